use crate::error::SyntaxError;
use sqlparser::ast::{ColumnOption, Statement, TableConstraint};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// A table structure reduced to what migration analysis needs.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub unique_keys: Vec<KeyDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub has_default: bool,
}

#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub foreign_table: String,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// What a shadow-table migration changes relative to its source, as recorded
/// on the migration row. The notes explain what a later REVERT could lose.
#[derive(Debug, Clone, Default)]
pub struct SchemaAnalysis {
    pub added_unique_keys: u64,
    pub removed_unique_keys: u64,
    pub removed_unique_key_names: Vec<String>,
    pub removed_foreign_key_names: Vec<String>,
    pub dropped_no_default_column_names: Vec<String>,
    pub expanded_column_names: Vec<String>,
    pub revertible_notes: Vec<String>,
}

/// Extracts a `TableDefinition` from a CREATE TABLE statement (typically the
/// output of SHOW CREATE TABLE).
pub fn parse_create_table(sql: &str) -> Result<TableDefinition, SyntaxError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
    let statement = statements
        .pop()
        .ok_or_else(|| SyntaxError::Malformed("empty statement".to_string()))?;
    let Statement::CreateTable {
        name,
        columns,
        constraints,
        ..
    } = statement
    else {
        return Err(SyntaxError::Malformed(
            "expected a CREATE TABLE statement".to_string(),
        ));
    };

    let table_name = name
        .0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default();

    let mut definition = TableDefinition {
        name: table_name,
        columns: Vec::new(),
        unique_keys: Vec::new(),
        foreign_keys: Vec::new(),
    };

    for column in &columns {
        let mut nullable = true;
        let mut has_default = false;
        for option in &column.options {
            match &option.option {
                ColumnOption::NotNull => nullable = false,
                ColumnOption::Default(_) => has_default = true,
                ColumnOption::Unique { is_primary } => {
                    if *is_primary {
                        nullable = false;
                    }
                    definition.unique_keys.push(KeyDefinition {
                        name: if *is_primary {
                            "PRIMARY".to_string()
                        } else {
                            column.name.value.clone()
                        },
                        columns: vec![column.name.value.to_ascii_lowercase()],
                        is_primary: *is_primary,
                    });
                }
                _ => {}
            }
        }
        definition.columns.push(ColumnDefinition {
            name: column.name.value.clone(),
            data_type: column.data_type.to_string().to_ascii_uppercase(),
            nullable,
            has_default,
        });
    }

    for constraint in &constraints {
        match constraint {
            TableConstraint::Unique {
                name,
                columns,
                is_primary,
            } => {
                definition.unique_keys.push(KeyDefinition {
                    name: if *is_primary {
                        "PRIMARY".to_string()
                    } else {
                        name.as_ref()
                            .map(|i| i.value.clone())
                            .unwrap_or_else(|| "<anonymous>".to_string())
                    },
                    columns: columns
                        .iter()
                        .map(|c| c.value.to_ascii_lowercase())
                        .collect(),
                    is_primary: *is_primary,
                });
            }
            TableConstraint::ForeignKey {
                name,
                columns,
                foreign_table,
                ..
            } => {
                definition.foreign_keys.push(ForeignKeyDefinition {
                    name: name
                        .as_ref()
                        .map(|i| i.value.clone())
                        .unwrap_or_else(|| "<anonymous>".to_string()),
                    columns: columns
                        .iter()
                        .map(|c| c.value.to_ascii_lowercase())
                        .collect(),
                    foreign_table: foreign_table
                        .0
                        .last()
                        .map(|i| i.value.to_ascii_lowercase())
                        .unwrap_or_default(),
                });
            }
            _ => {}
        }
    }

    Ok(definition)
}

/// Compares source and shadow structures, recording what the migration adds,
/// removes and expands.
pub fn analyze_schema_change(
    source: &TableDefinition,
    shadow: &TableDefinition,
) -> SchemaAnalysis {
    let mut analysis = SchemaAnalysis::default();

    let source_key_sets: Vec<(&KeyDefinition, Vec<String>)> = source
        .unique_keys
        .iter()
        .map(|k| (k, sorted(&k.columns)))
        .collect();
    let shadow_key_sets: Vec<Vec<String>> = shadow
        .unique_keys
        .iter()
        .map(|k| sorted(&k.columns))
        .collect();

    for (key, columns) in &source_key_sets {
        if !shadow_key_sets.contains(columns) {
            analysis.removed_unique_keys += 1;
            analysis.removed_unique_key_names.push(key.name.clone());
            analysis
                .revertible_notes
                .push(format!("unique key {} is removed", key.name));
        }
    }
    for columns in shadow.unique_keys.iter().map(|k| sorted(&k.columns)) {
        if !source_key_sets.iter().any(|(_, s)| *s == columns) {
            analysis.added_unique_keys += 1;
        }
    }

    let shadow_fk_signatures: Vec<String> =
        shadow.foreign_keys.iter().map(fk_signature).collect();
    for fk in &source.foreign_keys {
        if !shadow_fk_signatures.contains(&fk_signature(fk)) {
            analysis.removed_foreign_key_names.push(fk.name.clone());
        }
    }

    for column in &source.columns {
        match shadow.column(&column.name) {
            None => {
                if !column.nullable && !column.has_default {
                    analysis
                        .dropped_no_default_column_names
                        .push(column.name.clone());
                    analysis.revertible_notes.push(format!(
                        "dropped column {} has no default value",
                        column.name
                    ));
                }
            }
            Some(shadow_column) => {
                if is_expanded_type(&column.data_type, &shadow_column.data_type) {
                    analysis.expanded_column_names.push(column.name.clone());
                    analysis.revertible_notes.push(format!(
                        "column {} is expanded from {} to {}",
                        column.name, column.data_type, shadow_column.data_type
                    ));
                }
            }
        }
    }

    analysis
}

fn sorted(columns: &[String]) -> Vec<String> {
    let mut v = columns.to_vec();
    v.sort();
    v
}

fn fk_signature(fk: &ForeignKeyDefinition) -> String {
    format!("{}->{}", sorted(&fk.columns).join(","), fk.foreign_table)
}

/// Coarse type-widening check: a reverted migration would have to narrow
/// these columns back, possibly truncating data.
fn is_expanded_type(source: &str, shadow: &str) -> bool {
    if source == shadow {
        return false;
    }
    match (type_rank(source), type_rank(shadow)) {
        (Some((source_family, source_size)), Some((shadow_family, shadow_size))) => {
            if source_family == shadow_family {
                shadow_size > source_size
            } else {
                // Crossing from a sized character type into a TEXT family.
                source_family == "char" && shadow_family == "text"
            }
        }
        _ => false,
    }
}

/// `(family, size)` where size orders types within a family.
fn type_rank(data_type: &str) -> Option<(&'static str, u64)> {
    let upper = data_type.to_ascii_uppercase();
    let base = upper.split(['(', ' ']).next().unwrap_or("");
    let parenthesized: Option<u64> = upper
        .split_once('(')
        .and_then(|(_, rest)| rest.split([')', ',']).next())
        .and_then(|digits| digits.trim().parse().ok());
    match base {
        "TINYINT" => Some(("int", 1)),
        "SMALLINT" => Some(("int", 2)),
        "MEDIUMINT" => Some(("int", 3)),
        "INT" | "INTEGER" => Some(("int", 4)),
        "BIGINT" => Some(("int", 5)),
        "CHAR" | "CHARACTER" => Some(("char", parenthesized.unwrap_or(1))),
        "VARCHAR" => Some(("char", parenthesized.unwrap_or(1))),
        "TINYTEXT" => Some(("text", 1)),
        "TEXT" => Some(("text", 2)),
        "MEDIUMTEXT" => Some(("text", 3)),
        "LONGTEXT" => Some(("text", 4)),
        "TINYBLOB" => Some(("blob", 1)),
        "BLOB" => Some(("blob", 2)),
        "MEDIUMBLOB" => Some(("blob", 3)),
        "LONGBLOB" => Some(("blob", 4)),
        "DECIMAL" | "NUMERIC" => Some(("decimal", parenthesized.unwrap_or(10))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "CREATE TABLE orders (\
        id INT NOT NULL, \
        code VARCHAR(16) NOT NULL, \
        note VARCHAR(64), \
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
        PRIMARY KEY (id), \
        CONSTRAINT code_idx UNIQUE (code), \
        CONSTRAINT fk_customer FOREIGN KEY (customer_id) REFERENCES customers (id))";

    #[test]
    fn parses_show_create_output() {
        let def = parse_create_table(SOURCE).unwrap();
        assert_eq!(def.name, "orders");
        assert_eq!(def.columns.len(), 4);
        assert_eq!(def.unique_keys.len(), 2);
        assert_eq!(def.foreign_keys.len(), 1);
        let code = def.column("code").unwrap();
        assert!(!code.nullable);
        assert!(!code.has_default);
    }

    #[test]
    fn detects_removed_unique_key_and_fk() {
        let source = parse_create_table(SOURCE).unwrap();
        let shadow = parse_create_table(
            "CREATE TABLE shadow (\
             id INT NOT NULL, \
             code VARCHAR(32) NOT NULL, \
             created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             PRIMARY KEY (id))",
        )
        .unwrap();
        let analysis = analyze_schema_change(&source, &shadow);
        assert_eq!(analysis.removed_unique_keys, 1);
        assert_eq!(analysis.removed_unique_key_names, vec!["code_idx"]);
        assert_eq!(analysis.removed_foreign_key_names, vec!["fk_customer"]);
        // `note` is nullable, so dropping it is revert-safe.
        assert!(analysis.dropped_no_default_column_names.is_empty());
        // VARCHAR(16) -> VARCHAR(32)
        assert_eq!(analysis.expanded_column_names, vec!["code"]);
        assert!(!analysis.revertible_notes.is_empty());
    }

    #[test]
    fn detects_dropped_column_without_default() {
        let source = parse_create_table(
            "CREATE TABLE t (id INT NOT NULL, code VARCHAR(10) NOT NULL, PRIMARY KEY (id))",
        )
        .unwrap();
        let shadow =
            parse_create_table("CREATE TABLE t (id INT NOT NULL, PRIMARY KEY (id))").unwrap();
        let analysis = analyze_schema_change(&source, &shadow);
        assert_eq!(analysis.dropped_no_default_column_names, vec!["code"]);
    }

    #[test]
    fn type_expansion_rules() {
        assert!(is_expanded_type("INT", "BIGINT"));
        assert!(!is_expanded_type("BIGINT", "INT"));
        assert!(is_expanded_type("VARCHAR(16)", "VARCHAR(32)"));
        assert!(is_expanded_type("VARCHAR(255)", "TEXT"));
        assert!(!is_expanded_type("INT", "INT"));
        assert!(!is_expanded_type("DATETIME", "TIMESTAMP"));
    }
}
