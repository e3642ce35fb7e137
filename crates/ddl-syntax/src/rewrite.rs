use crate::error::SyntaxError;
use crate::parse::DdlStatement;
use sqlparser::ast::{Statement, TableConstraint};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use xxhash_rust::xxh3::xxh3_64;

/// MySQL identifier length cap.
const MAX_IDENT_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRename {
    pub old: String,
    pub new: String,
}

/// Rewrites the statement in place so it targets `new_table` instead of the
/// original name. Relies on the exact byte span captured at parse time.
pub fn retarget_to_table(ddl: &DdlStatement, new_table: &str) -> Result<String, SyntaxError> {
    let (start, end) = ddl
        .table_span
        .ok_or_else(|| SyntaxError::Malformed("statement has no target table".to_string()))?;
    Ok(format!(
        "{}`{}`{}",
        &ddl.raw[..start],
        new_table,
        &ddl.raw[end..]
    ))
}

/// Materializes a view definition under an artifact name: both
/// `ALTER VIEW v AS ...` and `CREATE OR REPLACE VIEW v AS ...` become
/// `CREATE VIEW <artifact> AS ...`.
pub fn view_as_create(ddl: &DdlStatement, artifact: &str) -> Result<String, SyntaxError> {
    if !ddl.is_view {
        return Err(SyntaxError::Malformed(
            "not a view statement".to_string(),
        ));
    }
    let (_, end) = ddl
        .table_span
        .ok_or_else(|| SyntaxError::Malformed("statement has no view name".to_string()))?;
    Ok(format!("CREATE VIEW `{artifact}`{}", &ddl.raw[end..]))
}

/// Appends `ALGORITHM=INSTANT` so the server refuses anything that would
/// fall back to a blocking copy.
pub fn add_algorithm_instant(alter_sql: &str) -> String {
    let trimmed = alter_sql.trim_end().trim_end_matches(';');
    format!("{trimmed}, ALGORITHM=INSTANT")
}

/// Rewrites CHECK and FOREIGN KEY constraint names in a CREATE TABLE so they
/// are deterministic across shards: any `<table>_` prefix is stripped and a
/// hash of the constraint body is appended. MySQL scopes these names to the
/// schema, so shard copies of the same table may not reuse them verbatim.
pub fn rewrite_create_table_constraints(
    sql: &str,
    table: &str,
) -> Result<(String, Vec<ConstraintRename>), SyntaxError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
    let mut statement = statements
        .pop()
        .ok_or_else(|| SyntaxError::Malformed("empty statement".to_string()))?;
    let Statement::CreateTable {
        ref mut constraints,
        ..
    } = statement
    else {
        return Err(SyntaxError::Malformed(
            "expected a CREATE TABLE statement".to_string(),
        ));
    };
    let mut renames = Vec::new();
    for constraint in constraints.iter_mut() {
        rename_constraint(constraint, table, &mut renames);
    }
    Ok((statement.to_string(), renames))
}

/// Same rewrite for constraints added by an ALTER TABLE.
pub fn rewrite_alter_constraints(
    sql: &str,
    table: &str,
) -> Result<(String, Vec<ConstraintRename>), SyntaxError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
    let mut statement = statements
        .pop()
        .ok_or_else(|| SyntaxError::Malformed("empty statement".to_string()))?;
    let Statement::AlterTable {
        ref mut operations, ..
    } = statement
    else {
        return Err(SyntaxError::Malformed(
            "expected an ALTER TABLE statement".to_string(),
        ));
    };
    let mut renames = Vec::new();
    for operation in operations.iter_mut() {
        if let sqlparser::ast::AlterTableOperation::AddConstraint(constraint) = operation {
            rename_constraint(constraint, table, &mut renames);
        }
    }
    Ok((statement.to_string(), renames))
}

fn rename_constraint(
    constraint: &mut TableConstraint,
    table: &str,
    renames: &mut Vec<ConstraintRename>,
) {
    let definition = constraint.to_string();
    let name = match constraint {
        TableConstraint::ForeignKey { name, .. } => name,
        TableConstraint::Check { name, .. } => name,
        // Index names are table-scoped in MySQL; nothing to deduplicate.
        _ => return,
    };
    if let Some(ident) = name {
        let new_name = deterministic_constraint_name(&ident.value, table, &definition);
        if new_name != ident.value {
            renames.push(ConstraintRename {
                old: ident.value.clone(),
                new: new_name.clone(),
            });
            ident.value = new_name;
        }
    }
}

/// `<base stripped of table prefix>_<8 hex of xxh3(definition)>`, capped to
/// MySQL's identifier length.
pub fn deterministic_constraint_name(original: &str, table: &str, definition: &str) -> String {
    let base = original
        .strip_prefix(&format!("{table}_"))
        .unwrap_or(original);
    let suffix = format!("{:08x}", xxh3_64(definition.as_bytes()) & 0xffff_ffff);
    let max_base = MAX_IDENT_LENGTH - suffix.len() - 1;
    let base = if base.len() > max_base {
        &base[..max_base]
    } else {
        base
    };
    format!("{base}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_ddl;

    #[test]
    fn retargets_alter_to_shadow_table() {
        let ddl = parse_ddl("ALTER TABLE `shop`.`orders` ADD COLUMN note TEXT").unwrap();
        let rewritten = retarget_to_table(&ddl, "_vt_vrp_abc_20260301100000").unwrap();
        assert_eq!(
            rewritten,
            "ALTER TABLE `_vt_vrp_abc_20260301100000` ADD COLUMN note TEXT"
        );
    }

    #[test]
    fn alter_view_becomes_create_of_artifact() {
        let ddl = parse_ddl("ALTER VIEW totals AS SELECT id, amount FROM orders").unwrap();
        let rewritten = view_as_create(&ddl, "_vt_HOLD_x_20260301100000").unwrap();
        assert_eq!(
            rewritten,
            "CREATE VIEW `_vt_HOLD_x_20260301100000` AS SELECT id, amount FROM orders"
        );
    }

    #[test]
    fn instant_suffix() {
        assert_eq!(
            add_algorithm_instant("ALTER TABLE t ADD COLUMN c INT;"),
            "ALTER TABLE t ADD COLUMN c INT, ALGORITHM=INSTANT"
        );
    }

    #[test]
    fn constraint_names_are_deterministic_and_prefix_stripped() {
        let a = deterministic_constraint_name("orders_chk_1", "orders", "CHECK (amount > 0)");
        let b = deterministic_constraint_name("orders_chk_1", "orders", "CHECK (amount > 0)");
        let c = deterministic_constraint_name("orders_chk_1", "orders", "CHECK (amount >= 0)");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("chk_1_"));
        assert!(a.len() <= MAX_IDENT_LENGTH);
    }

    #[test]
    fn rewrites_create_table_check_constraint() {
        let (rewritten, renames) = rewrite_create_table_constraints(
            "CREATE TABLE orders (id INT PRIMARY KEY, amount INT, \
             CONSTRAINT orders_positive CHECK (amount > 0))",
            "orders",
        )
        .unwrap();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].old, "orders_positive");
        assert!(renames[0].new.starts_with("positive_"));
        assert!(rewritten.contains(&renames[0].new));
        assert!(!rewritten.contains("orders_positive"));
    }
}
