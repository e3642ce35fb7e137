use crate::parse::{DdlStatement, Scanner};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{AlterColumnOperation, AlterTableOperation, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// An ALTER that can bypass the row-copy path and execute in-place within
/// sub-second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialAlterPlan {
    /// Every operation is INSTANT-algorithm eligible on this server.
    InstantDdl,
    /// A pure range-partition ADD/DROP.
    RangePartition,
}

impl SpecialAlterPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialAlterPlan::InstantDdl => "instant-ddl",
            SpecialAlterPlan::RangePartition => "range-partition",
        }
    }
}

/// Detects a pure `ALTER TABLE ... ADD|DROP PARTITION ...` statement.
pub fn is_range_partition_alter(ddl: &DdlStatement) -> bool {
    if ddl.is_view {
        return false;
    }
    let Some((_, name_end)) = ddl.table_span else {
        return false;
    };
    let mut scanner = Scanner::new(&ddl.raw[name_end..]);
    let first = scanner.take_atom().map(|a| a.to_ascii_uppercase());
    let second = scanner.take_atom().map(|a| a.to_ascii_uppercase());
    matches!(
        (first.as_deref(), second.as_deref()),
        (Some("ADD"), Some("PARTITION")) | (Some("DROP"), Some("PARTITION"))
    )
}

/// True when every operation of the ALTER is eligible for
/// `ALGORITHM=INSTANT`: column add/drop/rename and default changes. The
/// server must additionally support instant DDL (MySQL 8.0+), which the
/// caller checks.
pub fn is_instant_ddl_eligible(sql: &str) -> bool {
    let Ok(statements) = Parser::parse_sql(&MySqlDialect {}, sql) else {
        return false;
    };
    let Some(Statement::AlterTable { operations, .. }) = statements.into_iter().next() else {
        return false;
    };
    if operations.is_empty() {
        return false;
    }
    operations.iter().all(|operation| match operation {
        AlterTableOperation::AddColumn { .. } => true,
        AlterTableOperation::DropColumn { .. } => true,
        AlterTableOperation::RenameColumn { .. } => true,
        AlterTableOperation::AlterColumn { op, .. } => matches!(
            op,
            AlterColumnOperation::SetDefault { .. } | AlterColumnOperation::DropDefault
        ),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_ddl;

    #[test]
    fn detects_range_partition_alters() {
        let add = parse_ddl(
            "ALTER TABLE metrics ADD PARTITION (PARTITION p2026 VALUES LESS THAN (2027))",
        )
        .unwrap();
        assert!(is_range_partition_alter(&add));

        let drop = parse_ddl("ALTER TABLE metrics DROP PARTITION p2020").unwrap();
        assert!(is_range_partition_alter(&drop));

        let plain = parse_ddl("ALTER TABLE metrics ADD COLUMN c INT").unwrap();
        assert!(!is_range_partition_alter(&plain));
    }

    #[test]
    fn instant_eligibility() {
        assert!(is_instant_ddl_eligible(
            "ALTER TABLE t ADD COLUMN c INT, DROP COLUMN d"
        ));
        assert!(is_instant_ddl_eligible(
            "ALTER TABLE t ALTER COLUMN c SET DEFAULT 5"
        ));
        assert!(!is_instant_ddl_eligible("ALTER TABLE t ENGINE=InnoDB"));
        assert!(!is_instant_ddl_eligible(
            "ALTER TABLE t ADD COLUMN c INT, ADD UNIQUE KEY c_idx (c)"
        ));
        assert!(!is_instant_ddl_eligible("not sql"));
    }
}
