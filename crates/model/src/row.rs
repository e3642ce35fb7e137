use serde::{Deserialize, Serialize};

/// A database value decoupled from any driver, so stores and fakes can share
/// one row representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::UInt(v) => i64::try_from(*v).ok(),
            SqlValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::UInt(v) => Some(*v),
            SqlValue::Int(v) => u64::try_from(*v).ok(),
            SqlValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::UInt(v) => Some(*v as f64),
            SqlValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// MySQL booleans arrive as tinyint.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_i64().map(|v| v != 0)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Str(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Str(s)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

/// One result row: ordered column/value pairs with case-insensitive lookup,
/// mapped once into typed records by the callers that know the schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlRow {
    pairs: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new(pairs: Vec<(String, SqlValue)>) -> Self {
        SqlRow { pairs }
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.pairs.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.pairs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Value by position, for single-column results.
    pub fn at(&self, index: usize) -> Option<&SqlValue> {
        self.pairs.get(index).map(|(_, value)| value)
    }

    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.as_i64())
    }

    pub fn get_u64(&self, column: &str) -> Option<u64> {
        self.get(column).and_then(|v| v.as_u64())
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(|v| v.as_bool())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut row = SqlRow::default();
        row.push("Migration_UUID", SqlValue::from("abc"));
        row.push("retries", SqlValue::Int(3));
        assert_eq!(row.get_str("migration_uuid").as_deref(), Some("abc"));
        assert_eq!(row.get_i64("RETRIES"), Some(3));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn tinyint_booleans() {
        let mut row = SqlRow::default();
        row.push("postpone_launch", SqlValue::Int(1));
        row.push("is_view", SqlValue::Int(0));
        assert_eq!(row.get_bool("postpone_launch"), Some(true));
        assert_eq!(row.get_bool("is_view"), Some(false));
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(SqlValue::Str("42".into()).as_u64(), Some(42));
        assert_eq!(SqlValue::UInt(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Int(-1).as_u64(), None);
    }
}
