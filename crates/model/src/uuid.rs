use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A migration identifier: 32 lowercase hex digits grouped `8_4_4_4_12`,
/// joined with underscores so the value is usable inside a MySQL table name.
///
/// Example: `a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OnlineDdlUuid(String);

const GROUP_LENS: [usize; 5] = [8, 4, 4, 4, 12];

impl OnlineDdlUuid {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        let hyphenated = Uuid::new_v4().to_string();
        OnlineDdlUuid(hyphenated.replace('-', "_"))
    }

    /// Validates and adopts an identifier in the underscore form.
    /// A hyphenated RFC form is accepted and normalized.
    pub fn parse(s: &str) -> Result<Self, String> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let groups: Vec<&str> = normalized.split('_').collect();
        if groups.len() != GROUP_LENS.len() {
            return Err(format!("not a migration uuid: {s}"));
        }
        for (group, expected_len) in groups.iter().zip(GROUP_LENS.iter()) {
            if group.len() != *expected_len
                || !group.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
            {
                return Err(format!("not a migration uuid: {s}"));
            }
        }
        Ok(OnlineDdlUuid(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier with group separators removed: 32 hex digits.
    /// Used inside GC-namespace table names where parsing relies on a
    /// fixed-width field.
    pub fn plain(&self) -> String {
        self.0.replace('_', "")
    }

    /// Rebuilds the underscore form from a 32-hex-digit plain form.
    pub fn from_plain(plain: &str) -> Result<Self, String> {
        if plain.len() != 32 || !plain.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("not a plain migration uuid: {plain}"));
        }
        let lower = plain.to_ascii_lowercase();
        let mut grouped = String::with_capacity(36);
        let mut offset = 0;
        for (i, len) in GROUP_LENS.iter().enumerate() {
            if i > 0 {
                grouped.push('_');
            }
            grouped.push_str(&lower[offset..offset + len]);
            offset += len;
        }
        Ok(OnlineDdlUuid(grouped))
    }
}

impl fmt::Display for OnlineDdlUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnlineDdlUuid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OnlineDdlUuid::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuid_parses() {
        let uuid = OnlineDdlUuid::generate();
        assert_eq!(OnlineDdlUuid::parse(uuid.as_str()).unwrap(), uuid);
        assert_eq!(uuid.as_str().len(), 36);
    }

    #[test]
    fn hyphenated_form_is_normalized() {
        let uuid = OnlineDdlUuid::parse("A0C9BD52-66F1-11EC-BD2C-0A43F95F28A3").unwrap();
        assert_eq!(uuid.as_str(), "a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3");
    }

    #[test]
    fn plain_round_trip() {
        let uuid = OnlineDdlUuid::generate();
        let plain = uuid.plain();
        assert_eq!(plain.len(), 32);
        assert_eq!(OnlineDdlUuid::from_plain(&plain).unwrap(), uuid);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(OnlineDdlUuid::parse("").is_err());
        assert!(OnlineDdlUuid::parse("a0c9bd52_66f1_11ec_bd2c").is_err());
        assert!(OnlineDdlUuid::parse("g0c9bd52_66f1_11ec_bd2c_0a43f95f28a3").is_err());
        assert!(OnlineDdlUuid::from_plain("zz").is_err());
    }
}
