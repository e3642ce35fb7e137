use chrono::{DateTime, NaiveDateTime, Utc};
use model::uuid::OnlineDdlUuid;
use std::fmt;
use std::str::FromStr;

/// Prefix of every internal table owned by the executor.
pub const INTERNAL_TABLE_PREFIX: &str = "_vt_";

/// Format of the timestamp embedded in internal table names.
const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Marker of shadow tables filled by vreplication.
const VREPL_HINT_TOKEN: &str = "vrp";

/// Lifecycle state encoded in a GC-namespace table name. The external
/// table-GC component walks tables HOLD -> PURGE -> EVAC -> DROP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcTableState {
    Hold,
    Purge,
    Evac,
    Drop,
}

impl GcTableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcTableState::Hold => "HOLD",
            GcTableState::Purge => "PURGE",
            GcTableState::Evac => "EVAC",
            GcTableState::Drop => "DROP",
        }
    }
}

impl fmt::Display for GcTableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GcTableState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOLD" => Ok(GcTableState::Hold),
            "PURGE" => Ok(GcTableState::Purge),
            "EVAC" => Ok(GcTableState::Evac),
            "DROP" => Ok(GcTableState::Drop),
            other => Err(format!("unknown GC table state: {other}")),
        }
    }
}

/// `_vt_<STATE>_<32 hex>_<yyyymmddhhmmss>`. The timestamp is the moment the
/// table becomes eligible for the next GC transition.
pub fn generate_gc_table_name(
    state: GcTableState,
    uuid: &OnlineDdlUuid,
    eligible_at: DateTime<Utc>,
) -> String {
    format!(
        "{INTERNAL_TABLE_PREFIX}{}_{}_{}",
        state,
        uuid.plain(),
        eligible_at.format(NAME_TIMESTAMP_FORMAT)
    )
}

/// Parses a GC-namespace name back into its parts.
pub fn analyze_gc_table_name(
    name: &str,
) -> Option<(GcTableState, OnlineDdlUuid, NaiveDateTime)> {
    let rest = name.strip_prefix(INTERNAL_TABLE_PREFIX)?;
    let (state_str, rest) = rest.split_once('_')?;
    let state = GcTableState::from_str(state_str).ok()?;
    if rest.len() < 33 || !rest.is_char_boundary(32) {
        return None;
    }
    let (plain_uuid, timestamp_str) = rest.split_at(32);
    let uuid = OnlineDdlUuid::from_plain(plain_uuid).ok()?;
    let timestamp_str = timestamp_str.strip_prefix('_')?;
    let timestamp = NaiveDateTime::parse_from_str(timestamp_str, NAME_TIMESTAMP_FORMAT).ok()?;
    Some((state, uuid, timestamp))
}

pub fn is_gc_table_name(name: &str) -> bool {
    analyze_gc_table_name(name).is_some()
}

/// The deterministic shadow-table name for a vreplication migration:
/// `_vt_vrp_<32 hex>_<yyyymmddhhmmss>`.
pub fn internal_vrepl_table_hint(uuid: &OnlineDdlUuid, at: DateTime<Utc>) -> String {
    format!(
        "{INTERNAL_TABLE_PREFIX}{VREPL_HINT_TOKEN}_{}_{}",
        uuid.plain(),
        at.format(NAME_TIMESTAMP_FORMAT)
    )
}

pub fn is_internal_vrepl_table_name(name: &str) -> bool {
    name.strip_prefix(INTERNAL_TABLE_PREFIX)
        .and_then(|rest| rest.strip_prefix(VREPL_HINT_TOKEN))
        .map(|rest| rest.starts_with('_'))
        .unwrap_or(false)
}

/// Any table the executor (or the external table GC) owns.
pub fn is_internal_operation_table_name(name: &str) -> bool {
    is_gc_table_name(name) || is_internal_vrepl_table_name(name)
}

/// A RENAME that moves a table into the GC namespace; returns the statement
/// and the chosen target name.
pub fn generate_rename_statement_with_uuid(
    table: &str,
    state: GcTableState,
    uuid: &OnlineDdlUuid,
    eligible_at: DateTime<Utc>,
) -> (String, String) {
    let to_name = generate_gc_table_name(state, uuid, eligible_at);
    (
        format!("RENAME TABLE `{table}` TO `{to_name}`"),
        to_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap()
    }

    #[test]
    fn gc_names_parse_back() {
        let uuid = OnlineDdlUuid::generate();
        let name = generate_gc_table_name(GcTableState::Hold, &uuid, ts());
        assert!(name.starts_with("_vt_HOLD_"));
        assert!(name.ends_with("20260301103000"));
        let (state, parsed_uuid, parsed_ts) = analyze_gc_table_name(&name).unwrap();
        assert_eq!(state, GcTableState::Hold);
        assert_eq!(parsed_uuid, uuid);
        assert_eq!(parsed_ts, ts().naive_utc());
        assert!(name.len() <= 64);
    }

    #[test]
    fn recognizes_internal_names() {
        let uuid = OnlineDdlUuid::generate();
        let shadow = internal_vrepl_table_hint(&uuid, ts());
        assert!(is_internal_vrepl_table_name(&shadow));
        assert!(is_internal_operation_table_name(&shadow));
        assert!(!is_gc_table_name(&shadow));
        assert!(!is_internal_operation_table_name("customers"));
        assert!(!is_gc_table_name("_vt_HOLD_tooshort_123"));
        assert!(!is_gc_table_name("_vt_FROZEN_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa_20260301103000"));
    }

    #[test]
    fn rename_statement_carries_target_name() {
        let uuid = OnlineDdlUuid::generate();
        let (statement, to_name) =
            generate_rename_statement_with_uuid("customers", GcTableState::Hold, &uuid, ts());
        assert_eq!(statement, format!("RENAME TABLE `customers` TO `{to_name}`"));
        assert!(is_gc_table_name(&to_name));
    }
}
