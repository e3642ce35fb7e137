use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Execution policy for a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DdlStrategy {
    /// Run the statement as-is on the primary connection.
    Direct,
    /// Run the statement as-is, but managed through the migration lifecycle.
    MySql,
    /// Row-copy + binlog-follow execution.
    Online,
    /// Alias of `online`.
    Vitess,
    /// Compare the submitted CREATE against the live table and emit the
    /// necessary action.
    Declarative,
}

impl DdlStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DdlStrategy::Direct => "direct",
            DdlStrategy::MySql => "mysql",
            DdlStrategy::Online => "online",
            DdlStrategy::Vitess => "vitess",
            DdlStrategy::Declarative => "declarative",
        }
    }

    /// Whether ALTERs under this strategy run through vreplication.
    pub fn runs_vreplication(&self) -> bool {
        matches!(self, DdlStrategy::Online | DdlStrategy::Vitess)
    }
}

impl fmt::Display for DdlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DdlStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" | "" => Ok(DdlStrategy::Direct),
            "mysql" => Ok(DdlStrategy::MySql),
            "online" => Ok(DdlStrategy::Online),
            "vitess" => Ok(DdlStrategy::Vitess),
            "declarative" => Ok(DdlStrategy::Declarative),
            other => Err(format!("unknown ddl strategy: {other}")),
        }
    }
}

/// Recognized `--flag[=value]` options on a migration submission.
const KNOWN_OPTIONS: &[&str] = &[
    "allow-concurrent",
    "postpone-launch",
    "postpone-completion",
    "singleton",
    "singleton-context",
    "singleton-table",
    "in-order-completion",
    "allow-zero-in-date",
    "unsafe-allow-foreign-keys",
    "retain-artifacts",
    "cut-over-threshold",
    "force-cut-over-after",
    "analyze-table",
    "declarative",
];

/// A strategy together with its raw option string, e.g.
/// `vitess --postpone-completion --cut-over-threshold=15s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdlStrategySetting {
    pub strategy: DdlStrategy,
    pub options: String,
}

impl DdlStrategySetting {
    pub fn new(strategy: DdlStrategy, options: impl Into<String>) -> Self {
        DdlStrategySetting {
            strategy,
            options: options.into(),
        }
    }

    pub fn direct() -> Self {
        DdlStrategySetting::new(DdlStrategy::Direct, "")
    }

    /// Parses `<strategy> [--flag[=value] ...]`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let trimmed = s.trim();
        let (strategy_str, options) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim().to_string()),
            None => (trimmed, String::new()),
        };
        let setting = DdlStrategySetting {
            strategy: strategy_str.parse()?,
            options,
        };
        setting.validate()?;
        Ok(setting)
    }

    /// Rejects option tokens outside the recognized set.
    pub fn validate(&self) -> Result<(), String> {
        for token in tokenize_options(&self.options) {
            let flag = token.strip_prefix("--").ok_or_else(|| {
                format!("invalid migration option (expected --flag[=value]): {token}")
            })?;
            let name = flag.split('=').next().unwrap_or(flag);
            if !KNOWN_OPTIONS.contains(&name) {
                return Err(format!("unknown migration option: --{name}"));
            }
        }
        Ok(())
    }

    fn has_flag(&self, name: &str) -> bool {
        tokenize_options(&self.options).iter().any(|token| {
            token
                .strip_prefix("--")
                .map(|flag| flag.split('=').next() == Some(name))
                .unwrap_or(false)
        })
    }

    fn flag_value(&self, name: &str) -> Option<String> {
        tokenize_options(&self.options).iter().find_map(|token| {
            let flag = token.strip_prefix("--")?;
            let (flag_name, value) = flag.split_once('=')?;
            if flag_name == name {
                Some(value.trim_matches('"').to_string())
            } else {
                None
            }
        })
    }

    pub fn is_singleton(&self) -> bool {
        self.has_flag("singleton")
    }

    pub fn is_singleton_context(&self) -> bool {
        self.has_flag("singleton-context")
    }

    pub fn is_singleton_table(&self) -> bool {
        self.has_flag("singleton-table")
    }

    pub fn is_allow_concurrent(&self) -> bool {
        self.has_flag("allow-concurrent")
    }

    pub fn is_postpone_launch(&self) -> bool {
        self.has_flag("postpone-launch")
    }

    pub fn is_postpone_completion(&self) -> bool {
        self.has_flag("postpone-completion")
    }

    pub fn is_in_order_completion(&self) -> bool {
        self.has_flag("in-order-completion")
    }

    pub fn is_allow_zero_in_date(&self) -> bool {
        self.has_flag("allow-zero-in-date")
    }

    pub fn is_allow_foreign_keys(&self) -> bool {
        self.has_flag("unsafe-allow-foreign-keys")
    }

    pub fn is_analyze_table(&self) -> bool {
        self.has_flag("analyze-table")
    }

    pub fn is_declarative(&self) -> bool {
        self.strategy == DdlStrategy::Declarative || self.has_flag("declarative")
    }

    pub fn retain_artifacts_duration(&self) -> Result<Option<Duration>, String> {
        self.flag_value("retain-artifacts")
            .map(|v| parse_duration(&v))
            .transpose()
    }

    pub fn cut_over_threshold(&self) -> Result<Option<Duration>, String> {
        self.flag_value("cut-over-threshold")
            .map(|v| parse_duration(&v))
            .transpose()
    }

    pub fn force_cut_over_after(&self) -> Result<Option<Duration>, String> {
        self.flag_value("force-cut-over-after")
            .map(|v| parse_duration(&v))
            .transpose()
    }
}

impl fmt::Display for DdlStrategySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.options.is_empty() {
            write!(f, "{}", self.strategy)
        } else {
            write!(f, "{} {}", self.strategy, self.options)
        }
    }
}

/// Splits an option string on whitespace, honoring double quotes so values
/// like `--message="hello world"` stay one token.
fn tokenize_options(options: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in options.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parses `10s`, `5m`, `2h`, `500ms`, or a plain number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let (digits, unit): (String, String) = {
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        (s[..split].to_string(), s[split..].to_string())
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("invalid duration unit in: {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_with_options() {
        let setting = DdlStrategySetting::parse("vitess --postpone-completion --singleton").unwrap();
        assert_eq!(setting.strategy, DdlStrategy::Vitess);
        assert!(setting.is_postpone_completion());
        assert!(setting.is_singleton());
        assert!(!setting.is_allow_concurrent());
        assert!(setting.strategy.runs_vreplication());
    }

    #[test]
    fn rejects_unknown_option() {
        assert!(DdlStrategySetting::parse("online --frobnicate").is_err());
        assert!(DdlStrategySetting::parse("online postpone-completion").is_err());
    }

    #[test]
    fn valued_options() {
        let setting =
            DdlStrategySetting::parse("online --cut-over-threshold=15s --retain-artifacts=2h")
                .unwrap();
        assert_eq!(
            setting.cut_over_threshold().unwrap(),
            Some(Duration::from_secs(15))
        );
        assert_eq!(
            setting.retain_artifacts_duration().unwrap(),
            Some(Duration::from_secs(7200))
        );
        assert_eq!(setting.force_cut_over_after().unwrap(), None);
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn quoted_values_stay_single_tokens() {
        let tokens = tokenize_options(r#"--singleton --message="a b c""#);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1], r#"--message="a b c""#);
    }
}
