use crate::error::SyntaxError;
use model::status::DdlAction;
use model::uuid::OnlineDdlUuid;
use sqlparser::ast::{ObjectName, visit_relations};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

/// Submission fields encoded in a leading `/*ddl: ... */` comment, e.g.
/// `/*ddl: uuid=a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3 strategy=vitess
/// options="--postpone-completion" context=cli-8821 */`.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDirectives {
    pub uuid: Option<OnlineDdlUuid>,
    pub context: Option<String>,
    pub strategy: Option<String>,
    pub options: Option<String>,
}

/// Coarse classification of a submitted DDL statement.
#[derive(Debug, Clone)]
pub struct DdlStatement {
    pub action: DdlAction,
    /// Unqualified target table or view name; empty for REVERT (resolved
    /// later by the reviewer).
    pub table: String,
    pub is_view: bool,
    pub if_exists: bool,
    pub if_not_exists: bool,
    pub or_replace: bool,
    pub revert_uuid: Option<OnlineDdlUuid>,
    /// The statement with submission directives stripped.
    pub raw: String,
    /// Byte span of the (possibly qualified, possibly quoted) target name
    /// inside `raw`; used for exact in-place rewrites.
    pub table_span: Option<(usize, usize)>,
}

/// Splits a submission into its directive comment and classified statement.
pub fn parse_submission(sql: &str) -> Result<(SubmissionDirectives, DdlStatement), SyntaxError> {
    let (directives, stripped) = extract_directives(sql)?;
    let ddl = parse_ddl(&stripped)?;
    Ok((directives, ddl))
}

/// Classifies a DDL statement without looking at directives.
pub fn parse_ddl(sql: &str) -> Result<DdlStatement, SyntaxError> {
    let mut scanner = Scanner::new(sql);
    scanner.skip_ws_and_comments();
    let keyword = scanner
        .take_atom()
        .ok_or_else(|| SyntaxError::Malformed("empty statement".to_string()))?
        .to_ascii_uppercase();
    match keyword.as_str() {
        "REVERT" => parse_revert(sql, &mut scanner),
        "CREATE" => parse_create(sql, &mut scanner),
        "DROP" => parse_drop(sql, &mut scanner),
        "ALTER" => parse_alter(sql, &mut scanner),
        other => Err(SyntaxError::Unsupported(format!(
            "not a schema change statement (starts with {other})"
        ))),
    }
}

fn parse_revert(sql: &str, scanner: &mut Scanner) -> Result<DdlStatement, SyntaxError> {
    let mut atom = scanner
        .take_atom()
        .ok_or_else(|| SyntaxError::Malformed("REVERT requires a migration uuid".to_string()))?;
    if atom.eq_ignore_ascii_case("VITESS_MIGRATION") {
        atom = scanner.take_atom().ok_or_else(|| {
            SyntaxError::Malformed("REVERT requires a migration uuid".to_string())
        })?;
    }
    let uuid_text = atom.trim_matches('\'');
    let uuid = OnlineDdlUuid::parse(uuid_text).map_err(SyntaxError::Malformed)?;
    Ok(DdlStatement {
        action: DdlAction::Revert,
        table: String::new(),
        is_view: false,
        if_exists: false,
        if_not_exists: false,
        or_replace: false,
        revert_uuid: Some(uuid),
        raw: sql.to_string(),
        table_span: None,
    })
}

fn parse_create(sql: &str, scanner: &mut Scanner) -> Result<DdlStatement, SyntaxError> {
    let mut or_replace = false;
    let mut is_view = false;
    // Skip view attributes (ALGORITHM=, DEFINER=, SQL SECURITY) until the
    // object keyword.
    for _ in 0..12 {
        let atom = scanner
            .take_atom()
            .ok_or_else(|| SyntaxError::Malformed("incomplete CREATE statement".to_string()))?
            .to_ascii_uppercase();
        match atom.as_str() {
            "OR" => {
                if !scanner.accept_keyword("REPLACE") {
                    return Err(SyntaxError::Malformed("expected REPLACE after OR".to_string()));
                }
                or_replace = true;
            }
            "TABLE" => break,
            "VIEW" => {
                is_view = true;
                break;
            }
            "INDEX" | "UNIQUE" | "FULLTEXT" | "SPATIAL" | "DATABASE" | "SCHEMA" => {
                return Err(SyntaxError::Unsupported(format!(
                    "CREATE {atom} is not a supported schema change"
                )));
            }
            _ => continue,
        }
    }
    let if_not_exists = scanner.accept_phrase(&["IF", "NOT", "EXISTS"]);
    let (table, span) = scanner
        .take_identifier()
        .ok_or_else(|| SyntaxError::Malformed("missing table name in CREATE".to_string()))?;
    Ok(DdlStatement {
        action: DdlAction::Create,
        table,
        is_view,
        if_exists: false,
        if_not_exists,
        or_replace,
        revert_uuid: None,
        raw: sql.to_string(),
        table_span: Some(span),
    })
}

fn parse_drop(sql: &str, scanner: &mut Scanner) -> Result<DdlStatement, SyntaxError> {
    let object = scanner
        .take_atom()
        .ok_or_else(|| SyntaxError::Malformed("incomplete DROP statement".to_string()))?
        .to_ascii_uppercase();
    let is_view = match object.as_str() {
        "TABLE" => false,
        "VIEW" => true,
        other => {
            return Err(SyntaxError::Unsupported(format!(
                "DROP {other} is not a supported schema change"
            )));
        }
    };
    let if_exists = scanner.accept_phrase(&["IF", "EXISTS"]);
    let (table, span) = scanner
        .take_identifier()
        .ok_or_else(|| SyntaxError::Malformed("missing table name in DROP".to_string()))?;
    // Multi-table DROP is rejected: one migration maps to one table.
    scanner.skip_ws_and_comments();
    if scanner.peek_char() == Some(',') {
        return Err(SyntaxError::Unsupported(
            "DROP of multiple tables must be submitted as separate migrations".to_string(),
        ));
    }
    Ok(DdlStatement {
        action: DdlAction::Drop,
        table,
        is_view,
        if_exists,
        if_not_exists: false,
        or_replace: false,
        revert_uuid: None,
        raw: sql.to_string(),
        table_span: Some(span),
    })
}

fn parse_alter(sql: &str, scanner: &mut Scanner) -> Result<DdlStatement, SyntaxError> {
    let mut is_view = false;
    for _ in 0..12 {
        let atom = scanner
            .take_atom()
            .ok_or_else(|| SyntaxError::Malformed("incomplete ALTER statement".to_string()))?
            .to_ascii_uppercase();
        match atom.as_str() {
            "TABLE" => break,
            "VIEW" => {
                is_view = true;
                break;
            }
            // ALTER ALGORITHM=... DEFINER=... VIEW
            _ => continue,
        }
    }
    let (table, span) = scanner
        .take_identifier()
        .ok_or_else(|| SyntaxError::Malformed("missing table name in ALTER".to_string()))?;
    Ok(DdlStatement {
        action: DdlAction::Alter,
        table,
        is_view,
        if_exists: false,
        if_not_exists: false,
        or_replace: false,
        revert_uuid: None,
        raw: sql.to_string(),
        table_span: Some(span),
    })
}

/// Strips leading `/* ... */` comments, collecting `ddl:` directives.
fn extract_directives(sql: &str) -> Result<(SubmissionDirectives, String), SyntaxError> {
    let mut directives = SubmissionDirectives::default();
    let mut rest = sql.trim_start();
    while rest.starts_with("/*") {
        let end = rest
            .find("*/")
            .ok_or_else(|| SyntaxError::Malformed("unterminated comment".to_string()))?;
        let body = &rest[2..end];
        if let Some(payload) = body.trim().strip_prefix("ddl:") {
            apply_directives(&mut directives, payload)?;
        }
        rest = rest[end + 2..].trim_start();
    }
    Ok((directives, rest.to_string()))
}

fn apply_directives(directives: &mut SubmissionDirectives, payload: &str) -> Result<(), SyntaxError> {
    for token in split_quoted(payload) {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| SyntaxError::Directive(format!("expected key=value, got {token}")))?;
        let value = value.trim_matches('"').to_string();
        match key {
            "uuid" => {
                directives.uuid = Some(OnlineDdlUuid::parse(&value).map_err(SyntaxError::Directive)?);
            }
            "context" => directives.context = Some(value),
            "strategy" => directives.strategy = Some(value),
            "options" => directives.options = Some(value),
            other => {
                return Err(SyntaxError::Directive(format!("unknown directive: {other}")));
            }
        }
    }
    Ok(())
}

fn split_quoted(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
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

/// True when the statement's text mentions AUTO_INCREMENT, meaning the user
/// took control of the counter and the executor must not propagate it.
pub fn mentions_auto_increment(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains("AUTO_INCREMENT")
}

/// Walks the statement's AST and reports whether it references the table.
/// Used to pick KILL targets from the process list; statements that fail to
/// parse are assumed not to reference the table.
pub fn statement_references_table(sql: &str, table: &str) -> bool {
    let Ok(statements) = Parser::parse_sql(&MySqlDialect {}, sql) else {
        return false;
    };
    let mut found = false;
    for statement in &statements {
        let _: ControlFlow<()> = visit_relations(statement, |relation: &ObjectName| {
            if relation
                .0
                .last()
                .map(|ident| ident.value.eq_ignore_ascii_case(table))
                .unwrap_or(false)
            {
                found = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        if found {
            break;
        }
    }
    found
}

/// Minimal statement scanner: whitespace/comment skipping, atoms, and MySQL
/// identifiers (backtick-quoted, optionally schema-qualified).
pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Scanner { src, pos: 0 }
    }

    pub(crate) fn skip_ws_and_comments(&mut self) {
        loop {
            let rest = &self.src[self.pos..];
            if rest.starts_with("/*") {
                match rest.find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => {
                        self.pos = self.src.len();
                        return;
                    }
                }
            } else if rest.starts_with("--") || rest.starts_with('#') {
                match rest.find('\n') {
                    Some(end) => self.pos += end + 1,
                    None => {
                        self.pos = self.src.len();
                        return;
                    }
                }
            } else if let Some(c) = rest.chars().next() {
                if c.is_whitespace() {
                    self.pos += c.len_utf8();
                } else {
                    return;
                }
            } else {
                return;
            }
        }
    }

    pub(crate) fn peek_char(&mut self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    /// Consumes a run of non-whitespace characters, honoring backtick quotes.
    pub(crate) fn take_atom(&mut self) -> Option<String> {
        self.skip_ws_and_comments();
        let start = self.pos;
        let mut in_backticks = false;
        for c in self.src[self.pos..].chars() {
            match c {
                '`' => {
                    in_backticks = !in_backticks;
                    self.pos += 1;
                }
                c if c.is_whitespace() && !in_backticks => break,
                c => self.pos += c.len_utf8(),
            }
        }
        if self.pos == start {
            None
        } else {
            Some(self.src[start..self.pos].to_string())
        }
    }

    pub(crate) fn accept_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws_and_comments();
        let saved = self.pos;
        match self.take_atom() {
            Some(atom) if atom.eq_ignore_ascii_case(keyword) => true,
            _ => {
                self.pos = saved;
                false
            }
        }
    }

    pub(crate) fn accept_phrase(&mut self, keywords: &[&str]) -> bool {
        let saved = self.pos;
        for keyword in keywords {
            if !self.accept_keyword(keyword) {
                self.pos = saved;
                return false;
            }
        }
        true
    }

    /// Consumes `[schema.]name` with optional backtick quoting.
    /// Returns the unquoted last part and the byte span of the whole
    /// qualified name.
    pub(crate) fn take_identifier(&mut self) -> Option<(String, (usize, usize))> {
        self.skip_ws_and_comments();
        let start = self.pos;
        let mut last_part = self.take_identifier_part()?;
        loop {
            let saved = self.pos;
            self.skip_ws_and_comments();
            if self.peek_char() == Some('.') {
                self.pos += 1;
                match self.take_identifier_part() {
                    Some(part) => last_part = part,
                    None => {
                        self.pos = saved;
                        break;
                    }
                }
            } else {
                self.pos = saved;
                break;
            }
        }
        Some((last_part, (start, self.pos)))
    }

    fn take_identifier_part(&mut self) -> Option<String> {
        self.skip_ws_and_comments();
        let rest = &self.src[self.pos..];
        let mut chars = rest.chars();
        match chars.next()? {
            '`' => {
                let mut name = String::new();
                let mut offset = 1;
                let mut closed = false;
                let mut iter = rest[1..].chars().peekable();
                while let Some(c) = iter.next() {
                    offset += c.len_utf8();
                    if c == '`' {
                        if iter.peek() == Some(&'`') {
                            iter.next();
                            offset += 1;
                            name.push('`');
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        name.push(c);
                    }
                }
                if !closed || name.is_empty() {
                    return None;
                }
                self.pos += offset;
                Some(name)
            }
            c if is_ident_char(c) => {
                let mut len = 0;
                for c in rest.chars() {
                    if is_ident_char(c) {
                        len += c.len_utf8();
                    } else {
                        break;
                    }
                }
                self.pos += len;
                Some(rest[..len].to_string())
            }
            _ => None,
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_create_table() {
        let ddl = parse_ddl("CREATE TABLE IF NOT EXISTS `shop`.`orders` (id INT PRIMARY KEY)")
            .unwrap();
        assert_eq!(ddl.action, DdlAction::Create);
        assert_eq!(ddl.table, "orders");
        assert!(ddl.if_not_exists);
        assert!(!ddl.is_view);
        let (start, end) = ddl.table_span.unwrap();
        assert_eq!(&ddl.raw[start..end], "`shop`.`orders`");
    }

    #[test]
    fn classifies_create_or_replace_view() {
        let ddl =
            parse_ddl("CREATE OR REPLACE VIEW order_totals AS SELECT id FROM orders").unwrap();
        assert_eq!(ddl.action, DdlAction::Create);
        assert!(ddl.is_view);
        assert!(ddl.or_replace);
        assert_eq!(ddl.table, "order_totals");
    }

    #[test]
    fn classifies_drop_with_if_exists() {
        let ddl = parse_ddl("DROP TABLE IF EXISTS customers").unwrap();
        assert_eq!(ddl.action, DdlAction::Drop);
        assert!(ddl.if_exists);
        assert_eq!(ddl.table, "customers");
        assert!(parse_ddl("DROP TABLE a, b").is_err());
    }

    #[test]
    fn classifies_alter_view_with_attributes() {
        let ddl = parse_ddl(
            "ALTER ALGORITHM=UNDEFINED DEFINER=`root`@`localhost` SQL SECURITY DEFINER \
             VIEW order_totals AS SELECT id, total FROM orders",
        )
        .unwrap();
        assert_eq!(ddl.action, DdlAction::Alter);
        assert!(ddl.is_view);
        assert_eq!(ddl.table, "order_totals");
    }

    #[test]
    fn classifies_revert() {
        let ddl = parse_ddl("REVERT VITESS_MIGRATION 'a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3'")
            .unwrap();
        assert_eq!(ddl.action, DdlAction::Revert);
        assert_eq!(
            ddl.revert_uuid.unwrap().as_str(),
            "a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3"
        );
    }

    #[test]
    fn rejects_non_ddl() {
        assert!(parse_ddl("SELECT 1").is_err());
        assert!(parse_ddl("CREATE INDEX i ON t (c)").is_err());
        assert!(parse_ddl("").is_err());
    }

    #[test]
    fn extracts_directives() {
        let (directives, ddl) = parse_submission(
            "/*ddl: uuid=a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3 strategy=vitess \
             options=\"--postpone-completion --singleton\" context=cli-77 */ \
             ALTER TABLE t ADD COLUMN c INT",
        )
        .unwrap();
        assert_eq!(
            directives.uuid.unwrap().as_str(),
            "a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3"
        );
        assert_eq!(directives.strategy.as_deref(), Some("vitess"));
        assert_eq!(
            directives.options.as_deref(),
            Some("--postpone-completion --singleton")
        );
        assert_eq!(directives.context.as_deref(), Some("cli-77"));
        assert!(ddl.raw.starts_with("ALTER TABLE"));
        assert!(parse_submission("/*ddl: bogus=1 */ DROP TABLE t").is_err());
    }

    #[test]
    fn finds_table_references_in_queries() {
        assert!(statement_references_table(
            "SELECT * FROM customers WHERE id = 3",
            "customers"
        ));
        assert!(statement_references_table(
            "UPDATE shop.customers SET name = 'x' WHERE id = 1",
            "customers"
        ));
        assert!(!statement_references_table(
            "SELECT * FROM orders",
            "customers"
        ));
        assert!(!statement_references_table("not sql at all", "customers"));
    }
}
