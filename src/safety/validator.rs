//! Text-level SQL validation and rewriting.
//!
//! The validator works on raw SQL text with regular expressions rather than
//! a parser. Rules are applied in a fixed order and the first match wins:
//!
//! 1. empty input is rejected
//! 2. a `;` followed by more content is rejected as multiple statements
//! 3. forbidden commands are rejected for every caller
//! 4. a leading `EXPLAIN` is stripped and the inner statement validated
//! 5. standard callers are limited to SELECT over allow-listed tables
//! 6. SELECT statements without `LIMIT n` get the forced row limit
//!
//! Known limitation: the scans do not understand comments or string
//! literals. Most mistakes fail closed: `SELECT ';x'` is rejected as
//! multiple statements and `EXTRACT(YEAR FROM order_date)` reads
//! `order_date` as a table reference. A trailing line comment fails open.
//! In `SELECT id FROM sample_customers -- all` the appended `LIMIT` lands
//! inside the comment, so the row cap is lost for that statement.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{Privilege, ValidationOutcome};

/// Tables standard callers may read by default.
pub const DEFAULT_ALLOWED_TABLES: [&str; 4] = [
    "sample_customers",
    "sample_products",
    "sample_orders",
    "sample_order_items",
];

const DEFAULT_MAX_ROWS: u32 = 1000;

static FORBIDDEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bDROP\s+DATABASE\b",
        r"\bDROP\s+SCHEMA\b",
        r"\bTRUNCATE\b",
        r"\bGRANT\b",
        r"\bREVOKE\b",
        r"\bCREATE\s+USER\b",
        r"\bDROP\s+USER\b",
        r"\bALTER\s+USER\b",
        r"\bSHUTDOWN\b",
        r"\bLOAD\s+DATA\b",
        r"\bINTO\s+OUTFILE\b",
        r"\bINTO\s+DUMPFILE\b",
    ]
    .iter()
    .map(|p| case_insensitive(p))
    .collect()
});

static MULTI_STATEMENT: LazyLock<Regex> = LazyLock::new(|| pattern(r";\s*\S"));
static SELECT_START: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"^\s*SELECT\b"));
static EXPLAIN_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"^\s*(EXPLAIN)\b\s*"));
static LIMIT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| case_insensitive(r"\bLIMIT\s+\d+"));
static TABLE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| case_insensitive(r"(?:\bFROM\b|\bJOIN\b)\s+([`\w]+)"));
static TRAILING_SEMICOLON: LazyLock<Regex> = LazyLock::new(|| pattern(r";\s*$"));

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("validator pattern is a valid regex")
}

fn case_insensitive(re: &str) -> Regex {
    pattern(&format!("(?i){re}"))
}

/// Splits a leading `EXPLAIN` keyword off a statement.
///
/// Returns the keyword as written and the remaining inner statement.
pub fn split_explain(sql: &str) -> Option<(&str, &str)> {
    let caps = EXPLAIN_PREFIX.captures(sql)?;
    let keyword = caps.get(1)?.as_str();
    let end = caps.get(0)?.end();
    Some((keyword, &sql[end..]))
}

/// Closed set of tables that standard callers may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAllowList {
    tables: BTreeSet<String>,
}

impl TableAllowList {
    /// Creates an allow-list from table names (matched case-insensitively).
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Returns true if the (already lower-cased) table is allowed.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for TableAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TABLES)
    }
}

/// Stateless SQL validator.
///
/// Holds only configuration, so a single instance can be shared across
/// tasks without synchronization.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    max_rows: u32,
    allowed_tables: TableAllowList,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS, TableAllowList::default())
    }
}

impl SqlValidator {
    /// Creates a validator with the given forced row limit and allow-list.
    pub fn new(max_rows: u32, allowed_tables: TableAllowList) -> Self {
        Self {
            max_rows,
            allowed_tables,
        }
    }

    /// Returns the forced row limit appended to SELECT statements.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Validates `sql` for a caller with the given privilege.
    pub fn validate(&self, sql: &str, privilege: Privilege) -> ValidationOutcome {
        let outcome = self.validate_inner(sql, privilege);
        if let ValidationOutcome::Rejected { reason } = &outcome {
            debug!(%privilege, %reason, "SQL rejected");
        }
        outcome
    }

    fn validate_inner(&self, sql: &str, privilege: Privilege) -> ValidationOutcome {
        let sql = sql.trim();
        if sql.is_empty() {
            return ValidationOutcome::rejected("SQL cannot be empty");
        }

        if MULTI_STATEMENT.is_match(sql) {
            return ValidationOutcome::rejected("Multiple statements are not allowed");
        }

        if FORBIDDEN_PATTERNS.iter().any(|p| p.is_match(sql)) {
            return ValidationOutcome::rejected("Forbidden SQL command detected");
        }

        if let Some((keyword, inner)) = split_explain(sql) {
            return match self.validate_inner(inner, privilege) {
                ValidationOutcome::Accepted { processed_sql } => {
                    ValidationOutcome::accepted(format!("{keyword} {processed_sql}"))
                }
                rejected => rejected,
            };
        }

        if !privilege.is_admin() {
            if !SELECT_START.is_match(sql) {
                return ValidationOutcome::rejected(
                    "Only SELECT statements are allowed for non-admin users",
                );
            }

            if let Some(table) = self.first_disallowed_table(sql) {
                return ValidationOutcome::rejected(format!(
                    "Access denied to table: {table}. Only sample_* tables are allowed."
                ));
            }
        }

        ValidationOutcome::accepted(self.ensure_limit(sql))
    }

    /// Returns the first FROM/JOIN target outside the allow-list.
    fn first_disallowed_table(&self, sql: &str) -> Option<String> {
        referenced_tables(sql)
            .into_iter()
            .find(|table| !self.allowed_tables.contains(table))
    }

    /// Appends the forced row limit to SELECT statements lacking one.
    fn ensure_limit(&self, sql: &str) -> String {
        if LIMIT_CLAUSE.is_match(sql) {
            return sql.to_string();
        }

        if SELECT_START.is_match(sql) {
            let stripped = TRAILING_SEMICOLON.replace(sql, "");
            return format!("{} LIMIT {}", stripped.trim_end(), self.max_rows);
        }

        sql.to_string()
    }
}

/// Extracts identifiers following FROM or JOIN, unquoted and lower-cased.
fn referenced_tables(sql: &str) -> Vec<String> {
    TABLE_REFERENCE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace('`', "").to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validator() -> SqlValidator {
        SqlValidator::default()
    }

    fn assert_rejected(outcome: ValidationOutcome, expected: &str) {
        match outcome {
            ValidationOutcome::Rejected { reason } => assert!(
                reason.contains(expected),
                "expected reason containing {expected:?}, got {reason:?}"
            ),
            other => panic!("Expected rejection, got {other:?}"),
        }
    }

    fn processed(outcome: ValidationOutcome) -> String {
        match outcome {
            ValidationOutcome::Accepted { processed_sql } => processed_sql,
            other => panic!("Expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_sql_rejected() {
        assert_rejected(validator().validate("", Privilege::Admin), "cannot be empty");
        assert_rejected(
            validator().validate("   \n\t ", Privilege::Standard),
            "cannot be empty",
        );
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_rejected(
            validator().validate("SELECT * FROM users; DELETE FROM users", Privilege::Admin),
            "Multiple statements",
        );
        assert_rejected(
            validator().validate("SELECT 1;SELECT 2", Privilege::Standard),
            "Multiple statements",
        );
    }

    #[test]
    fn test_multiple_statements_checked_before_forbidden_commands() {
        assert_rejected(
            validator().validate("SELECT 1; DROP DATABASE prod", Privilege::Admin),
            "Multiple statements",
        );
    }

    #[test]
    fn test_single_trailing_semicolon_allowed() {
        let sql = processed(
            validator().validate("SELECT * FROM sample_orders;  ", Privilege::Standard),
        );
        assert_eq!(sql, "SELECT * FROM sample_orders LIMIT 1000");
    }

    #[test]
    fn test_forbidden_commands_rejected_for_admin() {
        let forbidden = [
            "DROP DATABASE prod",
            "drop schema app",
            "TRUNCATE TABLE sample_orders",
            "GRANT ALL ON *.* TO 'x'@'%'",
            "revoke select on t from u",
            "CREATE USER bob IDENTIFIED BY 'pw'",
            "Drop User bob",
            "ALTER   USER bob IDENTIFIED BY 'pw'",
            "SHUTDOWN",
            "LOAD DATA INFILE '/tmp/x' INTO TABLE t",
            "SELECT * FROM sample_customers INTO OUTFILE '/tmp/x'",
            "SELECT * FROM sample_customers INTO\nDUMPFILE '/tmp/x'",
        ];

        for sql in forbidden {
            assert_rejected(validator().validate(sql, Privilege::Admin), "Forbidden");
            assert_rejected(validator().validate(sql, Privilege::Standard), "Forbidden");
        }
    }

    #[test]
    fn test_forbidden_words_inside_identifiers_not_matched() {
        let sql = processed(validator().validate(
            "SELECT granted_at, truncated FROM audit_log",
            Privilege::Admin,
        ));
        assert_eq!(sql, "SELECT granted_at, truncated FROM audit_log LIMIT 1000");
    }

    #[test]
    fn test_standard_user_select_only() {
        assert_rejected(
            validator().validate("DELETE FROM sample_orders", Privilege::Standard),
            "Only SELECT",
        );
        assert_rejected(
            validator().validate("UPDATE sample_products SET price = 0", Privilege::Standard),
            "Only SELECT",
        );
        assert_rejected(
            validator().validate("SHOW TABLES", Privilege::Standard),
            "Only SELECT",
        );
    }

    #[test]
    fn test_standard_user_table_allow_list() {
        assert_rejected(
            validator().validate("SELECT * FROM users", Privilege::Standard),
            "Access denied to table: users",
        );
        assert_rejected(
            validator().validate(
                "SELECT * FROM sample_orders o JOIN `Users` u ON u.id = o.customer_id",
                Privilege::Standard,
            ),
            "Access denied to table: users",
        );
    }

    #[test]
    fn test_backticked_and_mixed_case_tables_allowed() {
        let sql = processed(validator().validate(
            "select * from `SAMPLE_ORDERS` o join sample_order_items i on i.order_id = o.id",
            Privilege::Standard,
        ));
        assert!(sql.ends_with(" LIMIT 1000"));
    }

    #[test]
    fn test_admin_may_query_any_table() {
        let sql = processed(validator().validate("SELECT * FROM users", Privilege::Admin));
        assert_eq!(sql, "SELECT * FROM users LIMIT 1000");
    }

    #[test]
    fn test_limit_appended() {
        let sql = processed(
            validator().validate("SELECT * FROM sample_customers", Privilege::Standard),
        );
        assert_eq!(sql, "SELECT * FROM sample_customers LIMIT 1000");
    }

    #[test]
    fn test_trailing_line_comment_hides_forced_limit() {
        let sql = processed(
            validator().validate("SELECT id FROM sample_customers -- all", Privilege::Standard),
        );
        assert_eq!(sql, "SELECT id FROM sample_customers -- all LIMIT 1000");
    }

    #[test]
    fn test_existing_limit_preserved() {
        let sql = processed(
            validator().validate("SELECT * FROM sample_customers limit 5", Privilege::Standard),
        );
        assert_eq!(sql, "SELECT * FROM sample_customers limit 5");
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let v = validator();
        let once = processed(v.validate("SELECT * FROM sample_products", Privilege::Standard));
        let twice = processed(v.validate(&once, Privilege::Standard));
        assert_eq!(once, twice);
        assert_eq!(twice.matches("LIMIT").count(), 1);
    }

    #[test]
    fn test_custom_max_rows() {
        let v = SqlValidator::new(50, TableAllowList::default());
        let sql = processed(v.validate("SELECT 1", Privilege::Admin));
        assert_eq!(sql, "SELECT 1 LIMIT 50");
        assert_eq!(v.max_rows(), 50);
    }

    #[test]
    fn test_non_select_passes_through_for_admin() {
        let sql = processed(validator().validate(
            "  UPDATE sample_products SET price = price * 2  ",
            Privilege::Admin,
        ));
        assert_eq!(sql, "UPDATE sample_products SET price = price * 2");
    }

    #[test]
    fn test_explain_validates_inner_statement() {
        let sql = processed(validator().validate(
            "EXPLAIN SELECT * FROM sample_customers",
            Privilege::Standard,
        ));
        assert_eq!(sql, "EXPLAIN SELECT * FROM sample_customers LIMIT 1000");

        assert_rejected(
            validator().validate("explain select * from users", Privilege::Standard),
            "Access denied to table: users",
        );
        assert_rejected(
            validator().validate("EXPLAIN DELETE FROM sample_orders", Privilege::Standard),
            "Only SELECT",
        );
    }

    #[test]
    fn test_bare_explain_is_rejected_as_empty() {
        assert_rejected(validator().validate("EXPLAIN", Privilege::Admin), "cannot be empty");
    }

    #[test]
    fn test_split_explain() {
        assert_eq!(
            split_explain("explain  SELECT 1"),
            Some(("explain", "SELECT 1"))
        );
        assert_eq!(split_explain("SELECT 1"), None);
        assert_eq!(split_explain("EXPLAINED SELECT 1"), None);
    }

    #[test]
    fn test_custom_allow_list() {
        let v = SqlValidator::new(10, TableAllowList::new(["Reports"]));
        assert!(v.validate("SELECT * FROM reports", Privilege::Standard).is_accepted());
        assert_rejected(
            v.validate("SELECT * FROM sample_orders", Privilege::Standard),
            "Access denied to table: sample_orders",
        );
    }

    #[test]
    fn test_allow_list_normalizes_names() {
        let list = TableAllowList::new([" Sample_Orders ", ""]);
        assert_eq!(list.len(), 1);
        assert!(list.contains("sample_orders"));
        assert_eq!(TableAllowList::default().len(), 4);
    }

    #[test]
    fn test_referenced_tables() {
        assert_eq!(
            referenced_tables("SELECT * FROM `a` JOIN b ON 1=1 LEFT JOIN C"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
