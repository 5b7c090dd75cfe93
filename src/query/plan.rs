//! Plan reduction.
//!
//! Reduces the planner rows produced by a backend's plan probe (see
//! [`DatabaseBackend::plan_probe`]) into the index(es) used and the
//! estimated number of rows scanned. Reduction is purely descriptive: plan
//! shapes without `key`/`rows` columns yield `None`, never an error.
//!
//! [`DatabaseBackend::plan_probe`]: crate::db::DatabaseBackend::plan_probe

use crate::db::PlanRow;

/// Planner column naming the index chosen for a step.
const KEY_COLUMN: &str = "key";

/// Planner column estimating rows examined by a step.
const ROWS_COLUMN: &str = "rows";

/// Scalar summary of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Distinct index names in first-seen order, comma separated.
    pub index_used: Option<String>,
    /// Sum of the numeric row estimates; `None` when no step reports one.
    pub rows_scanned: Option<u64>,
}

impl PlanSummary {
    /// Reduces planner rows into their summary.
    pub fn from_plan(plan: &[PlanRow]) -> Self {
        Self {
            index_used: index_used(plan),
            rows_scanned: rows_scanned(plan),
        }
    }
}

/// Collects the distinct, non-empty `key` values across plan steps.
pub fn index_used(plan: &[PlanRow]) -> Option<String> {
    let mut indexes: Vec<String> = Vec::new();
    for row in plan {
        let Some(value) = row.get_ignore_case(KEY_COLUMN) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let name = value.to_display_string();
        if !name.is_empty() && !indexes.contains(&name) {
            indexes.push(name);
        }
    }

    if indexes.is_empty() {
        None
    } else {
        Some(indexes.join(", "))
    }
}

/// Sums the numeric `rows` estimates across plan steps.
///
/// Returns `None` (unknown) when no step contributes a number, which is
/// distinct from `Some(0)` (the planner expects zero rows).
pub fn rows_scanned(plan: &[PlanRow]) -> Option<u64> {
    plan.iter()
        .filter_map(|row| row.get_ignore_case(ROWS_COLUMN))
        .filter_map(|value| value.as_count())
        .fold(None, |total, rows| {
            Some(total.unwrap_or(0u64).saturating_add(rows))
        })
}

/// Serializes plan rows to JSON for auditing, falling back to `[]`.
pub fn plan_json(plan: &[PlanRow]) -> String {
    serde_json::to_string(plan).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Record, Value};
    use pretty_assertions::assert_eq;

    fn mysql_step(table: &str, key: Value, rows: Value) -> PlanRow {
        Record::new()
            .with("id", 1i64)
            .with("select_type", "SIMPLE")
            .with("table", table)
            .with("type", "ref")
            .with("possible_keys", Value::Null)
            .with("key", key)
            .with("rows", rows)
            .with("Extra", Value::Null)
    }

    #[test]
    fn test_index_used_distinct_in_first_seen_order() {
        let plan = vec![
            mysql_step("o", "idx_customer".into(), Value::UInt(10)),
            mysql_step("c", "PRIMARY".into(), Value::UInt(1)),
            mysql_step("i", "idx_customer".into(), Value::UInt(3)),
        ];
        assert_eq!(index_used(&plan), Some("idx_customer, PRIMARY".to_string()));
    }

    #[test]
    fn test_index_used_absent_without_keys() {
        let plan = vec![
            mysql_step("o", Value::Null, Value::UInt(10)),
            mysql_step("c", "".into(), Value::UInt(1)),
        ];
        assert_eq!(index_used(&plan), None);
    }

    #[test]
    fn test_rows_scanned_sums_numeric_values() {
        let plan = vec![
            mysql_step("o", Value::Null, Value::UInt(1000)),
            mysql_step("c", Value::Null, Value::Int(25)),
            mysql_step("d", Value::Null, Value::Null),
        ];
        assert_eq!(rows_scanned(&plan), Some(1025));
    }

    #[test]
    fn test_rows_scanned_zero_is_not_absent() {
        let plan = vec![mysql_step("o", Value::Null, Value::Int(0))];
        assert_eq!(rows_scanned(&plan), Some(0));
    }

    #[test]
    fn test_rows_scanned_absent_without_numbers() {
        let plan = vec![mysql_step("o", Value::Null, Value::Null)];
        assert_eq!(rows_scanned(&plan), None);
        assert_eq!(rows_scanned(&[]), None);
    }

    #[test]
    fn test_sqlite_plan_shape_degrades_to_absent() {
        let plan = vec![Record::new()
            .with("id", 2i64)
            .with("parent", 0i64)
            .with("notused", 0i64)
            .with("detail", "SCAN sample_customers")];

        let summary = PlanSummary::from_plan(&plan);
        assert_eq!(summary, PlanSummary::default());
    }

    #[test]
    fn test_plan_json_keeps_planner_column_order() {
        let plan = vec![Record::new().with("id", 1i64).with("key", "PRIMARY")];
        assert_eq!(plan_json(&plan), r#"[{"id":1,"key":"PRIMARY"}]"#);
        assert_eq!(plan_json(&[]), "[]");
    }
}
