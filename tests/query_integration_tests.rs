//! Integration tests for SQL query execution
//!
//! These tests validate the complete query pipeline:
//! SQL → Parser → Typed Predicate → Executor → Results

use arrow::array::Int64Array;
use ethogram::query::{col, QueryEngine, QueryExecutor};
use ethogram::schema::{Choice, Feedback, TrialRecord};
use ethogram::storage::TrialTable;

/// Two sessions of 20 trials each with a cycling contrast ladder.
fn create_test_table() -> TrialTable {
    let trials: Vec<TrialRecord> = (0..40u64)
        .map(|i| {
            let session = if i < 20 { "sess-a" } else { "sess-b" };
            let contrast_right = f64::from(u32::try_from(i % 5).unwrap()) * 0.25;
            let choice = if i % 2 == 0 { Choice::Right } else { Choice::Left };
            let feedback = if i % 2 == 0 { Feedback::Correct } else { Feedback::Error };
            let response_time = 0.3 + 0.01 * f64::from(u32::try_from(i).unwrap());
            TrialRecord::new(session, i, 0.0, contrast_right, choice, feedback, response_time)
        })
        .collect();
    TrialTable::from_records(&trials).unwrap()
}

#[test]
fn test_simple_select_all() {
    let table = create_test_table();
    let plan = QueryEngine::new().parse("SELECT * FROM trials").unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();

    assert_eq!(result.num_rows(), 40);
    assert_eq!(result.num_columns(), 7);
}

#[test]
fn test_where_on_float_column() {
    let table = create_test_table();
    let plan = QueryEngine::new()
        .parse("SELECT trial_id FROM trials WHERE contrast_right >= 0.5")
        .unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();

    // contrast ladder cycles 0, 0.25, 0.5, 0.75, 1.0: three of five pass
    assert_eq!(result.num_rows(), 24);
    assert_eq!(result.num_columns(), 1);
}

#[test]
fn test_where_on_string_column() {
    let table = create_test_table();
    let plan = QueryEngine::new()
        .parse("SELECT * FROM trials WHERE session_id = 'sess-a'")
        .unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();
    assert_eq!(result.num_rows(), 20);
}

#[test]
fn test_compound_where() {
    let table = create_test_table();
    let plan = QueryEngine::new()
        .parse("SELECT * FROM trials WHERE session_id = 'sess-a' AND choice = 1")
        .unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();
    assert_eq!(result.num_rows(), 10);

    let plan = QueryEngine::new()
        .parse("SELECT * FROM trials WHERE contrast_right = 0 OR contrast_right = 1")
        .unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();
    assert_eq!(result.num_rows(), 16);
}

#[test]
fn test_order_by_desc_with_limit() {
    let table = create_test_table();
    let plan = QueryEngine::new()
        .parse("SELECT trial_id FROM trials ORDER BY response_time DESC LIMIT 5")
        .unwrap();
    let result = QueryExecutor::new().execute(&plan, &table).unwrap();

    assert_eq!(result.num_rows(), 5);
    let ids = result
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    // response time grows with trial index, so the slowest trial leads
    assert_eq!(ids.value(0), 39);
    assert_eq!(ids.value(4), 35);
}

#[test]
fn test_typed_builder_matches_sql_lowering() {
    let table = create_test_table();
    let combined = table.combined().unwrap();

    let built = col("contrast_right")
        .ge(0.5)
        .and(col("choice").eq(1i64))
        .apply(&combined)
        .unwrap();

    let plan = QueryEngine::new()
        .parse("SELECT * FROM trials WHERE contrast_right >= 0.5 AND choice = 1")
        .unwrap();
    let via_sql = QueryExecutor::new().execute(&plan, &table).unwrap();

    assert_eq!(built.num_rows(), via_sql.num_rows());
}

#[test]
fn test_unsupported_sql_is_rejected() {
    let engine = QueryEngine::new();
    assert!(engine
        .parse("SELECT * FROM trials JOIN sessions ON 1 = 1")
        .is_err());
    assert!(engine.parse("SELECT AVG(response_time) FROM trials").is_err());
    assert!(engine.parse("SELECT 1; SELECT 2").is_err());
    assert!(engine.parse("DELETE FROM trials").is_err());
}

#[test]
fn test_missing_column_errors_at_execution() {
    let table = create_test_table();
    let plan = QueryEngine::new()
        .parse("SELECT no_such_column FROM trials")
        .unwrap();
    assert!(QueryExecutor::new().execute(&plan, &table).is_err());
}
