//! Query execution against the columnar trial table

use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::compute::{self, SortColumn, SortOptions};
use arrow::datatypes::Schema;

use super::{OrderDirection, QueryPlan};
use crate::storage::TrialTable;
use crate::{Error, Result};

/// Executor for typed query plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryExecutor {
    _private: (),
}

impl QueryExecutor {
    /// Create a new query executor.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Execute a query plan against a trial table.
    ///
    /// # Errors
    /// Returns error if:
    /// - The table is empty
    /// - A referenced column is missing
    /// - The predicate cannot be evaluated against the schema
    ///
    /// # Example
    /// ```rust,no_run
    /// use ethogram::query::{QueryEngine, QueryExecutor};
    /// use ethogram::storage::TrialTable;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let table = TrialTable::load_parquet("data/trials.parquet")?;
    /// let plan = QueryEngine::new()
    ///     .parse("SELECT trial_id FROM trials WHERE response_time < 0.5")?;
    /// let result = QueryExecutor::new().execute(&plan, &table)?;
    /// println!("{} fast trials", result.num_rows());
    /// # Ok(())
    /// # }
    /// ```
    pub fn execute(&self, plan: &QueryPlan, table: &TrialTable) -> Result<RecordBatch> {
        let combined = table.combined()?;

        let filtered = match &plan.predicate {
            Some(predicate) => predicate.apply(&combined)?,
            None => combined,
        };

        // sort before projecting so the ORDER BY column need not be selected
        let ordered = if plan.order_by.is_empty() {
            match plan.limit {
                Some(limit) => filtered.slice(0, limit.min(filtered.num_rows())),
                None => filtered,
            }
        } else {
            Self::apply_order_by_limit(&filtered, plan)?
        };

        Self::project_columns(&ordered, &plan.columns)
    }

    /// Project columns from batch
    fn project_columns(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
        if columns.len() == 1 && columns[0] == "*" {
            return Ok(batch.clone());
        }

        let schema = batch.schema();
        let mut new_columns = Vec::new();
        let mut new_fields = Vec::new();

        for col_name in columns {
            let index = schema
                .fields()
                .iter()
                .position(|f| f.name() == col_name)
                .ok_or_else(|| Error::InvalidInput(format!("Column not found: {col_name}")))?;

            new_columns.push(batch.column(index).clone());
            new_fields.push(schema.field(index).clone());
        }

        let new_schema = Arc::new(Schema::new(new_fields));
        RecordBatch::try_new(new_schema, new_columns)
            .map_err(|e| Error::Storage(format!("Failed to project columns: {e}")))
    }

    /// Lexicographic sort over every ORDER BY column, then LIMIT.
    fn apply_order_by_limit(batch: &RecordBatch, plan: &QueryPlan) -> Result<RecordBatch> {
        let schema = batch.schema();
        let mut sort_columns = Vec::with_capacity(plan.order_by.len());
        for (col_name, direction) in &plan.order_by {
            let col_index = schema
                .fields()
                .iter()
                .position(|f| f.name() == col_name)
                .ok_or_else(|| Error::InvalidInput(format!("Column not found: {col_name}")))?;
            sort_columns.push(SortColumn {
                values: batch.column(col_index).clone(),
                options: Some(SortOptions {
                    descending: matches!(direction, OrderDirection::Desc),
                    nulls_first: false,
                }),
            });
        }

        let indices = compute::lexsort_to_indices(&sort_columns, plan.limit)
            .map_err(|e| Error::Storage(format!("Failed to sort: {e}")))?;

        let columns = batch
            .columns()
            .iter()
            .map(|c| compute::take(c.as_ref(), &indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Storage(format!("Failed to gather sorted rows: {e}")))?;

        RecordBatch::try_new(batch.schema(), columns)
            .map_err(|e| Error::Storage(format!("Failed to build sorted batch: {e}")))
    }
}
