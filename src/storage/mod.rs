//! Columnar trial table (Arrow/Parquet)
//!
//! Append-only write pattern: trial batches are bulk-loaded or appended,
//! never updated in place. The analysis modules read whole columns, so the
//! columnar layout is the right shape for every downstream computation.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int64Array, Int8Array, RecordBatch, StringArray};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::schema::{Choice, Feedback, TrialRecord};
use crate::{Error, Result};

/// Choice encoding in the columnar table: leftward turn.
const CHOICE_LEFT: i8 = -1;
/// Choice encoding in the columnar table: rightward turn.
const CHOICE_RIGHT: i8 = 1;
/// Choice encoding in the columnar table: no response.
const CHOICE_NOGO: i8 = 0;

/// The fixed Arrow schema of the trials table.
#[must_use]
pub fn trial_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("session_id", DataType::Utf8, false),
        Field::new("trial_id", DataType::Int64, false),
        Field::new("contrast_left", DataType::Float64, false),
        Field::new("contrast_right", DataType::Float64, false),
        Field::new("choice", DataType::Int8, false),
        Field::new("feedback", DataType::Int8, false),
        Field::new("response_time", DataType::Float64, false),
    ]))
}

/// Columnar storage for trial data.
pub struct TrialTable {
    batches: Vec<RecordBatch>,
}

impl TrialTable {
    /// Create a trial table from existing batches.
    ///
    /// Useful for testing and benchmarking.
    #[must_use]
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    /// Build a trial table from typed records.
    ///
    /// # Errors
    /// Returns error if the batch cannot be constructed (should not occur
    /// for well-formed records).
    pub fn from_records(records: &[TrialRecord]) -> Result<Self> {
        let session_ids: StringArray = records.iter().map(|t| Some(t.session_id())).collect();
        #[allow(clippy::cast_possible_wrap)]
        let trial_ids = Int64Array::from_iter_values(records.iter().map(|t| t.trial_id() as i64));
        let contrast_left =
            Float64Array::from_iter_values(records.iter().map(TrialRecord::contrast_left));
        let contrast_right =
            Float64Array::from_iter_values(records.iter().map(TrialRecord::contrast_right));
        let choice = Int8Array::from_iter_values(records.iter().map(|t| match t.choice() {
            Choice::Left => CHOICE_LEFT,
            Choice::Right => CHOICE_RIGHT,
            Choice::NoGo => CHOICE_NOGO,
        }));
        let feedback = Int8Array::from_iter_values(records.iter().map(|t| match t.feedback() {
            Feedback::Correct => 1i8,
            Feedback::Error => -1,
            Feedback::NoFeedback => 0,
        }));
        let response_time =
            Float64Array::from_iter_values(records.iter().map(TrialRecord::response_time));

        let batch = RecordBatch::try_new(
            trial_schema(),
            vec![
                Arc::new(session_ids),
                Arc::new(trial_ids),
                Arc::new(contrast_left),
                Arc::new(contrast_right),
                Arc::new(choice),
                Arc::new(feedback),
                Arc::new(response_time),
            ],
        )?;
        Ok(Self {
            batches: vec![batch],
        })
    }

    /// Load a trial table from a Parquet file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or does not match
    /// the trials schema.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

        let mut table = Self { batches: Vec::new() };
        for batch in reader {
            let batch =
                batch.map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
            table.append_batch(batch)?;
        }
        Ok(table)
    }

    /// Write the trial table to a Parquet file.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;
        use std::fs::File;

        let file = File::create(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to create Parquet file: {e}")))?;
        let schema = self
            .batches
            .first()
            .map_or_else(trial_schema, |b| b.schema());
        let mut writer = ArrowWriter::try_new(file, schema, None)
            .map_err(|e| Error::Storage(format!("Failed to create Parquet writer: {e}")))?;
        for batch in &self.batches {
            writer
                .write(batch)
                .map_err(|e| Error::Storage(format!("Failed to write record batch: {e}")))?;
        }
        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to close Parquet writer: {e}")))?;
        Ok(())
    }

    /// Append a batch to the table.
    ///
    /// This is the only write operation: batches are validated against the
    /// trials schema and never updated in place.
    ///
    /// # Errors
    /// Returns error if the batch schema does not match.
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema() != trial_schema() {
            return Err(Error::Storage(format!(
                "Schema mismatch: expected trials schema, got {:?}",
                batch.schema()
            )));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Get all record batches.
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of trial rows across batches.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Combine all batches into a single batch.
    ///
    /// # Errors
    /// Returns error if the table is empty or concatenation fails.
    pub fn combined(&self) -> Result<RecordBatch> {
        match self.batches.len() {
            0 => Err(Error::InvalidInput("No data in trial table".to_string())),
            1 => Ok(self.batches[0].clone()),
            _ => compute::concat_batches(&self.batches[0].schema(), &self.batches)
                .map_err(|e| Error::Storage(format!("Failed to combine batches: {e}"))),
        }
    }

    /// Decode the table back into typed records.
    ///
    /// # Errors
    /// Returns error on a malformed choice/feedback encoding.
    pub fn to_records(&self) -> Result<Vec<TrialRecord>> {
        let mut records = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let session_ids = downcast::<StringArray>(batch, 0)?;
            let trial_ids = downcast::<Int64Array>(batch, 1)?;
            let contrast_left = downcast::<Float64Array>(batch, 2)?;
            let contrast_right = downcast::<Float64Array>(batch, 3)?;
            let choices = downcast::<Int8Array>(batch, 4)?;
            let feedbacks = downcast::<Int8Array>(batch, 5)?;
            let response_times = downcast::<Float64Array>(batch, 6)?;

            for i in 0..batch.num_rows() {
                let choice = match choices.value(i) {
                    CHOICE_LEFT => Choice::Left,
                    CHOICE_RIGHT => Choice::Right,
                    CHOICE_NOGO => Choice::NoGo,
                    other => {
                        return Err(Error::Storage(format!("Invalid choice encoding: {other}")))
                    }
                };
                let feedback = match feedbacks.value(i) {
                    1 => Feedback::Correct,
                    -1 => Feedback::Error,
                    0 => Feedback::NoFeedback,
                    other => {
                        return Err(Error::Storage(format!(
                            "Invalid feedback encoding: {other}"
                        )))
                    }
                };
                #[allow(clippy::cast_sign_loss)]
                let trial_id = trial_ids.value(i) as u64;
                records.push(TrialRecord::new(
                    session_ids.value(i),
                    trial_id,
                    contrast_left.value(i),
                    contrast_right.value(i),
                    choice,
                    feedback,
                    response_times.value(i),
                ));
            }
        }
        Ok(records)
    }
}

fn downcast<T: 'static>(batch: &RecordBatch, index: usize) -> Result<&T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            Error::Storage(format!(
                "Column {index} has unexpected type {:?}",
                batch.column(index).data_type()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trials(n: usize) -> Vec<TrialRecord> {
        (0..n)
            .map(|i| {
                let contrast = f64::from(u32::try_from(i % 5).unwrap()) * 0.25;
                TrialRecord::new(
                    "sess-1",
                    i as u64,
                    if i % 2 == 0 { contrast } else { 0.0 },
                    if i % 2 == 0 { 0.0 } else { contrast },
                    if i % 2 == 0 { Choice::Left } else { Choice::Right },
                    Feedback::Correct,
                    0.3 + 0.01 * f64::from(u32::try_from(i % 10).unwrap()),
                )
            })
            .collect()
    }

    #[test]
    fn test_from_records_to_records_preserves_trials() {
        let trials = sample_trials(20);
        let table = TrialTable::from_records(&trials).unwrap();
        assert_eq!(table.num_rows(), 20);
        assert_eq!(table.to_records().unwrap(), trials);
    }

    #[test]
    fn test_append_batch_schema_validation() {
        let mut table = TrialTable::new(vec![]);
        let wrong_schema = Arc::new(Schema::new(vec![Field::new(
            "other",
            DataType::Int64,
            false,
        )]));
        let batch = RecordBatch::try_new(
            wrong_schema,
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        assert!(table.append_batch(batch).is_err());
    }

    #[test]
    fn test_combined_empty_table_errors() {
        let table = TrialTable::new(vec![]);
        assert!(table.combined().is_err());
    }

    #[test]
    fn test_parquet_round_trip() {
        let trials = sample_trials(50);
        let table = TrialTable::from_records(&trials).unwrap();

        let dir = std::env::temp_dir().join("ethogram_storage_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("trials.parquet");
        table.write_parquet(&path).unwrap();

        let loaded = TrialTable::load_parquet(&path).unwrap();
        assert_eq!(loaded.to_records().unwrap(), trials);
    }
}
