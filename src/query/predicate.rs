//! Typed filter predicates
//!
//! Filters are values, not strings: a `Predicate` names a column, a
//! comparison, and a typed scalar, and is evaluated against a record batch
//! into a boolean mask. The SQL front-end lowers WHERE clauses into this
//! representation, so no raw filter fragment ever reaches the executor.

use arrow::array::{
    Array, BooleanArray, Float64Array, Int64Array, Int8Array, RecordBatch, StringArray,
};
use arrow::compute;
use arrow::datatypes::DataType;

use crate::{Error, Result};

/// A typed scalar literal for comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Integer literal
    Int(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal
    Utf8(String),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Equal
    Eq,
    /// Not equal
    Ne,
}

/// A typed filter predicate over the trials table.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Compare a column against a scalar
    Compare {
        /// Column name
        column: String,
        /// Comparison operator
        cmp: Cmp,
        /// Typed literal
        value: Scalar,
    },
    /// Both sides must hold
    And(Box<Predicate>, Box<Predicate>),
    /// Either side must hold
    Or(Box<Predicate>, Box<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

/// Start a fluent predicate: `col("contrast_right").gt(0.25)`.
#[must_use]
pub fn col(name: impl Into<String>) -> ColumnRef {
    ColumnRef { name: name.into() }
}

/// A column reference used to build comparison predicates.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    name: String,
}

macro_rules! cmp_method {
    ($fn_name:ident, $cmp:expr, $doc:literal) => {
        #[doc = $doc]
        #[must_use]
        pub fn $fn_name(self, value: impl Into<Scalar>) -> Predicate {
            Predicate::Compare {
                column: self.name,
                cmp: $cmp,
                value: value.into(),
            }
        }
    };
}

impl ColumnRef {
    cmp_method!(gt, Cmp::Gt, "Column strictly greater than the value.");
    cmp_method!(ge, Cmp::Ge, "Column greater than or equal to the value.");
    cmp_method!(lt, Cmp::Lt, "Column strictly less than the value.");
    cmp_method!(le, Cmp::Le, "Column less than or equal to the value.");
    cmp_method!(eq, Cmp::Eq, "Column equal to the value.");
    cmp_method!(ne, Cmp::Ne, "Column not equal to the value.");
}

impl Predicate {
    /// Conjunction with another predicate.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with another predicate.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate the predicate into a boolean mask over the batch.
    ///
    /// Null entries never match, on either side of a negation.
    ///
    /// # Errors
    /// Returns error if a named column is missing or the scalar type cannot
    /// be compared with the column type.
    pub fn mask(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        match self {
            Self::Compare { column, cmp, value } => compare_mask(batch, column, *cmp, value),
            Self::And(a, b) => {
                let m = compute::and(&a.mask(batch)?, &b.mask(batch)?)?;
                Ok(m)
            }
            Self::Or(a, b) => {
                let m = compute::or(&a.mask(batch)?, &b.mask(batch)?)?;
                Ok(m)
            }
            Self::Not(inner) => {
                let m = compute::not(&inner.mask(batch)?)?;
                Ok(m)
            }
        }
    }

    /// Filter a batch down to the rows matching the predicate.
    ///
    /// # Errors
    /// Same conditions as [`Predicate::mask`].
    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.mask(batch)?;
        compute::filter_record_batch(batch, &mask)
            .map_err(|e| Error::Storage(format!("Failed to apply filter: {e}")))
    }
}

fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .fields()
        .iter()
        .position(|f| f.name() == name)
        .ok_or_else(|| Error::InvalidInput(format!("Column not found: {name}")))
}

fn compare_mask(batch: &RecordBatch, column: &str, cmp: Cmp, value: &Scalar) -> Result<BooleanArray> {
    let index = column_index(batch, column)?;
    let array = batch.column(index);

    match (array.data_type(), value) {
        (DataType::Int64, Scalar::Int(v)) => {
            let array = downcast::<Int64Array>(array.as_ref())?;
            Ok(numeric_mask(array.len(), |i| array.is_null(i), |i| cmp_ord(array.value(i), *v, cmp)))
        }
        (DataType::Int8, Scalar::Int(v)) => {
            let array = downcast::<Int8Array>(array.as_ref())?;
            Ok(numeric_mask(array.len(), |i| array.is_null(i), |i| {
                cmp_ord(i64::from(array.value(i)), *v, cmp)
            }))
        }
        // numeric coercion: integer literals compare against float columns and vice versa
        (DataType::Float64, Scalar::Int(_) | Scalar::Float(_)) => {
            let v = match value {
                #[allow(clippy::cast_precision_loss)]
                Scalar::Int(v) => *v as f64,
                Scalar::Float(v) => *v,
                Scalar::Utf8(_) => unreachable!(),
            };
            let array = downcast::<Float64Array>(array.as_ref())?;
            Ok(numeric_mask(array.len(), |i| array.is_null(i), |i| {
                cmp_float(array.value(i), v, cmp)
            }))
        }
        (DataType::Int64, Scalar::Float(v)) => {
            let array = downcast::<Int64Array>(array.as_ref())?;
            Ok(numeric_mask(array.len(), |i| array.is_null(i), |i| {
                #[allow(clippy::cast_precision_loss)]
                let lhs = array.value(i) as f64;
                cmp_float(lhs, *v, cmp)
            }))
        }
        (DataType::Utf8, Scalar::Utf8(v)) => {
            let array = downcast::<StringArray>(array.as_ref())?;
            Ok(numeric_mask(array.len(), |i| array.is_null(i), |i| {
                cmp_ord(array.value(i), v.as_str(), cmp)
            }))
        }
        (dt, scalar) => Err(Error::InvalidInput(format!(
            "Cannot compare column {column} of type {dt:?} with {scalar:?}"
        ))),
    }
}

fn downcast<T: 'static>(array: &dyn Array) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::Storage(format!(
            "Failed to downcast column of type {:?}",
            array.data_type()
        ))
    })
}

fn numeric_mask(
    len: usize,
    is_null: impl Fn(usize) -> bool,
    matches: impl Fn(usize) -> bool,
) -> BooleanArray {
    let values: Vec<bool> = (0..len).map(|i| !is_null(i) && matches(i)).collect();
    BooleanArray::from(values)
}

fn cmp_ord<T: PartialOrd>(lhs: T, rhs: T, cmp: Cmp) -> bool {
    match cmp {
        Cmp::Gt => lhs > rhs,
        Cmp::Ge => lhs >= rhs,
        Cmp::Lt => lhs < rhs,
        Cmp::Le => lhs <= rhs,
        Cmp::Eq => lhs == rhs,
        Cmp::Ne => lhs != rhs,
    }
}

fn cmp_float(lhs: f64, rhs: f64, cmp: Cmp) -> bool {
    match cmp {
        Cmp::Gt => lhs > rhs,
        Cmp::Ge => lhs >= rhs,
        Cmp::Lt => lhs < rhs,
        Cmp::Le => lhs <= rhs,
        Cmp::Eq => (lhs - rhs).abs() < f64::EPSILON,
        Cmp::Ne => (lhs - rhs).abs() >= f64::EPSILON,
    }
}
