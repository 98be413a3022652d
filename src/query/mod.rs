//! Query parsing and execution
//!
//! The SQL front-end accepts a small SELECT subset and lowers it into a
//! typed [`QueryPlan`]: WHERE clauses become [`Predicate`] values rather
//! than strings, so malformed filters fail at parse time, not mid-scan.
//!
//! ## Supported SQL subset
//!
//! - SELECT with column list or *
//! - FROM single table (no JOINs)
//! - WHERE with typed predicates (>, <, =, >=, <=, !=, AND, OR, NOT)
//! - ORDER BY (ASC/DESC)
//! - LIMIT
//!
//! Aggregate functions are rejected: summaries come from the
//! [`crate::behavior`] module, which knows the task semantics (no-go
//! exclusion, signed contrast) that a generic SUM/AVG cannot.

mod executor;
mod predicate;

pub use executor::QueryExecutor;
pub use predicate::{col, Cmp, ColumnRef, Predicate, Scalar};

use sqlparser::ast::{
    BinaryOperator, Expr, Query, Select, SelectItem, SetExpr, Statement, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::{Error, Result};

/// Parsed SQL query with extracted components
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Selected columns (or * for all)
    pub columns: Vec<String>,
    /// Table name
    pub table: String,
    /// WHERE clause as a typed predicate (optional)
    pub predicate: Option<Predicate>,
    /// ORDER BY clauses
    pub order_by: Vec<(String, OrderDirection)>,
    /// LIMIT count (optional)
    pub limit: Option<usize>,
}

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order (smallest first)
    Asc,
    /// Descending order (largest first)
    Desc,
}

/// Query parser
pub struct QueryEngine {
    dialect: GenericDialect,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    /// Create a new query engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Parse a SQL query into a typed query plan.
    ///
    /// # Errors
    /// Returns error if:
    /// - SQL syntax is invalid
    /// - The query uses unsupported features (JOINs, subqueries,
    ///   aggregates, multiple statements)
    /// - A WHERE literal cannot be typed
    ///
    /// # Example
    /// ```
    /// use ethogram::query::QueryEngine;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let engine = QueryEngine::new();
    /// let plan = engine.parse(
    ///     "SELECT trial_id, choice FROM trials WHERE contrast_right > 0.25",
    /// )?;
    /// assert_eq!(plan.table, "trials");
    /// assert!(plan.predicate.is_some());
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(&self, sql: &str) -> Result<QueryPlan> {
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| Error::Parse(format!("SQL parse error: {e}")))?;

        if statements.len() != 1 {
            return Err(Error::Parse("Only single statements supported".to_string()));
        }

        let stmt = &statements[0];
        let Statement::Query(query) = stmt else {
            return Err(Error::Parse("Only SELECT queries supported".to_string()));
        };

        Self::parse_select_query(query)
    }

    fn parse_select_query(query: &Query) -> Result<QueryPlan> {
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(Error::Parse("Only SELECT queries supported".to_string()));
        };

        let table = Self::extract_table_name(select)?;
        let columns = Self::extract_columns(&select.projection)?;
        let predicate = select
            .selection
            .as_ref()
            .map(Self::lower_predicate)
            .transpose()?;
        let order_by = Self::extract_order_by(query.order_by.as_ref());
        let limit = Self::extract_limit(query.limit.as_ref());

        Ok(QueryPlan {
            columns,
            table,
            predicate,
            order_by,
            limit,
        })
    }

    fn extract_table_name(select: &Select) -> Result<String> {
        if select.from.is_empty() {
            return Ok(String::new());
        }

        if select.from.len() > 1 {
            return Err(Error::Parse("Multiple tables not supported".to_string()));
        }

        let table_with_joins = &select.from[0];
        if !table_with_joins.joins.is_empty() {
            return Err(Error::Parse("JOINs not supported".to_string()));
        }

        Ok(table_with_joins.relation.to_string())
    }

    fn extract_columns(projection: &[SelectItem]) -> Result<Vec<String>> {
        let mut columns = Vec::new();
        for item in projection {
            match item {
                SelectItem::Wildcard(_) => columns.push("*".to_string()),
                SelectItem::UnnamedExpr(expr) => {
                    if matches!(expr, Expr::Function(_)) {
                        return Err(Error::Parse(
                            "Aggregate functions not supported; use behavior summaries"
                                .to_string(),
                        ));
                    }
                    columns.push(expr.to_string());
                }
                SelectItem::ExprWithAlias { alias, .. } => columns.push(alias.value.clone()),
                SelectItem::QualifiedWildcard(..) => {
                    return Err(Error::Parse("Qualified wildcards not supported".to_string()))
                }
            }
        }
        Ok(columns)
    }

    /// Lower a WHERE expression into a typed predicate.
    fn lower_predicate(expr: &Expr) -> Result<Predicate> {
        match expr {
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => Ok(Predicate::And(
                    Box::new(Self::lower_predicate(left)?),
                    Box::new(Self::lower_predicate(right)?),
                )),
                BinaryOperator::Or => Ok(Predicate::Or(
                    Box::new(Self::lower_predicate(left)?),
                    Box::new(Self::lower_predicate(right)?),
                )),
                BinaryOperator::Gt => Self::lower_compare(left, Cmp::Gt, right),
                BinaryOperator::GtEq => Self::lower_compare(left, Cmp::Ge, right),
                BinaryOperator::Lt => Self::lower_compare(left, Cmp::Lt, right),
                BinaryOperator::LtEq => Self::lower_compare(left, Cmp::Le, right),
                BinaryOperator::Eq => Self::lower_compare(left, Cmp::Eq, right),
                BinaryOperator::NotEq => Self::lower_compare(left, Cmp::Ne, right),
                other => Err(Error::Parse(format!("Unsupported operator: {other}"))),
            },
            Expr::Nested(inner) => Self::lower_predicate(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Predicate::Not(Box::new(Self::lower_predicate(expr)?))),
            other => Err(Error::Parse(format!(
                "Unsupported WHERE expression: {other}"
            ))),
        }
    }

    fn lower_compare(left: &Expr, cmp: Cmp, right: &Expr) -> Result<Predicate> {
        let Expr::Identifier(ident) = left else {
            return Err(Error::Parse(format!(
                "Expected column name on left of comparison, got {left}"
            )));
        };
        let value = Self::lower_scalar(right)?;
        Ok(Predicate::Compare {
            column: ident.value.clone(),
            cmp,
            value,
        })
    }

    fn lower_scalar(expr: &Expr) -> Result<Scalar> {
        match expr {
            Expr::Value(Value::Number(n, _)) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Scalar::Int(i))
                } else {
                    n.parse::<f64>()
                        .map(Scalar::Float)
                        .map_err(|_| Error::Parse(format!("Invalid numeric literal: {n}")))
                }
            }
            Expr::Value(Value::SingleQuotedString(s) | Value::DoubleQuotedString(s)) => {
                Ok(Scalar::Utf8(s.clone()))
            }
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match Self::lower_scalar(expr)? {
                Scalar::Int(i) => Ok(Scalar::Int(-i)),
                Scalar::Float(f) => Ok(Scalar::Float(-f)),
                Scalar::Utf8(_) => Err(Error::Parse("Cannot negate a string".to_string())),
            },
            other => Err(Error::Parse(format!("Unsupported literal: {other}"))),
        }
    }

    fn extract_order_by(
        order_by: Option<&sqlparser::ast::OrderBy>,
    ) -> Vec<(String, OrderDirection)> {
        order_by
            .map(|ob| {
                ob.exprs
                    .iter()
                    .map(|o| {
                        let col = o.expr.to_string();
                        let dir = if o.asc.unwrap_or(true) {
                            OrderDirection::Asc
                        } else {
                            OrderDirection::Desc
                        };
                        (col, dir)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn extract_limit(limit: Option<&Expr>) -> Option<usize> {
        limit.and_then(|expr| {
            if let Expr::Value(Value::Number(n, _)) = expr {
                n.parse().ok()
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowers_where_to_typed_predicate() {
        let engine = QueryEngine::new();
        let plan = engine
            .parse("SELECT * FROM trials WHERE contrast_right > 0.25 AND choice = 1")
            .unwrap();
        let Some(Predicate::And(left, right)) = plan.predicate else {
            panic!("expected conjunction");
        };
        assert_eq!(
            *left,
            Predicate::Compare {
                column: "contrast_right".to_string(),
                cmp: Cmp::Gt,
                value: Scalar::Float(0.25),
            }
        );
        assert_eq!(
            *right,
            Predicate::Compare {
                column: "choice".to_string(),
                cmp: Cmp::Eq,
                value: Scalar::Int(1),
            }
        );
    }

    #[test]
    fn test_parse_negative_literal() {
        let engine = QueryEngine::new();
        let plan = engine
            .parse("SELECT * FROM trials WHERE choice = -1")
            .unwrap();
        assert_eq!(
            plan.predicate,
            Some(Predicate::Compare {
                column: "choice".to_string(),
                cmp: Cmp::Eq,
                value: Scalar::Int(-1),
            })
        );
    }

    #[test]
    fn test_parse_rejects_joins_and_aggregates() {
        let engine = QueryEngine::new();
        assert!(engine
            .parse("SELECT * FROM trials JOIN sessions ON 1 = 1")
            .is_err());
        assert!(engine.parse("SELECT SUM(response_time) FROM trials").is_err());
    }

    #[test]
    fn test_parse_order_by_limit() {
        let engine = QueryEngine::new();
        let plan = engine
            .parse("SELECT trial_id FROM trials ORDER BY response_time DESC LIMIT 10")
            .unwrap();
        assert_eq!(
            plan.order_by,
            vec![("response_time".to_string(), OrderDirection::Desc)]
        );
        assert_eq!(plan.limit, Some(10));
    }
}
