//! Row filters shared by the table stores
//!
//! A [`Query`] renders to PostgREST query parameters for Supabase and is
//! evaluated directly by the in-memory store.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;

/// Single column predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column <> value`
    Neq(String, Value),
    /// `column >= value`
    Gte(String, Value),
    /// `column < value`
    Lt(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
    /// `column IS NULL`
    IsNull(String),
}

/// Sort key
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Filters, ordering and limit for a select/update/delete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    /// Match every row
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(column.to_string(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters
            .push(Filter::In(column.to_string(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    /// Append a sort key; nulls always sort last
    pub fn order(mut self, column: &str, descending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query string pairs, e.g. `("user_id", "eq.abc")`
    pub fn to_postgrest_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq(c, v) => (c.clone(), format!("eq.{}", render_scalar(v))),
                Filter::Neq(c, v) => (c.clone(), format!("neq.{}", render_scalar(v))),
                Filter::Gte(c, v) => (c.clone(), format!("gte.{}", render_scalar(v))),
                Filter::Lt(c, v) => (c.clone(), format!("lt.{}", render_scalar(v))),
                Filter::In(c, vs) => {
                    let items: Vec<String> = vs.iter().map(render_list_item).collect();
                    (c.clone(), format!("in.({})", items.join(",")))
                }
                Filter::IsNull(c) => (c.clone(), "is.null".to_string()),
            })
            .collect();

        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}.nullslast", o.column, if o.descending { "desc" } else { "asc" }))
                .collect();
            params.push(("order".to_string(), order.join(",")));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }

    /// Evaluate the filters against a JSON row
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(c, v) => values_equal(field(row, c), v),
            Filter::Neq(c, v) => !values_equal(field(row, c), v),
            Filter::Gte(c, v) => {
                matches!(compare_values(field(row, c), v), Some(Ordering::Greater | Ordering::Equal))
            }
            Filter::Lt(c, v) => matches!(compare_values(field(row, c), v), Some(Ordering::Less)),
            Filter::In(c, vs) => vs.iter().any(|v| values_equal(field(row, c), v)),
            Filter::IsNull(c) => field(row, c).is_null(),
        })
    }

    /// Sort rows by the order keys (nulls last) and apply the limit
    pub fn apply_order_and_limit(&self, rows: &mut Vec<Value>) {
        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for key in &self.order {
                    let (left, right) = (field(a, &key.column), field(b, &key.column));
                    let ordering = match (left.is_null(), right.is_null()) {
                        (true, true) => Ordering::Equal,
                        (true, false) => Ordering::Greater,
                        (false, true) => Ordering::Less,
                        (false, false) => {
                            let natural = compare_values(left, right).unwrap_or(Ordering::Equal);
                            if key.descending {
                                natural.reverse()
                            } else {
                                natural
                            }
                        }
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
    }
}

const NULL: Value = Value::Null;

fn field<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&NULL)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_list_item(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        other => render_scalar(other),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Some(Ordering::Equal),
        (Value::String(a), Value::String(b)) => {
            a == b || matches!((parse_time(a), parse_time(b)), (Some(x), Some(y)) if x == y)
        }
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => match (parse_time(a), parse_time(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(a.cmp(b)),
        },
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn parse_time(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}
