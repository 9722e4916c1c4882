//! Filtered, ordered and paged reads over one partition.
//!
//! Field names are the camelCase names entities serialise with. Values that
//! are decimal integers on both sides (JSON numbers or digit strings) compare
//! numerically, so `uint256` amounts order correctly.

use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Value;

use crate::amount::Amount;
use crate::entities::{Entity, EntityKind};
use crate::error::{Result, StoreError};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Comparison,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: Comparison, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    fn matches(&self, record: &Value) -> bool {
        match record.get(&self.field) {
            Some(actual) => compare(actual, &self.value)
                .map(|ordering| self.op.accepts(ordering))
                .unwrap_or(false),
            None => self.op == Comparison::Eq && self.value.is_null(),
        }
    }
}

/// Parses `field=value`, `field>=value`, `field>value`, `field<=value` and
/// `field<value`. `true`/`false`/`null` become JSON literals, anything else a
/// string.
impl FromStr for Filter {
    type Err = StoreError;

    fn from_str(expr: &str) -> std::result::Result<Self, Self::Err> {
        const OPERATORS: [(&str, Comparison); 5] = [
            (">=", Comparison::Gte),
            ("<=", Comparison::Lte),
            ("=", Comparison::Eq),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
        ];

        let (pos, token, op) = OPERATORS
            .iter()
            .filter_map(|(token, op)| expr.find(token).map(|pos| (pos, *token, *op)))
            .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
            .ok_or_else(|| StoreError::Query(format!("Missing comparison operator in '{}'", expr)))?;

        let field = expr[..pos].trim();
        if field.is_empty() {
            return Err(StoreError::Query(format!("Missing field name in '{}'", expr)));
        }
        let raw = expr[pos + token.len()..].trim();
        let value = match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            other => Value::String(other.to_string()),
        };

        Ok(Filter::new(field, op, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct EntityQuery {
    pub kind: EntityKind,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub direction: OrderDirection,
    pub first: Option<usize>,
    pub skip: usize,
}

impl EntityQuery {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            order_by: None,
            direction: OrderDirection::Asc,
            first: None,
            skip: 0,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::new(field, Comparison::Eq, value.into()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Run against a store. Without `order_by` rows come back in id order.
    pub fn run<S: EntityStore + ?Sized>(&self, store: &S) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        for (_, raw) in store.list_raw(self.kind)? {
            let record: Value = serde_json::from_str(&raw)?;
            if self.filters.iter().all(|f| f.matches(&record)) {
                rows.push(record);
            }
        }

        if let Some(field) = &self.order_by {
            // Stable sort keeps id order among equal keys
            rows.sort_by(|a, b| {
                let ordering = order_values(a.get(field), b.get(field));
                match self.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let limit = self.first.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(self.skip).take(limit).collect())
    }

    /// Run and decode into the entity type for this partition.
    pub fn run_typed<E: Entity, S: EntityStore + ?Sized>(&self, store: &S) -> Result<Vec<E>> {
        if E::KIND != self.kind {
            return Err(StoreError::Query(format!(
                "Query over {} cannot decode {}",
                self.kind,
                E::KIND
            )));
        }
        self.run(store)?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }
}

fn as_decimal(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(n) => n.as_u64().map(Amount::from),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
        _ => None,
    }
}

/// Ordering between two JSON values, or `None` when they are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_decimal(a), as_decimal(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::String(y)) => Some(x.to_string().cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order for sorting: missing and null first, then comparable values.
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}
