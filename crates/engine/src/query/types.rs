//! Query engine types.
//!
//! Provides type definitions for request input and compiled output:
//! - RequestQuery: untyped request parameters (filtered, sorted, paging)
//! - FilterCriterion / SortCriterion: validated payload entries
//! - Comparison / WhereClause: per-field comparison expressions
//! - OrderTerm: relation path + column + direction tuples
//! - QueryDescriptor: everything a data-access layer needs to run the query

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::include::IncludeNode;
use super::pipeline::{Accumulator, Criterion};

/// Request parameters as received from the routing layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuery {
    /// Filter criteria: an array, a single object, or JSON text of either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<Value>,

    /// Sort criteria: an array or JSON text of one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorted: Option<Value>,

    /// 1-indexed page number, as a number or numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Value>,

    /// Rows per page, as a number or numeric string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<Value>,

    /// Soft-delete visibility; `false` includes soft-deleted rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paranoid: Option<Value>,
}

impl RequestQuery {
    /// Filter payload, `Null` when absent.
    pub fn filter_payload(&self) -> &Value {
        self.filtered.as_ref().unwrap_or(&Value::Null)
    }

    /// Sort payload, `Null` when absent.
    pub fn sort_payload(&self) -> &Value {
        self.sorted.as_ref().unwrap_or(&Value::Null)
    }

    /// Whether soft-deleted rows should be returned.
    ///
    /// Accepts booleans and the strings `"true"`/`"false"`/`"1"`/`"0"` as sent
    /// in query strings. Anything else keeps soft-deleted rows hidden.
    pub fn include_soft_deleted(&self) -> bool {
        match &self.paranoid {
            Some(Value::Bool(paranoid)) => !paranoid,
            Some(Value::String(s)) => matches!(s.trim(), "false" | "0"),
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            _ => false,
        }
    }
}

/// Coerce a request scalar to a number the way a query-string consumer
/// expects: numbers pass through, numeric strings parse, blank strings and
/// `null` are zero, `true` is one. Anything unparseable or non-finite is zero.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(0.0)
            }
        }
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if number.is_finite() { number } else { 0.0 }
}

/// Operator a client may name explicitly on a filter criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FromStr for ComparisonOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(ComparisonOperator::Eq),
            "gt" => Ok(ComparisonOperator::Gt),
            "gte" => Ok(ComparisonOperator::Gte),
            "lt" => Ok(ComparisonOperator::Lt),
            "lte" => Ok(ComparisonOperator::Lte),
            _ => Err(()),
        }
    }
}

/// One filter entry: `{ id, value, operator? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriterion {
    /// Field name or `alias.field` path.
    pub id: String,

    /// Raw comparison value.
    pub value: Value,

    /// Explicit comparison operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<ComparisonOperator>,
}

impl FilterCriterion {
    pub fn new(id: &str, value: Value) -> Self {
        Self {
            id: id.to_string(),
            value,
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Validate one payload entry. Entries without a string `id` or without
    /// a `value` are rejected; an unrecognised operator counts as absent.
    pub fn from_value(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let id = object.get("id")?.as_str()?;
        let value = object.get("value")?.clone();
        let operator = object
            .get("operator")
            .and_then(Value::as_str)
            .and_then(|op| op.parse().ok());

        Some(Self {
            id: id.to_string(),
            value,
            operator,
        })
    }
}

impl Criterion for FilterCriterion {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One sort entry: `{ id, desc }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    /// Column name or dotted relation path.
    pub id: String,

    /// Descending when true.
    #[serde(default)]
    pub desc: bool,
}

impl SortCriterion {
    /// Validate one payload entry. Requires a non-empty string `id`; only a
    /// JSON `true` makes the entry descending.
    pub fn from_value(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let id = object.get("id")?.as_str()?;
        if id.is_empty() {
            return None;
        }
        let desc = object.get("desc") == Some(&Value::Bool(true));
        Some(Self {
            id: id.to_string(),
            desc,
        })
    }
}

impl Criterion for SortCriterion {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Comparison operator emitted into a where clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
}

impl Operator {
    /// Whether the operator is a substring pattern match.
    pub fn is_pattern(self) -> bool {
        matches!(self, Operator::Like | Operator::ILike)
    }
}

impl From<ComparisonOperator> for Operator {
    fn from(op: ComparisonOperator) -> Self {
        match op {
            ComparisonOperator::Eq => Operator::Eq,
            ComparisonOperator::Gt => Operator::Gt,
            ComparisonOperator::Gte => Operator::Gte,
            ComparisonOperator::Lt => Operator::Lt,
            ComparisonOperator::Lte => Operator::Lte,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "EQ",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
        };
        f.write_str(name)
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComparisonValue {
    /// Value as supplied (or wrapped in `%` for pattern matches).
    Json(Value),
    /// Value coerced for a date/time column.
    #[serde(serialize_with = "serialize_date")]
    Date(DateTime<Utc>),
}

fn serialize_date<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl ComparisonValue {
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            ComparisonValue::Date(date) => Some(date),
            ComparisonValue::Json(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ComparisonValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for ComparisonValue {
    fn from(value: Value) -> Self {
        ComparisonValue::Json(value)
    }
}

impl From<DateTime<Utc>> for ComparisonValue {
    fn from(date: DateTime<Utc>) -> Self {
        ComparisonValue::Date(date)
    }
}

/// A single `{ OPERATOR: value }` expression for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Operator, ComparisonValue>",
    into = "BTreeMap<Operator, ComparisonValue>"
)]
pub struct Comparison {
    pub operator: Operator,
    pub value: ComparisonValue,
}

impl Comparison {
    pub fn new(operator: Operator, value: impl Into<ComparisonValue>) -> Self {
        Self {
            operator,
            value: value.into(),
        }
    }
}

impl TryFrom<BTreeMap<Operator, ComparisonValue>> for Comparison {
    type Error = String;

    fn try_from(map: BTreeMap<Operator, ComparisonValue>) -> Result<Self, Self::Error> {
        let mut entries = map.into_iter();
        match (entries.next(), entries.next()) {
            (Some((operator, value)), None) => Ok(Self { operator, value }),
            _ => Err("comparison must have exactly one operator".to_string()),
        }
    }
}

impl From<Comparison> for BTreeMap<Operator, ComparisonValue> {
    fn from(comparison: Comparison) -> Self {
        BTreeMap::from([(comparison.operator, comparison.value)])
    }
}

/// Field name → comparison, AND-combined by the data-access layer.
pub type WhereClause = Accumulator<Comparison>;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

/// One ORDER BY entry: relation aliases, column, direction.
///
/// Serializes as a flat tuple, e.g. `["Role", "name", "DESC"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    /// Dot segments of the sort id; the last one is the column.
    pub segments: Vec<String>,
    pub direction: Direction,
}

impl OrderTerm {
    pub fn new<I, S>(segments: I, direction: Direction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            direction,
        }
    }

    /// Split a dotted id into an order term.
    pub fn from_path(id: &str, direction: Direction) -> Self {
        Self::new(id.split('.'), direction)
    }

    /// Relation aliases leading to the column.
    pub fn relation_path(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, path)) => path,
            None => &[],
        }
    }

    pub fn column(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl Serialize for OrderTerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.segments.len() + 1))?;
        for segment in &self.segments {
            seq.serialize_element(segment)?;
        }
        seq.serialize_element(&self.direction)?;
        seq.end()
    }
}

/// Compiled query, ready for the data-access layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Relation tree for the row query.
    pub include: Vec<IncludeNode>,

    /// Reduced relation tree for the total-count query.
    #[serde(rename = "includeCount")]
    pub include_for_count: Vec<IncludeNode>,

    /// Root entity comparisons, AND-combined.
    #[serde(rename = "where")]
    pub where_clause: WhereClause,

    /// ORDER BY entries in request order.
    pub order: Vec<OrderTerm>,

    pub offset: u64,

    pub limit: u64,

    pub include_soft_deleted: bool,
}
