//! Filter stage: request filter payload → per-field comparisons.
//!
//! Each criterion is resolved against the alias being filtered, classified
//! from the entity's column type, and turned into a [`Comparison`]:
//! - explicit `gt`/`gte`/`lt`/`lte` operators are used as given,
//! - string columns match UUID values and enumerated columns by equality
//!   and everything else by substring pattern (`ILIKE` where supported),
//! - number and date columns use equality,
//! - date columns get their value parsed into a timestamp.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::{Uuid, Variant};

use super::classify::{Classification, classify};
use super::path::resolve_field;
use super::pipeline::Pipeline;
use super::types::{
    Comparison, ComparisonOperator, ComparisonValue, FilterCriterion, Operator, WhereClause,
};
use crate::config::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::schema::{Entity, Field};

/// Pipeline from a filter payload to a where clause.
pub type FilterPipeline = Pipeline<Value, FilterCriterion, Comparison>;

/// Normalize a filter or sort payload into its entries.
///
/// Text is decoded as JSON first, so empty or blank text is malformed.
/// Arrays yield their elements, `null` yields nothing and any other value is
/// a single entry.
pub(crate) fn parse_payload(param: &'static str, payload: &Value) -> QueryResult<Vec<Value>> {
    let decoded;
    let payload = match payload {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text)
                .map_err(|e| QueryError::malformed(param, e))?;
            &decoded
        }
        other => other,
    };

    Ok(match payload {
        Value::Null => Vec::new(),
        Value::Array(entries) => entries.clone(),
        single => vec![single.clone()],
    })
}

/// Decode a text payload once so it can be re-scanned without re-parsing.
pub(crate) fn decode_payload(param: &'static str, payload: &Value) -> QueryResult<Value> {
    Ok(Value::Array(parse_payload(param, payload)?))
}

/// Build the filter pipeline for `entity`.
///
/// `alias` scopes the pipeline to an include branch: only `alias.field` ids
/// match. Without an alias only bare field names match.
pub fn filter_pipeline(entity: Arc<Entity>, alias: Option<String>, dialect: Dialect) -> FilterPipeline {
    let parser_entity = Arc::clone(&entity);
    let parser_alias = alias.clone();
    FilterPipeline::new()
        .with_value_parser(move |payload: &Value| {
            let criteria: Vec<FilterCriterion> = parse_payload("filtered", payload)?
                .iter()
                .filter_map(|entry| {
                    let criterion = FilterCriterion::from_value(entry);
                    if criterion.is_none() {
                        tracing::debug!(entry = %entry, "dropping malformed filter entry");
                    }
                    criterion
                })
                .collect();
            for criterion in &criteria {
                validate_criterion(&parser_entity, parser_alias.as_deref(), criterion)?;
            }
            Ok(criteria)
        })
        .with_query_builder(move |criterion, helper| {
            let Some(criterion) = criterion else {
                return;
            };
            let Some(field_name) = resolve_field(Some(&criterion.id), alias.as_deref()) else {
                tracing::trace!(
                    id = %criterion.id,
                    alias = alias.as_deref().unwrap_or(entity.singular_name()),
                    "filter id does not resolve; skipping"
                );
                return;
            };
            if let Some(comparison) = build_comparison(&entity, field_name, criterion, dialect) {
                helper.set_query(field_name, comparison);
            }
        })
        .with_transform_build(|query, transform| {
            transform.set_value(query.clone());
        })
}

/// Reject a criterion whose value cannot be applied to its resolved column.
///
/// Date columns need a parseable date.
fn validate_criterion(
    entity: &Entity,
    alias: Option<&str>,
    criterion: &FilterCriterion,
) -> QueryResult<()> {
    let Some(field_name) = resolve_field(Some(&criterion.id), alias) else {
        return Ok(());
    };
    let is_date = entity
        .field(field_name)
        .is_some_and(|f| classify(&f.data_type) == Classification::Date);
    if is_date && parse_date(&criterion.value).is_none() {
        return Err(QueryError::invalid_value(&criterion.id, value_text(&criterion.value)));
    }
    Ok(())
}

/// Build a where clause for `entity` from a filter payload.
pub fn build_filter(
    entity: &Arc<Entity>,
    alias: Option<&str>,
    payload: &Value,
    dialect: Dialect,
) -> QueryResult<WhereClause> {
    filter_pipeline(Arc::clone(entity), alias.map(str::to_string), dialect).build(payload)
}

/// Build the comparison for one resolved criterion.
///
/// Returns `None` when a date column receives a value that is not a date,
/// which only happens for items that bypassed [`validate_criterion`].
fn build_comparison(
    entity: &Entity,
    field_name: &str,
    criterion: &FilterCriterion,
    dialect: Dialect,
) -> Option<Comparison> {
    let field = entity.field(field_name);
    let class = field
        .map(|f| classify(&f.data_type))
        .unwrap_or(Classification::String);

    let operator = match criterion.operator {
        Some(
            op @ (ComparisonOperator::Gt
            | ComparisonOperator::Gte
            | ComparisonOperator::Lt
            | ComparisonOperator::Lte),
        ) => Operator::from(op),
        _ if class == Classification::String => {
            if is_uuid(&criterion.value) || field.is_some_and(Field::is_enumerated) {
                Operator::Eq
            } else if dialect.supports_ilike() {
                Operator::ILike
            } else {
                Operator::Like
            }
        }
        _ => Operator::Eq,
    };

    let value = if class == Classification::Date {
        ComparisonValue::Date(parse_date(&criterion.value)?)
    } else if operator.is_pattern() {
        ComparisonValue::Json(Value::String(format!("%{}%", value_text(&criterion.value))))
    } else {
        ComparisonValue::Json(criterion.value.clone())
    };

    Some(Comparison { operator, value })
}

/// Whether a value is a hyphenated RFC 4122 UUID string.
///
/// The version nibble must be 1-8 and the variant must be RFC 4122, except
/// for the nil and max UUIDs.
fn is_uuid(value: &Value) -> bool {
    let Some(text) = value.as_str().filter(|s| s.len() == 36) else {
        return false;
    };
    let Ok(uuid) = Uuid::parse_str(text) else {
        return false;
    };
    if uuid.is_nil() || uuid.as_u128() == u128::MAX {
        return true;
    }
    (1..=8).contains(&uuid.get_version_num()) && uuid.get_variant() == Variant::RFC4122
}

/// Text form of a value for pattern matching.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a filter value into a UTC timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (with `T` or space), plain dates
/// and epoch milliseconds.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_f64()? as i64),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(date) = DateTime::parse_from_rfc3339(s) {
                return Some(date.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(date) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(date.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        }
        _ => None,
    }
}
