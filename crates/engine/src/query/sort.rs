//! Sort stage: request sort payload → ordered ORDER BY terms.

use serde_json::Value;

use super::filter::parse_payload;
use super::pipeline::{Accumulator, Pipeline};
use super::types::{Direction, OrderTerm, SortCriterion};
use crate::error::QueryResult;

/// Pipeline from a sort payload to order terms.
pub type SortPipeline = Pipeline<Value, SortCriterion, Direction, Vec<OrderTerm>>;

fn order_terms(query: &Accumulator<Direction>) -> Vec<OrderTerm> {
    query
        .iter()
        .map(|(id, direction)| OrderTerm::from_path(id, *direction))
        .collect()
}

/// Build the sort pipeline.
pub fn sort_pipeline() -> SortPipeline {
    SortPipeline::new()
        .with_value_parser(|payload: &Value| {
            Ok(parse_payload("sorted", payload)?
                .iter()
                .filter_map(SortCriterion::from_value)
                .collect())
        })
        .with_query_builder(|criterion, helper| {
            if let Some(criterion) = criterion {
                let direction = if criterion.desc {
                    Direction::Desc
                } else {
                    Direction::Asc
                };
                helper.set_query(criterion.id.clone(), direction);
            }
        })
        .with_transform_build(|query, transform| {
            transform.set_value(order_terms(query));
        })
}

/// Build order terms from a sort payload.
pub fn build_sort(payload: &Value) -> QueryResult<Vec<OrderTerm>> {
    sort_pipeline().build(payload)
}
