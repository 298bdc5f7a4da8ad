//! Pagination stage: `page`/`pageSize` → `offset`/`limit`.

use serde::{Deserialize, Serialize};

use super::pipeline::{Criterion, Pipeline};
use super::types::{RequestQuery, coerce_number};
use crate::error::QueryResult;

const PAGE: &str = "page";
const PAGE_SIZE: &str = "pageSize";
const OFFSET: &str = "offset";
const LIMIT: &str = "limit";

/// One numeric paging parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageCriterion {
    pub id: &'static str,
    pub value: f64,
}

impl Criterion for PageCriterion {
    fn id(&self) -> &str {
        self.id
    }
}

/// Row window of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

/// Pipeline from request parameters to a row window.
pub type PaginationPipeline = Pipeline<RequestQuery, PageCriterion, u64, Pagination>;

/// Page size to use for a requested value; zero, negative and fractional
/// sizes below one fall back to `default_limit`.
fn effective_limit(page_size: f64, default_limit: u64) -> u64 {
    if page_size >= 1.0 {
        page_size.trunc() as u64
    } else {
        default_limit
    }
}

/// Build the pagination pipeline.
///
/// The offset is computed from the effective limit of the `pageSize`
/// criterion looked up directly, so it does not depend on the order in
/// which the two criteria are processed.
pub fn pagination_pipeline(default_limit: u64) -> PaginationPipeline {
    PaginationPipeline::new()
        .with_value_parser(|request: &RequestQuery| {
            Ok(vec![
                PageCriterion {
                    id: PAGE,
                    value: coerce_number(request.page.as_ref()),
                },
                PageCriterion {
                    id: PAGE_SIZE,
                    value: coerce_number(request.page_size.as_ref()),
                },
            ])
        })
        .with_query_builder(move |criterion, helper| {
            let Some(criterion) = criterion else {
                return;
            };
            match criterion.id {
                PAGE_SIZE => {
                    helper.set_query(LIMIT, effective_limit(criterion.value, default_limit));
                }
                PAGE => {
                    let limit = helper
                        .item_by_id(PAGE_SIZE)
                        .map(|size| effective_limit(size.value, default_limit))
                        .unwrap_or(default_limit);
                    let offset = limit as f64 * (criterion.value - 1.0);
                    helper.set_query(OFFSET, if offset > 0.0 { offset as u64 } else { 0 });
                }
                _ => {}
            }
        })
        .with_transform_build(move |query, transform| {
            transform.set_value(Pagination {
                offset: query.get(OFFSET).copied().unwrap_or(0),
                limit: query.get(LIMIT).copied().unwrap_or(default_limit),
            });
        })
}

/// Build the row window for a request.
pub fn build_pagination(request: &RequestQuery, default_limit: u64) -> QueryResult<Pagination> {
    pagination_pipeline(default_limit).build(request)
}
