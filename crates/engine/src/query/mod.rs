//! Query compilation module.
//!
//! This module provides:
//! - Pipeline: parser → builder → transform stages over request criteria
//! - Filter, sort and pagination pipelines built on it
//! - Include trees: per-request filtered relations, required propagation,
//!   count pruning
//! - QueryCompiler: assembles a QueryDescriptor from all of the above
//! - DescriptorQueryBuilder: SeaQuery-based SQL rendering of a descriptor

pub mod classify;
pub mod compile;
pub mod filter;
pub mod include;
pub mod pagination;
pub mod path;
pub mod pipeline;
pub mod sort;
pub mod sql;
pub mod types;

pub use compile::{BeforeBuildHook, CompileOptions, PipelineSet, QueryCompiler};
pub use filter::{FilterPipeline, build_filter, filter_pipeline};
pub use include::{
    BuildIncludeHook, IncludeNode, IncludeOptions, IncludeTemplate, JoinOn, find_node,
    inject_required, make_include_queryable, make_include_queryable_with, prune_for_count,
};
pub use pagination::{Pagination, PaginationPipeline, build_pagination, pagination_pipeline};
pub use pipeline::{Accumulator, Criterion, Pipeline, QueryHelper, TransformHelper};
pub use sort::{SortPipeline, build_sort, sort_pipeline};
pub use sql::DescriptorQueryBuilder;
pub use types::{
    Comparison, ComparisonOperator, ComparisonValue, Direction, FilterCriterion, Operator,
    OrderTerm, QueryDescriptor, RequestQuery, SortCriterion, WhereClause,
};
