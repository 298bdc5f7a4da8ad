//! Query compiler: request parameters → [`QueryDescriptor`].
//!
//! Wires the pagination, filter and sort pipelines for one entity, derives
//! the row and count include trees, and assembles the descriptor. Call sites
//! customise the pipelines for their entity through
//! [`CompileOptions::on_before_build`].

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::filter::{FilterPipeline, filter_pipeline};
use super::include::{
    BuildIncludeHook, IncludeNode, IncludeTemplate, inject_required, make_include_queryable,
    make_include_queryable_with, prune_for_count,
};
use super::pagination::{PaginationPipeline, pagination_pipeline};
use super::sort::{SortPipeline, sort_pipeline};
use super::types::{Direction, OrderTerm, QueryDescriptor, RequestQuery};
use crate::config::EngineConfig;
use crate::error::QueryResult;
use crate::schema::Entity;

/// The three pipelines run for one compilation.
#[derive(Debug, Clone)]
pub struct PipelineSet {
    pub filter: FilterPipeline,
    pub sort: SortPipeline,
    pub pagination: PaginationPipeline,
}

impl PipelineSet {
    /// Default pipelines for a root entity.
    pub fn for_entity(entity: &Arc<Entity>, config: &EngineConfig) -> Self {
        Self {
            filter: filter_pipeline(Arc::clone(entity), None, config.dialect),
            sort: sort_pipeline(),
            pagination: pagination_pipeline(config.default_page_size),
        }
    }
}

/// Hook run on the default pipelines before they build.
pub type BeforeBuildHook = Arc<dyn Fn(PipelineSet) -> PipelineSet + Send + Sync>;

/// Per-entity compilation options.
#[derive(Clone, Default)]
pub struct CompileOptions {
    /// Ordering used when the request names none.
    pub default_order: Vec<OrderTerm>,

    /// Adds or replaces pipeline stages before building.
    pub on_before_build: Option<BeforeBuildHook>,

    /// Rewrites each include node as the relation template is derived.
    pub on_build_include: Option<BuildIncludeHook>,
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("default_order", &self.default_order)
            .field("on_before_build", &self.on_before_build.is_some())
            .field("on_build_include", &self.on_build_include.is_some())
            .finish()
    }
}

impl CompileOptions {
    /// Order by `createdAt` descending when the request names no sort.
    pub fn newest_first() -> Self {
        Self::default().with_default_order(vec![OrderTerm::new(["createdAt"], Direction::Desc)])
    }

    pub fn with_default_order(mut self, order: Vec<OrderTerm>) -> Self {
        self.default_order = order;
        self
    }

    pub fn on_before_build<F>(mut self, hook: F) -> Self
    where
        F: Fn(PipelineSet) -> PipelineSet + Send + Sync + 'static,
    {
        self.on_before_build = Some(Arc::new(hook));
        self
    }

    pub fn on_build_include<F>(mut self, hook: F) -> Self
    where
        F: Fn(IncludeNode) -> IncludeNode + Send + Sync + 'static,
    {
        self.on_build_include = Some(Arc::new(hook));
        self
    }
}

/// Compiles request parameters into query descriptors.
///
/// Holds only configuration; every call allocates its own pipelines and
/// trees, so one compiler can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: EngineConfig,
    options: CompileOptions,
}

impl QueryCompiler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile a request against `entity` and its relation template.
    pub fn compile(
        &self,
        request: &RequestQuery,
        entity: &Arc<Entity>,
        template: &[IncludeTemplate],
    ) -> QueryResult<QueryDescriptor> {
        let include = self.make_include_queryable(request.filter_payload(), template)?;
        self.generate(request, entity, &include)
    }

    /// Rewrite a relation template into filtered include nodes.
    pub fn make_include_queryable(
        &self,
        filtered: &Value,
        template: &[IncludeTemplate],
    ) -> QueryResult<Vec<IncludeNode>> {
        match &self.options.on_build_include {
            Some(hook) => make_include_queryable_with(filtered, template, &self.config, hook.as_ref()),
            None => make_include_queryable(filtered, template, &self.config),
        }
    }

    /// Compile a request against already-queryable include nodes.
    pub fn generate(
        &self,
        request: &RequestQuery,
        entity: &Arc<Entity>,
        include: &[IncludeNode],
    ) -> QueryResult<QueryDescriptor> {
        let mut pipelines = PipelineSet::for_entity(entity, &self.config);
        if let Some(hook) = &self.options.on_before_build {
            pipelines = hook(pipelines);
        }

        let pagination = pipelines.pagination.build(request)?;
        let where_clause = pipelines.filter.build(request.filter_payload())?;
        let sort = pipelines.sort.build(request.sort_payload())?;

        let include_for_count = inject_required(&prune_for_count(include));
        let include = inject_required(include);

        let order = if sort.is_empty() {
            self.options.default_order.clone()
        } else {
            sort
        };

        tracing::debug!(
            entity = %entity.name,
            filters = where_clause.len(),
            sorts = order.len(),
            includes = include.len(),
            count_includes = include_for_count.len(),
            offset = pagination.offset,
            limit = pagination.limit,
            "compiled query"
        );

        Ok(QueryDescriptor {
            include,
            include_for_count,
            where_clause,
            order,
            offset: pagination.offset,
            limit: pagination.limit,
            include_soft_deleted: request.include_soft_deleted(),
        })
    }
}
