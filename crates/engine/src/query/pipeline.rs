//! Staged build pipeline shared by the filter, sort and pagination stages.
//!
//! A [`Pipeline`] is an immutable list of stages:
//! - value parsers normalize raw input into a sequence of items,
//! - query builders fold each item into an [`Accumulator`] keyed by id,
//! - transform builds turn the finished accumulator into the output.
//!
//! Registering a stage returns a new pipeline, so a configured pipeline can
//! be cloned, shared across threads and reused for any number of builds.
//!
//! Every value parser receives the original input and the last registered
//! parser's result becomes the working sequence. Pipelines are expected to
//! carry exactly one parser; earlier parsers only contribute their errors.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// An item that can be looked up by id while query builders run.
pub trait Criterion {
    fn id(&self) -> &str;
}

/// Insertion-ordered map from field id to accumulated value.
///
/// Writing an existing id replaces its value but keeps its original
/// position, so ordering reflects the first time each id was supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accumulator<V> {
    entries: IndexMap<String, V>,
}

impl<V> Default for Accumulator<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<V> Accumulator<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value for `id`, replacing any previous value.
    pub fn set(&mut self, id: impl Into<String>, value: V) {
        self.entries.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, V> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<V> IntoIterator for Accumulator<V> {
    type Item = (String, V);
    type IntoIter = indexmap::map::IntoIter<String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a Accumulator<V> {
    type Item = (&'a String, &'a V);
    type IntoIter = indexmap::map::Iter<'a, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Accumulator<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut accumulator = Self::new();
        for (id, value) in iter {
            accumulator.set(id, value);
        }
        accumulator
    }
}

/// State handed to query builders during one build.
///
/// Owns the accumulator and gives read access to every parsed item, so a
/// builder can depend on another item regardless of processing order.
pub struct QueryHelper<'a, T, V> {
    items: &'a [T],
    query: Accumulator<V>,
}

impl<'a, T, V> QueryHelper<'a, T, V> {
    fn new(items: &'a [T]) -> Self {
        Self {
            items,
            query: Accumulator::new(),
        }
    }

    /// Write an accumulator entry (last write wins).
    pub fn set_query(&mut self, id: impl Into<String>, value: V) {
        self.query.set(id, value);
    }

    fn into_query(self) -> Accumulator<V> {
        self.query
    }
}

impl<'a, T: Criterion, V> QueryHelper<'a, T, V> {
    /// Find the parsed item with the given id.
    pub fn item_by_id(&self, id: &str) -> Option<&'a T> {
        self.items.iter().find(|item| item.id() == id)
    }
}

/// Output slot handed to transform builds.
pub struct TransformHelper<O> {
    value: Option<O>,
}

impl<O> TransformHelper<O> {
    fn new() -> Self {
        Self { value: None }
    }

    /// Replace the output value.
    pub fn set_value(&mut self, value: O) {
        self.value = Some(value);
    }

    /// Output written by an earlier transform, if any.
    pub fn value(&self) -> Option<&O> {
        self.value.as_ref()
    }

    pub fn take_value(&mut self) -> Option<O> {
        self.value.take()
    }
}

type ValueParser<I, T> = Arc<dyn Fn(&I) -> QueryResult<Vec<T>> + Send + Sync>;
type QueryBuilder<T, V> = Arc<dyn Fn(Option<&T>, &mut QueryHelper<'_, T, V>) + Send + Sync>;
type TransformBuild<V, O> = Arc<dyn Fn(&Accumulator<V>, &mut TransformHelper<O>) + Send + Sync>;

/// Three-stage build pipeline from input `I` to output `O`.
///
/// `T` is the parsed item type and `V` the accumulator value type. The output
/// comes from the transform stages; [`Pipeline::build_query`] returns the
/// accumulator directly for pipelines without one.
pub struct Pipeline<I: ?Sized, T, V, O = Accumulator<V>> {
    value_parsers: Vec<ValueParser<I, T>>,
    query_builders: Vec<QueryBuilder<T, V>>,
    transform_builds: Vec<TransformBuild<V, O>>,
}

impl<I: ?Sized, T, V, O> Clone for Pipeline<I, T, V, O> {
    fn clone(&self) -> Self {
        Self {
            value_parsers: self.value_parsers.clone(),
            query_builders: self.query_builders.clone(),
            transform_builds: self.transform_builds.clone(),
        }
    }
}

impl<I: ?Sized, T, V, O> Default for Pipeline<I, T, V, O> {
    fn default() -> Self {
        Self {
            value_parsers: Vec::new(),
            query_builders: Vec::new(),
            transform_builds: Vec::new(),
        }
    }
}

impl<I: ?Sized, T, V, O> std::fmt::Debug for Pipeline<I, T, V, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("value_parsers", &self.value_parsers.len())
            .field("query_builders", &self.query_builders.len())
            .field("transform_builds", &self.transform_builds.len())
            .finish()
    }
}

impl<I, T, V, O> Pipeline<I, T, V, O>
where
    I: ?Sized + 'static,
    T: 'static,
    V: 'static,
    O: 'static,
{
    /// Create a pipeline with no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value parser.
    pub fn with_value_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&I) -> QueryResult<Vec<T>> + Send + Sync + 'static,
    {
        self.value_parsers.push(Arc::new(parser));
        self
    }

    /// Register a query builder, run once per parsed item.
    pub fn with_query_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(Option<&T>, &mut QueryHelper<'_, T, V>) + Send + Sync + 'static,
    {
        self.query_builders.push(Arc::new(builder));
        self
    }

    /// Register a transform build, run once over the finished accumulator.
    pub fn with_transform_build<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Accumulator<V>, &mut TransformHelper<O>) + Send + Sync + 'static,
    {
        self.transform_builds.push(Arc::new(transform));
        self
    }

    /// Run the parser and builder stages over `input`, skipping transforms.
    ///
    /// Query builders run at least once (with `None`) so they can write
    /// defaults even when the parsed sequence is empty.
    pub fn build_query(&self, input: &I) -> QueryResult<Accumulator<V>> {
        let mut items = Vec::new();
        for parser in &self.value_parsers {
            items = parser(input)?;
        }

        let mut helper = QueryHelper::new(&items);
        if items.is_empty() {
            for builder in &self.query_builders {
                builder(None, &mut helper);
            }
        } else {
            for item in &items {
                for builder in &self.query_builders {
                    builder(Some(item), &mut helper);
                }
            }
        }
        Ok(helper.into_query())
    }

    /// Run every stage over `input` and return the transformed output.
    ///
    /// Fails with [`QueryError::MissingOutput`] when no transform set a value.
    pub fn build(&self, input: &I) -> QueryResult<O> {
        let query = self.build_query(input)?;

        let mut transform = TransformHelper::new();
        for transform_build in &self.transform_builds {
            transform_build(&query, &mut transform);
        }

        transform.take_value().ok_or(QueryError::MissingOutput)
    }
}
