//! Relation (include) trees.
//!
//! A caller declares a static [`IncludeTemplate`] per entity. Every request
//! derives fresh [`IncludeNode`] trees from it:
//! - [`make_include_queryable`] attaches each branch's slice of the filter
//!   payload and marks filtered branches as required (inner joins);
//!   [`make_include_queryable_with`] also passes every built node through a
//!   caller hook,
//! - [`inject_required`] marks every ancestor of a required branch,
//! - [`prune_for_count`] keeps only branches that constrain the row count.
//!
//! All three take shared references and return new trees; templates and
//! entities are never mutated.

use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::filter::{build_filter, decode_payload};
use super::types::WhereClause;
use crate::config::EngineConfig;
use crate::error::{QueryError, QueryResult};
use crate::schema::Entity;

/// Join columns between a parent and an included entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOn {
    /// Column on the parent side.
    pub local_key: String,
    /// Column on the included side.
    pub foreign_key: String,
}

impl JoinOn {
    pub fn new(local_key: &str, foreign_key: &str) -> Self {
        Self {
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }
}

/// One declared include: a bare entity reference or an entry with options.
#[derive(Debug, Clone)]
pub enum IncludeTemplate {
    Entity(Arc<Entity>),
    Options(IncludeOptions),
}

impl IncludeTemplate {
    pub fn entity(&self) -> &Arc<Entity> {
        match self {
            IncludeTemplate::Entity(entity) => entity,
            IncludeTemplate::Options(options) => &options.entity,
        }
    }
}

impl From<Arc<Entity>> for IncludeTemplate {
    fn from(entity: Arc<Entity>) -> Self {
        IncludeTemplate::Entity(entity)
    }
}

impl From<IncludeOptions> for IncludeTemplate {
    fn from(options: IncludeOptions) -> Self {
        IncludeTemplate::Options(options)
    }
}

/// Include entry with explicit options.
#[derive(Debug, Clone)]
pub struct IncludeOptions {
    pub entity: Arc<Entity>,
    /// Alias; defaults to the entity's singular name.
    pub key: Option<String>,
    /// Static filter. Replaces any filter derived from the request.
    pub where_clause: Option<WhereClause>,
    /// Explicit join requirement. Never overridden.
    pub required: Option<bool>,
    pub join: Option<JoinOn>,
    pub include: Vec<IncludeTemplate>,
}

impl IncludeOptions {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            key: None,
            where_clause: None,
            required: None,
            join: None,
            include: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_where(mut self, where_clause: WhereClause) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn with_join(mut self, join: JoinOn) -> Self {
        self.join = Some(join);
        self
    }

    pub fn with_include(mut self, include: impl Into<IncludeTemplate>) -> Self {
        self.include.push(include.into());
        self
    }
}

fn serialize_entity_name<S: Serializer>(entity: &Arc<Entity>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&entity.name)
}

/// A queryable include branch derived for one request.
#[derive(Debug, Clone, Serialize)]
pub struct IncludeNode {
    #[serde(rename = "model", serialize_with = "serialize_entity_name")]
    pub entity: Arc<Entity>,

    #[serde(rename = "as")]
    pub alias: String,

    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<WhereClause>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinOn>,

    #[serde(rename = "include", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IncludeNode>,
}

impl IncludeNode {
    /// Unfiltered node aliased by the entity's singular name.
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            alias: entity.singular_name().to_string(),
            entity,
            filter: None,
            required: None,
            join: None,
            children: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn with_filter(mut self, filter: WhereClause) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn with_child(mut self, child: IncludeNode) -> Self {
        self.children.push(child);
        self
    }

    /// Whether the branch carries a non-empty filter.
    pub fn has_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|filter| !filter.is_empty())
    }

    /// Whether the branch is explicitly an inner join.
    pub fn is_required(&self) -> bool {
        self.required == Some(true)
    }

    /// Direct child with the given alias.
    pub fn child(&self, alias: &str) -> Option<&IncludeNode> {
        self.children.iter().find(|child| child.alias == alias)
    }

    /// Join columns, defaulting to a belongs-to key (`{alias}Id` → primary key).
    pub fn join_on(&self) -> JoinOn {
        self.join.clone().unwrap_or_else(|| JoinOn {
            local_key: format!("{}Id", self.alias),
            foreign_key: self.entity.primary_key.clone(),
        })
    }
}

/// Find a node by its alias path from the root list.
pub fn find_node<'a, S: AsRef<str>>(nodes: &'a [IncludeNode], path: &[S]) -> Option<&'a IncludeNode> {
    let (first, rest) = path.split_first()?;
    let mut node = nodes.iter().find(|node| node.alias == first.as_ref())?;
    for alias in rest {
        node = node.child(alias.as_ref())?;
    }
    Some(node)
}

/// Hook applied to each include node once it and its children are built.
pub type BuildIncludeHook = Arc<dyn Fn(IncludeNode) -> IncludeNode + Send + Sync>;

/// Rewrite a relation template into queryable nodes for one request.
///
/// Each branch independently re-scans the whole filter payload for
/// `alias.field` criteria. A branch with a non-empty derived filter becomes
/// required unless the template says otherwise; template filters replace
/// derived ones.
pub fn make_include_queryable(
    filtered: &Value,
    template: &[IncludeTemplate],
    config: &EngineConfig,
) -> QueryResult<Vec<IncludeNode>> {
    make_include_queryable_with(filtered, template, config, &|node: IncludeNode| node)
}

/// [`make_include_queryable`] with a per-node hook.
///
/// The hook sees each node after its filter, flags and children are set, so
/// it can rename the alias, force `required` or rewrite the subtree. Children
/// are passed through the hook before their parent.
pub fn make_include_queryable_with(
    filtered: &Value,
    template: &[IncludeTemplate],
    config: &EngineConfig,
    on_build_include: &dyn Fn(IncludeNode) -> IncludeNode,
) -> QueryResult<Vec<IncludeNode>> {
    let payload = decode_payload("filtered", filtered)?;
    let build = Build {
        payload: &payload,
        config,
        on_build_include,
    };
    build.level(template, 1)
}

/// State shared by one template rewrite.
struct Build<'a> {
    payload: &'a Value,
    config: &'a EngineConfig,
    on_build_include: &'a dyn Fn(IncludeNode) -> IncludeNode,
}

impl Build<'_> {
    fn level(&self, template: &[IncludeTemplate], depth: usize) -> QueryResult<Vec<IncludeNode>> {
        template
            .iter()
            .map(|include| self.include(include, depth))
            .collect()
    }

    fn include(&self, include: &IncludeTemplate, depth: usize) -> QueryResult<IncludeNode> {
        let config = self.config;
        let (entity, options) = match include {
            IncludeTemplate::Entity(entity) => (entity, None),
            IncludeTemplate::Options(options) => (&options.entity, Some(options)),
        };
        let alias = options
            .and_then(|o| o.key.clone())
            .unwrap_or_else(|| entity.singular_name().to_string());

        if depth > config.max_include_depth {
            return Err(QueryError::IncludeTooDeep {
                alias,
                max: config.max_include_depth,
            });
        }

        let derived = build_filter(entity, Some(alias.as_str()), self.payload, config.dialect)?;
        let derived_required = (!derived.is_empty()).then_some(true);
        let derived = (!derived.is_empty()).then_some(derived);

        let (filter, required, join, children) = match options {
            Some(options) => (
                options.where_clause.clone().or(derived),
                options.required.or(derived_required),
                options.join.clone(),
                self.level(&options.include, depth + 1)?,
            ),
            None => (derived, derived_required, None, Vec::new()),
        };

        Ok((self.on_build_include)(IncludeNode {
            entity: Arc::clone(entity),
            alias,
            filter,
            required,
            join,
            children,
        }))
    }
}

/// Mark every ancestor of a required branch as required.
///
/// A node is satisfying when it is explicitly required or has a satisfying
/// descendant; satisfying nodes without an explicit `required` become
/// required. Explicit values, including `false`, are kept.
pub fn inject_required(nodes: &[IncludeNode]) -> Vec<IncludeNode> {
    nodes.iter().map(|node| propagate(node).0).collect()
}

fn propagate(node: &IncludeNode) -> (IncludeNode, bool) {
    let mut satisfied_below = false;
    let children: Vec<IncludeNode> = node
        .children
        .iter()
        .map(|child| {
            let (child, satisfied) = propagate(child);
            satisfied_below |= satisfied;
            child
        })
        .collect();

    let satisfied = node.is_required() || satisfied_below;
    let required = match node.required {
        None if satisfied => Some(true),
        explicit => explicit,
    };

    let rewritten = IncludeNode {
        entity: Arc::clone(&node.entity),
        alias: node.alias.clone(),
        filter: node.filter.clone(),
        required,
        join: node.join.clone(),
        children,
    };
    (rewritten, satisfied)
}

/// Keep only branches that carry a filter, are required, or lead to one that
/// does. Dropped branches lose their whole subtree.
pub fn prune_for_count(nodes: &[IncludeNode]) -> Vec<IncludeNode> {
    nodes.iter().filter_map(prune).collect()
}

fn prune(node: &IncludeNode) -> Option<IncludeNode> {
    let children = prune_for_count(&node.children);
    if !(node.has_filter() || node.is_required() || !children.is_empty()) {
        return None;
    }
    Some(IncludeNode {
        entity: Arc::clone(&node.entity),
        alias: node.alias.clone(),
        filter: node.filter.clone(),
        required: node.required,
        join: node.join.clone(),
        children,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Dialect;
    use crate::query::types::{Comparison, Operator};
    use crate::schema::{Field, NativeType};
    use serde_json::json;

    fn entity(name: &str) -> Arc<Entity> {
        Arc::new(Entity::new(name).with_field("name", Field::new(NativeType::String)))
    }

    fn config() -> EngineConfig {
        EngineConfig {
            dialect: Dialect::Mysql,
            ..Default::default()
        }
    }

    #[test]
    fn bare_entities_use_singular_alias() {
        let role = Arc::new(Entity::new("Roles").with_singular("Role"));
        let nodes = make_include_queryable(&Value::Null, &[role.into()], &config()).unwrap();
        assert_eq!(nodes[0].alias, "Role");
        assert_eq!(nodes[0].required, None);
        assert!(nodes[0].filter.is_none());
    }

    #[test]
    fn filtered_branches_become_required() {
        let template = vec![
            IncludeTemplate::from(entity("Role")),
            IncludeTemplate::from(entity("Session")),
        ];
        let payload = json!([{"id": "Role.name", "value": "admin"}]);
        let nodes = make_include_queryable(&payload, &template, &config()).unwrap();

        let role = &nodes[0];
        assert_eq!(role.required, Some(true));
        assert_eq!(
            role.filter.as_ref().unwrap().get("name"),
            Some(&Comparison::new(Operator::Like, json!("%admin%")))
        );
        assert_eq!(nodes[1].required, None);
        assert!(nodes[1].filter.is_none());
    }

    #[test]
    fn explicit_options_win_over_derived_values() {
        let static_filter: WhereClause =
            [("name", Comparison::new(Operator::Eq, json!("owner")))].into_iter().collect();
        let template = vec![IncludeTemplate::from(
            IncludeOptions::new(entity("Role"))
                .with_key("Owner")
                .with_required(false)
                .with_where(static_filter.clone()),
        )];
        let payload = json!([{"id": "Owner.name", "value": "x"}]);
        let nodes = make_include_queryable(&payload, &template, &config()).unwrap();

        assert_eq!(nodes[0].alias, "Owner");
        assert_eq!(nodes[0].required, Some(false));
        assert_eq!(nodes[0].filter.as_ref(), Some(&static_filter));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let leaf = IncludeOptions::new(entity("C"));
        let middle = IncludeOptions::new(entity("B")).with_include(leaf);
        let top = IncludeOptions::new(entity("A")).with_include(middle);
        let config = EngineConfig {
            max_include_depth: 2,
            ..config()
        };

        let err = make_include_queryable(&Value::Null, &[top.into()], &config).unwrap_err();
        assert!(matches!(err, QueryError::IncludeTooDeep { ref alias, max: 2 } if alias == "C"));
    }

    #[test]
    fn build_hook_rewrites_each_node() {
        let template = vec![IncludeTemplate::from(
            IncludeOptions::new(entity("Role")).with_include(entity("Permission")),
        )];
        let hook = |node: IncludeNode| {
            let alias = format!("{}s", node.alias);
            node.with_alias(&alias).with_required(true)
        };
        let nodes = make_include_queryable_with(&Value::Null, &template, &config(), &hook).unwrap();

        assert_eq!(nodes[0].alias, "Roles");
        assert_eq!(nodes[0].required, Some(true));
        assert_eq!(nodes[0].children[0].alias, "Permissions");
        assert_eq!(nodes[0].children[0].required, Some(true));
    }

    #[test]
    fn build_hook_sees_derived_filters() {
        let payload = json!([{"id": "Role.name", "value": "admin"}]);
        let hook = |mut node: IncludeNode| {
            if node.has_filter() {
                node.required = Some(false);
            }
            node
        };
        let nodes =
            make_include_queryable_with(&payload, &[entity("Role").into()], &config(), &hook).unwrap();

        assert!(nodes[0].has_filter());
        assert_eq!(nodes[0].required, Some(false));
    }

    #[test]
    fn propagation_respects_explicit_false() {
        let nodes = vec![
            IncludeNode::new(entity("A"))
                .with_required(false)
                .with_child(IncludeNode::new(entity("B")).with_required(true)),
        ];
        let propagated = inject_required(&nodes);
        assert_eq!(propagated[0].required, Some(false));
        assert_eq!(propagated[0].children[0].required, Some(true));
    }

    #[test]
    fn every_sibling_is_visited() {
        let filter: WhereClause =
            [("name", Comparison::new(Operator::Eq, json!("x")))].into_iter().collect();
        let nodes = vec![
            IncludeNode::new(entity("A")).with_child(IncludeNode::new(entity("A1")).with_required(true)),
            IncludeNode::new(entity("B")).with_child(
                IncludeNode::new(entity("B1")).with_filter(filter).with_required(true),
            ),
        ];
        let propagated = inject_required(&nodes);
        assert_eq!(propagated[0].required, Some(true));
        assert_eq!(propagated[1].required, Some(true));
    }

    #[test]
    fn pruning_keeps_filtered_chains() {
        let nodes = vec![
            IncludeNode::new(entity("A"))
                .with_child(IncludeNode::new(entity("A1")))
                .with_child(IncludeNode::new(entity("A2")).with_required(true)),
            IncludeNode::new(entity("B")),
        ];
        let pruned = prune_for_count(&nodes);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].alias, "A");
        assert_eq!(pruned[0].children.len(), 1);
        assert_eq!(pruned[0].children[0].alias, "A2");
    }

    #[test]
    fn empty_filters_do_not_count() {
        let nodes = vec![IncludeNode::new(entity("A")).with_filter(WhereClause::new())];
        assert!(prune_for_count(&nodes).is_empty());
    }

    #[test]
    fn template_is_left_untouched() {
        let template = vec![IncludeTemplate::from(
            IncludeOptions::new(entity("A")).with_include(entity("B")),
        )];
        let payload = json!([{"id": "B.name", "value": "x"}]);
        let first = make_include_queryable(&payload, &template, &config()).unwrap();
        let second = make_include_queryable(&Value::Null, &template, &config()).unwrap();

        assert_eq!(first[0].children[0].required, Some(true));
        assert_eq!(second[0].children[0].required, None);
        match &template[0] {
            IncludeTemplate::Options(options) => {
                assert!(options.required.is_none());
                assert!(matches!(options.include[0], IncludeTemplate::Entity(_)));
            }
            other => panic!("unexpected template {other:?}"),
        }
    }

    #[test]
    fn default_join_is_belongs_to() {
        let node = IncludeNode::new(entity("Role"));
        assert_eq!(node.join_on(), JoinOn::new("RoleId", "id"));
    }
}
