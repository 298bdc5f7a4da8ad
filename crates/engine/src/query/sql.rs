//! Descriptor query builder using SeaQuery.
//!
//! Renders a [`QueryDescriptor`] into the row and count statements a
//! relational data-access layer would run:
//! - include nodes become joins aliased by their path (`Role->Permission`),
//!   inner when required and left otherwise, with node filters in `ON`
//! - root comparisons go to `WHERE`
//! - soft-deleted rows of paranoid entities are hidden unless requested
//! - order terms resolve their relation path through the include tree

use sea_query::extension::postgres::PgExpr;
use sea_query::{
    Alias, Asterisk, Cond, Expr, Func, JoinType, MysqlQueryBuilder, Order,
    PostgresQueryBuilder, Query, SelectStatement, SimpleExpr, SqliteQueryBuilder,
    Value as SqlValue,
};
use serde_json::Value;

use super::include::{IncludeNode, find_node};
use super::types::{
    Comparison, ComparisonValue, Direction, Operator, QueryDescriptor, WhereClause,
};
use crate::config::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::schema::Entity;

/// Column marking a soft-deleted row on paranoid entities.
pub const DELETED_AT: &str = "deletedAt";

/// Separator between aliases in a joined table's alias.
const PATH_SEPARATOR: &str = "->";

/// Query builder for compiled descriptors.
pub struct DescriptorQueryBuilder<'a> {
    descriptor: &'a QueryDescriptor,
    entity: &'a Entity,
    dialect: Dialect,
}

impl<'a> DescriptorQueryBuilder<'a> {
    pub fn new(descriptor: &'a QueryDescriptor, entity: &'a Entity, dialect: Dialect) -> Self {
        Self {
            descriptor,
            entity,
            dialect,
        }
    }

    /// Build the row query: joins, filters, order and paging.
    pub fn build(&self) -> QueryResult<String> {
        let root = self.entity.name.as_str();
        let mut query = Query::select();

        query.column((Alias::new(root), Asterisk));
        query.from_as(Alias::new(self.entity.table_name()), Alias::new(root));

        self.add_joins(&mut query, None, &self.descriptor.include);
        self.add_filters(&mut query, root);
        self.add_sorts(&mut query, root)?;

        query.limit(self.descriptor.limit);
        query.offset(self.descriptor.offset);

        self.render(&query)
    }

    /// Build the total-count query over the reduced include tree.
    pub fn build_count(&self) -> QueryResult<String> {
        let root = self.entity.name.as_str();
        let mut query = Query::select();

        query.expr_as(
            Func::count_distinct(column(root, &self.entity.primary_key)),
            Alias::new("count"),
        );
        query.from_as(Alias::new(self.entity.table_name()), Alias::new(root));

        self.add_joins(&mut query, None, &self.descriptor.include_for_count);
        self.add_filters(&mut query, root);

        self.render(&query)
    }

    fn render(&self, query: &SelectStatement) -> QueryResult<String> {
        match self.dialect {
            Dialect::Postgres => Ok(query.to_string(PostgresQueryBuilder)),
            Dialect::Mysql | Dialect::Mariadb => Ok(query.to_string(MysqlQueryBuilder)),
            Dialect::Sqlite => Ok(query.to_string(SqliteQueryBuilder)),
            Dialect::Mssql => Err(QueryError::UnsupportedDialect {
                dialect: self.dialect.to_string(),
            }),
        }
    }

    /// Add one join per include node, depth first.
    ///
    /// `parent` is the joined alias of the enclosing node, `None` at the root.
    fn add_joins(&self, query: &mut SelectStatement, parent: Option<&str>, nodes: &[IncludeNode]) {
        let parent_table = parent.unwrap_or(self.entity.name.as_str());
        for node in nodes {
            let alias = match parent {
                Some(parent) => format!("{parent}{PATH_SEPARATOR}{}", node.alias),
                None => node.alias.clone(),
            };
            let join_on = node.join_on();

            let mut on = Cond::all().add(
                column(parent_table, &join_on.local_key).equals((
                    Alias::new(&alias),
                    Alias::new(&join_on.foreign_key),
                )),
            );
            if let Some(filter) = &node.filter {
                on = on.add(self.where_condition(&alias, filter));
            }
            if node.entity.paranoid && !self.descriptor.include_soft_deleted {
                on = on.add(column(&alias, DELETED_AT).is_null());
            }

            let join_type = if node.is_required() {
                JoinType::InnerJoin
            } else {
                JoinType::LeftJoin
            };
            query.join_as(
                join_type,
                Alias::new(node.entity.table_name()),
                Alias::new(&alias),
                on,
            );

            self.add_joins(query, Some(&alias), &node.children);
        }
    }

    /// Add root comparisons and the soft-delete guard.
    fn add_filters(&self, query: &mut SelectStatement, root: &str) {
        if !self.descriptor.where_clause.is_empty() {
            query.cond_where(self.where_condition(root, &self.descriptor.where_clause));
        }
        if self.entity.paranoid && !self.descriptor.include_soft_deleted {
            query.and_where(column(root, DELETED_AT).is_null());
        }
    }

    /// AND-combine a where clause against one table alias.
    fn where_condition(&self, table: &str, where_clause: &WhereClause) -> Cond {
        where_clause
            .iter()
            .fold(Cond::all(), |cond, (field, comparison)| {
                cond.add(self.comparison_expr(table, field, comparison))
            })
    }

    /// Build a single comparison.
    fn comparison_expr(&self, table: &str, field: &str, comparison: &Comparison) -> SimpleExpr {
        let col = column(table, field);
        if comparison.operator.is_pattern() {
            let pattern = pattern_text(&comparison.value);
            return match comparison.operator {
                Operator::ILike if self.dialect.supports_ilike() => col.ilike(pattern),
                Operator::ILike => Expr::expr(Func::lower(col)).like(pattern.to_lowercase()),
                _ => col.like(pattern),
            };
        }

        let Some(value) = sql_value(&comparison.value) else {
            return col.is_null();
        };
        match comparison.operator {
            Operator::Gt => col.gt(value),
            Operator::Gte => col.gte(value),
            Operator::Lt => col.lt(value),
            Operator::Lte => col.lte(value),
            _ => col.eq(value),
        }
    }

    /// Add ORDER BY clauses, resolving relation paths through the row tree.
    fn add_sorts(&self, query: &mut SelectStatement, root: &str) -> QueryResult<()> {
        for term in &self.descriptor.order {
            let Some(column_name) = term.column() else {
                continue;
            };
            let path = term.relation_path();
            let table = if path.is_empty() {
                root.to_string()
            } else {
                if find_node(&self.descriptor.include, path).is_none() {
                    let alias = unresolved_alias(&self.descriptor.include, path);
                    return Err(QueryError::UnknownRelation { alias });
                }
                path.join(PATH_SEPARATOR)
            };

            let order = match term.direction {
                Direction::Asc => Order::Asc,
                Direction::Desc => Order::Desc,
            };
            query.order_by((Alias::new(table), Alias::new(column_name)), order);
        }
        Ok(())
    }
}

fn column(table: &str, column: &str) -> Expr {
    Expr::col((Alias::new(table), Alias::new(column)))
}

/// First alias in `path` with no matching include node.
fn unresolved_alias(nodes: &[IncludeNode], path: &[String]) -> String {
    let mut level = nodes;
    for alias in path {
        match level.iter().find(|node| &node.alias == alias) {
            Some(node) => level = &node.children,
            None => return alias.clone(),
        }
    }
    path.last().cloned().unwrap_or_default()
}

/// Bind value for a comparison; `None` for JSON null.
fn sql_value(value: &ComparisonValue) -> Option<SqlValue> {
    match value {
        ComparisonValue::Date(date) => Some(SqlValue::from(
            date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )),
        ComparisonValue::Json(json) => match json {
            Value::Null => None,
            Value::Bool(b) => Some(SqlValue::from(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => SqlValue::from(i),
                None => SqlValue::from(n.as_f64().unwrap_or_default()),
            }),
            Value::String(s) => Some(SqlValue::from(s.clone())),
            other => Some(SqlValue::from(other.to_string())),
        },
    }
}

fn pattern_text(value: &ComparisonValue) -> String {
    match value {
        ComparisonValue::Json(Value::String(s)) => s.clone(),
        ComparisonValue::Json(other) => other.to_string(),
        ComparisonValue::Date(date) => date.to_rfc3339(),
    }
}
