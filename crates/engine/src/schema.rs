//! Schema metadata consumed by the query engine.
//!
//! Entities describe a queryable table: its column types (used to pick
//! comparison semantics), enumerated values, and the default singular
//! name used as an include alias.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::query::include::{IncludeOptions, IncludeTemplate, JoinOn};
use crate::query::types::WhereClause;

/// Native column type as declared by the schema.
///
/// Parsed case-insensitively from names like `STRING`, `string(20)` or
/// `DECIMAL(10,2)`; anything unrecognised becomes [`NativeType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NativeType {
    String,
    Char,
    Text,
    Citext,
    Uuid,
    UuidV1,
    UuidV4,
    Json,
    Jsonb,
    Time,
    Date,
    DateOnly,
    Number,
    Integer,
    TinyInt,
    SmallInt,
    MediumInt,
    BigInt,
    Float,
    Real,
    Double,
    Decimal,
    Boolean,
    Enum,
    Blob,
    Other(String),
}

impl From<&str> for NativeType {
    fn from(name: &str) -> Self {
        let base = name.split('(').next().unwrap_or(name).trim();
        match base.to_ascii_uppercase().as_str() {
            "STRING" | "VARCHAR" => NativeType::String,
            "CHAR" => NativeType::Char,
            "TEXT" => NativeType::Text,
            "CITEXT" => NativeType::Citext,
            "UUID" => NativeType::Uuid,
            "UUIDV1" => NativeType::UuidV1,
            "UUIDV4" => NativeType::UuidV4,
            "JSON" => NativeType::Json,
            "JSONB" => NativeType::Jsonb,
            "TIME" => NativeType::Time,
            "DATE" | "TIMESTAMP" | "DATETIME" => NativeType::Date,
            "DATEONLY" => NativeType::DateOnly,
            "NUMBER" => NativeType::Number,
            "INTEGER" | "INT" => NativeType::Integer,
            "TINYINT" => NativeType::TinyInt,
            "SMALLINT" => NativeType::SmallInt,
            "MEDIUMINT" => NativeType::MediumInt,
            "BIGINT" => NativeType::BigInt,
            "FLOAT" => NativeType::Float,
            "REAL" => NativeType::Real,
            "DOUBLE" => NativeType::Double,
            "DECIMAL" | "NUMERIC" => NativeType::Decimal,
            "BOOLEAN" | "BOOL" => NativeType::Boolean,
            "ENUM" => NativeType::Enum,
            "BLOB" => NativeType::Blob,
            _ => NativeType::Other(name.to_string()),
        }
    }
}

impl From<String> for NativeType {
    fn from(name: String) -> Self {
        NativeType::from(name.as_str())
    }
}

impl From<NativeType> for String {
    fn from(data_type: NativeType) -> Self {
        data_type.to_string()
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeType::String => "STRING",
            NativeType::Char => "CHAR",
            NativeType::Text => "TEXT",
            NativeType::Citext => "CITEXT",
            NativeType::Uuid => "UUID",
            NativeType::UuidV1 => "UUIDV1",
            NativeType::UuidV4 => "UUIDV4",
            NativeType::Json => "JSON",
            NativeType::Jsonb => "JSONB",
            NativeType::Time => "TIME",
            NativeType::Date => "DATE",
            NativeType::DateOnly => "DATEONLY",
            NativeType::Number => "NUMBER",
            NativeType::Integer => "INTEGER",
            NativeType::TinyInt => "TINYINT",
            NativeType::SmallInt => "SMALLINT",
            NativeType::MediumInt => "MEDIUMINT",
            NativeType::BigInt => "BIGINT",
            NativeType::Float => "FLOAT",
            NativeType::Real => "REAL",
            NativeType::Double => "DOUBLE",
            NativeType::Decimal => "DECIMAL",
            NativeType::Boolean => "BOOLEAN",
            NativeType::Enum => "ENUM",
            NativeType::Blob => "BLOB",
            NativeType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Declared column type.
    #[serde(rename = "type")]
    pub data_type: NativeType,

    /// Allowed values for enumerated columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl Field {
    pub fn new(data_type: NativeType) -> Self {
        Self {
            data_type,
            values: None,
        }
    }

    pub fn enumerated<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data_type: NativeType::Enum,
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether the column only admits a fixed set of values.
    pub fn is_enumerated(&self) -> bool {
        self.data_type == NativeType::Enum || self.values.as_ref().is_some_and(|v| !v.is_empty())
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// A queryable entity (table) and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name (e.g. "User").
    pub name: String,

    /// Singular name, used as the default include alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singular: Option<String>,

    /// Backing table name. Defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Whether rows are soft-deleted through a `deletedAt` column.
    #[serde(default)]
    pub paranoid: bool,

    /// Columns keyed by field name, in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
}

impl Entity {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            singular: None,
            table: None,
            primary_key: default_primary_key(),
            paranoid: false,
            fields: IndexMap::new(),
        }
    }

    /// Add a column.
    pub fn with_field(mut self, name: &str, field: Field) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    /// Set the backing table name.
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    /// Set the singular alias name.
    pub fn with_singular(mut self, singular: &str) -> Self {
        self.singular = Some(singular.to_string());
        self
    }

    /// Mark the entity as soft-deleting.
    pub fn paranoid(mut self) -> Self {
        self.paranoid = true;
        self
    }

    pub fn singular_name(&self) -> &str {
        self.singular.as_deref().unwrap_or(&self.name)
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }
}

/// Declarative include entry naming its entity, as loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeSpec {
    /// Entity name, resolved through the [`Schema`].
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinOn>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<IncludeSpec>,
}

/// Set of entities shared read-only by every compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    entities: IndexMap<String, Arc<Entity>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under its name.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
        self
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<Arc<Entity>> {
        self.entities.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Resolve JSON include declarations into a relation template.
    pub fn resolve_includes(&self, specs: &[IncludeSpec]) -> QueryResult<Vec<IncludeTemplate>> {
        specs.iter().map(|spec| self.resolve_include(spec)).collect()
    }

    fn resolve_include(&self, spec: &IncludeSpec) -> QueryResult<IncludeTemplate> {
        let entity = self
            .entity(&spec.model)
            .ok_or_else(|| QueryError::UnknownEntity {
                name: spec.model.clone(),
            })?;

        let bare = spec.key.is_none()
            && spec.where_clause.is_none()
            && spec.required.is_none()
            && spec.join.is_none()
            && spec.include.is_empty();
        if bare {
            return Ok(IncludeTemplate::Entity(entity));
        }

        Ok(IncludeTemplate::Options(IncludeOptions {
            entity,
            key: spec.key.clone(),
            where_clause: spec.where_clause.clone(),
            required: spec.required,
            join: spec.join.clone(),
            include: self.resolve_includes(&spec.include)?,
        }))
    }
}
