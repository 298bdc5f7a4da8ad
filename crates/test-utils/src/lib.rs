//! Sieve test utilities.
//!
//! Helpers for integration testing: a small user/role/permission schema,
//! request and include builders, and assertion utilities for descriptors
//! and rendered SQL.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use sieve_engine::config::{Dialect, EngineConfig};
use sieve_engine::query::{IncludeOptions, IncludeTemplate, RequestQuery};
use sieve_engine::schema::{Entity, Field, NativeType, Schema};
use uuid::Uuid;

/// `User`: soft-deleting, stored in `user`, belongs to a `Role`.
pub fn user() -> Entity {
    Entity::new("User")
        .with_table("user")
        .with_field("id", Field::new(NativeType::Uuid))
        .with_field("email", Field::new(NativeType::String))
        .with_field("fullname", Field::new(NativeType::String))
        .with_field("phone", Field::new(NativeType::String))
        .with_field("RoleId", Field::new(NativeType::Uuid))
        .with_field("balance", Field::new(NativeType::Integer))
        .with_field("isActive", Field::new(NativeType::Boolean))
        .with_field("createdAt", Field::new(NativeType::Date))
        .with_field("status", Field::enumerated(["active", "blocked", "pending"]))
        .paranoid()
}

/// `Role`: has many permissions.
pub fn role() -> Entity {
    Entity::new("Role")
        .with_table("role")
        .with_field("id", Field::new(NativeType::Uuid))
        .with_field("name", Field::new(NativeType::String))
        .with_field("PermissionId", Field::new(NativeType::Uuid))
        .with_field("level", Field::new(NativeType::SmallInt))
}

/// `Permission`: leaf of the role tree.
pub fn permission() -> Entity {
    Entity::new("Permission")
        .with_table("permission")
        .with_field("id", Field::new(NativeType::Uuid))
        .with_field("name", Field::new(NativeType::String))
        .with_field("grantedAt", Field::new(NativeType::Date))
}

/// `Sessions`: plural entity with a singular alias.
pub fn session() -> Entity {
    Entity::new("Sessions")
        .with_singular("Session")
        .with_table("session")
        .with_field("id", Field::new(NativeType::Uuid))
        .with_field("ip", Field::new(NativeType::String))
        .with_field("expiresAt", Field::new(NativeType::Date))
}

/// Schema with every fixture entity registered.
pub fn schema() -> Schema {
    Schema::new()
        .with_entity(user())
        .with_entity(role())
        .with_entity(permission())
        .with_entity(session())
}

/// Shared handle to a fixture entity.
pub fn entity(entity: Entity) -> Arc<Entity> {
    Arc::new(entity)
}

/// `Role → Permission` include template.
pub fn role_with_permission() -> IncludeTemplate {
    IncludeOptions::new(entity(role()))
        .with_include(entity(permission()))
        .into()
}

/// `[Role → Permission, Session]` include template for `User`.
pub fn user_includes() -> Vec<IncludeTemplate> {
    vec![role_with_permission(), entity(session()).into()]
}

/// Engine configuration for a dialect, other settings default.
pub fn config(dialect: Dialect) -> EngineConfig {
    EngineConfig {
        dialect,
        ..Default::default()
    }
}

/// Parse request parameters from JSON.
///
/// Panics on malformed fixtures.
#[allow(clippy::expect_used)]
pub fn request(params: JsonValue) -> RequestQuery {
    serde_json::from_value(params).expect("request fixture must deserialize")
}

/// A random hyphenated UUID string.
pub fn uuid_string() -> String {
    Uuid::now_v7().to_string()
}

/// Assertion helpers for descriptors and SQL.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_every_fixture() {
        let schema = schema();
        assert_eq!(schema.len(), 4);
        assert!(schema.entity("User").unwrap().paranoid);
        assert_eq!(schema.entity("Sessions").unwrap().singular_name(), "Session");
    }

    #[test]
    fn user_includes_nest_permission_under_role() {
        let includes = user_includes();
        match &includes[0] {
            IncludeTemplate::Options(options) => {
                assert_eq!(options.entity.name, "Role");
                assert_eq!(options.include[0].entity().name, "Permission");
            }
            other => panic!("unexpected template {other:?}"),
        }
        assert_eq!(includes[1].entity().name, "Sessions");
    }

    #[test]
    fn request_fixture() {
        let request = request(serde_json::json!({"page": 2, "paranoid": false}));
        assert!(request.include_soft_deleted());
        assert!(request.page.is_some());
    }

    #[test]
    fn assertions() {
        let json = serde_json::json!({"name": "test", "value": 42});
        assert::has_key(&json, "name");
        assert::contains("hello world", "world");
        assert::not_contains("hello world", "foo");
        assert_eq!(uuid_string().len(), 36);
    }
}
