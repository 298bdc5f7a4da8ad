#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Query compiler integration tests.
//!
//! Tests for pagination, filter and sort compilation and the full
//! request → descriptor path.

use std::thread;

use serde_json::json;
use sieve_engine::config::Dialect;
use sieve_engine::query::{
    Comparison, CompileOptions, Direction, FilterPipeline, IncludeNode, IncludeTemplate, Operator,
    OrderTerm, PaginationPipeline, QueryCompiler, QueryDescriptor, SortPipeline, build_filter,
    build_pagination, build_sort,
};
use sieve_engine::QueryError;
use sieve_test_utils::{config, entity, request, user, user_includes, uuid_string};

fn compiler(dialect: Dialect) -> QueryCompiler {
    QueryCompiler::new(config(dialect))
}

// -------------------------------------------------------------------------
// Pagination
// -------------------------------------------------------------------------

#[test]
fn first_pages_start_at_zero() {
    for page in [json!(-3), json!(0), json!(1), json!("1"), json!("abc")] {
        for size in [json!(5), json!(0), json!("20")] {
            let pagination =
                build_pagination(&request(json!({"page": page, "pageSize": size})), 10).unwrap();
            assert_eq!(pagination.offset, 0, "page {page} size {size}");
        }
    }
}

#[test]
fn later_pages_skip_previous_rows() {
    for (page, size) in [(2, 5), (3, 10), (7, 25), (2, 1)] {
        let pagination =
            build_pagination(&request(json!({"page": page, "pageSize": size})), 10).unwrap();
        assert_eq!(pagination.offset, size * (page - 1));
        assert_eq!(pagination.limit, size);
    }
}

#[test]
fn missing_or_zero_page_size_uses_default() {
    let absent = build_pagination(&request(json!({"page": 3})), 10).unwrap();
    assert_eq!(absent.limit, 10);
    assert_eq!(absent.offset, 20);

    let zero = build_pagination(&request(json!({"pageSize": 0})), 10).unwrap();
    assert_eq!(zero.limit, 10);

    let blank = build_pagination(&request(json!({"pageSize": ""})), 10).unwrap();
    assert_eq!(blank.limit, 10);
}

#[test]
fn configured_default_page_size() {
    let mut config = config(Dialect::Postgres);
    config.default_page_size = 50;
    let descriptor = QueryCompiler::new(config)
        .compile(&request(json!({"page": 2})), &entity(user()), &[])
        .unwrap();
    assert_eq!(descriptor.limit, 50);
    assert_eq!(descriptor.offset, 50);
}

// -------------------------------------------------------------------------
// Filters
// -------------------------------------------------------------------------

#[test]
fn unresolved_ids_produce_no_entry() {
    let payload = json!([
        {"id": "Role.name", "value": "admin"},
        {"id": "Team.Role.name", "value": "admin"},
        {"id": "email.", "value": "x"}
    ]);
    let filter = build_filter(&entity(user()), None, &payload, Dialect::Mysql).unwrap();
    assert!(filter.is_empty());
}

#[test]
fn date_fields_are_coerced() {
    let payload = json!([{"id": "createdAt", "value": "2024-01-02", "operator": "lt"}]);
    let filter = build_filter(&entity(user()), None, &payload, Dialect::Postgres).unwrap();
    let comparison = filter.get("createdAt").unwrap();

    assert_eq!(comparison.operator, Operator::Lt);
    assert!(comparison.value.as_date().is_some());
    assert_eq!(
        serde_json::to_value(comparison).unwrap(),
        json!({"LT": "2024-01-02T00:00:00.000Z"})
    );
}

#[test]
fn uuid_values_on_string_fields_use_equality() {
    let id = uuid_string();
    let payload = json!([{"id": "fullname", "value": id}]);
    let filter = build_filter(&entity(user()), None, &payload, Dialect::Postgres).unwrap();
    assert_eq!(filter.get("fullname"), Some(&Comparison::new(Operator::Eq, json!(id))));
}

#[test]
fn unparseable_dates_fail_the_request() {
    let params = request(json!({
        "filtered": [{"id": "createdAt", "value": "not-a-date", "operator": "gte"}]
    }));
    let err = compiler(Dialect::Postgres)
        .compile(&params, &entity(user()), &[])
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidValue { ref field, .. } if field == "createdAt"));

    // Relation date columns are validated by their own branch.
    let params = request(json!({
        "filtered": [{"id": "Permission.grantedAt", "value": "soon"}]
    }));
    let err = compiler(Dialect::Postgres)
        .compile(&params, &entity(user()), &user_includes())
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidValue { ref field, .. } if field == "Permission.grantedAt"));
}

#[test]
fn blank_filter_text_is_malformed() {
    let err = compiler(Dialect::Mysql)
        .compile(&request(json!({"filtered": "  "})), &entity(user()), &[])
        .unwrap_err();
    assert!(matches!(err, QueryError::MalformedPayload { param: "filtered", .. }));
}

#[test]
fn malformed_entries_are_skipped() {
    let payload = json!([
        {"value": "no id"},
        {"id": "email"},
        "loose",
        {"id": "phone", "value": "555"}
    ]);
    let filter = build_filter(&entity(user()), None, &payload, Dialect::Mysql).unwrap();
    assert_eq!(filter.keys().collect::<Vec<_>>(), vec!["phone"]);
}

// -------------------------------------------------------------------------
// Sorts
// -------------------------------------------------------------------------

#[test]
fn relation_sort_produces_path_tuple() {
    let order = build_sort(&json!([{"id": "Role.name", "desc": true}])).unwrap();
    assert_eq!(serde_json::to_value(&order).unwrap(), json!([["Role", "name", "DESC"]]));
}

#[test]
fn sort_preserves_request_order() {
    let order = build_sort(&json!(
        r#"[{"id": "fullname"}, {"id": "createdAt", "desc": true}, {"id": "fullname", "desc": true}]"#
    ))
    .unwrap();
    assert_eq!(
        order,
        vec![
            OrderTerm::new(["fullname"], Direction::Desc),
            OrderTerm::new(["createdAt"], Direction::Desc),
        ]
    );
}

#[test]
fn malformed_sort_text_is_an_error() {
    let err = build_sort(&json!("{not json")).unwrap_err();
    assert!(matches!(err, QueryError::MalformedPayload { param: "sorted", .. }));
}

// -------------------------------------------------------------------------
// End to end
// -------------------------------------------------------------------------

#[test]
fn end_to_end_descriptor() {
    let params = request(json!({
        "page": "2",
        "pageSize": "5",
        "filtered": {"id": "email", "value": "bob"},
        "sorted": [{"id": "createdAt", "desc": true}]
    }));
    let descriptor = compiler(Dialect::Mysql)
        .compile(&params, &entity(user()), &[])
        .unwrap();

    assert_eq!(descriptor.offset, 5);
    assert_eq!(descriptor.limit, 5);
    sieve_test_utils::assert::json_eq(
        &serde_json::to_value(&descriptor).unwrap(),
        &json!({
            "include": [],
            "includeCount": [],
            "where": {"email": {"LIKE": "%bob%"}},
            "order": [["createdAt", "DESC"]],
            "offset": 5,
            "limit": 5,
            "includeSoftDeleted": false
        }),
    );
}

#[test]
fn end_to_end_with_relations() {
    let params = request(json!({
        "filtered": [
            {"id": "Role.name", "value": "admin"},
            {"id": "balance", "value": 100, "operator": "gte"}
        ],
        "sorted": [{"id": "Role.name"}]
    }));
    let descriptor = compiler(Dialect::Postgres)
        .compile(&params, &entity(user()), &user_includes())
        .unwrap();

    assert_eq!(
        descriptor.where_clause.get("balance"),
        Some(&Comparison::new(Operator::Gte, json!(100)))
    );
    assert!(descriptor.where_clause.get("name").is_none());

    let role = &descriptor.include[0];
    assert_eq!(role.alias, "Role");
    assert_eq!(role.required, Some(true));
    assert_eq!(
        role.filter.as_ref().unwrap().get("name"),
        Some(&Comparison::new(Operator::ILike, json!("%admin%")))
    );
    assert_eq!(descriptor.include[1].alias, "Session");
    assert_eq!(descriptor.include[1].required, None);

    assert_eq!(descriptor.include_for_count.len(), 1);
    assert_eq!(descriptor.include_for_count[0].alias, "Role");
    assert!(descriptor.include_for_count[0].children.is_empty());
}

#[test]
fn default_order_is_overridden_by_request() {
    let compiler = compiler(Dialect::Postgres).with_options(CompileOptions::newest_first());
    let descriptor = compiler
        .compile(&request(json!({"sorted": [{"id": "email"}]})), &entity(user()), &[])
        .unwrap();
    assert_eq!(descriptor.order, vec![OrderTerm::new(["email"], Direction::Asc)]);
}

#[test]
fn compiler_is_reusable_across_requests() {
    let compiler = compiler(Dialect::Mysql);
    let user = entity(user());
    let includes = user_includes();

    let filtered = compiler
        .compile(
            &request(json!({"filtered": [{"id": "Session.ip", "value": "10.0"}]})),
            &user,
            &includes,
        )
        .unwrap();
    let plain = compiler.compile(&request(json!({})), &user, &includes).unwrap();

    assert_eq!(filtered.include[1].required, Some(true));
    assert_eq!(plain.include[1].required, None);
    assert!(plain.include_for_count.is_empty());
}

// -------------------------------------------------------------------------
// Concurrency
// -------------------------------------------------------------------------

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn shared_types_are_send_and_sync() {
    assert_send_sync::<QueryCompiler>();
    assert_send_sync::<CompileOptions>();
    assert_send_sync::<FilterPipeline>();
    assert_send_sync::<SortPipeline>();
    assert_send_sync::<PaginationPipeline>();
    assert_send_sync::<IncludeTemplate>();
    assert_send_sync::<IncludeNode>();
    assert_send_sync::<QueryDescriptor>();
}

#[test]
fn concurrent_compilations_are_independent() {
    let options = CompileOptions::newest_first().on_before_build(|mut set| {
        set.filter = set.filter.with_query_builder(|_, helper| {
            helper.set_query("status", Comparison::new(Operator::Eq, json!("active")));
        });
        set
    });
    let compiler = compiler(Dialect::Postgres).with_options(options);
    let user = entity(user());
    let includes = user_includes();

    let requests: Vec<(String, u64)> = (1..=8u64)
        .map(|page| {
            let alias = if page % 2 == 0 { "Role" } else { "Session" };
            (alias.to_string(), page)
        })
        .collect();

    let descriptors: Vec<QueryDescriptor> = thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|(alias, page)| {
                let (compiler, user, includes) = (&compiler, &user, &includes);
                scope.spawn(move || {
                    let field = if alias == "Role" { "name" } else { "ip" };
                    let params = request(json!({
                        "page": page,
                        "pageSize": 3,
                        "filtered": [{"id": format!("{alias}.{field}"), "value": format!("v{page}")}]
                    }));
                    compiler.compile(&params, user, includes).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for ((alias, page), descriptor) in requests.iter().zip(&descriptors) {
        assert_eq!(descriptor.offset, 3 * (page - 1));
        assert_eq!(descriptor.limit, 3);
        assert_eq!(
            descriptor.where_clause.get("status"),
            Some(&Comparison::new(Operator::Eq, json!("active")))
        );
        assert_eq!(descriptor.order, vec![OrderTerm::new(["createdAt"], Direction::Desc)]);

        let (filtered, other) = if alias == "Role" { (0, 1) } else { (1, 0) };
        let node = &descriptor.include[filtered];
        assert_eq!(node.alias, *alias);
        assert_eq!(node.required, Some(true));
        let field = if alias == "Role" { "name" } else { "ip" };
        assert_eq!(
            node.filter.as_ref().unwrap().get(field),
            Some(&Comparison::new(Operator::ILike, json!(format!("%v{page}%"))))
        );
        assert_eq!(descriptor.include[other].required, None);
        assert!(descriptor.include[other].filter.is_none());
        assert_eq!(descriptor.include_for_count.len(), 1);
        assert_eq!(descriptor.include_for_count[0].alias, *alias);
    }

    // The shared template is never mutated by the compilations.
    let plain = compiler.compile(&request(json!({})), &user, &includes).unwrap();
    assert!(plain.include.iter().all(|node| node.required.is_none()));
    assert!(plain.include_for_count.is_empty());
}
