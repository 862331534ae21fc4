//! Join planning and select-list tests against a fixed association graph.
//!
//! foo belongs to client; client has one order and belongs to company; order
//! belongs to orderType and has one stuff; stuff belongs to stuffType; company
//! belongs to category.

use pretty_assertions::assert_eq;
use serde_json::json;
use tether::query::{resolve_first_level, JoinClause};
use tether::{
    AssociationOptions, Backend, CollectionOptions, ColumnType, Contain, ContainOptions, JoinKind,
    LifeError, Predicate, Query, Registry, Strategy,
};

fn registry() -> Registry {
    let registry = Registry::new();
    let id_only = || CollectionOptions::new().column("id", ColumnType::Integer);

    registry.build("foo", id_only());
    registry.build(
        "client",
        CollectionOptions::new()
            .column("id", ColumnType::Integer)
            .column("name", ColumnType::String)
            .column("phone", ColumnType::String),
    );
    registry.build(
        "order",
        CollectionOptions::new()
            .column("id", ColumnType::Integer)
            .column("total", ColumnType::String)
            .column("placed", ColumnType::DateTime),
    );
    registry.build("company", id_only().table("organizations"));
    registry.build("orderType", id_only());
    registry.build("stuff", id_only().table("things"));
    registry.build("stuffType", id_only());
    registry.build("category", id_only());

    let none = AssociationOptions::new;
    registry.belongs_to("foo", "client", none()).unwrap();
    registry.has_one("client", "order", none()).unwrap();
    registry.belongs_to("client", "company", none()).unwrap();
    registry.belongs_to("order", "orderType", none()).unwrap();
    registry.has_one("order", "stuff", none()).unwrap();
    registry.belongs_to("stuff", "stuffType", none()).unwrap();
    registry.belongs_to("company", "category", none()).unwrap();
    registry
}

fn join(alias: &str, table: &str, kind: JoinKind, on: &str) -> JoinClause {
    let (left, right) = on.split_once(" = ").unwrap();
    JoinClause {
        alias: alias.to_string(),
        table: table.to_string(),
        kind,
        on: vec![Predicate::columns(left, right)],
    }
}

fn select_keys(query: &Query, registry: &Registry) -> Vec<(String, String)> {
    query
        .compile(registry)
        .unwrap()
        .select_clause()
        .iter()
        .map(|f| (f.alias.clone().unwrap_or_default(), f.expr.clone()))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_contain_to_joins_one_level() {
    let registry = registry();
    let query = Query::new()
        .select(["foo.id"])
        .repository("foo")
        .contain_json(&json!({
            "client": {
                "order": {"orderType": [], "stuff": ["stuffType"]},
                "company": {"foreignKey": "organization_id", "category": []}
            }
        }))
        .unwrap();

    let compiled = query.compile(&registry).unwrap();
    assert_eq!(
        compiled.join_clause(),
        &[
            join("client", "clients", JoinKind::Left, "client.id = foo.client_id"),
            join("order", "orders", JoinKind::Inner, "client.id = order.client_id"),
            join("orderType", "order_types", JoinKind::Left, "orderType.id = order.order_type_id"),
            join("stuff", "things", JoinKind::Inner, "order.id = stuff.order_id"),
            join("stuffType", "stuff_types", JoinKind::Left, "stuffType.id = stuff.stuff_type_id"),
            join("company", "organizations", JoinKind::Left, "company.id = client.organization_id"),
            join("category", "categories", JoinKind::Left, "category.id = company.category_id"),
        ]
    );
    assert!(compiled.deferred().is_empty());

    let nodes = query.normalized_containments(&registry).unwrap();
    let order: Vec<&str> = resolve_first_level(&nodes).iter().map(|n| n.alias.as_str()).collect();
    assert_eq!(
        order,
        vec!["client", "order", "orderType", "stuff", "stuffType", "company", "category"]
    );
}

#[test]
fn test_contain_to_fields_predefined() {
    let registry = registry();
    let query = Query::new().select(["foo.id"]).repository("foo").contain(Contain::with(
        "client",
        ContainOptions::new()
            .fields(["name", "company_id", "client.telephone"])
            .contain(Contain::with("order", ContainOptions::new().fields(["total", "placed"]))),
    ));

    assert_eq!(
        select_keys(&query, &registry),
        pairs(&[
            ("foo__id", "foo.id"),
            ("client__name", "client.name"),
            ("client__company_id", "client.company_id"),
            ("client__telephone", "client.telephone"),
            ("order__total", "order.total"),
            ("order__placed", "order.placed"),
        ])
    );
}

#[test]
fn test_contain_to_fields_default() {
    let registry = registry();

    let query = Query::new()
        .repository("foo")
        .contain_json(&json!({"client": ["order"]}))
        .unwrap();
    assert_eq!(
        select_keys(&query, &registry),
        pairs(&[
            ("foo__id", "foo.id"),
            ("client__id", "client.id"),
            ("client__name", "client.name"),
            ("client__phone", "client.phone"),
            ("order__id", "order.id"),
            ("order__total", "order.total"),
            ("order__placed", "order.placed"),
        ])
    );

    let query = Query::new()
        .select(["foo.id"])
        .repository("foo")
        .contain_json(&json!({"client": {"fields": ["name"], "order": []}}))
        .unwrap();
    assert_eq!(
        select_keys(&query, &registry),
        pairs(&[("foo__id", "foo.id"), ("client__name", "client.name")])
    );

    let query = Query::new()
        .repository("foo")
        .contain_json(&json!({"client": {"fields": [], "order": {"fields": false}}}))
        .unwrap();
    assert_eq!(
        select_keys(&query, &registry),
        pairs(&[
            ("foo__id", "foo.id"),
            ("client__id", "client.id"),
            ("client__name", "client.name"),
            ("client__phone", "client.phone"),
        ])
    );
}

#[test]
fn test_join_conditions_follow_key_equality() {
    let registry = registry();
    registry
        .belongs_to(
            "foo",
            "client",
            AssociationOptions::new().condition(Predicate::eq("active", true)),
        )
        .unwrap();

    let compiled = Query::new()
        .repository("foo")
        .contain(Contain::with(
            "client",
            ContainOptions::new().condition(Predicate::eq("name", "acme")),
        ))
        .compile(&registry)
        .unwrap();

    assert_eq!(
        compiled.join_clause()[0].on,
        vec![
            Predicate::columns("client.id", "foo.client_id"),
            Predicate::eq("client.active", true),
            Predicate::eq("client.name", "acme"),
        ]
    );

    let sql = compiled.to_sql(Backend::Postgres);
    assert!(
        sql.contains(
            r#"LEFT JOIN "clients" AS "client" ON "client"."id" = "foo"."client_id" AND "client"."active" = TRUE AND "client"."name" = 'acme'"#
        ),
        "{sql}"
    );
}

#[test]
fn test_select_strategy_stops_joining() {
    let registry = registry();
    let compiled = Query::new()
        .repository("foo")
        .select(["id", "client_id"])
        .contain(Contain::with(
            "client",
            ContainOptions::new()
                .strategy(Strategy::Select)
                .contain("order"),
        ))
        .compile(&registry)
        .unwrap();

    assert!(compiled.join_clause().is_empty());
    assert_eq!(compiled.deferred().len(), 1);
    let deferred = &compiled.deferred()[0];
    assert_eq!(deferred.parent_key, "client_id");
    assert_eq!(deferred.child_key, "id");
}

#[test]
fn test_unknown_association_is_rejected() {
    let registry = registry();
    let err = Query::new()
        .repository("foo")
        .contain_json(&json!({"client": ["invoice"]}))
        .unwrap()
        .compile(&registry)
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "client is not associated with invoice");
}

#[test]
fn test_contain_json_rejects_bad_shape() {
    assert!(matches!(
        Query::new().contain_json(&json!(42)),
        Err(LifeError::InvalidContain(_))
    ));
}

#[test]
fn test_same_association_joined_on_two_branches_is_rejected() {
    let registry = registry();
    registry.belongs_to("order", "category", AssociationOptions::new()).unwrap();

    let err = Query::new()
        .repository("foo")
        .select(["foo.id"])
        .contain_json(&json!({
            "client": {"order": {"category": []}, "company": {"category": []}}
        }))
        .unwrap()
        .compile(&registry)
        .unwrap_err();
    assert!(matches!(err, LifeError::InvalidContain(_)));
    assert!(err.to_string().contains("\"category\""), "{err}");
}

#[test]
fn test_first_level_matches_planned_joins() {
    let registry = registry();
    let query = Query::new()
        .repository("foo")
        .contain_json(&json!({
            "client": {
                "order": {"stuff": {"strategy": "select", "stuffType": []}},
                "company": []
            }
        }))
        .unwrap();

    let compiled = query.compile(&registry).unwrap();
    let joined: Vec<&str> = compiled.join_clause().iter().map(|j| j.alias.as_str()).collect();
    let nodes = query.normalized_containments(&registry).unwrap();
    let first: Vec<&str> = resolve_first_level(&nodes).iter().map(|n| n.alias.as_str()).collect();
    assert_eq!(first, joined);
    assert_eq!(first, vec!["client", "order", "company"]);
    assert_eq!(compiled.deferred().len(), 1);
}
