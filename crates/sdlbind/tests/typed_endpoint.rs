//! Integration tests for endpoints whose root types are registered in code.

use std::sync::Arc;

use async_graphql::Value;
use futures_util::StreamExt;
use sdlbind::{
    ArgumentConfig, EndpointConfig, FieldConfig, FieldList, Record, RequestContext, Resolved, SchemaError,
    SchemaStore, TypeConfig, TypeState, WireType,
};
use serde_json::json;

fn category(name: &str, parent: Option<Record>) -> Record {
    let record = Record::new("Category").property("name", name);
    match parent {
        Some(parent) => record.property("parent", parent),
        None => record,
    }
}

fn catalog_store() -> SchemaStore {
    let store = SchemaStore::single(
        "catalog",
        EndpointConfig::typed("Query").with_subscription("Subscription"),
    );
    let registry = store.registry();

    registry.register("Category", |_| {
        Ok(TypeConfig::object(
            "Category",
            FieldList::deferred(|registry| {
                let category = registry.get("Category")?;
                Ok(vec![
                    FieldConfig::new("name", WireType::named("String").non_null()),
                    FieldConfig::new("parent", WireType::of(&category)),
                ])
            }),
        ))
    });
    registry.register("Node", |_| {
        Ok(TypeConfig::interface(
            "Node",
            FieldList::eager(vec![FieldConfig::new("id", WireType::named("ID").non_null())]),
        ))
    });
    registry.register("Book", |registry| {
        let node = registry.get("Node")?;
        Ok(TypeConfig::object(
            "Book",
            FieldList::eager(vec![
                FieldConfig::new("id", WireType::named("ID").non_null()),
                FieldConfig::new("title", WireType::named("String")),
            ]),
        )
        .implements(node.name.clone()))
    });
    registry.register("Query", |registry| {
        let category_type = registry.get("Category")?;
        let node = registry.get("Node")?;
        let book = registry.get("Book")?;
        Ok(TypeConfig::object(
            "Query",
            FieldList::eager(vec![
                FieldConfig::new("category", WireType::of(&category_type)).resolve(|_, _, _| {
                    Ok(category("Boots", Some(category("Shoes", None))).into_resolved())
                }),
                FieldConfig::new("node", WireType::of(&node))
                    .argument(ArgumentConfig::new("id", WireType::named("ID").non_null()))
                    .resolve(|_, args, _| {
                        let id = args.string("id").unwrap_or_default().to_string();
                        Ok(Record::new("Book").property("id", id).property("title", "Dune").into())
                    }),
                FieldConfig::new("books", WireType::of(&book).non_null().list()),
                FieldConfig::new("caller", WireType::named("String"))
                    .resolve(|_, _, ctx| Ok(ctx.attribute("user").map_or(Resolved::Null, Resolved::from))),
                FieldConfig::new("greeting", WireType::named("String").non_null())
                    .argument(ArgumentConfig::new("name", WireType::named("String").non_null()))
                    .resolve_async(|_, args, _| async move {
                        tokio::task::yield_now().await;
                        let name = args.string("name").unwrap_or_default();
                        Ok(Resolved::from(format!("hello {name}")))
                    }),
            ]),
        ))
    });
    registry.register("Subscription", |_| {
        Ok(TypeConfig::object(
            "Subscription",
            FieldList::eager(vec![
                FieldConfig::new("ticks", WireType::named("Int").non_null())
                    .resolve(|_, _, _| Ok(Resolved::list([1, 2, 3]))),
            ]),
        ))
    });
    store
}

async fn query(store: &SchemaStore, query: &str) -> serde_json::Value {
    let response = store.execute("catalog", query, RequestContext::new()).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    response.data.into_json().unwrap()
}

#[tokio::test]
async fn test_deferred_self_reference() {
    let store = catalog_store();
    let data = query(&store, "{ category { name parent { name parent { name } } } }").await;
    assert_eq!(
        data,
        json!({"category": {"name": "Boots", "parent": {"name": "Shoes", "parent": null}}})
    );
    assert_eq!(store.registry().state("Category"), TypeState::Ready);
}

#[tokio::test]
async fn test_interface_resolves_from_value_type_name() {
    let store = catalog_store();
    let data = query(&store, r#"{ node(id: "b1") { id ... on Book { title } } }"#).await;
    assert_eq!(data, json!({"node": {"id": "b1", "title": "Dune"}}));
}

#[tokio::test]
async fn test_root_value_serves_unbound_fields() {
    let store = catalog_store();
    store.set_root_value(
        "catalog",
        Record::new("Query").property(
            "books",
            Resolved::list([Record::new("Book").property("id", "b2").property("title", "Emma")]),
        ),
    );
    let data = query(&store, "{ books { id title } }").await;
    assert_eq!(data, json!({"books": [{"id": "b2", "title": "Emma"}]}));
}

#[tokio::test]
async fn test_request_context_reaches_handlers() {
    let store = catalog_store();
    let response = store
        .execute(
            "catalog",
            "{ caller }",
            RequestContext::new().with_attribute("user", "ada"),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap(), json!({"caller": "ada"}));
}

#[tokio::test]
async fn test_async_handler_is_awaited() {
    let store = catalog_store();
    let data = query(&store, r#"{ a: greeting(name: "ada") b: greeting(name: "bo") }"#).await;
    assert_eq!(data, json!({"a": "hello ada", "b": "hello bo"}));
}

#[tokio::test]
async fn test_subscription_streams_each_item() {
    let store = catalog_store();
    let schema = store.get_schema("catalog").unwrap();
    let responses: Vec<_> = schema
        .execute_stream(async_graphql::Request::new("subscription { ticks }").data(RequestContext::new()))
        .collect()
        .await;

    let ticks: Vec<_> = responses
        .into_iter()
        .map(|response| {
            assert!(response.errors.is_empty(), "{:?}", response.errors);
            response.data.into_json().unwrap()["ticks"].clone()
        })
        .collect();
    assert_eq!(ticks, vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn test_shared_registry_serves_every_schema() {
    let store = catalog_store();
    let first = store.get_schema("catalog").unwrap();
    let second = store.get_schema("catalog").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(store.cached_endpoints().is_empty());

    store.registry().register("Extra", |_| Ok(TypeConfig::scalar("Extra")));
    assert!(!Arc::ptr_eq(&first, &store.get_schema("catalog").unwrap()));

    let category = store.registry().get("Category").unwrap();
    assert!(Arc::ptr_eq(&category, &store.registry().get("Category").unwrap()));
}

#[test]
fn test_eager_cycle_fails_schema_build() {
    let store = SchemaStore::single("cyclic", EndpointConfig::typed("Query"));
    store.registry().register("Query", |registry| {
        let author = registry.get("Author")?;
        Ok(TypeConfig::object(
            "Query",
            FieldList::eager(vec![FieldConfig::new("author", WireType::of(&author))]),
        ))
    });
    store.registry().register("Author", |registry| {
        let author = registry.get("Author")?;
        Ok(TypeConfig::object(
            "Author",
            FieldList::eager(vec![FieldConfig::new("mentor", WireType::of(&author))]),
        ))
    });

    match store.get_schema("cyclic").err().unwrap() {
        SchemaError::CircularType { name } => assert_eq!(name, "Author"),
        other => panic!("expected circular type error, got {other:?}"),
    }
}

#[test]
fn test_missing_root_type_is_reported() {
    let store = SchemaStore::single("empty", EndpointConfig::typed("Query"));
    let response = tokio_test::block_on(store.execute("empty", "{ a }", RequestContext::new()));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.data, Value::Null);
}
