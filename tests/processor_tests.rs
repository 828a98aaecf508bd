mod common;

use autoroute::errors::{ErrorKind, Outcome};
use autoroute::implementation::{HandlerSet, Reply};
use autoroute::request::RawRequest;
use autoroute::routes::{generate, RouteTable};
use autoroute::spec::load;
use common::{items_document, CountingImpl};
use http::Method;
use serde_json::json;
use std::sync::Arc;

fn table(implementation: Arc<CountingImpl>) -> RouteTable {
    let model = load(&items_document()).unwrap();
    generate(&model, implementation, "", None).unwrap()
}

#[test]
fn test_non_integer_path_id_is_rejected_before_invocation() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::GET, "/items/{id}").unwrap();

    let outcome = route.invoke(&RawRequest::new(Method::GET, "/items/abc").with_path_param("id", "abc"));
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(failure.status(), 422);
    assert_eq!(failure.issues.len(), 1);
    assert_eq!(failure.issues[0].path, "path.id");
    assert_eq!(implementation.calls(), 0);

    let problem = failure.to_problem();
    assert_eq!(problem["type"], "/errors/validation_error");
    assert_eq!(problem["errors"][0]["path"], "path.id");
}

#[test]
fn test_path_id_is_coerced_and_response_reshaped() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::GET, "/items/{id}").unwrap();

    let outcome = route.invoke(&RawRequest::new(Method::GET, "/items/7").with_path_param("id", "7"));
    assert_eq!(implementation.last_arg("id"), Some(json!(7)));
    match outcome {
        Outcome::Success(response) => {
            assert_eq!(response.status, 200);
            assert_eq!(response.content_type.as_deref(), Some("application/json"));
            // `internal` is undeclared; `status` comes from its default.
            assert_eq!(
                response.body,
                Some(json!({ "id": 7, "name": "widget", "status": "active" }))
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_successful_create_strips_undeclared_price() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::POST, "/items").unwrap();

    let raw = RawRequest::new(Method::POST, "/items").with_body(json!({ "name": "widget" }));
    let outcome = route.invoke(&raw);

    assert_eq!(implementation.calls(), 1);
    assert_eq!(implementation.last_body(), Some(json!({ "name": "widget" })));
    assert_eq!(outcome.status(), 201);
    let body = outcome.body().unwrap();
    assert!(body.get("price").is_none());
    assert_eq!(body["id"], 1);
    assert_eq!(body["name"], "widget");
}

#[test]
fn test_domain_conflict_maps_to_409() {
    let implementation = Arc::new(CountingImpl::new().conflicting("duplicate name"));
    let routes = table(implementation.clone());
    let route = routes.find(&Method::POST, "/items").unwrap();

    let raw = RawRequest::new(Method::POST, "/items").with_body(json!({ "name": "widget" }));
    let outcome = route.invoke(&raw);
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Conflict);
    assert_eq!(failure.status(), 409);
    assert_eq!(failure.detail, "duplicate name");
    assert_eq!(failure.to_problem()["detail"], "duplicate name");
}

#[test]
fn test_body_problems_are_reported_together() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::POST, "/items").unwrap();

    let raw = RawRequest::new(Method::POST, "/items").with_body(json!({ "name": "", "price": -1, "extra": 1 }));
    let failure = route.invoke(&raw).failure().cloned().unwrap();
    let paths: Vec<&str> = failure.issues.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths.len(), 3, "{paths:?}");
    assert!(paths.contains(&"body.name"));
    assert!(paths.contains(&"body.price"));
    assert!(paths.contains(&"body.extra"));

    let missing = route.invoke(&RawRequest::new(Method::POST, "/items"));
    assert_eq!(missing.failure().unwrap().issues[0].message, "request body is required");

    let garbled = route.invoke(&RawRequest::new(Method::POST, "/items").with_raw_body("{not json"));
    assert_eq!(garbled.failure().unwrap().issues[0].path, "body");
    assert_eq!(implementation.calls(), 0);
}

#[test]
fn test_query_defaults_and_arrays() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::GET, "/items").unwrap();

    let outcome = route.invoke(&RawRequest::new(Method::GET, "/items"));
    assert_eq!(outcome.status(), 200);
    assert_eq!(implementation.last_arg("limit"), Some(json!(20)));
    assert_eq!(implementation.last_arg("tags"), None);

    route.invoke(&RawRequest::new(Method::GET, "/items?limit=5&tags=a&tags=b"));
    assert_eq!(implementation.last_arg("limit"), Some(json!(5)));
    assert_eq!(implementation.last_arg("tags"), Some(json!(["a", "b"])));

    let rejected = route.invoke(&RawRequest::new(Method::GET, "/items?limit=0"));
    assert_eq!(rejected.failure().unwrap().issues[0].path, "query.limit");
}

#[test]
fn test_delete_infers_204_without_body() {
    let implementation = Arc::new(CountingImpl::new());
    let routes = table(implementation.clone());
    let route = routes.find(&Method::DELETE, "/items/{id}").unwrap();
    let outcome = route.invoke(&RawRequest::new(Method::DELETE, "/items/3").with_path_param("id", "3"));
    assert_eq!(outcome.status(), 204);
    assert_eq!(outcome.body(), None);
}

#[test]
fn test_explicit_error_status_becomes_problem_details() {
    let handlers = HandlerSet::new()
        .get(|_| Ok(Reply::status(404, json!("Item not found"))))
        .create(|_| Ok(Reply::status(400, json!({ "error": "bad batch", "batch": 3 }))));
    let model = load(&items_document()).unwrap();
    let routes = generate(&model, Arc::new(handlers), "", None).unwrap();

    let get = routes.find(&Method::GET, "/items/{id}").unwrap();
    let outcome = get.invoke(&RawRequest::new(Method::GET, "/items/9").with_path_param("id", "9"));
    assert_eq!(outcome.status(), 404);
    assert_eq!(
        outcome.body(),
        Some(&json!({ "type": "about:blank", "title": "Item not found", "status": 404 }))
    );

    let create = routes.find(&Method::POST, "/items").unwrap();
    let raw = RawRequest::new(Method::POST, "/items").with_body(json!({ "name": "widget" }));
    let body = create.invoke(&raw).body().cloned().unwrap();
    assert_eq!(body["title"], "bad batch");
    assert_eq!(body["status"], 400);
    assert_eq!(body["batch"], 3);
}
