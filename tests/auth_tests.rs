mod common;

use autoroute::errors::{ErrorKind, GenerationError};
use autoroute::request::RawRequest;
use autoroute::routes::{generate, RouteGenerator};
use autoroute::security::{ApiKeyAuth, AuthFailure, AuthGate, AuthStrategy, BearerAuth, Principal};
use autoroute::spec::{load, load_str};
use common::{items_document, CountingImpl};
use http::Method;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const SECURED: &str = r#"
openapi: 3.0.3
info: { title: secured, version: "1" }
security:
  - key: []
components:
  securitySchemes:
    key: { type: apiKey, in: header, name: X-API-Key }
    token:
      type: oauth2
      flows:
        clientCredentials:
          tokenUrl: https://auth.example.com/token
          scopes: { "items:write": write items }
paths:
  /items:
    get:
      responses: { "200": { description: ok } }
    post:
      security:
        - token: ["items:write"]
      responses: { "201": { description: created } }
  /status:
    get:
      operationId: status
      security: []
      responses: { "200": { description: ok } }
"#;

fn bearer() -> AuthGate {
    let mut tokens = HashMap::new();
    tokens.insert("writer".to_string(), json!({ "scope": "items:read items:write" }));
    tokens.insert("reader".to_string(), json!({ "scope": "items:read" }));
    Arc::new(BearerAuth::with_tokens(tokens))
}

#[test]
fn test_rejected_request_never_reaches_implementation() {
    let implementation = Arc::new(CountingImpl::new());
    let model = load(&items_document()).unwrap();
    let gate: AuthGate = Arc::new(ApiKeyAuth::new(["secret"]));
    let table = generate(&model, implementation.clone(), "", Some(gate)).unwrap();

    for route in &table {
        let outcome = route.invoke(
            &RawRequest::new(route.method.clone(), "/items/1")
                .with_path_param("id", "not-even-an-integer")
                .with_body(json!({})),
        );
        assert_eq!(outcome.failure().unwrap().kind, ErrorKind::Unauthorized, "{}", route.label());
    }
    assert_eq!(implementation.calls(), 0);

    let list = table.find(&Method::GET, "/items").unwrap();
    let ok = list.invoke(&RawRequest::new(Method::GET, "/items").with_header("x-api-key", "secret"));
    assert_eq!(ok.status(), 200);
    assert_eq!(implementation.calls(), 1);
}

#[test]
fn test_closure_gate_receives_the_raw_request() {
    let implementation = Arc::new(CountingImpl::new());
    let model = load(&items_document()).unwrap();
    let gate: AuthGate = Arc::new(|req: &RawRequest| match req.header("x-tenant") {
        Some(tenant) => Ok(Principal::new("tenant", tenant, json!({}))),
        None => Err(AuthFailure::Unauthorized("tenant required".to_string())),
    });
    let table = generate(&model, implementation.clone(), "", Some(gate)).unwrap();
    let list = table.find(&Method::GET, "/items").unwrap();

    let denied = list.invoke(&RawRequest::new(Method::GET, "/items"));
    assert_eq!(denied.failure().unwrap().to_problem()["detail"], "tenant required");
    list.invoke(&RawRequest::new(Method::GET, "/items").with_header("X-Tenant", "acme"));
    let principal = implementation
        .last
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|c| c.principal.clone())
        .unwrap();
    assert_eq!(principal.subject, "acme");
}

#[test]
fn test_per_scheme_gates_and_scopes() {
    let implementation = Arc::new(CountingImpl::new());
    let model = load_str(SECURED).unwrap();
    let mut keys = HashMap::new();
    keys.insert("k1".to_string(), json!({ "owner": "ops" }));
    let table = RouteGenerator::new(implementation.clone())
        .scheme_gate("key", Arc::new(ApiKeyAuth::with_metadata(keys)))
        .scheme_gate("token", bearer())
        .generate(&model)
        .unwrap();

    let list = table.find(&Method::GET, "/items").unwrap();
    assert_eq!(list.guard.schemes(), vec!["key"]);
    let missing = list.invoke(&RawRequest::new(Method::GET, "/items"));
    assert_eq!(missing.status(), 401);
    let wrong = list.invoke(&RawRequest::new(Method::GET, "/items").with_header("X-API-Key", "nope"));
    assert_eq!(wrong.failure().unwrap().detail, "Invalid API key");

    let create = table.find(&Method::POST, "/items").unwrap();
    let forbidden = create.invoke(
        &RawRequest::new(Method::POST, "/items").with_header("Authorization", "Bearer reader"),
    );
    assert_eq!(forbidden.failure().unwrap().kind, ErrorKind::Forbidden);
    let created = create.invoke(
        &RawRequest::new(Method::POST, "/items").with_header("Authorization", "bearer writer"),
    );
    assert_eq!(created.status(), 201);

    let status = table.find(&Method::GET, "/status").unwrap();
    assert!(status.guard.is_open());
    assert!(status.invoke(&RawRequest::new(Method::GET, "/status")).is_success());
}

#[test]
fn test_unknown_scheme_without_fallback_fails_generation() {
    let model = load_str(SECURED).unwrap();
    let err = RouteGenerator::new(Arc::new(CountingImpl::new()))
        .scheme_gate("key", Arc::new(ApiKeyAuth::new(["k1"])))
        .generate(&model)
        .unwrap_err();
    assert_eq!(
        err,
        GenerationError::UnknownSecurityScheme {
            operation: "POST /items".to_string(),
            scheme: "token".to_string(),
        }
    );
}

#[test]
fn test_default_gate_backs_unregistered_schemes() {
    let model = load_str(SECURED).unwrap();
    let implementation = Arc::new(CountingImpl::new());
    let table = generate(&model, implementation, "", Some(bearer())).unwrap();
    let create = table.find(&Method::POST, "/items").unwrap();
    // Scopes declared for the scheme still apply to the fallback gate.
    let reader = create.invoke(
        &RawRequest::new(Method::POST, "/items").with_header("Authorization", "Bearer reader"),
    );
    assert_eq!(reader.status(), 403);
    let writer = create.invoke(
        &RawRequest::new(Method::POST, "/items").with_header("Authorization", "Bearer writer"),
    );
    assert_eq!(writer.status(), 201);
}

#[test]
fn test_signed_jwt_payload_becomes_principal() {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "alice", "scope": "read" }).to_string());
    let token = format!("e30.{payload}.sig");
    let auth = BearerAuth::signed_jwt("sig");
    let gate: AuthGate = Arc::new(auth);

    let req = RawRequest::new(Method::GET, "/").with_header("Authorization", format!("Bearer {token}"));
    let principal = gate.authenticate(&req).unwrap();
    assert_eq!(principal.subject, "alice");
    assert_eq!(principal.scopes(), vec!["read".to_string()]);

    let forged = RawRequest::new(Method::GET, "/")
        .with_header("Authorization", format!("Bearer e30.{payload}.other"));
    assert!(gate.authenticate(&forged).is_err());
    let basic = RawRequest::new(Method::GET, "/").with_header("Authorization", "Basic abc");
    assert_eq!(
        gate.authenticate(&basic),
        Err(AuthFailure::Unauthorized("Authorization scheme must be Bearer".to_string()))
    );
}

const QUERY_KEYED: &str = r#"
openapi: 3.0.3
info: { title: query keyed, version: "1" }
security:
  - key: []
components:
  securitySchemes:
    key: { type: apiKey, in: query, name: api_key }
paths:
  /items:
    get:
      responses: { "200": { description: ok } }
"#;

#[test]
fn test_api_key_is_read_only_where_declared() {
    let implementation = Arc::new(CountingImpl::new());
    let model = load_str(QUERY_KEYED).unwrap();
    let keys = HashMap::from([("k1".to_string(), json!({ "owner": "ops" }))]);
    let gate = ApiKeyAuth::from_scheme(&model.security_schemes["key"], keys).unwrap();
    let table = RouteGenerator::new(implementation.clone())
        .scheme_gate("key", Arc::new(gate))
        .generate(&model)
        .unwrap();
    let list = table.find(&Method::GET, "/items").unwrap();

    let header_only = list.invoke(&RawRequest::new(Method::GET, "/items").with_header("X-API-Key", "k1"));
    assert_eq!(header_only.status(), 401);
    assert_eq!(implementation.calls(), 0);

    let blank_header = list.invoke(
        &RawRequest::new(Method::GET, "/items?api_key=k1").with_header("X-API-Key", ""),
    );
    assert_eq!(blank_header.status(), 200);
    assert_eq!(implementation.calls(), 1);
}
