use pretty_assertions::assert_eq;
use restmirror_sync::{
    Collection, CollectionConfig, EntityId, HttpConfig, HttpTransport, Params, RestTransport,
    into_record,
};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn params(value: Value) -> Params {
    into_record(value).unwrap()
}

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::for_url(format!("{}/users", server.uri())).unwrap()
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn http_config_default() {
    let cfg = HttpConfig::default();
    assert!(cfg.base_url.is_empty());
    assert_eq!(cfg.timeout_secs, 30);
}

#[test]
fn http_config_serde_roundtrip() {
    let cfg = HttpConfig {
        base_url: "https://api.example.com/users".to_string(),
        timeout_secs: 5,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    let deserialized: HttpConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, cfg);
}

#[test]
fn http_config_partial_json_uses_defaults() {
    let cfg: HttpConfig = serde_json::from_str(r#"{"base_url": "http://x"}"#).unwrap();
    assert_eq!(cfg.base_url, "http://x");
    assert_eq!(cfg.timeout_secs, 30);
}

// ── Verbs ────────────────────────────────────────────────────────

#[tokio::test]
async fn get_sends_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "2"))
        .and(query_param("name", "ann"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let body = transport(&server)
        .get(None, &params(json!({"page": 2, "name": "ann", "skip": null})))
        .await
        .unwrap();

    assert_eq!(body, json!([{"id": 1}]));
}

#[tokio::test]
async fn get_with_identity_targets_the_member() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/a%20b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a b"})))
        .expect(1)
        .mount(&server)
        .await;

    let body = transport(&server)
        .get(Some(&EntityId::from("a b")), &Params::new())
        .await
        .unwrap();

    assert_eq!(body, json!({"id": "a b"}));
}

#[tokio::test]
async fn post_patch_put_send_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(json!({"name": "x"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9, "name": "x"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/users/9"))
        .and(body_json(json!({"name": "y"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9, "name": "y"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9, "name": "z"})))
        .expect(1)
        .mount(&server)
        .await;

    let http = transport(&server);
    let id = EntityId::from(9u64);
    assert_eq!(http.post(&json!({"name": "x"})).await.unwrap()["id"], json!(9));
    assert_eq!(http.patch(&id, &json!({"name": "y"})).await.unwrap()["name"], json!("y"));
    assert_eq!(http.put(&id, &json!({"name": "z"})).await.unwrap()["name"], json!("z"));
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/users/3"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let body = transport(&server).delete(&EntityId::from(3u64)).await.unwrap();
    assert_eq!(body, Value::Null);
}

// ── Errors ───────────────────────────────────────────────────────

#[tokio::test]
async fn error_status_carries_the_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "gone"})))
        .mount(&server)
        .await;

    let err = transport(&server).get(None, &Params::new()).await.unwrap_err();

    assert_eq!(err.status, Some(404));
    assert_eq!(err.body, Some(json!({"detail": "gone"})));
    assert!(!err.is_not_modified());
}

#[tokio::test]
async fn not_modified_is_reported_as_such() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let err = transport(&server).get(None, &Params::new()).await.unwrap_err();
    assert!(err.is_not_modified());
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let http = HttpTransport::new(HttpConfig {
        base_url: "http://127.0.0.1:1/users".into(),
        timeout_secs: 2,
    })
    .unwrap();

    let err = http.get(None, &Params::new()).await.unwrap_err();
    assert_eq!(err.status, None);
}

// ── Through a collection ─────────────────────────────────────────

#[tokio::test]
async fn collection_fetches_members_by_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/5"))
        .and(query_param("expand", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "name": "e"})))
        .expect(1)
        .mount(&server)
        .await;

    let users: Collection = Collection::new(Arc::new(transport(&server)), CollectionConfig::default());

    let response = users
        .fetch(params(json!({"id": 5, "expand": "all"})))
        .await
        .unwrap();
    assert!(response.first().unwrap().ptr_eq(&users.by_id(5u64).unwrap()));

    // Now resident: answered without another request.
    users.fetch(params(json!({"id": 5}))).await.unwrap();
}

#[tokio::test]
async fn collection_treats_not_modified_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let users: Collection = Collection::new(Arc::new(transport(&server)), CollectionConfig::default());

    let response = users.fetch(params(json!({"page": 1}))).await.unwrap();
    assert!(response.items().is_empty());
    assert_eq!(users.is_loading(), 0);
}
