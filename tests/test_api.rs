//! REST client against a mock backend.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quadrant_live::api::{ApiClient, ApiError};
use quadrant_live::config::ApiConfig;

fn client(server: &MockServer, token: Option<&str>) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: format!("{}/api/", server.uri()),
        token_file: None,
        auth_token: token.map(str::to_string),
    })
    .unwrap()
}

#[tokio::test]
async fn sends_bearer_token_and_decodes_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .and(header("authorization", "Bearer secret"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let tasks = client(&server, Some("secret")).tasks().all().await.unwrap();
    assert_eq!(tasks, Some(json!([{"id": 1}])));
}

#[tokio::test]
async fn unauthorized_maps_to_authorization_required() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "bad token"})))
        .mount(&server)
        .await;

    let err = client(&server, None).auth().current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::AuthorizationRequired));
}

#[tokio::test]
async fn failure_carries_backend_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_json(json!({"title": "t"})))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "title too short"})))
        .mount(&server)
        .await;

    let err = client(&server, None).tasks().create(&json!({"title": "t"})).await.unwrap_err();
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "title too short");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failure_without_error_field_uses_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notebooks/3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server, None).notebooks().one(3).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, ref message } if message == "Request failed"));
}

#[tokio::test]
async fn no_content_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/pages/5"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert_eq!(client(&server, None).pages().delete(5).await.unwrap(), None);
}

#[tokio::test]
async fn search_query_is_url_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/pages/search"))
        .and(query_param("q", "plan & do/now"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let hits = client(&server, None).pages().search("plan & do/now").await.unwrap();
    assert_eq!(hits, Some(json!([])));
}

#[tokio::test]
async fn login_token_is_used_for_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "fresh"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/4/archive"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4, "archived": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, None);
    let login = api.auth().login("a@b.c", "pw").await.unwrap().unwrap();
    api.set_auth_token(login["token"].as_str().unwrap()).unwrap();

    let archived = api.tasks().archive(4).await.unwrap().unwrap();
    assert_eq!(archived["archived"], json!(true));
}
