use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use file_host::{
    config::{Config, StorageBackend, StorageConfig, StoreConfig},
    create_app,
    database::Database,
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "file-host-test-boundary";

async fn test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_path: upload_dir.to_string_lossy().to_string(),
            remote_url: None,
            remote_token: None,
        },
        store: StoreConfig {
            quota_limit_bytes: 20,
            max_single_upload_bytes: 15,
            staging_dir: dir.path().join("staging"),
            ..StoreConfig::default()
        },
        jwt_secret: "test-secret".to_string(),
        access_token_ttl_secs: 3600,
        password_hash_cost: 4,
    };

    let database = Database::open_in_memory().await.unwrap();
    let state = AppState::new(database, config).unwrap();

    (create_app(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": username, "password": "securepassword123" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["data"]["access_token"].as_str().unwrap().to_string()
}

fn multipart_upload(token: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY,
        field = field,
        filename = filename
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/files")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn authorized(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["checks"]["database"], "healthy");
}

#[tokio::test]
async fn test_files_require_authentication() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/files").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(authorized("GET", "/api/v1/usage", "not-a-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_list_download_delete() {
    let (app, _dir) = test_app().await;
    let token = register(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(multipart_upload(&token, "file", "hello.txt", b"hello world"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["accepted"], true);
    assert_eq!(body["reason"], "ok");
    assert_eq!(body["file"]["name"], "hello.txt");
    assert_eq!(body["bytes_used_after"], 11);
    assert_eq!(body["bytes_remaining"], 9);

    let response = app.clone().oneshot(authorized("GET", "/api/v1/files", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
    assert_eq!(body["usage"]["used_bytes"], 11);
    assert_eq!(body["usage"]["quota_bytes"], 20);

    let response = app
        .clone()
        .oneshot(authorized("GET", "/api/v1/files/hello.txt", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"hello.txt\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let response = app
        .clone()
        .oneshot(authorized("DELETE", "/api/v1/files/hello.txt", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["bytes_freed"], 11);
    assert_eq!(body["usage"]["used_bytes"], 0);

    let response = app
        .clone()
        .oneshot(authorized("DELETE", "/api/v1/files/hello.txt", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(authorized("GET", "/api/v1/usage", &token)).await.unwrap();
    assert_eq!(body_json(response).await["used_bytes"], 0);
}

#[tokio::test]
async fn test_upload_rejections_map_to_status_codes() {
    let (app, _dir) = test_app().await;
    let token = register(&app, "alice").await;

    let cases: [(&str, &[u8], StatusCode, &str); 4] = [
        ("virus.exe", b"MZ", StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type"),
        ("big.zip", b"0123456789abcdef", StatusCode::PAYLOAD_TOO_LARGE, "single_file_too_large"),
        ("first.txt", b"0123456789ab", StatusCode::CREATED, "ok"),
        ("second.txt", b"0123456789", StatusCode::FORBIDDEN, "quota_exceeded"),
    ];

    for (name, content, status, reason) in cases {
        let response = app
            .clone()
            .oneshot(multipart_upload(&token, "file", name, content))
            .await
            .unwrap();
        assert_eq!(response.status(), status, "{}", name);
        assert_eq!(body_json(response).await["reason"], reason, "{}", name);
    }

    let response = app
        .clone()
        .oneshot(multipart_upload(&token, "file", "", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(multipart_upload(&token, "attachment", "notes.txt", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cannot_delete_another_users_file() {
    let (app, _dir) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let response = app
        .clone()
        .oneshot(multipart_upload(&alice, "file", "private.txt", b"secret"))
        .await
        .unwrap();
    let id = body_json(response).await["file"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(authorized("DELETE", &format!("/api/v1/files/id/{}", id), &bob))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(authorized("GET", "/api/v1/files/private.txt", &bob))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(authorized("DELETE", &format!("/api/v1/files/id/{}", id), &alice))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let (app, _dir) = test_app().await;
    register(&app, "alice").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": "alice", "password": "anotherpassword" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login() {
    let (app, _dir) = test_app().await;
    register(&app, "alice").await;

    let login = |password: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "username": "alice", "password": password }).to_string(),
            ))
            .unwrap()
    };

    let response = app.clone().oneshot(login("wrongpassword")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(login("securepassword123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await["data"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.clone().oneshot(authorized("GET", "/api/v1/usage", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authorized("POST", "/api/v1/auth/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reconcile_reports_local_backend() {
    let (app, _dir) = test_app().await;
    let token = register(&app, "alice").await;

    let response = app
        .oneshot(authorized("POST", "/api/v1/files/reconcile", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["enumerable"], true);
    assert_eq!(body["adopted"], json!([]));
}
