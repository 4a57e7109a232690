//! Scan upload, status, artifact, and deletion integration tests.
//!
//! Run with: `cargo test -p roomscan-api --test scans_test`

mod helpers;

use axum::http::{header, Method, StatusCode};
use axum_test::multipart::MultipartForm;
use helpers::converter::{FakeConverter, FAKE_GLB};
use helpers::fixtures::{create_obj_of_len, create_test_obj, file_part, upload_form, upload_obj};
use helpers::{api_path, bearer, setup_test_app, setup_test_app_with};

const META: &str = r#"{"author":"tester","title":"Kitchen","filename":"kitchen.glb"}"#;

#[tokio::test]
async fn test_upload_convert_and_download() {
    let app = setup_test_app().await;
    let client = app.client();

    let id = upload_obj(client, META).await;
    let status = app.wait_for_terminal(&id).await;

    assert_eq!(status["status"], "done");
    assert_eq!(status["progress"], 100);
    assert_eq!(
        status["url"].as_str().unwrap(),
        format!("/api/scans/{}/room.glb", id)
    );

    let response = client
        .get(&api_path(&format!("/scans/{}/room.glb", id)))
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.header(header::CONTENT_TYPE).to_str().unwrap(),
        "model/gltf-binary"
    );
    let disposition = response.header(header::CONTENT_DISPOSITION);
    assert!(disposition.to_str().unwrap().contains("kitchen.glb"));
    assert_eq!(response.as_bytes().as_ref(), FAKE_GLB);
}

async fn download_filename(meta: &str) -> String {
    let app = setup_test_app().await;
    let id = upload_obj(app.client(), meta).await;
    app.wait_for_terminal(&id).await;

    let response = app
        .client()
        .get(&api_path(&format!("/scans/{}/room.glb", id)))
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response
        .header(header::CONTENT_DISPOSITION)
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_download_uses_default_filename() {
    let disposition = download_filename(r#"{"author":"tester"}"#).await;
    assert_eq!(disposition, "attachment; filename=\"room.glb\"");
}

#[tokio::test]
async fn test_download_sanitizes_filename() {
    let disposition =
        download_filename(r#"{"filename":"../evil\\name.glb","author":"x"}"#).await;
    assert_eq!(disposition, "attachment; filename=\"evilname.glb\"");
}

#[tokio::test]
async fn test_upload_returns_location() {
    let app = setup_test_app().await;
    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.obj", "text/plain"))
        .add_text("meta", "author=tester");

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let id = body["id"].as_str().unwrap();
    assert_eq!(
        response.header(header::LOCATION).to_str().unwrap(),
        format!("/api/scans/{}", id)
    );
}

#[tokio::test]
async fn test_failed_conversion_reports_error() {
    let app = setup_test_app_with(FakeConverter::failing(2), |_| {}).await;

    let id = upload_obj(app.client(), META).await;
    let status = app.wait_for_terminal(&id).await;

    assert_eq!(status["status"], "error");
    assert_eq!(status["error"], "converter exited with code 2");
    assert!(status.get("url").is_none());

    let response = app
        .client()
        .get(&api_path(&format!("/scans/{}/room.glb", id)))
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_unknown_extension() {
    let app = setup_test_app().await;
    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.exe", "text/plain"))
        .add_text("meta", "author=tester");

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn test_upload_rejects_mismatched_content_type() {
    let app = setup_test_app().await;
    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.obj", "image/png"))
        .add_text("meta", "author=tester");

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let app = setup_test_app().await;
    let form = MultipartForm::new().add_text("meta", "author=tester");

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let app = setup_test_app().await;
    let form = MultipartForm::new()
        .add_part("file", file_part(Vec::new(), "scan.obj", "text/plain"))
        .add_text("meta", "author=tester");

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "EMPTY_FILE");
}

#[tokio::test]
async fn test_upload_lists_every_invalid_metadata_field() {
    let app = setup_test_app().await;
    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.obj", "text/plain"))
        .add_text("meta", r#"{"title":"Kitchen","color":"red"}"#);

    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_METADATA");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(fields.contains(&"author"));
    assert!(fields.contains(&"color"));
    assert!(!fields.contains(&"title"));

    // Nothing was persisted for the rejected upload.
    let list: Vec<String> = app
        .client()
        .get(&api_path("/scans"))
        .add_header("Authorization", bearer())
        .await
        .json();
    assert!(list.is_empty());
}

#[tokio::test]
async fn test_upload_size_limit_boundary() {
    let app = setup_test_app_with(FakeConverter::open(), |config| {
        config.max_upload_bytes = 256;
    })
    .await;

    let exact = MultipartForm::new()
        .add_part("file", file_part(create_obj_of_len(256), "scan.obj", "text/plain"))
        .add_text("meta", "author=tester");
    let response = upload_form(app.client(), exact).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let over = MultipartForm::new()
        .add_part("file", file_part(create_obj_of_len(257), "scan.obj", "text/plain"))
        .add_text("meta", "author=tester");
    let response = upload_form(app.client(), over).await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_queue_full_returns_retry_after() {
    let app = setup_test_app_with(FakeConverter::gated(), |config| {
        config.queue_max_depth = 1;
    })
    .await;

    let first = upload_obj(app.client(), META).await;

    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.obj", "text/plain"))
        .add_text("meta", "author=tester");
    let response = upload_form(app.client(), form).await;

    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header(header::RETRY_AFTER).to_str().unwrap(), "7");
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "QUEUE_FULL");

    let list: Vec<String> = app
        .client()
        .get(&api_path("/scans"))
        .add_header("Authorization", bearer())
        .await
        .json();
    assert_eq!(list, vec![first.clone()]);

    app.release_conversions();
    let status = app.wait_for_terminal(&first).await;
    assert_eq!(status["status"], "done");
}

fn scratch_entries(app: &helpers::TestApp) -> usize {
    std::fs::read_dir(app.state.scratch.dir()).unwrap().count()
}

#[tokio::test]
async fn test_rejected_uploads_leave_scratch_empty() {
    let app = setup_test_app_with(FakeConverter::gated(), |config| {
        config.max_upload_bytes = 256;
        config.queue_max_depth = 1;
    })
    .await;

    let first = upload_obj(app.client(), META).await;
    assert_eq!(scratch_entries(&app), 0);

    let rejected = [
        (
            file_part(create_obj_of_len(257), "scan.obj", "text/plain"),
            "author=tester",
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
        (
            file_part(create_test_obj(), "scan.exe", "text/plain"),
            "author=tester",
            StatusCode::BAD_REQUEST,
        ),
        (
            file_part(create_test_obj(), "scan.obj", "text/plain"),
            r#"{"color":"red"}"#,
            StatusCode::BAD_REQUEST,
        ),
        (
            file_part(create_test_obj(), "scan.obj", "text/plain"),
            "author=tester",
            StatusCode::TOO_MANY_REQUESTS,
        ),
    ];
    for (part, meta, expected) in rejected {
        let form = MultipartForm::new()
            .add_part("file", part)
            .add_text("meta", meta.to_string());
        let response = upload_form(app.client(), form).await;
        assert_eq!(response.status_code(), expected);
        assert_eq!(scratch_entries(&app), 0, "scratch not empty after {}", expected);
    }

    app.release_conversions();
    let status = app.wait_for_terminal(&first).await;
    assert_eq!(status["status"], "done");
}

#[tokio::test]
async fn test_artifact_not_ready_is_not_found() {
    let app = setup_test_app_with(FakeConverter::gated(), |_| {}).await;

    let id = upload_obj(app.client(), META).await;
    let response = app
        .client()
        .get(&api_path(&format!("/scans/{}/room.glb", id)))
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let status: serde_json::Value = app
        .client()
        .get(&api_path(&format!("/scans/{}", id)))
        .add_header("Authorization", bearer())
        .await
        .json();
    assert!(status["status"] == "pending" || status["status"] == "processing");
    assert!(status.get("url").is_none());

    app.release_conversions();
    app.wait_for_terminal(&id).await;
}

#[tokio::test]
async fn test_artifact_head_and_conditional_get() {
    let app = setup_test_app().await;
    let client = app.client();
    let id = upload_obj(client, META).await;
    app.wait_for_terminal(&id).await;
    let path = api_path(&format!("/scans/{}/room.glb", id));

    let head = client
        .method(Method::HEAD, &path)
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(head.status_code(), StatusCode::OK);
    assert!(head.as_bytes().is_empty());
    assert_eq!(
        head.header(header::CONTENT_LENGTH).to_str().unwrap(),
        FAKE_GLB.len().to_string()
    );
    let etag = head.header(header::ETAG).to_str().unwrap().to_string();

    let cached = client
        .get(&path)
        .add_header("Authorization", bearer())
        .add_header("If-None-Match", etag.clone())
        .await;
    assert_eq!(cached.status_code(), StatusCode::NOT_MODIFIED);
    assert!(cached.as_bytes().is_empty());

    let stale = client
        .get(&path)
        .add_header("Authorization", bearer())
        .add_header("If-None-Match", "\"something-else\"")
        .await;
    assert_eq!(stale.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_info_round_trips_metadata() {
    let app = setup_test_app().await;
    let client = app.client();
    let id = upload_obj(client, META).await;
    app.wait_for_terminal(&id).await;
    let path = api_path(&format!("/scans/{}/info", id));

    let response = client
        .get(&path)
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let info: serde_json::Value = response.json();
    assert_eq!(info["id"], id.as_str());
    assert_eq!(info["status"], "done");
    assert_eq!(info["meta"]["author"], "tester");
    assert_eq!(info["meta"]["title"], "Kitchen");
    assert_eq!(info["outputFile"], "room.glb");
    assert_eq!(info["hash"].as_str().unwrap().len(), 64);
    assert!(info.get("inputFile").is_none());

    let etag = response.header(header::ETAG).to_str().unwrap().to_string();
    let cached = client
        .get(&path)
        .add_header("Authorization", bearer())
        .add_header("If-None-Match", etag)
        .await;
    assert_eq!(cached.status_code(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_delete_removes_job() {
    let app = setup_test_app().await;
    let client = app.client();
    let id = upload_obj(client, META).await;
    app.wait_for_terminal(&id).await;
    let path = api_path(&format!("/scans/{}", id));

    let response = client
        .delete(&path)
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = client.get(&path).add_header("Authorization", bearer()).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = client
        .delete(&path)
        .add_header("Authorization", bearer())
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = setup_test_app().await;

    for path in ["/scans/not-a-uuid", "/scans/NOT-A-UUID/info", "/scans/123/room.glb"] {
        let response = app
            .client()
            .get(&api_path(path))
            .add_header("Authorization", bearer())
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{}", path);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "INVALID_ID");
    }
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get(&api_path("/scans/0b6f4b8e-3c1a-4f5e-9d2a-7c8b9e0f1a2b"))
        .add_header("Authorization", bearer())
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_scans_pagination() {
    let app = setup_test_app().await;
    let client = app.client();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(upload_obj(client, "author=tester").await);
    }
    ids.sort();

    let list = |query: &'static str| {
        client
            .get(&format!("{}{}", api_path("/scans"), query))
            .add_header("Authorization", bearer())
    };

    let all: Vec<String> = list("").await.json();
    assert_eq!(all, ids);

    let first: Vec<String> = list("?limit=2").await.json();
    assert_eq!(first, ids[..2].to_vec());

    let second: Vec<String> = list("?page=2&limit=2").await.json();
    assert_eq!(second, ids[2..].to_vec());

    let past_end: Vec<String> = list("?page=5&limit=2").await.json();
    assert!(past_end.is_empty());

    // Unparseable values fall back to defaults.
    let fallback: Vec<String> = list("?page=abc&limit=-3").await.json();
    assert_eq!(fallback, ids);
}
