//! Test fixtures: small scan files and upload shortcuts.

#![allow(dead_code)]

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};

use super::{api_path, bearer};

/// A tiny Wavefront OBJ triangle.
pub fn create_test_obj() -> Vec<u8> {
    b"# room scan\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".to_vec()
}

/// An OBJ-looking text file of exactly `len` bytes.
pub fn create_obj_of_len(len: usize) -> Vec<u8> {
    let mut data = b"v 0 0 0\n".to_vec();
    data.resize(len, b'#');
    data
}

pub fn file_part(data: Vec<u8>, filename: &str, mime: &str) -> Part {
    Part::bytes(bytes::Bytes::from(data))
        .file_name(filename.to_string())
        .mime_type(mime.to_string())
}

/// POST a multipart form to the upload endpoint.
pub async fn upload_form(client: &TestServer, form: MultipartForm) -> TestResponse {
    client
        .post(&api_path("/scans"))
        .add_header("Authorization", bearer())
        .multipart(form)
        .await
}

/// Upload the default OBJ with `meta` and return the job id.
pub async fn upload_obj(client: &TestServer, meta: &str) -> String {
    let form = MultipartForm::new()
        .add_part("file", file_part(create_test_obj(), "scan.obj", "text/plain"))
        .add_text("meta", meta.to_string());
    let response = upload_form(client, form).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: serde_json::Value = response.json();
    body["id"]
        .as_str()
        .expect("Expected 'id' in upload response")
        .to_string()
}
