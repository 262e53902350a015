//! Shared setup for client integration tests against a mockito server.

#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use spotreport_client::{ApiClient, Auth};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "session=integration-test";
pub const TARGET: &str = "Ireland#Donegal#Bundoran";

/// Returns the versioned API path, e.g. `api_path("/reports")` -> `/api/v0/reports`.
pub fn api_path(path: &str) -> String {
    format!("/api/v0{}", path)
}

pub fn api_client(server: &ServerGuard) -> ApiClient {
    ApiClient::new(
        server.url(),
        "v0",
        Auth::SessionCookie(SESSION_COOKIE.to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

/// Upload-URL endpoint issuing `/blob/1`, `/blob/2`, ... on the same server
/// with keys `reports/<mediaType>-<n>`, expected `hits` times.
pub async fn mock_upload_urls(server: &mut ServerGuard, hits: usize) -> Mock {
    let base = server.url();
    let issued = Arc::new(AtomicUsize::new(0));
    server
        .mock("POST", api_path("/media/upload-url").as_str())
        .match_header("cookie", SESSION_COOKIE)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |request| {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            let body: serde_json::Value =
                serde_json::from_slice(request.body().unwrap()).unwrap();
            let media_type = body["mediaType"].as_str().unwrap_or("unknown").to_string();
            json!({
                "uploadUrl": format!("{}/blob/{}", base, n),
                "remoteKey": format!("reports/{}-{}", media_type, n),
                "expiresAt": "2030-01-01T00:00:00Z"
            })
            .to_string()
            .into_bytes()
        })
        .expect(hits)
        .create_async()
        .await
}

/// CSRF endpoint handing out `token-1`, `token-2`, ..., expected `hits` times.
pub async fn mock_csrf_tokens(server: &mut ServerGuard, hits: usize) -> Mock {
    let issued = Arc::new(AtomicUsize::new(0));
    server
        .mock("GET", api_path("/csrf-token").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |_| {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            json!({ "token": format!("token-{}", n) }).to_string().into_bytes()
        })
        .expect(hits)
        .create_async()
        .await
}

pub async fn mock_blob_put(server: &mut ServerGuard, n: usize, status: usize) -> Mock {
    server
        .mock("PUT", format!("/blob/{}", n).as_str())
        .with_status(status)
        .expect(1)
        .create_async()
        .await
}

pub async fn mock_delete(server: &mut ServerGuard, key: &str, storage_type: &str) -> Mock {
    server
        .mock("DELETE", api_path("/media").as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("key".into(), key.into()),
            Matcher::UrlEncoded("type".into(), storage_type.into()),
        ]))
        .match_header("cookie", SESSION_COOKIE)
        .with_status(204)
        .expect(1)
        .create_async()
        .await
}
