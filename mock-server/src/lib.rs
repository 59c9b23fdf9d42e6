//! A small HTTP server with canned responses for exercising transports.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Anti-hijacking prefix in front of the `/json` payload.
pub const JSON_PREFIX: &str = ")]}'\n";

pub const XML_DOCUMENT: &str = r#"<?xml version="1.0"?><items><item>1</item><item>2</item></items>"#;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    /// Lower-cased names; repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/text", get(text))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", get(delay))
        .route("/echo", any(echo))
        .route("/json", get(json))
        .route("/xml", get(xml))
        .route("/cookies", get(cookies))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn text() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "hello")
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let reason = status.canonical_reason().unwrap_or_default().to_string();
    Ok((status, reason))
}

async fn delay(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        seen.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(&value);
            })
            .or_insert(value);
    }
    Json(Echo {
        method: method.to_string(),
        headers: seen,
        body,
    })
}

async fn json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        format!("{JSON_PREFIX}{{\"items\":[1,2,3]}}"),
    )
}

async fn xml() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/xml")], XML_DOCUMENT)
}

async fn cookies() -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, "a=1"), (header::SET_COOKIE, "b=2")]),
        "ok",
    )
}
