//! Runs the router once per process under the CGI/1.1 execution model:
//! request from the environment and stdin, response to stdout.

use std::collections::BTreeMap;
use std::io;
use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tower::ServiceExt;
use tracing::debug;

use crate::constants::MAX_BODY_BYTES;
use crate::error::UploadError;
use crate::pages::error_page;
use crate::templates::Templates;

pub type CgiVars = BTreeMap<String, String>;

pub fn is_cgi() -> bool {
    std::env::var_os("GATEWAY_INTERFACE").is_some()
}

pub fn env_vars() -> CgiVars {
    std::env::vars().collect()
}

/// The URL the form should post back to.
pub fn script_name(vars: &CgiVars) -> &str {
    vars.get("SCRIPT_NAME").map(String::as_str).unwrap_or("")
}

pub async fn run(router: Router, vars: &CgiVars) -> io::Result<()> {
    let body = read_body(vars, tokio::io::stdin()).await?;
    let response = match build_request(vars, body) {
        Ok(req) => router
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {}),
        Err(e) => e.into_response(),
    };
    write_response(response, &mut tokio::io::stdout()).await
}

/// Answers with the error page without routing, for failures before the
/// router exists.
pub async fn fail<W: AsyncWrite + Unpin>(
    templates: &Templates,
    err: UploadError,
    out: &mut W,
) -> io::Result<()> {
    write_response(error_page(templates, err).await, out).await
}

/// Reads `CONTENT_LENGTH` bytes, but never more than one byte past the body
/// limit so oversized requests are still refused by the router.
pub async fn read_body<R: AsyncRead + Unpin>(vars: &CgiVars, input: R) -> io::Result<Bytes> {
    let declared = vars
        .get("CONTENT_LENGTH")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let limit = declared.min(MAX_BODY_BYTES as u64 + 1);

    let mut buf = Vec::new();
    input.take(limit).read_to_end(&mut buf).await?;
    debug!(declared, read = buf.len(), "read CGI request body");
    Ok(Bytes::from(buf))
}

pub fn build_request(vars: &CgiVars, body: Bytes) -> Result<Request<Body>, UploadError> {
    let method = vars
        .get("REQUEST_METHOD")
        .map(String::as_str)
        .unwrap_or("GET");
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| UploadError::Form(format!("Unsupported request method {method:?}")))?;

    let mut target = vars
        .get("PATH_INFO")
        .filter(|p| p.starts_with('/'))
        .cloned()
        .unwrap_or_else(|| "/".to_string());
    if let Some(query) = vars.get("QUERY_STRING").filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    let uri: Uri = target
        .parse()
        .map_err(|_| UploadError::Form(format!("Malformed request path {target:?}")))?;

    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in request_headers(vars) {
        builder = builder.header(name, value);
    }
    let mut req = builder
        .body(Body::from(body))
        .map_err(|e| UploadError::Form(format!("Malformed request: {e}")))?;

    if let Some(addr) = remote_addr(vars) {
        req.extensions_mut().insert(ConnectInfo(addr));
    }
    Ok(req)
}

/// `CONTENT_TYPE`, `CONTENT_LENGTH` and the `HTTP_*` meta-variables as
/// header pairs. Variables that do not form a valid header are dropped.
fn request_headers(vars: &CgiVars) -> Vec<(HeaderName, HeaderValue)> {
    vars.iter()
        .filter(|(_, value)| !value.is_empty())
        .filter_map(|(key, value)| {
            let name = match key.as_str() {
                "CONTENT_TYPE" => header::CONTENT_TYPE,
                "CONTENT_LENGTH" => header::CONTENT_LENGTH,
                other => {
                    let http = other.strip_prefix("HTTP_")?;
                    let name = http.to_ascii_lowercase().replace('_', "-");
                    HeaderName::from_bytes(name.as_bytes()).ok()?
                }
            };
            let value = HeaderValue::from_str(value).ok()?;
            Some((name, value))
        })
        .collect()
}

fn remote_addr(vars: &CgiVars) -> Option<SocketAddr> {
    let ip = vars.get("REMOTE_ADDR")?.trim().parse::<IpAddr>().ok()?;
    let port = vars
        .get("REMOTE_PORT")
        .and_then(|p| p.trim().parse::<u16>().ok())
        .unwrap_or(0);
    Some(SocketAddr::new(ip, port))
}

/// Writes a CGI response: `Status:` line, headers, blank line, body.
pub async fn write_response<W: AsyncWrite + Unpin>(response: Response, out: &mut W) -> io::Result<()> {
    let (parts, body) = response.into_parts();
    let body = body.collect().await.map_err(io::Error::other)?.to_bytes();

    let mut head = format!(
        "Status: {} {}\r\n",
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    );
    if !parts.headers.contains_key(header::CONTENT_TYPE) {
        head.push_str(&format!("content-type: {}\r\n", mime::TEXT_PLAIN_UTF_8));
    }
    for (name, value) in &parts.headers {
        head.push_str(&format!(
            "{}: {}\r\n",
            name,
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
    head.push_str("\r\n");

    out.write_all(head.as_bytes()).await?;
    out.write_all(&body).await?;
    out.flush().await
}
