use std::net::SocketAddr;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{ConnectInfo, Multipart, Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::error::UploadError;
use crate::form::UploadForm;
use crate::incoming::upload_stamp;
use crate::notify::{RequestInfo, UploadReport};
use crate::pages::{error_page, render_accepted_page, render_main_page, AcceptedFile};
use crate::state::AppState;
use crate::util::is_word_chars;

pub(crate) async fn index(State(state): State<AppState>) -> Response {
    let accepting = match state.incoming.usage().await {
        Ok(usage) => !state.rules.is_full(usage),
        Err(e) => return error_response(&state, e).await,
    };
    match render_main_page(&state.templates, &state.post_url, accepting).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => error_response(&state, e).await,
    }
}

pub(crate) async fn submit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request = request_info(connect_info, &headers);
    match accept_upload(&state, &request, multipart).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            if let UploadError::QuotaExceeded { .. } = e {
                let report = UploadReport::refused(&e.to_string());
                state.notifier.send(&report, &request).await;
            }
            error_response(&state, e).await
        }
    }
}

async fn accept_upload(
    state: &AppState,
    request: &RequestInfo,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, UploadError> {
    let multipart = multipart.map_err(|e| {
        error!(error = %e, "multipart parse failed");
        UploadError::Form("Error parsing multipart/form-data request".to_string())
    })?;

    let form = UploadForm::from_multipart(multipart).await?;
    form.check_consent()?;
    if form.files.is_empty() {
        return Err(UploadError::Form("No files were received.".to_string()));
    }

    let stamp = upload_stamp(OffsetDateTime::now_utc());
    let mut accepted = Vec::with_capacity(form.files.len());
    {
        let _guard = state.quota_lock.lock().await;

        state.incoming.ensure_exists().await?;
        let usage = state.incoming.usage().await?;
        if state.rules.is_full(usage) {
            return Err(UploadError::QuotaExceeded {
                current: usage.bytes,
                incoming: form.files.iter().map(|f| f.size()).sum(),
                max: state.rules.max_incoming_dir_size,
            });
        }

        let uploads = state.rules.validate_batch(&form.files, usage)?;
        for upload in uploads {
            let stored = state.incoming.store(&upload, &stamp).await?;
            let digest = format!("{:x}", Sha256::digest(&upload.content));
            if upload.was_renamed() {
                info!(
                    file = %stored.name,
                    original = %upload.original_name,
                    size = stored.size,
                    sha256 = %digest,
                    remote_addr = %request.remote_addr,
                    "UPLOAD"
                );
            } else {
                info!(
                    file = %stored.name,
                    size = stored.size,
                    sha256 = %digest,
                    remote_addr = %request.remote_addr,
                    "UPLOAD"
                );
            }
            accepted.push(AcceptedFile {
                stored,
                original_name: upload.original_name,
            });
        }
    }

    check_identifier("IFDB ID", form.ifdb_id.as_deref());
    check_identifier("TUID", form.tuid.as_deref());

    let report = UploadReport::accepted(&form, &accepted, &state.admin_url);
    state.notifier.send(&report, request).await;

    render_accepted_page(&state.templates, &accepted).await
}

/// Odd identifiers are passed on to the admins, only flagged in the log.
fn check_identifier(what: &str, value: Option<&str>) {
    if let Some(value) = value {
        if !is_word_chars(value) {
            error!(value, "{what} isn't alphanumeric");
        }
    }
}

fn request_info(connect_info: Option<ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> RequestInfo {
    let header_text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestInfo {
        remote_addr: connect_info
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "?".to_string()),
        user_agent: header_text(header::USER_AGENT)
            .unwrap_or_else(|| "No Known Browser".to_string()),
        referer: header_text(header::REFERER),
    }
}

pub(crate) async fn error_response(state: &AppState, err: UploadError) -> Response {
    if err.is_internal() {
        error!(error = %err, "upload failed");
    } else {
        warn!(error = %err, "upload refused");
    }
    error_page(&state.templates, err).await
}

/// Turns the body-limit layer's bare 413 into the error page.
pub(crate) async fn body_limit_page(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    let is_page = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"text/html"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_page {
        return error_response(&state, UploadError::TooLarge).await;
    }
    response
}
