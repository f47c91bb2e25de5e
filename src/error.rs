use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::util::html_escape;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("bad filename: {0:?}")]
    BadFilename(String),

    #[error("extension not accepted: {0:?}")]
    BadExtension(String),

    #[error("incoming directory quota exceeded ({current} + {incoming} > {max} bytes)")]
    QuotaExceeded { current: u64, incoming: u64, max: u64 },

    #[error("failed to store {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("{0}")]
    Form(String),

    #[error("request body too large")]
    TooLarge,
}

impl UploadError {
    pub(crate) fn storage(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| UploadError::Storage { path, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::BadFilename(_) | UploadError::BadExtension(_) | UploadError::Form(_) => {
                StatusCode::BAD_REQUEST
            }
            UploadError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            UploadError::Storage { .. } | UploadError::Config(_) | UploadError::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// HTML paragraphs suitable for the `errorparas` tag of the error page.
    ///
    /// Internal failures get a generic apology; the quota message never
    /// reveals the configured limit.
    pub fn user_message(&self) -> String {
        let text = match self {
            UploadError::BadFilename(name) => format!(
                "The filename \u{201c}{name}\u{201d} cannot be accepted. \
                 Please rename the file and try again."
            ),
            UploadError::BadExtension(name) => format!(
                "Files of this type (\u{201c}{name}\u{201d}) are not accepted by the upload form. \
                 Please package the file as a zip archive and try again."
            ),
            UploadError::QuotaExceeded { .. } => "There are already too many files in the upload \
                area, preventing your files from being uploaded. We apologize for the \
                inconvenience."
                .to_string(),
            UploadError::Form(msg) => msg.clone(),
            UploadError::TooLarge => "The uploaded file is too large.".to_string(),
            UploadError::Storage { .. } | UploadError::Config(_) | UploadError::Template(_) => {
                "We were unable to process your uploaded file at this time. We apologize for \
                 the inconvenience, and ask that you try again later. If the problem persists, \
                 please contact the archive maintainers."
                    .to_string()
            }
        };
        format!("<p>{}</p>", html_escape(&text))
    }

    pub(crate) fn is_internal(&self) -> bool {
        self.status().is_server_error() && !matches!(self, UploadError::QuotaExceeded { .. })
    }
}

/// Plain-text fallback, used when the error page itself cannot be rendered.
impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_internal() {
            error!(error = %self, "request failed");
            return (status, "Internal Server Error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}
