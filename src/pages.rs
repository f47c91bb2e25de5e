use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::constants::{ACCEPTED_TEMPLATE, ERROR_TEMPLATE, FOOTER_TEMPLATE, MAIN_TEMPLATE};
use crate::error::UploadError;
use crate::incoming::StoredFile;
use crate::templates::Templates;
use crate::util::html_escape;

const SUBMIT_BUTTON: &str = r#"type="submit" value="Upload File""#;
const DISABLED_BUTTON: &str =
    r#"type="button" value="Upload Disabled (upload directory is full)""#;

/// A stored upload as listed on the confirmation page.
#[derive(Debug, Clone)]
pub struct AcceptedFile {
    pub stored: StoredFile,
    pub original_name: String,
}

impl AcceptedFile {
    pub fn display_name(&self) -> String {
        if self.stored.name == self.original_name {
            self.stored.name.clone()
        } else {
            format!("{} (originally {})", self.stored.name, self.original_name)
        }
    }
}

pub(crate) async fn render_main_page(
    templates: &Templates,
    post_url: &str,
    accepting: bool,
) -> Result<String, UploadError> {
    let footer = templates.load(FOOTER_TEMPLATE).await?;
    let post_url = html_escape(post_url);
    let button = if accepting {
        SUBMIT_BUTTON
    } else {
        DISABLED_BUTTON
    };
    templates
        .render(
            MAIN_TEMPLATE,
            &[
                ("footer", footer.as_str()),
                ("posturl", post_url.as_str()),
                ("button", button),
            ],
        )
        .await
}

pub(crate) async fn render_accepted_page(
    templates: &Templates,
    files: &[AcceptedFile],
) -> Result<String, UploadError> {
    let footer = templates.load(FOOTER_TEMPLATE).await?;
    let filenames = file_list_html(files);
    templates
        .render(
            ACCEPTED_TEMPLATE,
            &[("footer", footer.as_str()), ("filenames", filenames.as_str())],
        )
        .await
}

/// `message` must already be HTML (see [`UploadError::user_message`]).
pub(crate) async fn render_error_page(
    templates: &Templates,
    message: &str,
) -> Result<String, UploadError> {
    let footer = templates.load(FOOTER_TEMPLATE).await?;
    templates
        .render(
            ERROR_TEMPLATE,
            &[("footer", footer.as_str()), ("errorparas", message)],
        )
        .await
}

/// The error page for `err` with its status. Falls back to the plain-text
/// response when the templates cannot be rendered.
pub async fn error_page(templates: &Templates, err: UploadError) -> Response {
    match render_error_page(templates, &err.user_message()).await {
        Ok(page) => (err.status(), Html(page)).into_response(),
        Err(page_err) => {
            error!(error = %page_err, "failed to render error page");
            err.into_response()
        }
    }
}

fn file_list_html(files: &[AcceptedFile]) -> String {
    let mut lines = Vec::with_capacity(files.len() + 2);
    lines.push("<ul>".to_string());
    for f in files {
        lines.push(format!(
            "<li>{} ({} bytes)</li>",
            html_escape(&f.display_name()),
            f.stored.size
        ));
    }
    lines.push("</ul>".to_string());
    lines.join("\n")
}
