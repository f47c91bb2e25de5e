use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::UploadError;
use crate::upload::UploadRequest;

/// The submitted upload form: donor details plus the file parts.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub about: Option<String>,
    pub directory: Option<String>,
    pub ifdb_id: Option<String>,
    pub tuid: Option<String>,
    pub tos: bool,
    pub rights: Option<String>,
    pub files: Vec<UploadRequest>,
}

impl UploadForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, UploadError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();

            if is_file_field(&name) {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content = field.bytes().await.map_err(multipart_error)?;
                // An unused file input still sends an empty part.
                if file_name.is_empty() {
                    continue;
                }
                form.files.push(UploadRequest::new(file_name, content));
                continue;
            }

            let value = non_empty(field.text().await.map_err(multipart_error)?);
            // A repeated field keeps its first non-empty value.
            let slot = match name.as_str() {
                "name" => &mut form.donor_name,
                "email" => &mut form.donor_email,
                "filedesc" => &mut form.about,
                "directory" => &mut form.directory,
                "ifdbid" => &mut form.ifdb_id,
                "tuid" => &mut form.tuid,
                "rights" => &mut form.rights,
                "tos" => {
                    form.tos |= value.is_some();
                    continue;
                }
                _ => continue,
            };
            if slot.is_none() {
                *slot = value;
            }
        }

        form.about = form.about.map(|v| v.replace('\r', ""));
        Ok(form)
    }

    /// The terms of use and a rights statement are mandatory.
    pub fn check_consent(&self) -> Result<(), UploadError> {
        if !self.tos {
            return Err(UploadError::Form(
                "You must agree to the Terms of Use in order to upload files to the Archive."
                    .to_string(),
            ));
        }
        if self.rights.is_none() {
            return Err(UploadError::Form(
                "Please select whichever of the \"Right to use\" options applies to your upload."
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn donor_name(&self) -> &str {
        self.donor_name.as_deref().unwrap_or("Anonymous")
    }

    pub fn donor_email(&self) -> &str {
        self.donor_email.as_deref().unwrap_or("???")
    }
}

/// `file`, or the numbered `file.1`, `file.2`, ... of the multi-file form.
fn is_file_field(name: &str) -> bool {
    match name.strip_prefix("file") {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn multipart_error(e: MultipartError) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        UploadError::Form(format!("Error parsing the submitted form: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};

    use super::*;

    async fn parse(fields: &[(&str, &str)]) -> UploadForm {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--XYZ\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str("--XYZ--\r\n");
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        let multipart = Multipart::from_request(req, &()).await.unwrap();
        UploadForm::from_multipart(multipart).await.unwrap()
    }

    #[tokio::test]
    async fn repeated_fields_keep_first_value() {
        let form = parse(&[
            ("name", "Ann"),
            ("name", "Bob"),
            ("email", ""),
            ("email", "bob@example.org"),
            ("filedesc", "line one\r\nline two"),
            ("tos", "on"),
            ("tos", ""),
        ])
        .await;

        assert_eq!(form.donor_name.as_deref(), Some("Ann"));
        assert_eq!(form.donor_email.as_deref(), Some("bob@example.org"));
        assert_eq!(form.about.as_deref(), Some("line one\nline two"));
        assert!(form.tos);
        assert!(form.files.is_empty());
    }

    #[test]
    fn file_field_names() {
        assert!(is_file_field("file"));
        assert!(is_file_field("file.1"));
        assert!(is_file_field("file.12"));
        assert!(!is_file_field("file."));
        assert!(!is_file_field("file.x"));
        assert!(!is_file_field("filedesc"));
        assert!(!is_file_field("name"));
    }

    #[test]
    fn consent_requires_tos_then_rights() {
        let mut form = UploadForm::default();
        let err = form.check_consent().unwrap_err();
        assert!(matches!(err, UploadError::Form(msg) if msg.contains("Terms of Use")));

        form.tos = true;
        let err = form.check_consent().unwrap_err();
        assert!(matches!(err, UploadError::Form(msg) if msg.contains("Right to use")));

        form.rights = Some("author".to_string());
        assert!(form.check_consent().is_ok());
    }

    #[test]
    fn donor_defaults() {
        let form = UploadForm::default();
        assert_eq!(form.donor_name(), "Anonymous");
        assert_eq!(form.donor_email(), "???");
    }
}
