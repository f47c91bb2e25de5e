//! Upload reports: always logged, and mailed through `sendmail -t` when a
//! recipient is configured.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info};

use crate::constants::SENDMAIL_TIMEOUT;
use crate::form::UploadForm;
use crate::pages::AcceptedFile;
use crate::util::{header_safe, plural};

/// Where the request came from, for the report trailer.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub remote_addr: String,
    pub user_agent: String,
    pub referer: Option<String>,
}

impl RequestInfo {
    fn trailer(&self) -> Vec<(&'static str, &str)> {
        let mut lines = vec![
            ("REMOTE_ADDR", self.remote_addr.as_str()),
            ("HTTP_USER_AGENT", self.user_agent.as_str()),
        ];
        if let Some(referer) = &self.referer {
            lines.push(("HTTP_REFERER", referer.as_str()));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
}

impl UploadReport {
    pub fn accepted(form: &UploadForm, files: &[AcceptedFile], admin_url: &str) -> Self {
        let total: u64 = files.iter().map(|f| f.stored.size).sum();
        let mut body = format!(
            "{} {} totalling {} uploaded successfully:\n\n",
            files.len(),
            plural("file", files.len()),
            kb(total)
        );
        for f in files {
            body.push_str(&format!("  * {} ({})\n", f.display_name(), kb(f.stored.size)));
        }

        body.push_str(&format!(
            "\nUploaded by {} <{}>\n\n",
            form.donor_name(),
            form.donor_email()
        ));
        if let Some(about) = &form.about {
            body.push_str(about);
            body.push('\n');
        }
        if let Some(dir) = &form.directory {
            body.push_str(&format!("Suggested directory: if-archive/{dir}\n"));
        }
        if let Some(rights) = &form.rights {
            body.push_str(&format!("Permission from: {rights}\n"));
        }
        if let Some(id) = &form.ifdb_id {
            body.push_str(&format!("IFDB ID: {id}\n"));
        }
        if let Some(tuid) = &form.tuid {
            body.push_str(&format!("TUID: {tuid}\n"));
        }
        body.push_str(&format!("\n\n{admin_url}\n\n"));

        let names: Vec<&str> = files.iter().map(|f| f.stored.name.as_str()).collect();
        let reply_to = form.donor_email.as_deref().map(|email| match &form.donor_name {
            Some(name) => format!("{} <{}>", header_safe(name), header_safe(email)),
            None => format!("<{}>", header_safe(email)),
        });

        Self {
            subject: format!("IFArchive Upload {}", names.join(" ")),
            body,
            reply_to,
        }
    }

    pub fn refused(reason: &str) -> Self {
        Self {
            subject: "Upload Report".to_string(),
            body: reason.to_string(),
            reply_to: None,
        }
    }

    /// RFC 822 message for `sendmail -t`.
    pub fn to_mail(&self, recipient: &str, request: &RequestInfo) -> String {
        let recipient = header_safe(recipient);
        let mut mail = format!(
            "To: {recipient}\nFrom: {recipient}\nSubject: {}\n",
            header_safe(&self.subject)
        );
        if let Some(reply_to) = &self.reply_to {
            mail.push_str(&format!("Reply-To: {reply_to}\n"));
        }
        mail.push('\n');
        mail.push_str(&self.body);
        mail.push('\n');
        mail.push_str("---------------------------------------\n");
        for (key, value) in request.trailer() {
            mail.push_str(&format!("{key}: {value}\n"));
        }
        mail.push_str("---------------------------------------\n");
        mail
    }
}

fn kb(bytes: u64) -> String {
    format!("{:.2} kb", bytes as f64 / 1024.0)
}

#[derive(Debug, Clone)]
pub struct Notifier {
    sendmail: Option<PathBuf>,
    recipient: Option<String>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(sendmail: Option<PathBuf>, recipient: Option<String>) -> Self {
        Self {
            sendmail,
            recipient,
            timeout: SENDMAIL_TIMEOUT,
        }
    }

    /// Logs reports but never mails them.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Never fails: a report that cannot be mailed is logged instead.
    pub async fn send(&self, report: &UploadReport, request: &RequestInfo) {
        info!(subject = %report.subject, "upload report");
        info!(message = %report.body, "upload message");
        for (key, value) in request.trailer() {
            info!(key, value, "upload env");
        }

        let (Some(sendmail), Some(recipient)) = (&self.sendmail, &self.recipient) else {
            return;
        };
        let mail = report.to_mail(recipient, request);
        if let Err(e) = pipe_to_sendmail(sendmail, mail.into_bytes(), self.timeout).await {
            error!(error = %e, sendmail = %sendmail.display(), "failed to mail upload report");
        }
    }
}

async fn pipe_to_sendmail(sendmail: &Path, mail: Vec<u8>, limit: Duration) -> io::Result<()> {
    let mut cmd = Command::new(sendmail);
    cmd.arg("-t")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&mail).await?;
        stdin.shutdown().await?;
    }

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("sendmail timed out after {}s", limit.as_secs()),
            ))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "sendmail exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incoming::StoredFile;

    fn accepted(name: &str, original: &str, size: u64) -> AcceptedFile {
        AcceptedFile {
            stored: StoredFile {
                name: name.to_string(),
                path: PathBuf::from("/incoming").join(name),
                size,
            },
            original_name: original.to_string(),
        }
    }

    fn request() -> RequestInfo {
        RequestInfo {
            remote_addr: "192.0.2.7".to_string(),
            user_agent: "Lynx/2.9".to_string(),
            referer: None,
        }
    }

    #[test]
    fn accepted_report_lists_files_and_donor() {
        let form = UploadForm {
            donor_name: Some("Ann".to_string()),
            donor_email: Some("ann@example.org".to_string()),
            about: Some("A small game.".to_string()),
            directory: Some("games/zcode".to_string()),
            rights: Some("author".to_string()),
            ifdb_id: Some("abc123".to_string()),
            tos: true,
            ..UploadForm::default()
        };
        let files = [
            accepted("zork.z5", "zork.z5", 2048),
            accepted("zork.zip.17.5", "zork.zip", 512),
        ];

        let report = UploadReport::accepted(&form, &files, "https://admin");

        assert_eq!(report.subject, "IFArchive Upload zork.z5 zork.zip.17.5");
        assert_eq!(report.reply_to.as_deref(), Some("Ann <ann@example.org>"));
        assert_eq!(
            report.body,
            "2 files totalling 2.50 kb uploaded successfully:\n\n\
             \x20 * zork.z5 (2.00 kb)\n\
             \x20 * zork.zip.17.5 (originally zork.zip) (0.50 kb)\n\
             \nUploaded by Ann <ann@example.org>\n\n\
             A small game.\n\
             Suggested directory: if-archive/games/zcode\n\
             Permission from: author\n\
             IFDB ID: abc123\n\
             \n\nhttps://admin\n\n"
        );
    }

    #[test]
    fn anonymous_report_has_no_reply_to() {
        let form = UploadForm::default();
        let report = UploadReport::accepted(&form, &[accepted("a.txt", "a.txt", 1)], "u");
        assert!(report.body.starts_with("1 file totalling"));
        assert!(report.body.contains("Uploaded by Anonymous <???>"));
        assert_eq!(report.reply_to, None);
    }

    #[test]
    fn mail_headers_cannot_be_injected() {
        let form = UploadForm {
            donor_name: Some("Eve\nBcc: victim@example.org".to_string()),
            donor_email: Some("eve@example.org".to_string()),
            ..UploadForm::default()
        };
        let report = UploadReport::accepted(&form, &[accepted("a.txt", "a.txt", 1)], "u");
        let mail = report.to_mail("uploads@example.org", &request());
        let headers = mail.split("\n\n").next().unwrap();
        assert!(!headers.lines().any(|l| l.starts_with("Bcc:")));
        assert!(mail.contains("REMOTE_ADDR: 192.0.2.7\n"));
        assert!(mail.starts_with("To: uploads@example.org\nFrom: uploads@example.org\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sendmail_failure_is_reported() {
        let result =
            pipe_to_sendmail(Path::new("/bin/false"), b"x".to_vec(), Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_sendmail_is_an_error() {
        let err = pipe_to_sendmail(
            Path::new("/nonexistent/sendmail"),
            b"x".to_vec(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
