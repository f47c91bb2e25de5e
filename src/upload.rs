//! Upload validation: filename, extension and quota checks, run in that
//! order and stopping at the first failure.

use std::path::Path;

use bytes::Bytes;

use crate::config::ArchiveConfig;
use crate::constants::MAX_FILENAME_BYTES;
use crate::error::UploadError;
use crate::incoming::DirUsage;

/// One file part of a submitted form.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Bytes,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// An upload that passed every check and may be written to disk.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// Basename as the browser sent it.
    pub original_name: String,
    /// Name to use inside the incoming directory.
    pub safe_name: String,
    pub content: Bytes,
}

impl ValidatedUpload {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn was_renamed(&self) -> bool {
        self.safe_name != self.original_name
    }
}

#[derive(Debug, Clone)]
pub struct UploadRules {
    pub max_incoming_dir_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl From<&ArchiveConfig> for UploadRules {
    fn from(cfg: &ArchiveConfig) -> Self {
        Self {
            max_incoming_dir_size: cfg.max_incoming_dir_size,
            allowed_extensions: cfg.allowed_extensions.clone(),
        }
    }
}

impl UploadRules {
    /// No upload of any size can be accepted.
    pub fn is_full(&self, usage: DirUsage) -> bool {
        usage.bytes >= self.max_incoming_dir_size
    }

    pub fn validate(
        &self,
        req: &UploadRequest,
        usage: DirUsage,
    ) -> Result<ValidatedUpload, UploadError> {
        let (original_name, safe_name) = check_filename(&req.filename)?;
        self.check_extension(&safe_name)?;
        self.check_quota(usage, req.size())?;
        Ok(ValidatedUpload {
            original_name,
            safe_name,
            content: req.content.clone(),
        })
    }

    /// Validates every file against the usage the earlier files in the batch
    /// would leave behind. Either all files pass or none do.
    pub fn validate_batch(
        &self,
        reqs: &[UploadRequest],
        usage: DirUsage,
    ) -> Result<Vec<ValidatedUpload>, UploadError> {
        let mut projected = usage;
        let mut accepted = Vec::with_capacity(reqs.len());
        for req in reqs {
            let upload = self.validate(req, projected)?;
            projected = projected.plus(upload.size());
            accepted.push(upload);
        }
        Ok(accepted)
    }

    fn check_extension(&self, safe_name: &str) -> Result<(), UploadError> {
        if self.allowed_extensions.iter().any(|e| e == "*") {
            return Ok(());
        }
        let ext = Path::new(safe_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| UploadError::BadExtension(safe_name.to_string()))?;
        if self.allowed_extensions.iter().any(|e| *e == ext) {
            Ok(())
        } else {
            Err(UploadError::BadExtension(safe_name.to_string()))
        }
    }

    fn check_quota(&self, usage: DirUsage, incoming: u64) -> Result<(), UploadError> {
        if usage.bytes.saturating_add(incoming) > self.max_incoming_dir_size {
            return Err(UploadError::QuotaExceeded {
                current: usage.bytes,
                incoming,
                max: self.max_incoming_dir_size,
            });
        }
        Ok(())
    }
}

/// Returns `(original_name, safe_name)` for a submitted filename.
pub fn check_filename(raw: &str) -> Result<(String, String), UploadError> {
    let bad = || UploadError::BadFilename(raw.to_string());

    if raw.trim().is_empty() || raw.contains("../") || raw.contains("..\\") {
        return Err(bad());
    }

    let original = strip_dirs(raw);
    if original.is_empty() || original == "." || original == ".." {
        return Err(bad());
    }

    let safe = clean_filename(raw);
    if safe.len() > MAX_FILENAME_BYTES {
        return Err(bad());
    }
    Ok((original.to_string(), safe))
}

/// Everything after the last `/` or `\`.
pub(crate) fn strip_dirs(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Replaces runs of control characters and path separators with `_`.
pub(crate) fn clean_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        let unsafe_char = matches!(c, '\u{0}'..='\u{1f}' | '\u{7f}'..='\u{9f}' | '/' | '\\');
        if unsafe_char {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    // CGI form encoding leaves double quotes percent-escaped.
    out.replace("%22", "\"")
}
