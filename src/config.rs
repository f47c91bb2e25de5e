use std::env;
use std::path::{Path, PathBuf};

use ini::Ini;

use crate::constants::{
    DEFAULT_ADMIN_URL, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_BIND_ADDR, DEFAULT_CONFIG_PATH,
    DEFAULT_TEMPLATE_DIR, DEFAULT_UPLOAD_DIR,
};
use crate::error::UploadError;

/// Process-level settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub config_path: PathBuf,
    pub template_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub sendmail: Option<PathBuf>,
    pub report_email: Option<String>,
    pub admin_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_or("BIND_ADDR", DEFAULT_BIND_ADDR),
            config_path: env_or("UPLOAD_CONFIG", DEFAULT_CONFIG_PATH).into(),
            template_dir: env_or("UPLOAD_TEMPLATE_DIR", DEFAULT_TEMPLATE_DIR).into(),
            upload_dir: env_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR).into(),
            log_file: optional_env("UPLOAD_LOG_FILE").map(PathBuf::from),
            sendmail: optional_env("SENDMAIL_PATH").map(PathBuf::from),
            report_email: optional_env("UPLOAD_REPORT_EMAIL"),
            admin_url: env_or("UPLOAD_ADMIN_URL", DEFAULT_ADMIN_URL),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Settings shared with the rest of the archive tooling, read from the INI
/// config file once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub db_file: PathBuf,
    pub max_incoming_dir_size: u64,
    pub ifdb_commit_key: Option<String>,
    /// Lowercased, without leading dots. `*` accepts every extension.
    pub allowed_extensions: Vec<String>,
}

impl ArchiveConfig {
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let ini = Ini::load_from_file_noescape(path).map_err(|e| {
            UploadError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_ini(&ini)
    }

    pub fn parse(text: &str) -> Result<Self, UploadError> {
        let ini = Ini::load_from_str_noescape(text)
            .map_err(|e| UploadError::Config(format!("malformed config: {e}")))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, UploadError> {
        let db_file = lookup(ini, "DBFile")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UploadError::Config("DBFile must be set".to_string()))?;

        let max_raw = lookup(ini, "MaxIncomingDirSize")
            .ok_or_else(|| UploadError::Config("MaxIncomingDirSize must be set".to_string()))?;
        let max_incoming_dir_size = max_raw.parse::<u64>().map_err(|_| {
            UploadError::Config(format!("MaxIncomingDirSize is not a byte count: {max_raw:?}"))
        })?;

        let ifdb_commit_key = lookup(ini, "IFDBCommitKey")
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let allowed_extensions = match lookup(ini, "AllowedExtensions") {
            Some(list) => parse_extension_list(list),
            None => DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        };
        if allowed_extensions.is_empty() {
            return Err(UploadError::Config(
                "AllowedExtensions must name at least one extension".to_string(),
            ));
        }

        Ok(Self {
            db_file: PathBuf::from(db_file),
            max_incoming_dir_size,
            ifdb_commit_key,
            allowed_extensions,
        })
    }
}

/// Keys live in `[DEFAULT]` (as Python's configparser writes them) or at
/// the top of the file; names compare case-insensitively.
fn lookup<'a>(ini: &'a Ini, key: &str) -> Option<&'a str> {
    [Some("DEFAULT"), None]
        .into_iter()
        .filter_map(|section| ini.section(section))
        .flat_map(|props| props.iter())
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
