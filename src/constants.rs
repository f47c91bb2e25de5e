use std::time::Duration;

pub const MAX_FILE_BYTES: usize = 256 * 1024 * 1024;
pub const MAX_BODY_BYTES: usize = MAX_FILE_BYTES + (1024 * 1024);

/// Longest cleaned filename we accept, leaving room for a collision suffix.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Subdirectory of the incoming directory holding uploads still being written.
pub const STAGING_DIR: &str = ".partial";

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/var/ifarchive/lib/ifarch.config";
pub(crate) const DEFAULT_TEMPLATE_DIR: &str = "/var/ifarchive/lib/uploader";
pub(crate) const DEFAULT_UPLOAD_DIR: &str = "/var/ifarchive/incoming";
pub(crate) const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_ADMIN_URL: &str = "https://upload.ifarchive.org/admin/incoming";

pub(crate) const SENDMAIL_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const MAIN_TEMPLATE: &str = "main.html";
pub(crate) const ACCEPTED_TEMPLATE: &str = "accepted.html";
pub(crate) const ERROR_TEMPLATE: &str = "error.html";
pub(crate) const FOOTER_TEMPLATE: &str = "footer.html";

/// Used when the config file has no `AllowedExtensions` key.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    // Archives
    "7z", "bz2", "gz", "lzh", "rar", "sit", "tar", "tgz", "xz", "zip",
    // Story files
    "a3c", "acd", "agx", "blb", "blorb", "dat", "gam", "gblorb", "glb", "hex", "l9", "mag",
    "sna", "t3", "taf", "ulx", "z1", "z2", "z3", "z4", "z5", "z6", "z7", "z8", "zblorb", "zlb",
    // Disk images
    "adf", "atr", "d64", "dsk", "tap", "tzx",
    // Documents
    "htm", "html", "md", "pdf", "rtf", "txt",
    // Images
    "gif", "jpeg", "jpg", "png",
];
