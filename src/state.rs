use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{AppConfig, ArchiveConfig};
use crate::constants::DEFAULT_ADMIN_URL;
use crate::incoming::IncomingDir;
use crate::notify::Notifier;
use crate::templates::Templates;
use crate::upload::UploadRules;

#[derive(Clone)]
pub struct AppState {
    pub(crate) incoming: IncomingDir,
    pub(crate) templates: Templates,
    pub(crate) rules: Arc<UploadRules>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) post_url: Arc<str>,
    pub(crate) admin_url: Arc<str>,
    /// Held from measuring the incoming directory until the upload is on
    /// disk, so concurrent requests in one process see each other's files.
    pub(crate) quota_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        incoming: IncomingDir,
        templates: Templates,
        rules: UploadRules,
        notifier: Notifier,
        post_url: &str,
    ) -> Self {
        Self {
            incoming,
            templates,
            rules: Arc::new(rules),
            notifier: Arc::new(notifier),
            post_url: Arc::from(post_url),
            admin_url: Arc::from(DEFAULT_ADMIN_URL),
            quota_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &AppConfig, archive: &ArchiveConfig, post_url: &str) -> Self {
        Self::new(
            IncomingDir::new(&config.upload_dir),
            Templates::new(&config.template_dir),
            UploadRules::from(archive),
            Notifier::new(config.sendmail.clone(), config.report_email.clone()),
            post_url,
        )
        .with_admin_url(&config.admin_url)
    }

    /// Link to the review page, appended to upload reports.
    pub fn with_admin_url(mut self, admin_url: &str) -> Self {
        self.admin_url = Arc::from(admin_url);
        self
    }
}
