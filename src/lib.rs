pub mod app;
pub mod cgi;
pub mod config;
pub mod constants;
pub mod error;
pub mod form;
mod handlers;
pub mod incoming;
pub mod notify;
pub mod pages;
pub mod state;
pub mod templates;
pub mod upload;
mod util;

pub use app::build_router;
pub use config::{AppConfig, ArchiveConfig};
pub use error::UploadError;
pub use state::AppState;
