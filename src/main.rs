use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Mutex;

use ifarchive_upload::templates::Templates;
use ifarchive_upload::{build_router, cgi, AppConfig, AppState, ArchiveConfig};
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[tokio::main]
async fn main() -> ExitCode {
    // A `.env` file is optional.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();
    let in_cgi = cgi::is_cgi();
    init_tracing(&config, in_cgi);

    let archive = match ArchiveConfig::load(&config.config_path) {
        Ok(archive) => archive,
        Err(e) => {
            error!(error = %e, path = %config.config_path.display(), "failed to load config");
            if in_cgi {
                let templates = Templates::new(&config.template_dir);
                let _ = cgi::fail(&templates, e, &mut tokio::io::stdout()).await;
            }
            return ExitCode::FAILURE;
        }
    };

    if in_cgi {
        let vars = cgi::env_vars();
        let state = AppState::from_config(&config, &archive, cgi::script_name(&vars));
        if let Err(e) = cgi::run(build_router(state), &vars).await {
            error!(error = %e, "failed to answer CGI request");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let state = AppState::from_config(&config, &archive, "/");
    let app = build_router(state);

    info!(
        bind = %config.bind,
        incoming = %config.upload_dir.display(),
        quota = archive.max_incoming_dir_size,
        db = %archive.db_file.display(),
        "starting server"
    );
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("bind must succeed");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server must start");
    info!("server stopped");
    ExitCode::SUCCESS
}

/// Under CGI stdout carries the response, so logs go to stderr (the web
/// server's error log) unless a log file is configured.
fn init_tracing(config: &AppConfig, in_cgi: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    let log_file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("cannot open log file {}: {e}", path.display()))
            .ok()
    });

    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None if in_cgi => BoxMakeWriter::new(std::io::stderr),
        None => BoxMakeWriter::new(std::io::stdout),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.log_file.is_none() && !in_cgi)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term =
            signal(SignalKind::terminate()).expect("register SIGTERM handler must succeed");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received (SIGINT)");
            }
            _ = term.recv() => {
                info!("shutdown signal received (SIGTERM)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    }
}
