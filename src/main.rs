use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use tickbus::app::App;
use tickbus::config::load_config;
use tickbus::transport::FallbackHandler;
use tickbus::utils::error::ServerError;
use tickbus::utils::logging;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // no-op when logging is already up
            logging::init("info");
            error!(error = %e, "tickbus exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let settings = load_config()?;
    logging::init(&settings.log.level);

    let handler = Arc::new(FallbackHandler::new(settings.server.mode));
    let app = App::new(settings).bind(handler).await?;
    app.run_until(shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
