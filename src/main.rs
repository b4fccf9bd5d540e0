use std::sync::Arc;

use classroom_signaling::identity::{Directory, StaticDirectory};
use classroom_signaling::{api, logging, ClassroomError, ClassroomServer, Config, Result};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("classroom-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(&config.logging)?;

    let directory: Arc<dyn Directory> = match &config.directory_file {
        Some(path) => {
            let directory = StaticDirectory::load(path).await?;
            tracing::info!(path = %path, "Directory loaded");
            Arc::new(directory)
        }
        None => {
            tracing::warn!("DIRECTORY_FILE not set, no instructors or courses are known");
            Arc::new(StaticDirectory::new())
        }
    };

    if config.auth.dev_mode {
        tracing::warn!("Development mode: adminId/studentId query params are accepted");
    }
    if config.auth.jwt_secret.is_none() {
        if !config.auth.dev_mode {
            return Err(ClassroomError::MissingConfiguration("JWT_SECRET".to_string()));
        }
        tracing::warn!("JWT_SECRET not set, every token will be rejected");
    }

    let server = Arc::new(ClassroomServer::new(
        directory,
        config.auth.jwt_secret.as_deref(),
        config.auth.dev_mode,
        config.ice.clone(),
    ));

    let routes = api::routes(server.clone());

    let shutdown = {
        let server = server.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            let ended = server.shutdown().await;
            tracing::info!(rooms_ended = ended, "Shutting down");
        }
    };

    let (addr, serving) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.bind_address(), shutdown)
        .map_err(|e| {
            ClassroomError::InvalidConfiguration(format!(
                "Failed to bind {}:{}: {e}",
                config.server.host, config.server.port
            ))
        })?;

    tracing::info!(address = %addr, "Classroom signaling server listening");
    serving.await;
    Ok(())
}
