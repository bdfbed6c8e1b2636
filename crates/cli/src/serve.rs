use std::sync::Arc;

use {
    anyhow::Context,
    tocsin_api::AppState,
    tocsin_config::TocsinConfig,
    tocsin_scheduler::{
        Dispatcher, DispatcherConfig, Executor, ReqwestTransport, clock::SystemClock,
    },
    tracing::info,
};

use crate::storage;

/// Open storage, start the dispatcher and serve the API until a shutdown
/// signal, then stop the dispatcher.
pub async fn run(config: TocsinConfig) -> anyhow::Result<()> {
    let storage = storage::open(&config).await?;

    let transport = Arc::new(
        ReqwestTransport::from_config(&config.executor).context("failed to build HTTP client")?,
    );
    let executor = Arc::new(Executor::new(
        transport,
        storage.archive,
        Arc::new(SystemClock),
    ));
    let dispatcher = Dispatcher::new(
        storage.jobs,
        executor,
        DispatcherConfig::from(&config.scheduler),
    );
    dispatcher.start().await.context("failed to start dispatcher")?;

    let app = tocsin_api::router(AppState::new(Arc::clone(&dispatcher)));
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    dispatcher.stop().await;
    served.context("http server failed")?;
    info!("goodbye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
