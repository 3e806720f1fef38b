use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rollcall::config::{LogFormat, ServiceArgs};
use rollcall::{
    AppState, Dispatcher, SmtpTransport, TransportPtr, UnavailableTransport, build_app,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServiceArgs::parse();
    init_tracing(args.log_format);

    let addr = args.bind_addr()?;
    let dispatcher_config = args.dispatcher_config()?;

    // A transport that cannot be built is reported per dispatch, not fatal at startup
    let transport: TransportPtr = match SmtpTransport::from_config(&args.smtp_config()) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "Failed to construct SMTP transport");
            Arc::new(UnavailableTransport::new(e.to_string()))
        }
    };

    let dispatcher = Dispatcher::new(transport, dispatcher_config);

    #[cfg(feature = "metrics")]
    let state = {
        let metrics = rollcall::DispatchMetrics::new(prometheus::Registry::new())?;
        let mut state = AppState::new(Arc::new(dispatcher.with_metrics(metrics.clone())));
        state.metrics = Some(metrics);
        state
    };
    #[cfg(not(feature = "metrics"))]
    let state = AppState::new(Arc::new(dispatcher));

    let app = build_app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(%addr, "Server listening");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}
