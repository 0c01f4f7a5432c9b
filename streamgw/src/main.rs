#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

mod cache;
mod config;
mod engine;
mod error;
mod http;
mod range;
mod worker;

use std::sync::Arc;

use axum::extract::Extension;
use clap::Parser;
use msgstore_client::HttpBackendTransport;
use tracing_subscriber::filter::EnvFilter;

use config::Args;
use engine::Engine;

fn main() {
    init_logging();

    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to start the tokio runtime");
    rt.block_on(run(args)).expect("Failed to run the gateway");
}

async fn run(args: Args) -> error::Result<()> {
    let credentials = args.load_credentials()?;
    let workers = args.load_workers(&credentials)?;
    tracing::info!(workers = workers.len(), "worker pool assembled");

    let transport = Arc::new(
        HttpBackendTransport::new(&credentials).map_err(error::Error::init_error)?,
    );
    let engine = Arc::new(Engine::new(transport, workers, args.engine_config()));

    cache::spawn_sweeper(engine.cache().clone(), engine.clean_interval());

    let app = http::get_router();

    #[cfg(debug_assertions)]
    let app = app.layer(tower_http::trace::TraceLayer::new_for_http());

    let app = app.layer(Extension(engine));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .map_err(error::Error::init_error)?;

    tracing::info!(addr = %args.listen, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(error::Error::init_error)?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        return EnvFilter::new("info")
            .add_directive("streamgw=debug".parse().unwrap())
            .add_directive("msgstore_client=debug".parse().unwrap());

        #[cfg(not(debug_assertions))]
        return EnvFilter::new("info");
    });

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .init();
}
