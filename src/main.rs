use clap::{Parser, Subcommand};
use tracing::info;

mod api;
mod config;
mod identity;
mod mailer;
mod store;
mod sweeper;
mod types;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the OTP service.
    Serve {
        /// Path to the config file.
        config: String,

        /// The address to bind to.
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        address: String,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config, address } => serve(&config, &address).await,
    }
}

async fn serve(config_path: &str, address: &str) -> color_eyre::Result<()> {
    use color_eyre::eyre::Context;

    let config = config::load(config_path)?;

    let store = store::OtpStore::new(config.otp.clone());
    let mailer = mailer::SmtpMailer::new(&config.smtp)?;
    let identity = identity::RestIdentityProvider::new(&config.identity);

    let sweeper = sweeper::spawn(store.clone(), config.otp.sweep_interval_secs);

    let router = api::create_router(store, mailer, identity);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .wrap_err_with(|| format!("failed to bind to {address}"))?;

    info!(address = %address, "OTP service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    // Stops the background eviction task.
    drop(sweeper);

    info!("shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
