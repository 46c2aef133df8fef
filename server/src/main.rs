use clap::Parser;
use log::{error, info};
use server::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = shared::DEFAULT_BIND_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Chat server starting on {}...", address);

    let server = Server::bind(&address).await.map_err(|e| {
        error!("Server error: {}", e);
        e
    })?;

    server.run_until(shutdown_signal()).await.map_err(|e| {
        error!("Server error: {}", e);
        e
    })?;

    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed the server keeps
/// running until killed.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
