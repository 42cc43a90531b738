// main.rs
use dotenvy::dotenv;
use poll_backend::{config::Config, start_server, BoxError};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok(); // Load environment variables from .env file

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    start_server(config).await
}
