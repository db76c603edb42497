use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use horus_operator::config::Config;
use horus_operator::operator::Operator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::parse();
    Operator::new(config).run().await
}
