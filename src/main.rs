use fleet_dashboard::{AppConfig, app};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::from_env();

    // Optional first argument overrides the listen address
    if let Some(addr) = env::args().nth(1) {
        config = config.with_listen_addr(&addr);
    }

    app::run(config).await?;

    Ok(())
}
