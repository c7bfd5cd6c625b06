use bot::BotService;
use config::AppConfig;
use state::AppState;

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

mod bot;
mod command;
mod config;
mod error;
mod handler;
mod service;
mod state;
mod storage;
mod utils;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();

    info!("Starting bot...");

    let config = AppConfig::from_env()?;

    info!("Initializing AppState...");
    let state = AppState::new(config).await?;

    let bot_service = BotService::new(state);

    bot_service.start().await.map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
