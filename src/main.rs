use alchemon::{
    config::{
        AppConfig,
        Cli,
    },
    logging,
    wallet,
};
use clap::Parser;
use color_eyre::eyre::Result;

mod app;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = AppConfig::from_cli(Cli::parse())?;
    let _log_guard = logging::init_tracing(&config.log_dir)?;
    tracing::info!("starting alchemon client");
    // Unlock before raw mode so the password prompt can use the terminal
    let unlocked = match &config.wallet {
        Some(name) => {
            let descriptor = wallet::find_wallet(&config.wallet_dir, name)?;
            Some(wallet::prompt_unlock(&descriptor)?)
        }
        None => None,
    };
    app::run_app(config, unlocked).await
}
