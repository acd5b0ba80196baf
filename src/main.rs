use anyhow::Result;
use clap::Parser;
use cli_table::{print_stdout, WithTitle};

use crate::app::App;
use crate::config::Config;

mod api;
mod app;
mod auth;
mod config;
mod display;
mod poll;
mod render;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = app::Cli::parse();

    let mut logger = simple_logger::SimpleLogger::new().with_utc_timestamps();

    logger = match cli.verbose {
        0 => logger.with_level(log::LevelFilter::Error),
        1 => logger.with_level(log::LevelFilter::Info),
        2 => logger.with_level(log::LevelFilter::Debug),
        _ => logger.with_level(log::LevelFilter::Trace),
    };

    logger.init()?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    log::debug!("config path: {:?}", config_path);
    let config = Config::load(&config_path)?;

    log::debug!("token cache path: {:?}", config.token_cache_path);
    let storage = auth::JsonTokenStorage::new(config.token_cache_path.clone());

    let mut app_instance = App::new(&config, &storage)?;

    match cli.command {
        app::Commands::Run => app_instance.run().await?,
        app::Commands::Authenticate => {
            let expires_at = app_instance.authenticate().await?;
            println!(
                "Authenticated, token valid until {}",
                app::format_expiry(expires_at)
            );
        }
        app::Commands::Departures => {
            print_stdout(app_instance.departures().await?.with_title())?;
        }
        app::Commands::Bikes => match app_instance.bikes().await? {
            Some(count) => println!("{} bikes available at station {}", count, config.station_id),
            None => println!("Bike availability unknown"),
        },
        app::Commands::Render { output } => {
            app_instance.render_to(output.clone()).await?;
            println!("Frame written to {}", output.display());
        }
    }

    Ok(())
}
