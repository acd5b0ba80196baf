use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use reqwest::Client;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::api::departures::DepartureSample;
use crate::api::{DashboardSource, HttpSource};
use crate::auth::{HttpTokenExchange, JsonTokenStorage, SystemClock, TokenClient};
use crate::config::Config;
use crate::display::PbmDisplay;
use crate::poll::{PollLoop, PollSettings};
use crate::render::Layout;

#[derive(Parser)]
#[clap(version, about = "Transit departures and bike availability on an e-paper panel")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[clap(short, long, parse(from_occurrences))]
    pub verbose: usize,

    #[clap(short, long, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh the panel forever
    Run,
    /// Make sure a valid access token is cached
    Authenticate,
    /// Print the next departures
    Departures,
    /// Print the bikes available at the configured station
    Bikes,
    /// Render a single frame to a PBM file
    Render {
        #[clap(short, long, help = "Where to write the frame")]
        output: PathBuf,
    },
}

type Source<'a> = HttpSource<'a, JsonTokenStorage, HttpTokenExchange, SystemClock>;

pub struct App<'a> {
    config: &'a Config,
    source: Source<'a>,
}

impl<'a> App<'a> {
    pub fn new(config: &'a Config, storage: &'a JsonTokenStorage) -> Result<App<'a>> {
        let credential = config.credential()?;
        let client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("failed to build HTTP client")?;

        let exchange = HttpTokenExchange::new(
            client.clone(),
            config.token_url().context("invalid token_url")?,
        );
        let tokens = TokenClient::new(credential, storage, exchange, client.clone());

        let source = HttpSource::new(
            tokens,
            client,
            config.departures_url().context("invalid api_url")?,
            config.departures_per_direction,
        )
        .with_station(
            config
                .station_status_url()
                .context("invalid station_status_url")?,
            &config.station_id,
        );

        Ok(Self { config, source })
    }

    /// Returns the unix expiry of the token now in the cache.
    pub async fn authenticate(&mut self) -> Result<i64> {
        let tokens = self.source.tokens();
        tokens.get_valid_token().await?;

        tokens
            .expires_at()
            .context("token client holds no token after a successful exchange")
    }

    pub async fn departures(&mut self) -> Result<Vec<DepartureSample>> {
        Ok(self.source.departures().await?)
    }

    pub async fn bikes(&mut self) -> Result<Option<u32>> {
        Ok(self.source.bike_availability().await?)
    }

    pub async fn render_to(self, output: PathBuf) -> Result<()> {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let display = PbmDisplay::new(dir, self.config.width, self.config.height);
        let settings = self.poll_settings();

        let mut poll = PollLoop::new(self.source, display, settings);
        let frame = poll.compose(&Local::now()).await;
        log::debug!("rendered frame with {} black pixels", frame.ink_count());

        std::fs::write(&output, frame.to_pbm())
            .with_context(|| format!("failed to write {:?}", output))?;
        Ok(())
    }

    /// Runs the poll loop until it fails or the process is interrupted.
    pub async fn run(self) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("failed to create output dir {:?}", self.config.output_dir)
        })?;
        let display = PbmDisplay::new(
            self.config.output_dir.clone(),
            self.config.width,
            self.config.height,
        );
        let settings = self.poll_settings();
        let mut poll = PollLoop::new(self.source, display, settings);

        log::info!("running dashboard");
        poll.run_until(shutdown_signal())
            .await
            .context("display failed")
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: self.config.poll_interval(),
            ready_poll_interval: self.config.ready_poll_interval(),
            full_refresh_threshold: self.config.full_refresh_threshold,
            clock_format: self.config.clock_format.clone(),
            background_path: self.config.background_path.clone(),
            layout: Layout::default(),
        }
    }
}

/// Resolves on ctrl + c, or on SIGTERM where there is one.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl + c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("ctrl + c: exit requested by user"),
        _ = terminate => log::info!("SIGTERM: exit requested by the service manager"),
    }
}

pub fn format_expiry(expires_at: i64) -> String {
    match Local.timestamp_opt(expires_at, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => expires_at.to_string(),
    }
}
