use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::auth::{Clock, RequestError, TokenClient, TokenExchange, TokenStorage};

pub mod bikes;
pub mod departures;

use bikes::StationStatusFeed;
use departures::{DepartureSample, DeparturesResponse};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: Url },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Everything one dashboard cycle needs from the network.
#[async_trait(?Send)]
pub trait DashboardSource {
    async fn departures(&mut self) -> Result<Vec<DepartureSample>, FetchError>;

    /// `Ok(None)` when the station is not configured or not in the feed.
    async fn bike_availability(&mut self) -> Result<Option<u32>, FetchError>;
}

pub struct HttpSource<'a, Storage, Exchange, C>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
    C: Clock,
{
    tokens: TokenClient<'a, Storage, Exchange, C>,
    client: Client,
    departures_url: Url,
    per_direction: usize,
    station_status_url: Option<Url>,
    station_id: String,
}

impl<'a, Storage, Exchange, C> HttpSource<'a, Storage, Exchange, C>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
    C: Clock,
{
    pub fn new(
        tokens: TokenClient<'a, Storage, Exchange, C>,
        client: Client,
        departures_url: Url,
        per_direction: usize,
    ) -> Self {
        Self {
            tokens,
            client,
            departures_url,
            per_direction,
            station_status_url: None,
            station_id: String::new(),
        }
    }

    pub fn with_station(mut self, station_status_url: Option<Url>, station_id: &str) -> Self {
        self.station_status_url = station_status_url;
        self.station_id = station_id.to_owned();
        self
    }

    pub fn tokens(&mut self) -> &mut TokenClient<'a, Storage, Exchange, C> {
        &mut self.tokens
    }
}

#[async_trait(?Send)]
impl<'a, Storage, Exchange, C> DashboardSource for HttpSource<'a, Storage, Exchange, C>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
    C: Clock,
{
    async fn departures(&mut self) -> Result<Vec<DepartureSample>, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let url = self.departures_url.clone();
        let response = self.tokens.authenticated_get(url.clone(), headers).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let parsed: DeparturesResponse = serde_json::from_slice(&body)?;
        log::debug!("received {} departures", parsed.results.len());

        Ok(departures::summarize(&parsed.results, self.per_direction))
    }

    async fn bike_availability(&mut self) -> Result<Option<u32>, FetchError> {
        let url = match &self.station_status_url {
            Some(url) => url.clone(),
            None => return Ok(None),
        };

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let feed: StationStatusFeed = serde_json::from_slice(&body)?;
        let available = feed.available_bikes(&self.station_id);
        if available.is_none() {
            log::warn!("station {} is missing from the status feed", self.station_id);
        }

        Ok(available)
    }
}
