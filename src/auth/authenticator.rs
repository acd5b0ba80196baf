use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Response};
use thiserror::Error;
use url::Url;

use crate::auth::storage::{CacheLookup, TokenStorage};
use crate::auth::token::{Credential, TokenRecord, TokenResponse};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed token response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("token lifetime of {0} seconds is out of range")]
    InvalidLifetime(u64),
}

impl AuthError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Rejected { status, .. } => Some(*status),
            AuthError::Transport(err) => err.status().map(|s| s.as_u16()),
            AuthError::MalformedResponse(_) | AuthError::InvalidLifetime(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Source of the current unix time in seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Performs the client-credentials grant against a token endpoint.
#[async_trait]
pub trait TokenExchange {
    async fn exchange(&self, credential: &Credential) -> Result<TokenResponse, AuthError>;
}

#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: Client,
    token_url: Url,
}

impl HttpTokenExchange {
    pub fn new(client: Client, token_url: Url) -> Self {
        Self { client, token_url }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, credential: &Credential) -> Result<TokenResponse, AuthError> {
        let params = [("grant_type", "client_credentials")];

        let response = self
            .client
            .post(self.token_url.clone())
            .header(AUTHORIZATION, credential.basic_header())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Hands out a bearer token that is valid right now, exchanging the
/// credential for a new one only when the cached token is missing or expired.
pub struct TokenClient<'a, Storage, Exchange, C = SystemClock>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
    C: Clock,
{
    credential: Credential,
    storage: &'a Storage,
    exchange: Exchange,
    clock: C,
    http: Client,
    current: Option<TokenRecord>,
}

impl<'a, Storage, Exchange> TokenClient<'a, Storage, Exchange, SystemClock>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
{
    pub fn new(
        credential: Credential,
        storage: &'a Storage,
        exchange: Exchange,
        http: Client,
    ) -> Self {
        Self::with_clock(credential, storage, exchange, http, SystemClock)
    }
}

impl<'a, Storage, Exchange, C> TokenClient<'a, Storage, Exchange, C>
where
    Storage: TokenStorage,
    Exchange: TokenExchange,
    C: Clock,
{
    pub fn with_clock(
        credential: Credential,
        storage: &'a Storage,
        exchange: Exchange,
        http: Client,
        clock: C,
    ) -> Self {
        let current = match storage.load() {
            CacheLookup::Hit(record) => {
                log::debug!("loaded cached token expiring at {}", record.expires_at);
                Some(record)
            }
            CacheLookup::Missing => {
                log::debug!("no cached token");
                None
            }
            CacheLookup::Corrupt(reason) => {
                log::warn!("ignoring corrupt token cache: {}", reason);
                None
            }
        };

        Self {
            credential,
            storage,
            exchange,
            clock,
            http,
            current,
        }
    }

    /// Expiry of the token currently held in memory, if any.
    pub fn expires_at(&self) -> Option<i64> {
        self.current.as_ref().map(|record| record.expires_at)
    }

    pub async fn get_valid_token(&mut self) -> Result<String, AuthError> {
        let now = self.clock.now();

        if let Some(record) = self.current.as_ref().filter(|r| r.is_valid_at(now)) {
            return Ok(record.access_token.clone());
        }

        log::info!("token missing or expired, fetching new");
        self.exchange().await.map_err(|err| {
            log::warn!("token exchange failed (status {:?}): {}", err.status(), err);
            err
        })
    }

    async fn exchange(&mut self) -> Result<String, AuthError> {
        let response = self.exchange.exchange(&self.credential).await?;
        let record = TokenRecord::issued_at(
            response.access_token,
            self.clock.now(),
            response.expires_in,
        )
        .ok_or(AuthError::InvalidLifetime(response.expires_in))?;

        if let Err(err) = self.storage.save(&record) {
            log::warn!("failed to persist token cache: {:#}", err);
        }

        let access_token = record.access_token.clone();
        self.current = Some(record);

        Ok(access_token)
    }

    /// GET `url` with `headers` plus a bearer token from [`Self::get_valid_token`].
    pub async fn authenticated_get(
        &mut self,
        url: Url,
        mut headers: HeaderMap,
    ) -> Result<Response, RequestError> {
        let access_token = self.get_valid_token().await?;
        headers.remove(AUTHORIZATION);

        Ok(self
            .http
            .get(url)
            .headers(headers)
            .bearer_auth(access_token)
            .send()
            .await?)
    }
}
