use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Seconds subtracted from the server-reported lifetime before a token is
/// considered expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,

    /// Unix seconds, already reduced by [`EXPIRY_MARGIN_SECS`].
    #[serde(deserialize_with = "from_json_number")]
    pub expires_at: i64,
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Builds the record for a token that was issued at `now` and lives for
    /// `expires_in` seconds. `None` when the expiry does not fit a timestamp.
    pub fn issued_at(access_token: impl Into<String>, now: i64, expires_in: u64) -> Option<Self> {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(|lifetime| now.checked_add(lifetime))
            .and_then(|at| at.checked_sub(EXPIRY_MARGIN_SECS))?;

        Some(Self::new(access_token, expires_at))
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && now < self.expires_at
    }
}

// Older cache files carry fractional timestamps.
fn from_json_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?.floor();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if !value.is_finite() || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "expires_at {} is not a unix timestamp",
            value
        )));
    }

    Ok(value as i64)
}

/// Base64 encoded `client-id:secret` pair sent as HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn basic_header(&self) -> String {
        format!("Basic {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    // token_type and scope are ignored
}
