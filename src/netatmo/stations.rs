/// Weather station readings from the Netatmo data endpoint
use log::debug;
use serde::Deserialize;
use url::Url;

use crate::config::BridgeConfig;
use crate::error::{ApiError, ConfigError};
use crate::models::StationReading;
use crate::netatmo::describe_failure;

const STATIONS_PATH: &str = "api/getstationsdata";

/// Source of station readings for the poll loop
pub trait StationApi {
    async fn fetch(&self, access_token: &str) -> Result<StationReading, ApiError>;
}

/// Authenticated client for `getstationsdata`
///
/// Makes exactly one request per call; retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct StationClient {
    http: reqwest::Client,
    stations_url: Url,
}

impl StationClient {
    pub fn new(http: reqwest::Client, config: &BridgeConfig) -> Result<Self, ConfigError> {
        let mut stations_url =
            config
                .base_url
                .join(STATIONS_PATH)
                .map_err(|e| ConfigError::Invalid {
                    key: "BASEURL",
                    value: config.base_url.to_string(),
                    reason: e.to_string(),
                })?;
        stations_url
            .query_pairs_mut()
            .append_pair("get_favorites", "false");

        Ok(Self { http, stations_url })
    }
}

impl StationApi for StationClient {
    async fn fetch(&self, access_token: &str) -> Result<StationReading, ApiError> {
        let response = self
            .http
            .get(self.stations_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("Station data response: HTTP {} ({} bytes)", status, body.len());

        decode_station_response(status, &body)
    }
}

/// Top-level envelope of the readings endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    body: Option<StationReading>,
}

/// Classify a readings endpoint response
///
/// Only HTTP 200 with `"status": "ok"` and a readable body is a success.
///
/// # Arguments
/// * `status` - HTTP status code of the response
/// * `body` - Raw response body
///
/// # Returns
/// The station reading, or an [`ApiError`] naming what was wrong with the response
pub fn decode_station_response(status: u16, body: &str) -> Result<StationReading, ApiError> {
    if status != 200 {
        return Err(ApiError::Status {
            status,
            message: describe_failure(body),
        });
    }

    let envelope: Envelope = serde_json::from_str(body).map_err(|e| ApiError::Malformed {
        message: e.to_string(),
    })?;

    match envelope.status.as_deref() {
        Some("ok") => {}
        Some(other) => {
            return Err(ApiError::NotOk {
                status: other.to_string(),
                message: describe_failure(body),
            })
        }
        None => {
            return Err(ApiError::Malformed {
                message: "response has no status field".into(),
            })
        }
    }

    envelope.body.ok_or_else(|| ApiError::Malformed {
        message: "response has no body".into(),
    })
}
