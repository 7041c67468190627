/// Error types for every stage of the bridge
use std::path::PathBuf;

/// Missing or unusable configuration. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Credential record could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no stored credential at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credential record in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to persist credential to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The refresh-token grant failed. Stored credentials are left untouched.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed token response: {message}")]
    Malformed { message: String },
}

/// The station readings request failed or returned an unusable body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("station request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("station request returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("station API reported status {status:?}: {message}")]
    NotOk { status: String, message: String },

    #[error("malformed station response: {message}")]
    Malformed { message: String },
}

/// The message bus can no longer be used.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("bus connection closed")]
    Closed,
}

/// Outcome of a failed token refresh: either the grant itself or the
/// persistence of the new credential went wrong.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Persist(#[from] StoreError),
}

/// Fatal condition that ends the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credential(#[from] StoreError),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<RefreshError> for BridgeError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Auth(e) => BridgeError::Auth(e),
            RefreshError::Persist(e) => BridgeError::Credential(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_diagnostics() {
        let err = ApiError::Status {
            status: 403,
            message: "Invalid access_token".into(),
        };
        assert_eq!(
            err.to_string(),
            "station request returned HTTP 403: Invalid access_token"
        );

        let err = AuthError::Rejected {
            status: 400,
            message: "invalid_grant".into(),
        };
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("invalid_grant"));

        let err = ConfigError::Missing("CLIENT_ID");
        assert_eq!(err.to_string(), "CLIENT_ID environment variable not set");
    }

    #[test]
    fn refresh_error_maps_to_bridge_error() {
        let err: BridgeError = RefreshError::Persist(StoreError::NotFound {
            path: PathBuf::from("token.json"),
        })
        .into();
        assert!(matches!(err, BridgeError::Credential(_)));

        let err: BridgeError = RefreshError::Auth(AuthError::Malformed {
            message: "missing access_token".into(),
        })
        .into();
        assert!(matches!(err, BridgeError::Auth(_)));
    }
}
