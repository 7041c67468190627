/// Durable storage for the OAuth2 credential
use log::{debug, info};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::models::{Credential, CredentialRecord};

/// Load and persist the token pair
///
/// `load` reports a missing or empty record as [`StoreError::NotFound`] and
/// leaves it to the caller to decide whether that is fatal. `save` must never
/// let a concurrent `load` see a half-written record.
pub trait CredentialStore {
    fn load(&self) -> Result<Credential, StoreError>;
    fn save(&self, credential: &Credential) -> Result<(), StoreError>;
}

/// Credential record kept as pretty-printed JSON on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Persist {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for JsonFileStore {
    fn load(&self) -> Result<Credential, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Err(StoreError::NotFound {
                path: self.path.clone(),
            });
        }

        let record: CredentialRecord =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        info!("Using stored {}", self.path.display());
        Ok(record.into())
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let record = CredentialRecord::from(credential);
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| self.persist_error(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        // Temp file must live on the same filesystem for the rename to be atomic
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.persist_error(e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| self.persist_error(e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| self.persist_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.persist_error(e.error))?;

        debug!("Credential record written to {}", self.path.display());
        Ok(())
    }
}

impl From<CredentialRecord> for Credential {
    fn from(record: CredentialRecord) -> Self {
        Credential {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            // Records without an explicit expiry are refreshed on the first cycle
            expires_at: record.expires_at.unwrap_or(OffsetDateTime::UNIX_EPOCH),
            expires_in: record.expires_in,
        }
    }
}

impl From<&Credential> for CredentialRecord {
    fn from(credential: &Credential) -> Self {
        CredentialRecord {
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            expires_in: credential.expires_in,
            expires_at: Some(credential.expires_at),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_credential() -> Credential {
        Credential {
            access_token: "5e3c|access".into(),
            refresh_token: "5e3c|refresh".into(),
            expires_at: datetime!(2026-10-19 10:46:40 UTC),
            expires_in: Some(10800),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("token.json"));

        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn empty_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "  \n").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{\"access_token\": 42").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
    }

    #[test]
    fn saved_credential_is_visible_to_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        JsonFileStore::new(&path).save(&sample_credential()).unwrap();

        // A fresh instance stands in for a process restart
        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded, sample_credential());
    }

    #[test]
    fn save_replaces_previous_record_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = JsonFileStore::new(&path);

        store.save(&sample_credential()).unwrap();
        let mut rotated = sample_credential();
        rotated.refresh_token = "5e3c|rotated".into();
        store.save(&rotated).unwrap();

        assert_eq!(store.load().unwrap().refresh_token, "5e3c|rotated");
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary files must be renamed away");
    }

    #[test]
    fn hand_written_record_without_expiry_is_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"access_token": "a", "refresh_token": "r", "expires_in": 10800, "scope": ["read_station"]}"#,
        )
        .unwrap();

        let credential = JsonFileStore::new(path).load().unwrap();
        assert_eq!(credential.refresh_token, "r");
        assert_eq!(credential.expires_in, Some(10800));
        assert!(credential.is_expired(OffsetDateTime::now_utc()));
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent").join("token.json"));

        assert!(matches!(
            store.save(&sample_credential()),
            Err(StoreError::Persist { .. })
        ));
    }
}
