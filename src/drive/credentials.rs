//! OAuth token persistence.
//!
//! The token is read through the store on every upload, so replacing
//! `token.json` on disk takes effect on the next request.

use crate::error::PressError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// An OAuth token set as returned by the token endpoint.
///
/// The on-disk shape matches the `token.json` written by Google's Node
/// client (`expiry_date` in epoch milliseconds), so an existing file can be
/// reused as-is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry as epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            scope: None,
            token_type: default_token_type(),
            expiry_date: None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date.and_then(DateTime::from_timestamp_millis)
    }

    pub fn set_expires_at(&mut self, at: DateTime<Utc>) {
        self.expiry_date = Some(at.timestamp_millis());
    }

    /// True if the token is expired or expires within `margin` of `now`.
    /// A token without an expiry never expires.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now + margin)
    }
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

/// Where the OAuth token lives.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The stored token, or `None` if authorization never happened.
    async fn load(&self) -> Result<Option<StoredToken>, PressError>;

    /// Replace the stored token.
    async fn save(&self, token: &StoredToken) -> Result<(), PressError>;
}

// ── File ─────────────────────────────────────────────────────────────────

/// Token kept in a JSON file. Writes go to a sibling temp file and are
/// renamed into place.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<StoredToken>, PressError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PressError::Credentials(format!(
                    "cannot read '{}': {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            PressError::Credentials(format!("'{}' is not a token file: {e}", self.path.display()))
        })
    }

    async fn save(&self, token: &StoredToken) -> Result<(), PressError> {
        let io_err = |e: std::io::Error| {
            PressError::Credentials(format!("cannot write '{}': {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(token)
            .map_err(|e| PressError::Credentials(format!("cannot encode token: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &body).await.map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_err)?;
        }
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        debug!("Saved OAuth token to {}", self.path.display());
        Ok(())
    }
}

// ── Memory ───────────────────────────────────────────────────────────────

/// Token held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<StoredToken>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: StoredToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<StoredToken>, PressError> {
        Ok(self.token.read().await.clone())
    }

    async fn save(&self, token: &StoredToken) -> Result<(), PressError> {
        *self.token.write().await = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> StoredToken {
        let mut t = StoredToken::new("ya29.access");
        t.refresh_token = Some("1//refresh".into());
        t.scope = Some("https://www.googleapis.com/auth/drive.file".into());
        t.expiry_date = Some(1_760_000_000_000);
        t
    }

    #[tokio::test]
    async fn file_store_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/token.json"));
        assert!(store.load().await.unwrap().is_none());

        store.save(&token()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(token()));
        assert!(!dir.path().join("nested/token.json.tmp").exists());
    }

    #[tokio::test]
    async fn reads_node_client_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"access_token":"a","refresh_token":"r","scope":"s","token_type":"Bearer","expiry_date":1700000000000}"#,
        )
        .unwrap();
        let t = FileCredentialStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(t.access_token, "a");
        assert_eq!(t.expires_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "nope").unwrap();
        let err = FileCredentialStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, PressError::Credentials(_)));
    }

    #[tokio::test]
    async fn memory_store_replaces_token() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&token()).await.unwrap();
        let mut newer = token();
        newer.access_token = "ya29.newer".into();
        store.save(&newer).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().access_token, "ya29.newer");
    }

    #[test]
    fn expiry_margin() {
        let now = Utc::now();
        let mut t = StoredToken::new("a");
        assert!(!t.expires_within(Duration::seconds(60), now));

        t.set_expires_at(now + Duration::seconds(30));
        assert!(t.expires_within(Duration::seconds(60), now));

        t.set_expires_at(now + Duration::minutes(10));
        assert!(!t.expires_within(Duration::seconds(60), now));
    }

    #[test]
    fn debug_hides_secrets() {
        let s = format!("{:?}", token());
        assert!(!s.contains("ya29.access"));
        assert!(!s.contains("1//refresh"));
    }
}
