//! Google Drive upload.
//!
//! * [`credentials`]: where the OAuth token lives ([`CredentialStore`])
//! * [`oauth`]: consent URL, code exchange and refresh ([`Authorizer`])
//! * [`upload`]: multipart file creation and sharing ([`DriveClient`])
//!
//! Each piece takes its collaborators as constructor arguments. Tests use
//! [`MemoryCredentialStore`] and point every endpoint at a local mock.

pub mod credentials;
pub mod oauth;
pub mod upload;

pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredToken};
pub use oauth::{Authorizer, OAuthClient};
pub use upload::{DriveClient, DriveFile};
