//! On-disk persistence of the device identity and installation id.
//!
//! Both files live in one per-user directory, are written atomically
//! through a temp file in the same directory, and are owner-only on Unix.
//! Loading never fails outright: unreadable data is replaced by a fresh
//! identity, and a failed write only costs persistence, not the identity.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::device::{DeviceIdentity, decode_key, derive_device_id};

// ============================================================================
// Constants
// ============================================================================

/// Identity file name.
const IDENTITY_FILE: &str = "device.json";

/// Installation id file name.
const INSTALLATION_ID_FILE: &str = "installation-id";

/// Identity file format version.
const IDENTITY_VERSION: u32 = 1;

/// Directory under `$HOME` used when none is configured.
const DEFAULT_DIR: &str = ".gateway-client/identity";

// ============================================================================
// StoredIdentity
// ============================================================================

/// Serialized form of [`DeviceIdentity`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    version: u32,
    device_id: String,
    public_key: String,
    private_key: String,
    created_at_ms: u64,
}

impl From<&DeviceIdentity> for StoredIdentity {
    fn from(identity: &DeviceIdentity) -> Self {
        Self {
            version: IDENTITY_VERSION,
            device_id: identity.device_id().to_string(),
            public_key: identity.public_key_base64url(),
            private_key: identity.private_key_base64url(),
            created_at_ms: identity.created_at_ms(),
        }
    }
}

// ============================================================================
// IdentityStore
// ============================================================================

/// Loads, creates and persists identity material in one directory.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    /// Creates a store rooted at `dir`.
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the default per-user identity directory.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_DIR))
    }

    /// Returns the store directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the identity file path.
    #[inline]
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE)
    }

    /// Returns the installation id file path.
    #[inline]
    #[must_use]
    pub fn installation_id_path(&self) -> PathBuf {
        self.dir.join(INSTALLATION_ID_FILE)
    }
}

// ============================================================================
// IdentityStore - Device Identity
// ============================================================================

impl IdentityStore {
    /// Loads the stored identity, creating and persisting one if needed.
    ///
    /// A stored device id that does not match the stored public key is
    /// corrected and rewritten. Any read or parse failure falls back to a
    /// new identity.
    pub fn load_or_create(&self) -> DeviceIdentity {
        let path = self.identity_path();

        match self.load() {
            Ok((identity, false)) => {
                debug!(device_id = %identity.device_id(), "Loaded device identity");
                identity
            }
            Ok((identity, true)) => {
                info!(device_id = %identity.device_id(), "Corrected stored device id");
                if let Err(e) = self.persist(&identity) {
                    warn!(error = %e, path = %path.display(), "Failed to rewrite device identity");
                }
                identity
            }
            Err(e) => {
                if matches!(&e, Error::Io(io) if io.kind() == ErrorKind::NotFound) {
                    debug!(path = %path.display(), "No device identity, generating");
                } else {
                    warn!(error = %e, path = %path.display(), "Unreadable device identity, regenerating");
                }

                let identity = DeviceIdentity::generate();
                match self.persist(&identity) {
                    Ok(()) => {
                        info!(device_id = %identity.device_id(), "Created device identity")
                    }
                    Err(e) => warn!(
                        error = %e,
                        path = %path.display(),
                        "Failed to persist device identity, using it in memory only"
                    ),
                }
                identity
            }
        }
    }

    /// Reads the identity file.
    ///
    /// Returns the identity and whether its stored device id was stale.
    fn load(&self) -> Result<(DeviceIdentity, bool)> {
        let text = fs::read_to_string(self.identity_path())?;
        let stored: StoredIdentity = serde_json::from_str(&text)?;

        if stored.version != IDENTITY_VERSION {
            return Err(Error::identity(format!(
                "unsupported identity version {}",
                stored.version
            )));
        }

        let signing_key = SigningKey::from_bytes(&decode_key(&stored.private_key)?);
        let public_key = decode_key(&stored.public_key)?;
        if signing_key.verifying_key().to_bytes() != public_key {
            return Err(Error::identity("stored public key does not match private key"));
        }

        let migrated = stored.device_id != derive_device_id(&public_key);
        let identity = DeviceIdentity::from_signing_key(signing_key, stored.created_at_ms);
        Ok((identity, migrated))
    }

    /// Writes the identity file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] if the file cannot be written.
    pub fn persist(&self, identity: &DeviceIdentity) -> Result<()> {
        let json = serde_json::to_string_pretty(&StoredIdentity::from(identity))?;
        self.write_private(&self.identity_path(), json.as_bytes())
    }
}

// ============================================================================
// IdentityStore - Installation Id
// ============================================================================

impl IdentityStore {
    /// Returns the persistent installation id, creating it on first use.
    pub fn installation_id(&self) -> String {
        let path = self.installation_id_path();

        if let Ok(text) = fs::read_to_string(&path) {
            let id = text.trim();
            if Uuid::parse_str(id).is_ok() {
                return id.to_string();
            }
            warn!(path = %path.display(), "Invalid installation id, regenerating");
        }

        let id = Uuid::new_v4().to_string();
        if let Err(e) = self.write_private(&path, id.as_bytes()) {
            warn!(error = %e, path = %path.display(), "Failed to persist installation id");
        }
        id
    }
}

// ============================================================================
// IdentityStore - File Helpers
// ============================================================================

impl IdentityStore {
    /// Creates the store directory with owner-only access.
    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    /// Atomically writes an owner-only file.
    fn write_private(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.ensure_dir()?;

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;
        }

        file.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
