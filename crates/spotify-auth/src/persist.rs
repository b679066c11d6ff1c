//! Credential file persistence
//!
//! Serializes a credential record to JSON. Writes go to a temp file in the
//! same directory which is then renamed over the target, so a crash never
//! leaves a half-written file. Files are created with 0600 permissions on
//! unix since they hold tokens and the client secret.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::credentials::{ClientCredentials, UserCredentials};
use crate::error::{Error, Result};

/// A record that can be stored under a default file name in a directory.
pub trait StoredCredential: Serialize + DeserializeOwned {
    const FILE_NAME: &'static str;
}

impl StoredCredential for ClientCredentials {
    const FILE_NAME: &'static str = "Spotify_ClientCredentials.json";
}

impl StoredCredential for UserCredentials {
    const FILE_NAME: &'static str = "Spotify_UserCredentials.json";
}

/// Default location of a record of type `T` inside `dir`.
pub fn default_path<T: StoredCredential>(dir: &Path) -> PathBuf {
    dir.join(T::FILE_NAME)
}

/// Atomically write `record` to `path`.
pub async fn save<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("credentials");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

/// Read a record previously written with [`save`].
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading credential file {}: {e}", path.display())))?;
    let record = serde_json::from_str(&contents)
        .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
    debug!(path = %path.display(), "loaded credentials");
    Ok(record)
}

/// Delete a credential file. Missing files are not an error.
pub async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
    }
}
