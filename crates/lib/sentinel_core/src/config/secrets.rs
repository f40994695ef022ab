//! Secret resolution: environment variable first, then a persisted file.
//!
//! A secret generated here is only returned once it is on disk. The
//! encryption key in particular must survive restarts, or every stored
//! email and MFA secret becomes unreadable.

use std::io;
use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;

/// Resolve a secret: env var `var` → file `name` under the data dir →
/// freshly generated and persisted.
pub fn resolve_secret(var: &str, name: &str) -> io::Result<String> {
    if let Ok(secret) = std::env::var(var)
        && !secret.is_empty()
    {
        return Ok(secret);
    }
    let path = secret_path(name);
    resolve_secret_file(&path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!(
                "{var} is unset and {} could not be used: {e}",
                path.display()
            ),
        )
    })
}

/// Read the secret stored at `path`, or generate one and write it there.
/// Any I/O failure other than a missing file is returned, never papered
/// over with an unpersisted secret.
pub fn resolve_secret_file(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(existing) if !existing.trim().is_empty() => return Ok(existing.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let secret = generate_secret();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &secret)?;
    info!(path = %path.display(), "generated new secret");
    Ok(secret)
}

/// 64 random alphanumeric characters.
pub fn generate_secret() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Path to a persisted secret file.
fn secret_path(name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sentinel")
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_long_and_distinct() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn generated_secret_is_persisted_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("encryption-key");
        let first = resolve_secret_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(resolve_secret_file(&path).unwrap(), first);
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        assert!(resolve_secret_file(&blocker.join("encryption-key")).is_err());
    }

    #[test]
    fn blank_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access-secret");
        std::fs::write(&path, "  \n").unwrap();
        let secret = resolve_secret_file(&path).unwrap();
        assert_eq!(secret.len(), 64);
    }
}
