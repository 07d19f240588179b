use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::services::session::generate_token;

const FILENAME_PREFIX_LENGTH: usize = 32;
const MAX_BASENAME_LENGTH: usize = 50;

/// Public URL prefix the upload root is served under.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

fn unsafe_filename_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("Invalid regex"))
}

/// Stores uploaded event images below `<root>/<events_dir>`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    events_dir: String,
    max_bytes: usize,
}

impl UploadStore {
    #[must_use]
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root_path),
            events_dir: config.events_dir.clone(),
            max_bytes: config.max_upload_bytes,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Writes the image and returns its public reference, `/uploads/events/<name>`.
    pub async fn save_event_image(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.len() > self.max_bytes {
            anyhow::bail!(
                "Upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_bytes
            );
        }

        let dir = self.root.join(&self.events_dir);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;

        let filename = secure_filename(original_name);
        let path = dir.join(&filename);
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload to {}", path.display()))?;

        info!(path = %path.display(), size = bytes.len(), "Stored event image");
        Ok(format!("{UPLOADS_URL_PREFIX}/{}/{filename}", self.events_dir))
    }

    /// Best-effort removal of a file previously returned by [`Self::save_event_image`].
    pub async fn delete_reference(&self, reference: &str) {
        let Some(path) = self.path_for_reference(reference) else {
            debug!(reference = %reference, "Ignoring foreign upload reference");
            return;
        };
        if let Err(e) = fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete old upload");
        }
    }

    fn path_for_reference(&self, reference: &str) -> Option<PathBuf> {
        let relative = reference
            .strip_prefix(UPLOADS_URL_PREFIX)?
            .trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|part| part == "..") {
            return None;
        }
        Some(self.root.join(relative))
    }
}

/// `<32 random alphanumerics>_<sanitized basename><.ext>`.
#[must_use]
pub fn secure_filename(original_name: &str) -> String {
    // browsers may send a full client-side path
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let path = Path::new(name);

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| unsafe_filename_chars().replace_all(e, "").into_owned())
        .filter(|e| !e.is_empty());

    let mut base: String = unsafe_filename_chars().replace_all(stem, "").into_owned();
    if base.chars().count() > MAX_BASENAME_LENGTH {
        base = base.chars().take(MAX_BASENAME_LENGTH).collect();
    }

    let prefix = generate_token(FILENAME_PREFIX_LENGTH);
    match extension {
        Some(ext) => format!("{prefix}_{base}.{ext}"),
        None => format!("{prefix}_{base}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> UploadStore {
        UploadStore::new(&UploadConfig {
            root_path: root.to_string_lossy().into_owned(),
            events_dir: "events".to_string(),
            max_upload_bytes: 16,
        })
    }

    #[test]
    fn test_secure_filename_shape() {
        let name = secure_filename("My Photo (1).JPG");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 32);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(rest, "MyPhoto1.JPG");
    }

    #[test]
    fn test_secure_filename_strips_paths_and_truncates() {
        let long = format!("C:\\Users\\x\\{}.png", "a".repeat(80));
        let name = secure_filename(&long);
        let rest = name.split_once('_').unwrap().1;
        assert_eq!(rest, format!("{}.png", "a".repeat(50)));

        let name = secure_filename("../../etc/passwd");
        assert!(name.ends_with("_passwd"));
    }

    #[tokio::test]
    async fn test_save_and_delete_round_trip() {
        let root = std::env::temp_dir().join(format!("eventdesk-uploads-{}", uuid::Uuid::new_v4()));
        let uploads = store(&root);

        let reference = uploads.save_event_image("cat.png", b"png").await.unwrap();
        assert!(reference.starts_with("/uploads/events/"));
        assert!(reference.ends_with("_cat.png"));

        let path = uploads.path_for_reference(&reference).unwrap();
        assert!(path.exists());

        uploads.delete_reference(&reference).await;
        assert!(!path.exists());
        // deleting again only logs
        uploads.delete_reference(&reference).await;

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let root = std::env::temp_dir().join(format!("eventdesk-uploads-{}", uuid::Uuid::new_v4()));
        let uploads = store(&root);
        assert!(uploads.save_event_image("big.bin", &[0u8; 17]).await.is_err());
    }

    #[test]
    fn test_foreign_references_are_ignored() {
        let uploads = store(Path::new("/tmp/x"));
        assert!(uploads.path_for_reference("/static/logo.png").is_none());
        assert!(uploads.path_for_reference("/uploads/../secret").is_none());
    }
}
