use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use crate::constants::STAGING_DIR;
use crate::error::UploadError;
use crate::upload::ValidatedUpload;

const MAX_NAME_ATTEMPTS: u32 = 100;

/// Aggregate size of the files waiting in the incoming directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirUsage {
    pub bytes: u64,
}

impl DirUsage {
    pub fn plus(self, bytes: u64) -> Self {
        Self {
            bytes: self.bytes.saturating_add(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct IncomingDir {
    root: PathBuf,
}

impl IncomingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_exists(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(UploadError::storage(&self.root))
    }

    /// Sums the sizes of the regular files directly inside the directory.
    /// Partial writes live in the staging subdirectory and are not counted.
    pub async fn usage(&self) -> Result<DirUsage, UploadError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DirUsage::default()),
            Err(e) => return Err(UploadError::storage(&self.root)(e)),
        };

        let mut usage = DirUsage::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(UploadError::storage(&self.root))?
        {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed by an admin between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(UploadError::storage(entry.path())(e)),
            };
            if meta.is_file() {
                usage = usage.plus(meta.len());
            }
        }
        Ok(usage)
    }

    /// Writes the upload under its safe name, never replacing an existing
    /// file. `stamp` disambiguates the name on collision.
    pub async fn store(
        &self,
        upload: &ValidatedUpload,
        stamp: &str,
    ) -> Result<StoredFile, UploadError> {
        let root = self.root.clone();
        let name = upload.safe_name.clone();
        let content = upload.content.clone();
        let stamp = stamp.to_string();

        tokio::task::spawn_blocking(move || store_blocking(&root, &name, &content, &stamp))
            .await
            .map_err(|e| UploadError::storage(&self.root)(io::Error::other(e)))?
    }
}

fn store_blocking(
    root: &Path,
    name: &str,
    content: &Bytes,
    stamp: &str,
) -> Result<StoredFile, UploadError> {
    let staging = root.join(STAGING_DIR);
    std::fs::create_dir_all(&staging).map_err(UploadError::storage(&staging))?;
    let mut tmp = NamedTempFile::new_in(&staging).map_err(UploadError::storage(&staging))?;
    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(UploadError::storage(tmp.path()))?;
    make_world_readable(&tmp).map_err(UploadError::storage(tmp.path()))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = candidate_name(name, stamp, attempt);
        let target = root.join(&candidate);
        match tmp.persist_noclobber(&target) {
            Ok(_) => {
                return Ok(StoredFile {
                    name: candidate,
                    path: target,
                    size: content.len() as u64,
                })
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(name = %candidate, "name taken, trying another");
                tmp = e.file;
            }
            Err(e) => return Err(UploadError::storage(target)(e.error)),
        }
    }

    Err(UploadError::storage(root.join(name))(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free name for upload",
    )))
}

fn candidate_name(name: &str, stamp: &str, attempt: u32) -> String {
    match attempt {
        0 => name.to_string(),
        1 => format!("{name}.{stamp}"),
        n => format!("{name}.{stamp}.{n}"),
    }
}

#[cfg(unix)]
fn make_world_readable(tmp: &NamedTempFile) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn make_world_readable(_tmp: &NamedTempFile) -> io::Result<()> {
    Ok(())
}

/// Upload time in the `seconds.micros` form used for collision suffixes.
pub fn upload_stamp(now: OffsetDateTime) -> String {
    format!("{}.{:06}", now.unix_timestamp(), now.microsecond())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn validated(name: &str, content: &[u8]) -> ValidatedUpload {
        ValidatedUpload {
            original_name: name.to_string(),
            safe_name: name.to_string(),
            content: Bytes::copy_from_slice(content),
        }
    }

    #[tokio::test]
    async fn missing_directory_has_zero_usage() {
        let tmp = TempDir::new().unwrap();
        let dir = IncomingDir::new(tmp.path().join("incoming"));
        assert_eq!(dir.usage().await.unwrap(), DirUsage::default());
    }

    #[tokio::test]
    async fn usage_counts_regular_files_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.zip"), vec![0u8; 9000]).unwrap();
        std::fs::write(tmp.path().join("b.txt"), vec![0u8; 34]).unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub").join("c.zip"), vec![0u8; 100]).unwrap();

        let dir = IncomingDir::new(tmp.path());
        assert_eq!(dir.usage().await.unwrap().bytes, 9034);
    }

    #[tokio::test]
    async fn abandoned_partial_writes_do_not_count() {
        let tmp = TempDir::new().unwrap();
        let dir = IncomingDir::new(tmp.path());
        dir.store(&validated("a.zip", &[0u8; 300]), "0.0")
            .await
            .unwrap();
        std::fs::write(tmp.path().join(STAGING_DIR).join(".tmpXyZ123"), vec![0u8; 5000]).unwrap();

        assert_eq!(dir.usage().await.unwrap().bytes, 300);
        let names: Vec<_> = std::fs::read_dir(tmp.path().join(STAGING_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![".tmpXyZ123"]);
    }

    #[tokio::test]
    async fn stored_bytes_read_back_identically() {
        let tmp = TempDir::new().unwrap();
        let dir = IncomingDir::new(tmp.path());
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let stored = dir
            .store(&validated("game.zip", &content), "1.000001")
            .await
            .unwrap();

        assert_eq!(stored.name, "game.zip");
        assert_eq!(stored.size, 4096);
        assert_eq!(std::fs::read(&stored.path).unwrap(), content);
    }

    #[tokio::test]
    async fn collisions_get_suffixes_instead_of_overwriting() {
        let tmp = TempDir::new().unwrap();
        let dir = IncomingDir::new(tmp.path());

        let first = dir.store(&validated("game.zip", b"one"), "17.5").await.unwrap();
        let second = dir.store(&validated("game.zip", b"two"), "17.5").await.unwrap();
        let third = dir.store(&validated("game.zip", b"three"), "17.5").await.unwrap();

        assert_eq!(first.name, "game.zip");
        assert_eq!(second.name, "game.zip.17.5");
        assert_eq!(third.name, "game.zip.17.5.2");
        assert_eq!(std::fs::read(&first.path).unwrap(), b"one");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"two");
        assert_eq!(std::fs::read(&third.path).unwrap(), b"three");
    }

    #[tokio::test]
    async fn usage_grows_by_stored_size() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("old.zip"), vec![0u8; 9000]).unwrap();
        let dir = IncomingDir::new(tmp.path());

        dir.store(&validated("new.zip", &[1u8; 500]), "0.0")
            .await
            .unwrap();

        assert_eq!(dir.usage().await.unwrap().bytes, 9500);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stored_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = IncomingDir::new(tmp.path());
        let stored = dir.store(&validated("a.txt", b"x"), "0.0").await.unwrap();
        let mode = std::fs::metadata(&stored.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn stamp_format() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
            + time::Duration::microseconds(42);
        assert_eq!(upload_stamp(now), "1700000000.000042");
    }
}
