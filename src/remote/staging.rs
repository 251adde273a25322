//! Per-run scratch directory for SSH credentials and uploaded artifacts.

use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Permissions, fs_utf8::Dir};
use tracing::warn;
use uuid::Uuid;

use super::RemoteError;

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// Owner-only directory `<root>/vista-<uuid>`, removed on drop.
#[derive(Debug)]
pub struct StagingDir {
    root: Dir,
    name: String,
    path: Utf8PathBuf,
    dir: Dir,
}

impl StagingDir {
    /// Creates a fresh staging directory below `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Staging`] when the directory cannot be created.
    pub fn create(root: &Utf8Path) -> Result<Self, RemoteError> {
        let name = format!("vista-{}", Uuid::new_v4());
        let path = root.join(&name);
        let io_error = |err: std::io::Error| RemoteError::Staging {
            path: path.clone(),
            message: err.to_string(),
        };

        let root_dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(io_error)?;
        root_dir.create_dir(&name).map_err(io_error)?;
        root_dir
            .set_permissions(&name, owner_only(DIR_MODE))
            .map_err(io_error)?;
        let dir = root_dir.open_dir(&name).map_err(io_error)?;

        Ok(Self {
            root: root_dir,
            name,
            path,
            dir,
        })
    }

    /// Creates a staging directory inside the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Staging`] when the temporary directory is not
    /// valid UTF-8 or the directory cannot be created.
    pub fn in_temp_dir() -> Result<Self, RemoteError> {
        let temp = Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            RemoteError::Staging {
                path: Utf8PathBuf::from(path.to_string_lossy().as_ref()),
                message: String::from("temporary directory path is not valid UTF-8"),
            }
        })?;
        Self::create(&temp)
    }

    /// Absolute path of the directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes `contents` to `file_name` with owner-only permissions.
    ///
    /// The returned guard deletes the file when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Staging`] when the file cannot be written.
    pub fn write_private(
        &self,
        file_name: &str,
        contents: &[u8],
    ) -> Result<StagedFile<'_>, RemoteError> {
        let path = self.path.join(file_name);
        let io_error = |err: std::io::Error| RemoteError::Staging {
            path: path.clone(),
            message: err.to_string(),
        };

        // Restrict the mode before the secret lands in the file.
        self.dir.write(file_name, b"").map_err(io_error)?;
        self.dir
            .set_permissions(file_name, owner_only(FILE_MODE))
            .map_err(io_error)?;
        self.dir.write(file_name, contents).map_err(io_error)?;

        Ok(StagedFile {
            dir: &self.dir,
            name: file_name.to_owned(),
            path,
        })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(err) = self.root.remove_dir_all(&self.name) {
            warn!(path = %self.path, error = %err, "failed to remove staging directory");
        }
    }
}

/// File written by [`StagingDir::write_private`], removed on drop.
#[derive(Debug)]
pub struct StagedFile<'a> {
    dir: &'a Dir,
    name: String,
    path: Utf8PathBuf,
}

impl StagedFile<'_> {
    /// Absolute path of the staged file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for StagedFile<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.dir.remove_file(&self.name) {
            warn!(path = %self.path, error = %err, "failed to remove staged file");
        }
    }
}

fn owner_only(mode: u32) -> Permissions {
    Permissions::from_std(std::fs::Permissions::from_mode(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non UTF-8 temp dir: {}", path.display()))
    }

    #[test]
    fn staged_files_are_owner_only_and_removed_on_drop() {
        let tmp = TempDir::new().expect("temp dir");
        let staging = StagingDir::create(&utf8_root(&tmp)).expect("staging dir");

        let path = {
            let staged = staging
                .write_private("key", b"secret")
                .expect("staged file");
            let metadata = std::fs::metadata(staged.path()).expect("metadata");
            assert_eq!(metadata.permissions().mode() & 0o777, FILE_MODE);
            assert_eq!(std::fs::read(staged.path()).expect("read"), b"secret");
            staged.path().to_path_buf()
        };

        assert!(!path.exists());
        assert!(staging.path().exists());
    }

    #[test]
    fn directory_is_removed_with_its_contents() {
        let tmp = TempDir::new().expect("temp dir");
        let staging = StagingDir::create(&utf8_root(&tmp)).expect("staging dir");
        let dir_path = staging.path().to_path_buf();
        assert!(
            dir_path
                .file_name()
                .is_some_and(|name| name.starts_with("vista-"))
        );

        let staged = staging.write_private("cert", b"cert").expect("staged");
        std::mem::forget(staged);
        drop(staging);

        assert!(!dir_path.exists());
    }

    #[test]
    fn runs_get_distinct_directories() {
        let tmp = TempDir::new().expect("temp dir");
        let root = utf8_root(&tmp);
        let first = StagingDir::create(&root).expect("first");
        let second = StagingDir::create(&root).expect("second");
        assert_ne!(first.path(), second.path());
    }
}
