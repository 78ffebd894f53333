use std::path::{Path, PathBuf};

use nanoid::nanoid;

use super::{AppResult, ErrType};

pub mod tmp;

const TMP_PREFIX: &str = "cold_";
const TMP_NAME_ATTEMPTS: usize = 8;

/// Manage the directories touched by the pipeline
///
/// * variants land flat in `storage_dir`
/// * downloads are staged in `tmp_dir` and never outlive a call
pub struct Storage {
    /// Must exist before the pipeline is built
    storage_dir: PathBuf,

    /// Created on demand
    tmp_dir: PathBuf,
}

async fn create_dir(dir: &Path) -> AppResult<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|err| ErrType::FsError.err(err, format!("Failed to create dir {dir:?}")))
}

pub(crate) async fn create_file(file_path: &Path) -> AppResult<tokio::fs::File> {
    tokio::fs::File::create(file_path)
        .await
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to create/truncate file {file_path:?}")))
}

pub(crate) async fn remove_file(file_path: &Path) -> AppResult<()> {
    tokio::fs::remove_file(file_path)
        .await
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to remove file {file_path:?}")))
}

pub(crate) async fn rename_file(from: &Path, to: &Path) -> AppResult<()> {
    tokio::fs::rename(from, to)
        .await
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to rename {from:?} to {to:?}")))
}

/// Whether `name` stays a single component once joined with a directory
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

/// `<local_name>.<spec_name><ext>`
pub fn variant_file_name(local_name: &str, spec_name: &str, ext: &str) -> String {
    format!("{local_name}.{spec_name}{ext}")
}

impl Storage {
    pub async fn new(storage_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let storage_dir = storage_dir.into();
        let tmp_dir = tmp_dir.into();

        let meta = tokio::fs::metadata(&storage_dir)
            .await
            .map_err(|err| ErrType::FsError.err(err, format!("Storage dir {storage_dir:?} is not accessible")))?;
        if !meta.is_dir() {
            return Err(ErrType::FsError.msg(format!("Storage dir {storage_dir:?} is not a directory")));
        }

        create_dir(&tmp_dir).await?;

        Ok(Self {
            storage_dir,
            tmp_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Full destination path of a variant along with its bare file name
    pub fn variant_path(&self, local_name: &str, spec_name: &str, ext: &str) -> (PathBuf, String) {
        let name = variant_file_name(local_name, spec_name, ext);
        (self.storage_dir.join(&name), name)
    }

    /// Creates a new, never before used file in the tmp dir
    pub(crate) async fn new_tmp_file(&self) -> AppResult<(PathBuf, tokio::fs::File)> {
        for _ in 0..TMP_NAME_ATTEMPTS {
            let id = nanoid!(12);
            let path = self.tmp_dir.join(format!("{TMP_PREFIX}{id}"));

            match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(ErrType::FsError.err(err, format!("Failed to create tmp file {path:?}"))),
            }
        }

        Err(ErrType::FsError.msg(format!("Failed to find a free tmp file name in {:?}", self.tmp_dir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_are_deterministic() {
        assert_eq!(variant_file_name("owl", "sm", ".jpg"), "owl.sm.jpg");
        assert_eq!(variant_file_name("owl", "orig", ""), "owl.orig");
    }

    #[test]
    fn plain_names_have_no_path_components() {
        assert!(is_plain_name("owl"));
        assert!(is_plain_name("owl.v2"));
        assert!(!is_plain_name(""));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("../owl"));
        assert!(!is_plain_name("birds/owl"));
        assert!(!is_plain_name("birds\\owl"));
    }

    #[tokio::test]
    async fn variant_path_joins_storage_dir() -> anyhow::Result<()> {
        let storage_dir = tempfile::tempdir()?;
        let tmp_dir = tempfile::tempdir()?;
        let storage = Storage::new(storage_dir.path(), tmp_dir.path()).await?;

        let (path, name) = storage.variant_path("owl", "xs", ".png");

        assert_eq!(name, "owl.xs.png");
        assert_eq!(path, storage_dir.path().join("owl.xs.png"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_storage_dir_is_rejected() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;

        let err = match Storage::new(root.path().join("nope"), root.path().join("tmp")).await {
            Ok(_) => anyhow::bail!("storage dir should be required"),
            Err(err) => err,
        };

        assert_eq!(err.kind(), &ErrType::FsError);
        Ok(())
    }

    #[tokio::test]
    async fn tmp_dir_is_created_and_names_are_unique() -> anyhow::Result<()> {
        let storage_dir = tempfile::tempdir()?;
        let root = tempfile::tempdir()?;
        let tmp_dir = root.path().join("staging");
        let storage = Storage::new(storage_dir.path(), &tmp_dir).await?;

        let (first, _) = storage.new_tmp_file().await?;
        let (second, _) = storage.new_tmp_file().await?;

        assert!(tmp_dir.is_dir());
        assert_ne!(first, second);
        assert!(first.file_name().and_then(|s| s.to_str()).is_some_and(|s| s.starts_with(TMP_PREFIX)));
        assert_eq!(std::fs::read_dir(&tmp_dir)?.count(), 2);
        Ok(())
    }
}
