use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::debug;
use uuid::Uuid;

/// File bucket rooted at a directory; objects live at `{user_id}/{file_name}`.
#[derive(Debug, Clone)]
pub struct Bucket {
    root: PathBuf,
}

impl Bucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the object, replacing any previous one at the same path.
    pub async fn put(
        &self,
        user_id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        let file_name = object_name(file_name)?;
        let dir = self.root.join(user_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating bucket dir {}", dir.display()))?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        debug!(path = %path.display(), size = bytes.len(), "stored object");
        Ok(format!("{user_id}/{file_name}"))
    }

    pub async fn get(&self, object_path: &str) -> anyhow::Result<Vec<u8>> {
        let Some((user_id, file_name)) = object_path.split_once('/') else {
            bail!("malformed object path {object_path:?}");
        };
        let user_id: Uuid = user_id.parse()?;
        let path = self.root.join(user_id.to_string()).join(object_name(file_name)?);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

/// Last path component of an uploaded name; directory parts are dropped.
fn object_name(file_name: &str) -> anyhow::Result<&str> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid file name {file_name:?}");
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_keeps_last_component() {
        assert_eq!(object_name("cat.png").unwrap(), "cat.png");
        assert_eq!(object_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(object_name("C:\\pics\\cat.png").unwrap(), "cat.png");
        assert!(object_name("").is_err());
        assert!(object_name("dir/..").is_err());
        assert!(object_name("dir/").is_err());
    }

    #[tokio::test]
    async fn same_name_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = Bucket::new(dir.path());
        let user = Uuid::now_v7();

        let first = bucket.put(user, "notes.txt", b"one").await.unwrap();
        let second = bucket.put(user, "notes.txt", b"two").await.unwrap();

        assert_eq!(first, format!("{user}/notes.txt"));
        assert_eq!(first, second);
        assert_eq!(bucket.get(&first).await.unwrap(), b"two");
    }
}
