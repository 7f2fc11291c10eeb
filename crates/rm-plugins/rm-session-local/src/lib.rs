//! # rm-session-local
//!
//! Local filesystem implementation of `KeyValueStore`.
//! Each key is one file under the root directory; writes go through a
//! temporary file and a rename so a crash never leaves a torn record.

use anyhow::Context;
use async_trait::async_trait;
use rm_core::traits::KeyValueStore;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

pub struct LocalKv {
    /// Directory holding one file per key (e.g., "./data/client")
    root_path: PathBuf,
}

impl LocalKv {
    pub fn new(root: PathBuf) -> Self {
        Self { root_path: root }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                && !key.starts_with('.'),
            "invalid storage key '{key}'"
        );
        Ok(self.root_path.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for LocalKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root_path)
            .await
            .with_context(|| format!("creating {}", self.root_path.display()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        tracing::debug!(key, "stored client value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
