use super::source::PersistenceGateway;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Keeps every key in one JSON object on disk.
///
/// Each write replaces the whole file through a temporary sibling and a rename,
/// so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileGateway {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl FileGateway {
    /// Opens `path`, starting empty when the file doesn't exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Malformed state file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, data: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create state directory")?;
            }
        }
        let contents = serde_json::to_string_pretty(data).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!("State written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        next.extend(items);
        self.flush(&next).await?;
        *data = next;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        for key in keys {
            next.remove(*key);
        }
        self.flush(&next).await?;
        *data = next;
        Ok(())
    }
}
