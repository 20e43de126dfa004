use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::RwLock;

use crate::properties;

#[derive(Debug, thiserror::Error)]
pub enum PropertiesError {
    #[error("failed to read properties file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write properties file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Key/value view over one `.properties` file. Every mutation is written
/// back before it returns; a failed write leaves the in-memory view as it was.
#[derive(Debug, Clone)]
pub struct PropertiesStore {
    path: PathBuf,
    props: Arc<RwLock<BTreeMap<String, String>>>,
}

impl PropertiesStore {
    /// Loads `path`. A file that doesn't exist yet starts the store empty; it
    /// is created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PropertiesError> {
        let path = path.into();
        let props = match tokio::fs::read_to_string(&path).await {
            Ok(text) => properties::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "properties file not found; starting empty");
                BTreeMap::new()
            }
            Err(source) => return Err(PropertiesError::Read { path, source }),
        };
        tracing::info!(path = %path.display(), keys = props.len(), "properties loaded");

        Ok(Self {
            path,
            props: Arc::new(RwLock::new(props)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn all(&self) -> BTreeMap<String, String> {
        self.props.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.props.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), PropertiesError> {
        let mut props = self.props.write().await;
        let mut next = props.clone();
        next.insert(key.to_string(), value.to_string());
        self.save(&next).await?;
        *props = next;
        Ok(())
    }

    /// Applies every pair, then writes the file once.
    pub async fn set_many(&self, values: BTreeMap<String, String>) -> Result<(), PropertiesError> {
        let mut props = self.props.write().await;
        let mut next = props.clone();
        next.extend(values);
        self.save(&next).await?;
        *props = next;
        Ok(())
    }

    /// Returns `false` when the key wasn't there (nothing is written).
    pub async fn delete(&self, key: &str) -> Result<bool, PropertiesError> {
        let mut props = self.props.write().await;
        if !props.contains_key(key) {
            return Ok(false);
        }
        let mut next = props.clone();
        next.remove(key);
        self.save(&next).await?;
        *props = next;
        Ok(true)
    }

    async fn save(&self, props: &BTreeMap<String, String>) -> Result<(), PropertiesError> {
        let stamp = chrono::Utc::now().format("%a %b %d %H:%M:%S UTC %Y");
        let text = properties::render(props, Some(&format!("Updated properties\n{stamp}")));

        let write_err = |source: std::io::Error| PropertiesError::Write {
            path: self.path.clone(),
            source,
        };
        let tmp = self.path.with_extension("properties.tmp");
        tokio::fs::write(&tmp, text.as_bytes())
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_err)?;
        tracing::debug!(path = %self.path.display(), keys = props.len(), "properties saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty_and_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");
        let store = PropertiesStore::open(&path).await.unwrap();
        assert!(store.all().await.is_empty());
        assert!(!path.exists());

        store.set("motd", "Hello").await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#Updated properties\n#"));
        assert!(text.contains("motd=Hello\n"));
    }

    #[tokio::test]
    async fn crud_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");
        std::fs::write(&path, "server-port=25565\nmotd=Old\n").unwrap();

        let store = PropertiesStore::open(&path).await.unwrap();
        assert_eq!(store.get("motd").await.as_deref(), Some("Old"));
        assert_eq!(store.get("missing").await, None);

        let mut bulk = BTreeMap::new();
        bulk.insert("motd".to_string(), "New".to_string());
        bulk.insert("max-players".to_string(), "20".to_string());
        store.set_many(bulk).await.unwrap();

        assert!(store.delete("server-port").await.unwrap());
        assert!(!store.delete("server-port").await.unwrap());

        let reopened = PropertiesStore::open(&path).await.unwrap();
        let all = reopened.all().await;
        assert_eq!(all.get("motd").map(String::as_str), Some("New"));
        assert_eq!(all.get("max-players").map(String::as_str), Some("20"));
        assert!(!all.contains_key("server-port"));
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory can't be read as a file.
        let err = PropertiesStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, PropertiesError::Read { .. }));
    }
}
