use std::path::PathBuf;

use crate::{config, error::Result, types::Session};

/// File backed cache of the signed-in session, so a restart does not require
/// signing in again. Cleared on sign-out.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Cache in the local data directory (`sporlplay/cache/token.json`).
    pub fn default_location() -> Self {
        let mut path = config::data_dir();
        path.push("cache/token.json");
        Self { path }
    }

    /// Loads the cached session, `Ok(None)` if nobody is signed in.
    pub async fn load(&self) -> Result<Option<Session>> {
        if !self.path.is_file() {
            return Ok(None);
        }

        let content = async_fs::read_to_string(&self.path).await?;
        let session: Session = serde_json::from_str(&content)?;
        Ok(Some(session))
    }

    pub async fn persist(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(session)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        if self.path.is_file() {
            async_fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
