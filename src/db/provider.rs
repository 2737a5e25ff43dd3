//! Backend selection for the entity store.
//!
//! ```rust,ignore
//! use openlab::db::DatabaseProvider;
//!
//! // In-memory database (tests, throwaway runs)
//! let store = DatabaseProvider::Memory.open().await?;
//!
//! // File-based SQLite
//! let store = DatabaseProvider::SQLite { path: "data/openlab.db".into() }.open().await?;
//! ```

use super::EntityStore;
use crate::types::Result;
use crate::utils::toml_config::DatabaseConfig;

/// Database provider configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DatabaseProvider {
    /// In-memory SQLite database (ephemeral, lost on restart)
    #[default]
    Memory,
    /// File-based SQLite database
    SQLite {
        /// Path to the SQLite database file
        path: String,
    },
    /// Remote Turso database (requires network access)
    #[cfg(feature = "turso")]
    Turso {
        /// The Turso database URL (e.g., `libsql://your-db.turso.io`)
        url: String,
        /// Authentication token for the Turso database
        auth_token: String,
    },
}

impl DatabaseProvider {
    /// Open the store and apply the schema
    pub async fn open(&self) -> Result<EntityStore> {
        match self {
            DatabaseProvider::Memory => EntityStore::new_memory().await,
            DatabaseProvider::SQLite { path } => EntityStore::new_local(path).await,
            #[cfg(feature = "turso")]
            DatabaseProvider::Turso { url, auth_token } => {
                EntityStore::new_remote(url.clone(), auth_token.clone()).await
            }
        }
    }

    /// Resolve the provider from the `[database]` section.
    ///
    /// Turso wins when both of its environment variables are configured and
    /// set; otherwise `url` selects a file or `:memory:`.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        #[cfg(feature = "turso")]
        {
            if let (Some(url_env), Some(token_env)) =
                (&config.turso_url_env, &config.turso_token_env)
            {
                if let (Ok(url), Ok(auth_token)) =
                    (std::env::var(url_env), std::env::var(token_env))
                {
                    if !url.is_empty() && !auth_token.is_empty() {
                        return DatabaseProvider::Turso { url, auth_token };
                    }
                }
            }
        }

        Self::from_url(&config.url)
    }

    fn from_url(url: &str) -> Self {
        if url.is_empty() || url == ":memory:" {
            DatabaseProvider::Memory
        } else {
            DatabaseProvider::SQLite {
                path: url.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_url_selects_memory() {
        let config = DatabaseConfig {
            url: ":memory:".to_string(),
            ..Default::default()
        };
        assert_eq!(DatabaseProvider::from_config(&config), DatabaseProvider::Memory);
    }

    #[test]
    fn test_path_selects_sqlite() {
        let config = DatabaseConfig::default();
        assert_eq!(
            DatabaseProvider::from_config(&config),
            DatabaseProvider::SQLite {
                path: "./data/openlab.db".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_open_file_database_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lab.db");

        let provider = DatabaseProvider::SQLite {
            path: path.to_string_lossy().to_string(),
        };
        provider.open().await.unwrap();

        assert!(path.exists());
    }
}
