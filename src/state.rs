use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::config::{AppConfig, StoreConfig};
use crate::store::{AirtableStore, CredentialStore, MemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let hasher = config.hasher()?;

        let store = match &config.store {
            StoreConfig::Airtable(at) => {
                tracing::info!(base = %at.base_id, table = %at.table, "using airtable credential store");
                Arc::new(AirtableStore::new(&at.api_url, &at.base_id, &at.table, &at.token)?)
                    as Arc<dyn CredentialStore>
            }
            StoreConfig::Memory => {
                tracing::warn!("using in-memory credential store; data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn CredentialStore>
            }
        };

        Ok(Self::from_parts(config, store, hasher))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            config,
            store,
            hasher,
        }
    }

    /// State over an in-memory store, with the admin token set to `admin-secret`.
    #[cfg(test)]
    pub fn fake(store: Arc<MemoryStore>) -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            store,
            PasswordHasher::default(),
        )
    }
}
