use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CredentialStore;
use crate::auth::repo_types::{CredentialRecord, NewCredential, PasswordCredential};

/// In-process store for local development and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
    next_id: AtomicU64,
    #[cfg(test)]
    fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// Inserts a record as-is, e.g. a pre-registered account without a password.
    pub async fn insert(&self, record: CredentialRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    #[cfg(test)]
    pub async fn get(&self, id: &str) -> Option<CredentialRecord> {
        self.records.read().await.get(id).cloned()
    }

    #[cfg(test)]
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_outage(&self) -> anyhow::Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("simulated store outage");
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_outage(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_legajo(&self, legajo: &str) -> anyhow::Result<Option<CredentialRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.legajo == legajo)
            .cloned())
    }

    async fn create(&self, new: NewCredential) -> anyhow::Result<CredentialRecord> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.legajo == new.legajo) {
            anyhow::bail!("legajo {} already exists", new.legajo);
        }
        let id = format!("mem{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let record = CredentialRecord {
            id: id.clone(),
            legajo: new.legajo,
            nombre: new.nombre,
            credential: Some(new.credential),
        };
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn update_password(
        &self,
        id: &str,
        credential: &PasswordCredential,
    ) -> anyhow::Result<CredentialRecord> {
        self.check_outage()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("record {} not found", id))?;
        record.credential = Some(credential.clone());
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(salt: &str, hash: &str) -> PasswordCredential {
        PasswordCredential {
            salt: salt.into(),
            hash: hash.into(),
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryStore::new();
        let created = store
            .create(NewCredential {
                legajo: "100".into(),
                nombre: Some("Lucía".into()),
                credential: cred("aa", "bb"),
            })
            .await
            .unwrap();
        let found = store.find_by_legajo("100").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.find_by_legajo("101").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_legajo() {
        let store = MemoryStore::new();
        let new = NewCredential {
            legajo: "100".into(),
            nombre: None,
            credential: cred("aa", "bb"),
        };
        store.create(new.clone()).await.unwrap();
        assert!(store.create(new).await.is_err());
    }

    #[tokio::test]
    async fn update_unknown_record_fails() {
        let store = MemoryStore::new();
        assert!(store.update_password("nope", &cred("a", "b")).await.is_err());
    }
}
