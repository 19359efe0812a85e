mod airtable;
mod memory;

use async_trait::async_trait;

use crate::auth::repo_types::{CredentialRecord, NewCredential, PasswordCredential};

pub use airtable::AirtableStore;
pub use memory::MemoryStore;

/// Remote keyed-record store holding student credentials.
///
/// Implementations own connection handling and retries; callers only see
/// lookups by legajo and writes by record id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_legajo(&self, legajo: &str) -> anyhow::Result<Option<CredentialRecord>>;
    async fn create(&self, new: NewCredential) -> anyhow::Result<CredentialRecord>;
    async fn update_password(
        &self,
        id: &str,
        credential: &PasswordCredential,
    ) -> anyhow::Result<CredentialRecord>;
}
