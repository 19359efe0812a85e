use serde::{Deserialize, Serialize};

/// Salt and hash pair; both are stored together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredential {
    pub salt: String,
    pub hash: String,
}

/// Student account as held by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: String,                             // store record id
    pub legajo: String,                         // institutional student id
    pub nombre: Option<String>,                 // display name
    pub credential: Option<PasswordCredential>, // None while pre-registered
}

/// Fields for a record that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub legajo: String,
    pub nombre: Option<String>,
    pub credential: PasswordCredential,
}
