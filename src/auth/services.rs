use std::sync::Arc;

use axum::http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use super::dto::PublicStudent;
use super::password::{PasswordError, PasswordHasher};
use super::repo_types::{CredentialRecord, NewCredential};
use crate::state::AppState;
use crate::store::CredentialStore;

/// Shown for every failed login, whatever the cause.
pub const INVALID_CREDENTIALS: &str = "Legajo o contraseña incorrectos";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Legajo y contraseña son obligatorios")]
    MissingFields,
    #[error("Legajo inválido")]
    InvalidLegajo,
    #[error("{}", INVALID_CREDENTIALS)]
    InvalidCredentials,
    #[error("El legajo ya tiene una contraseña registrada")]
    AlreadyRegistered,
    #[error("Legajo no encontrado")]
    NotFound,
    #[error("credential store error: {0:#}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingFields | AuthError::InvalidLegajo => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::AlreadyRegistered => StatusCode::CONFLICT,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Store(_) | AuthError::Password(_) | AuthError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AuthError> for (StatusCode, String) {
    fn from(e: AuthError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, "auth request failed");
            return (status, "Error interno del servidor".into());
        }
        (status, e.to_string())
    }
}

pub(crate) fn is_valid_legajo(legajo: &str) -> bool {
    lazy_static! {
        static ref LEGAJO_RE: Regex = Regex::new(r"^[A-Za-z0-9./-]{1,32}$").unwrap();
    }
    LEGAJO_RE.is_match(legajo)
}

/// Runs a CPU-heavy hashing closure off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn public(record: &CredentialRecord) -> PublicStudent {
    PublicStudent {
        legajo: record.legajo.clone(),
        nombre: record.nombre.clone(),
    }
}

/// Salt for the throwaway derivation on logins that have nothing to verify.
const DUMMY_SALT: &str = "5f3c9a0e7b21d4688e1f0c2a9b7d3e46";

/// Refuses a login only after one full derivation, matching the cost of a
/// wrong-password attempt.
async fn reject_after_hashing(hasher: PasswordHasher, password: &str) -> AuthError {
    let plain = password.to_owned();
    match blocking(move || hasher.hash(&plain, DUMMY_SALT)).await {
        Ok(_) => AuthError::InvalidCredentials,
        Err(e) => e,
    }
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub student: PublicStudent,
    /// Background rehash started for a legacy credential. Dropping it leaves the task running.
    pub upgrade: Option<JoinHandle<()>>,
}

pub async fn login(
    state: &AppState,
    legajo: &str,
    password: &str,
) -> Result<LoginOutcome, AuthError> {
    let legajo = legajo.trim();
    if legajo.is_empty() || password.is_empty() {
        return Err(AuthError::MissingFields);
    }
    if !is_valid_legajo(legajo) {
        warn!(%legajo, "login with malformed legajo");
        return Err(reject_after_hashing(state.hasher, password).await);
    }

    let record = match state.store.find_by_legajo(legajo).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            warn!(%legajo, "login unknown legajo");
            return Err(reject_after_hashing(state.hasher, password).await);
        }
        Err(e) => return Err(AuthError::Store(e)),
    };

    let Some(credential) = record.credential.clone() else {
        warn!(%legajo, record_id = %record.id, "login on account with no password configured");
        return Err(reject_after_hashing(state.hasher, password).await);
    };

    let hasher = state.hasher;
    let plain = password.to_owned();
    let verification =
        blocking(move || hasher.verify(&plain, &credential.salt, &credential.hash)).await?;

    if !verification.is_valid() {
        warn!(%legajo, record_id = %record.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let upgrade = verification.needs_upgrade().then(|| {
        info!(%legajo, record_id = %record.id, "legacy credential accepted; scheduling upgrade");
        spawn_upgrade(
            state.store.clone(),
            state.hasher,
            record.id.clone(),
            password.to_owned(),
        )
    });

    info!(%legajo, "student logged in");
    Ok(LoginOutcome {
        student: public(&record),
        upgrade,
    })
}

/// Rehashes a legacy credential under a fresh salt and stores it.
///
/// Failures are logged only; the next successful legacy login tries again.
pub fn spawn_upgrade(
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    record_id: String,
    password: String,
) -> JoinHandle<()> {
    let span = info_span!("credential_upgrade", record_id = %record_id);
    tokio::spawn(
        async move {
            let credential = match tokio::task::spawn_blocking(move || hasher.derive(&password)).await {
                Ok(Ok(c)) => c,
                Ok(Err(e)) => {
                    error!(error = %e, "deriving upgraded credential failed");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "upgrade hashing task panicked");
                    return;
                }
            };
            match store.update_password(&record_id, &credential).await {
                Ok(_) => info!("credential upgraded to pbkdf2"),
                Err(e) => error!(error = %e, "storing upgraded credential failed"),
            }
        }
        .instrument(span),
    )
}

#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    /// A new record was created.
    Created(PublicStudent),
    /// A pre-registered record received its first password.
    Activated(PublicStudent),
}

pub async fn register(
    state: &AppState,
    legajo: &str,
    password: &str,
    nombre: Option<String>,
) -> Result<Registration, AuthError> {
    let legajo = legajo.trim();
    if legajo.is_empty() || password.is_empty() {
        return Err(AuthError::MissingFields);
    }
    if !is_valid_legajo(legajo) {
        return Err(AuthError::InvalidLegajo);
    }

    let existing = state
        .store
        .find_by_legajo(legajo)
        .await
        .map_err(AuthError::Store)?;
    if let Some(r) = &existing {
        if r.credential.is_some() {
            warn!(%legajo, "legajo already registered");
            return Err(AuthError::AlreadyRegistered);
        }
    }

    let hasher = state.hasher;
    let plain = password.to_owned();
    let credential = blocking(move || hasher.derive(&plain)).await?;

    match existing {
        Some(r) => {
            let updated = state
                .store
                .update_password(&r.id, &credential)
                .await
                .map_err(AuthError::Store)?;
            info!(%legajo, record_id = %updated.id, "pre-registered student set password");
            Ok(Registration::Activated(public(&updated)))
        }
        None => {
            let nombre = nombre
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            let created = state
                .store
                .create(NewCredential {
                    legajo: legajo.to_string(),
                    nombre,
                    credential,
                })
                .await
                .map_err(AuthError::Store)?;
            info!(%legajo, record_id = %created.id, "student registered");
            Ok(Registration::Created(public(&created)))
        }
    }
}

/// Overwrites the stored credential for `legajo` with a freshly salted hash.
pub async fn reset_password(
    state: &AppState,
    legajo: &str,
    new_password: &str,
) -> Result<PublicStudent, AuthError> {
    let legajo = legajo.trim();
    if legajo.is_empty() || new_password.is_empty() {
        return Err(AuthError::MissingFields);
    }
    if !is_valid_legajo(legajo) {
        return Err(AuthError::InvalidLegajo);
    }

    let record = state
        .store
        .find_by_legajo(legajo)
        .await
        .map_err(AuthError::Store)?
        .ok_or(AuthError::NotFound)?;

    let hasher = state.hasher;
    let plain = new_password.to_owned();
    let credential = blocking(move || hasher.derive(&plain)).await?;

    let updated = state
        .store
        .update_password(&record.id, &credential)
        .await
        .map_err(AuthError::Store)?;
    info!(%legajo, record_id = %updated.id, "password reset");
    Ok(public(&updated))
}
