use serde::{Deserialize, Serialize};

// Missing fields deserialize to empty strings so they surface as 400, not 422.

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub legajo: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub legajo: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub nombre: Option<String>,
}

/// Request body for an administrator password reset.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub legajo: String,
    #[serde(default)]
    pub password: String,
}

/// Public part of the student returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicStudent {
    pub legajo: String,
    pub nombre: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
