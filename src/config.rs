use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

use crate::auth::password::{PasswordHasher, DEFAULT_ITERATIONS};

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableConfig {
    pub api_url: String,
    pub base_id: String,
    pub table: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    Airtable(AirtableConfig),
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub pbkdf2_iterations: u32,
    pub admin_token: Option<String>,
    pub bind_addr: SocketAddr,
}

fn bind_addr(host: &str, port: &str) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("APP_HOST/APP_PORT {}:{} is not a socket address", host, port))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("CREDENTIAL_STORE")
            .unwrap_or_else(|_| "airtable".into())
            .as_str()
        {
            "memory" => StoreConfig::Memory,
            "airtable" => StoreConfig::Airtable(AirtableConfig {
                api_url: std::env::var("AIRTABLE_API_URL")
                    .unwrap_or_else(|_| "https://api.airtable.com".into()),
                base_id: std::env::var("AIRTABLE_BASE_ID").context("AIRTABLE_BASE_ID")?,
                table: std::env::var("AIRTABLE_TABLE").unwrap_or_else(|_| "Estudiantes".into()),
                token: std::env::var("AIRTABLE_PAT").context("AIRTABLE_PAT")?,
            }),
            other => anyhow::bail!("unknown CREDENTIAL_STORE {:?}", other),
        };

        let pbkdf2_iterations = match std::env::var("PBKDF2_ITERATIONS") {
            Ok(v) => v
                .parse::<u32>()
                .with_context(|| format!("PBKDF2_ITERATIONS={:?} is not a number", v))?,
            Err(_) => DEFAULT_ITERATIONS,
        };

        let admin_token = std::env::var("ADMIN_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let bind_addr = bind_addr(
            &std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            &std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into()),
        )?;

        let config = Self {
            store,
            pbkdf2_iterations,
            admin_token,
            bind_addr,
        };
        config.hasher()?;
        Ok(config)
    }

    pub fn hasher(&self) -> anyhow::Result<PasswordHasher> {
        Ok(PasswordHasher::new(self.pbkdf2_iterations)?)
    }

    /// In-memory store, default rounds, admin token `admin-secret`.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            store: StoreConfig::Memory,
            pbkdf2_iterations: DEFAULT_ITERATIONS,
            admin_token: Some("admin-secret".into()),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}
