use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Response, Url,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::CredentialStore;
use crate::auth::repo_types::{CredentialRecord, NewCredential, PasswordCredential};

const FIELD_LEGAJO: &str = "Legajo";
const FIELD_NOMBRE: &str = "Nombre";
const FIELD_SALT: &str = "Salt";
const FIELD_PASSWORD: &str = "Password";
/// Rows fetched per legajo lookup; duplicates beyond the first are resolved to the oldest.
const LOOKUP_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    records: Vec<AirtableRecord>,
}

#[derive(Debug, Deserialize)]
struct AirtableRecord {
    id: String,
    // Airtable always returns UTC `YYYY-MM-DDTHH:MM:SS.sssZ`, so string order is time order.
    #[serde(rename = "createdTime", default)]
    created_time: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Credential store backed by an Airtable table.
#[derive(Clone)]
pub struct AirtableStore {
    client: Client,
    table_url: Url,
}

impl AirtableStore {
    pub fn new(api_url: &str, base_id: &str, table: &str, token: &str) -> anyhow::Result<Self> {
        let mut table_url = Url::parse(api_url).context("parse airtable api url")?;
        table_url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("airtable api url cannot be a base"))?
            .pop_if_empty()
            .extend(["v0", base_id, table]);

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("airtable token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("build airtable http client")?;

        Ok(Self { client, table_url })
    }

    fn record_url(&self, id: &str) -> anyhow::Result<Url> {
        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("airtable api url cannot be a base"))?
            .push(id);
        Ok(url)
    }
}

/// Airtable formula matching a single legajo.
fn legajo_formula(legajo: &str) -> String {
    let escaped = legajo.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{{}}} = '{}'", FIELD_LEGAJO, escaped)
}

fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn credential_fields(credential: &PasswordCredential) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(FIELD_SALT.into(), Value::String(credential.salt.clone()));
    fields.insert(FIELD_PASSWORD.into(), Value::String(credential.hash.clone()));
    fields
}

impl AirtableRecord {
    fn into_credential_record(self) -> CredentialRecord {
        let salt = text_field(&self.fields, FIELD_SALT);
        let hash = text_field(&self.fields, FIELD_PASSWORD);
        let credential = match (salt, hash) {
            (Some(salt), Some(hash)) => Some(PasswordCredential { salt, hash }),
            (None, None) => None,
            _ => {
                warn!(record_id = %self.id, "record has only one of salt/password; treating as unset");
                None
            }
        };
        CredentialRecord {
            legajo: text_field(&self.fields, FIELD_LEGAJO).unwrap_or_default(),
            nombre: text_field(&self.fields, FIELD_NOMBRE),
            credential,
            id: self.id,
        }
    }
}

async fn check_status(resp: Response, op: &str) -> anyhow::Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("airtable {} returned {}: {}", op, status, body)
}

#[async_trait]
impl CredentialStore for AirtableStore {
    async fn find_by_legajo(&self, legajo: &str) -> anyhow::Result<Option<CredentialRecord>> {
        let formula = legajo_formula(legajo);
        let resp = self
            .client
            .get(self.table_url.clone())
            .query(&[("filterByFormula", formula.as_str()), ("maxRecords", LOOKUP_LIMIT)])
            .send()
            .await
            .context("airtable list records")?;
        let list: RecordList = check_status(resp, "list")
            .await?
            .json()
            .await
            .context("decode airtable record list")?;
        debug!(matches = list.records.len(), "airtable lookup by legajo");
        if list.records.len() > 1 {
            warn!(matches = list.records.len(), "duplicate rows for legajo; using the oldest");
        }
        Ok(list
            .records
            .into_iter()
            .min_by(|a, b| (&a.created_time, &a.id).cmp(&(&b.created_time, &b.id)))
            .map(AirtableRecord::into_credential_record))
    }

    async fn create(&self, new: NewCredential) -> anyhow::Result<CredentialRecord> {
        let mut fields = credential_fields(&new.credential);
        fields.insert(FIELD_LEGAJO.into(), Value::String(new.legajo));
        if let Some(nombre) = new.nombre {
            fields.insert(FIELD_NOMBRE.into(), Value::String(nombre));
        }
        let resp = self
            .client
            .post(self.table_url.clone())
            .json(&json!({ "fields": fields, "typecast": true }))
            .send()
            .await
            .context("airtable create record")?;
        let record: AirtableRecord = check_status(resp, "create")
            .await?
            .json()
            .await
            .context("decode created airtable record")?;
        Ok(record.into_credential_record())
    }

    async fn update_password(
        &self,
        id: &str,
        credential: &PasswordCredential,
    ) -> anyhow::Result<CredentialRecord> {
        let resp = self
            .client
            .patch(self.record_url(id)?)
            .json(&json!({ "fields": credential_fields(credential) }))
            .send()
            .await
            .with_context(|| format!("airtable update record {}", id))?;
        let record: AirtableRecord = check_status(resp, "update")
            .await?
            .json()
            .await
            .context("decode updated airtable record")?;
        Ok(record.into_credential_record())
    }
}
