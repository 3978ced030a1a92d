use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utils::{CanonicalRecord, DomainSchema, RemoteTable};

pub const AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";

const PAGE_SIZE: &str = "100";

/// One Airtable table addressed by base id and opaque table id.
#[derive(Debug, Clone)]
pub struct AirtableTable {
    http: Client,
    api_url: String,
    base_id: String,
    table_id: String,
}

impl AirtableTable {
    pub fn new(token: &str, base_id: &str, table_id: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("AIRTABLE_TOKEN contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: AIRTABLE_API_URL.to_string(),
            base_id: base_id.to_string(),
            table_id: table_id.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/{}", self.api_url, self.base_id, self.table_id)
    }
}

impl RemoteTable for AirtableTable {
    fn describe(&self) -> String {
        format!("Airtable {}/{}", self.base_id, self.table_id)
    }

    fn fetch_existing_keys(&mut self, key_column: &str) -> Result<HashSet<String>> {
        let endpoint = self.endpoint();
        let mut keys = HashSet::new();
        let mut offset: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query: Vec<(&str, &str)> =
                vec![("fields[]", key_column), ("pageSize", PAGE_SIZE)];
            if let Some(o) = offset.as_deref() {
                query.push(("offset", o));
            }

            let page: ListResponse = self
                .http
                .get(&endpoint)
                .query(&query)
                .send()
                .with_context(|| format!("GET {endpoint} failed"))?
                .error_for_status()
                .with_context(|| format!("GET {endpoint} returned non-success status"))?
                .json()
                .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

            pages += 1;
            keys.extend(keys_from_page(&page, key_column));

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!("Fetched {} page(s) from {}", pages, self.describe());
        Ok(keys)
    }

    fn insert_record(&mut self, _schema: &DomainSchema, record: &CanonicalRecord) -> Result<()> {
        let endpoint = self.endpoint();
        let body = CreateRequest {
            fields: record_fields(record),
            typecast: true,
        };

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("POST {endpoint} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("Airtable returned {}: {}", status, text));
        }
        Ok(())
    }
}

/// Record fields as sent to Airtable; null cells are left out.
pub fn record_fields(record: &CanonicalRecord) -> Map<String, Value> {
    record
        .cells()
        .iter()
        .map(|cell| (cell.column.to_string(), cell.value.to_json()))
        .filter(|(_, v)| !v.is_null())
        .collect()
}

fn keys_from_page<'a>(page: &'a ListResponse, key_column: &'a str) -> impl Iterator<Item = String> + 'a {
    page.records
        .iter()
        .filter_map(move |r| match r.fields.get(key_column) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<ListedRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedRecord {
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct CreateRequest {
    fields: Map<String, Value>,
    typecast: bool,
}
