use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::config::DirectoryConfig;
use crate::models::{CardNumber, Sid};

/// Client for the campus identity directory, used to prefill registration
pub struct DirectoryClient {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

/// Raw directory answer for a card lookup
#[derive(Debug, Deserialize)]
pub struct DirectoryRecord {
    /// Id number prefixed with a letter, e.g. "A20123456"
    pub idnumber: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub id: Sid,
    pub first_name: String,
    pub last_name: String,
}

impl DirectoryEntry {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl TryFrom<DirectoryRecord> for DirectoryEntry {
    type Error = anyhow::Error;

    fn try_from(record: DirectoryRecord) -> Result<Self> {
        // Drop the leading letter of the id number
        let digits = record.idnumber.get(1..).unwrap_or_default();
        let id = digits
            .parse::<Sid>()
            .with_context(|| format!("Invalid directory id number '{}'", record.idnumber))?;

        Ok(Self {
            id,
            first_name: record.first_name,
            last_name: record.last_name,
        })
    }
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Look up who owns a card. Ok(None) when the directory has no entry.
    pub async fn lookup_card(&self, card: CardNumber) -> Result<Option<DirectoryEntry>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("card", card)])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("Failed to send request to directory")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            bail!("Directory returned error status: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read directory response")?;

        parse_lookup(&body)
    }
}

/// Empty body and JSON null both mean "no entry"
fn parse_lookup(body: &str) -> Result<Option<DirectoryEntry>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let record: Option<DirectoryRecord> =
        serde_json::from_str(body).context("Failed to parse JSON response from directory")?;

    record.map(DirectoryEntry::try_from).transpose()
}
