// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tamperseal_kernel::pushdata;

use super::{fingerprint_payload, LedgerClient};
use crate::errors::CollectorError;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    fingerprint: &'a str,
    /// Hex `OP_FALSE OP_RETURN <push>` output script.
    script: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    txid: String,
}

#[derive(Deserialize)]
struct OutputScript {
    hex: String,
}

/// Client for a ledger gateway that funds and broadcasts data transactions.
///
/// `POST {base}/v1/tx/data` submits, `GET {base}/v1/tx/{txid}/opreturn` reads
/// back the data outputs of a transaction.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    client: Client,
}

impl HttpLedgerClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("ledger client: {}", e)))?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Gateways report an empty wallet either as 402 or in the error text.
fn classify_failure(status: StatusCode, body: &str) -> CollectorError {
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::PAYMENT_REQUIRED
        || lowered.contains("insufficient")
        || lowered.contains("no utxo")
    {
        CollectorError::LedgerUnderfunded(format!("{}: {}", status, body.trim()))
    } else {
        CollectorError::LedgerSubmission(format!("{}: {}", status, body.trim()))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, fingerprint: &str) -> Result<String, CollectorError> {
        let payload = fingerprint_payload(fingerprint)?;
        let url = format!("{}/v1/tx/data", self.base_url);
        let request = SubmitRequest {
            fingerprint,
            script: pushdata::encode_hex(&payload),
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollectorError::LedgerSubmission(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| CollectorError::LedgerSubmission(format!("bad gateway response: {}", e)))?;
        if body.txid.is_empty() {
            return Err(CollectorError::LedgerSubmission("gateway returned an empty txid".into()));
        }
        Ok(body.txid)
    }

    async fn read(&self, txid: &str) -> Result<Option<String>, CollectorError> {
        let url = format!("{}/v1/tx/{}/opreturn", self.base_url, txid);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CollectorError::LedgerSubmission(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CollectorError::LedgerSubmission(format!(
                "read request failed: {}",
                resp.status()
            )));
        }

        let outputs: Vec<OutputScript> = resp
            .json()
            .await
            .map_err(|e| CollectorError::LedgerSubmission(e.to_string()))?;

        Ok(outputs
            .iter()
            .find_map(|out| pushdata::fingerprint_from_script(&out.hex)))
    }
}
