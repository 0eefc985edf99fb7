//! Off-chain corroboration of a subject/controller claim.
//!
//! A `did:web` subject proves control by publishing the controller's
//! account either in a DNS TXT record at `_omatrust.<domain>` or in the
//! `verificationMethod` list of its hosted DID document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omatrust_contracts::did::{Caip10, did_method, did_web_domain, embedded_address, strip_port};
use omatrust_contracts::{ErrorCode, EvidenceMethod};
use serde::Deserialize;

use crate::error::WitnessError;

pub const TXT_RECORD_PREFIX: &str = "_omatrust";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceResult {
    pub found: bool,
    pub details: Option<String>,
    pub matched_controller: Option<String>,
}

impl EvidenceResult {
    fn matched(controller: &str, details: String) -> Self {
        Self {
            found: true,
            details: Some(details),
            matched_controller: Some(controller.to_string()),
        }
    }

    fn missing(details: String) -> Self {
        Self {
            found: false,
            details: Some(details),
            matched_controller: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// TXT strings published at `name`. A name with no records yields an
    /// empty list, not an error.
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, TransportError>;
}

#[async_trait]
pub trait DidDocumentFetcher: Send + Sync {
    async fn fetch_did_document(&self, domain: &str) -> Result<serde_json::Value, TransportError>;
}

/// DNS TXT lookups over a DNS-over-HTTPS JSON endpoint.
#[derive(Clone)]
pub struct DohTxtResolver {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

const DNS_TYPE_TXT: u16 = 16;
const DNS_STATUS_NOERROR: u32 = 0;
const DNS_STATUS_NXDOMAIN: u32 = 3;

impl DohTxtResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::new(err.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TxtResolver for DohTxtResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, TransportError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("name", name), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(|err| TransportError::new(format!("DNS query for {} failed: {}", name, err)))?;

        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "DNS resolver returned status {} for {}",
                response.status(),
                name
            )));
        }

        let body = response.json::<DohResponse>().await.map_err(|err| {
            TransportError::new(format!("DNS resolver returned invalid JSON: {}", err))
        })?;

        match body.status {
            DNS_STATUS_NOERROR => Ok(body
                .answer
                .iter()
                .filter(|answer| answer.record_type == DNS_TYPE_TXT)
                .map(|answer| unquote_txt(&answer.data))
                .collect()),
            DNS_STATUS_NXDOMAIN => Ok(Vec::new()),
            rcode => Err(TransportError::new(format!(
                "DNS query for {} failed with rcode {}",
                name, rcode
            ))),
        }
    }
}

/// Joins the character-strings of a presentation-format TXT value:
/// `"v=1;" "caip10=..."` becomes `v=1;caip10=...`.
fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }

    let mut out = String::with_capacity(data.len());
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in data.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Fetches `did.json` documents from a URL template containing `{domain}`.
#[derive(Clone)]
pub struct HttpDidDocumentFetcher {
    http: reqwest::Client,
    url_template: String,
}

impl HttpDidDocumentFetcher {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::new(err.to_string()))?;
        Ok(Self {
            http,
            url_template: url_template.into(),
        })
    }

    fn url_for(&self, domain: &str) -> String {
        self.url_template.replace("{domain}", domain)
    }
}

#[async_trait]
impl DidDocumentFetcher for HttpDidDocumentFetcher {
    async fn fetch_did_document(&self, domain: &str) -> Result<serde_json::Value, TransportError> {
        let url = self.url_for(domain);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| TransportError::new(format!("GET {} failed: {}", url, err)))?;

        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "GET {} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|err| TransportError::new(format!("{} is not valid JSON: {}", url, err)))
    }
}

#[derive(Clone)]
pub struct EvidenceVerifier {
    txt: Arc<dyn TxtResolver>,
    did_documents: Arc<dyn DidDocumentFetcher>,
}

impl EvidenceVerifier {
    pub fn new(txt: Arc<dyn TxtResolver>, did_documents: Arc<dyn DidDocumentFetcher>) -> Self {
        Self { txt, did_documents }
    }

    pub async fn verify(
        &self,
        subject: &str,
        controller: &str,
        method: EvidenceMethod,
    ) -> Result<EvidenceResult, WitnessError> {
        let domain = match did_method(subject) {
            Some("web") => did_web_domain(subject),
            _ => None,
        }
        .ok_or_else(|| {
            WitnessError::new(
                ErrorCode::InvalidSubject,
                format!(
                    "evidence method {} requires a did:web subject, got {}",
                    method, subject
                ),
            )
        })?;

        let address = embedded_address(controller).ok_or_else(|| {
            WitnessError::new(
                ErrorCode::EvidenceNotFound,
                format!("controller {} carries no account address", controller),
            )
        })?;

        let result = match method {
            EvidenceMethod::DnsTxt => self.check_dns_txt(&domain, controller, address).await?,
            EvidenceMethod::DidJson => self.check_did_json(&domain, controller, address).await?,
        };

        if !result.found {
            return Err(WitnessError::new(
                ErrorCode::EvidenceNotFound,
                result
                    .details
                    .unwrap_or_else(|| format!("no {} evidence for {}", method, controller)),
            ));
        }

        Ok(result)
    }

    async fn check_dns_txt(
        &self,
        domain: &str,
        controller: &str,
        address: &str,
    ) -> Result<EvidenceResult, WitnessError> {
        let name = format!("{}.{}", TXT_RECORD_PREFIX, strip_port(domain));
        let records = self
            .txt
            .resolve_txt(&name)
            .await
            .map_err(|err| WitnessError::new(ErrorCode::EvidenceNotFound, err.message))?;

        if records.is_empty() {
            return Ok(EvidenceResult::missing(format!(
                "no TXT records found at {}",
                name
            )));
        }

        let matched = records.iter().find(|record| {
            txt_record_accounts(record)
                .iter()
                .any(|account| account.address_matches(address))
        });

        Ok(match matched {
            Some(record) => {
                EvidenceResult::matched(controller, format!("TXT record at {}: {}", name, record))
            }
            None => EvidenceResult::missing(format!(
                "no TXT record at {} lists {}; found: {}",
                name,
                address,
                records.join(" | ")
            )),
        })
    }

    async fn check_did_json(
        &self,
        domain: &str,
        controller: &str,
        address: &str,
    ) -> Result<EvidenceResult, WitnessError> {
        let document = self
            .did_documents
            .fetch_did_document(domain)
            .await
            .map_err(|err| WitnessError::new(ErrorCode::EvidenceNotFound, err.message))?;

        let accounts = document_accounts(&document);
        let matched = accounts.iter().find(|account| {
            embedded_address(account).is_some_and(|candidate| candidate.eq_ignore_ascii_case(address))
        });

        Ok(match matched {
            Some(account) => EvidenceResult::matched(
                controller,
                format!("did.json for {} lists {}", domain, account),
            ),
            None if accounts.is_empty() => EvidenceResult::missing(format!(
                "did.json for {} has no verificationMethod with a blockchainAccountId",
                domain
            )),
            None => EvidenceResult::missing(format!(
                "did.json for {} does not list {}; found: {}",
                domain,
                address,
                accounts.join(", ")
            )),
        })
    }
}

/// CAIP-10 accounts declared by a `v=1` TXT record. Entries are separated
/// by `;` or whitespace; records of any other version declare nothing.
pub fn txt_record_accounts(record: &str) -> Vec<Caip10> {
    let entries = record
        .split(|c: char| c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>();

    if !entries.contains(&"v=1") {
        return Vec::new();
    }

    entries
        .iter()
        .filter_map(|entry| entry.strip_prefix("caip10="))
        .filter_map(Caip10::parse)
        .collect()
}

fn document_accounts(document: &serde_json::Value) -> Vec<String> {
    document
        .get("verificationMethod")
        .and_then(|methods| methods.as_array())
        .map(|methods| {
            methods
                .iter()
                .filter_map(|method| method.get("blockchainAccountId"))
                .filter_map(|id| id.as_str())
                .map(|id| id.to_string())
                .collect()
        })
        .unwrap_or_default()
}
