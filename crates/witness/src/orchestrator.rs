use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use omatrust_contracts::{WitnessRequest, WitnessResponse};
use omatrust_ledger::AttestationLedger;
use omatrust_ledger::rpc::{RpcLedger, RpcLedgerConfig};
use tracing::Instrument;

use crate::allowlist::AllowlistGate;
use crate::cache::WitnessCache;
use crate::config::{StartupError, WitnessConfig};
use crate::error::WitnessError;
use crate::evidence::{DohTxtResolver, EvidenceVerifier, HttpDidDocumentFetcher};
use crate::reader::verify_prior_attestation;
use crate::submitter::AttestationSubmitter;
use crate::validate::validate_request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessOutcome {
    pub uid: String,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub observed_at: u64,
    pub existing: bool,
}

impl WitnessOutcome {
    pub fn outcome_code(&self) -> &'static str {
        if self.existing { "EXISTING" } else { "OK" }
    }

    pub fn into_response(self) -> WitnessResponse {
        WitnessResponse {
            success: true,
            uid: self.uid,
            tx_hash: self.tx_hash,
            block_number: self.block_number,
            observed_at: self.observed_at,
            existing: self.existing,
        }
    }
}

/// Runs one witness request through validation, dedup, gating, prior
/// attestation checks, evidence and submission, in that order.
#[derive(Clone)]
pub struct WitnessService {
    gate: Arc<AllowlistGate>,
    ledger: Arc<dyn AttestationLedger>,
    evidence: EvidenceVerifier,
    cache: WitnessCache,
    submitter: AttestationSubmitter,
}

impl WitnessService {
    /// Wires the service to JSON-RPC ledgers and HTTP evidence sources.
    pub fn from_config(config: &WitnessConfig) -> Result<Self, StartupError> {
        let ledger = RpcLedger::new(RpcLedgerConfig {
            endpoints: config.rpc_urls.clone(),
            request_timeout: config.rpc_timeout,
            receipt_timeout: config.receipt_timeout,
            poll_interval: config.receipt_poll_interval,
        })
        .map_err(|err| StartupError {
            code: "ERR_LEDGER_CLIENT",
            message: err.to_string(),
        })?;

        let transport_error = |err: crate::evidence::TransportError| StartupError {
            code: "ERR_EVIDENCE_CLIENT",
            message: err.message,
        };
        let txt = DohTxtResolver::new(config.doh_url.clone(), config.evidence_timeout)
            .map_err(transport_error)?;
        let did_documents = HttpDidDocumentFetcher::new(
            config.did_document_url_template.clone(),
            config.evidence_timeout,
        )
        .map_err(transport_error)?;

        Self::new(
            config,
            Arc::new(ledger),
            EvidenceVerifier::new(Arc::new(txt), Arc::new(did_documents)),
        )
    }

    pub fn new(
        config: &WitnessConfig,
        ledger: Arc<dyn AttestationLedger>,
        evidence: EvidenceVerifier,
    ) -> Result<Self, StartupError> {
        let witness_schema = config.witness_schema().cloned().ok_or_else(|| StartupError {
            code: "ERR_INVALID_SCHEMA_REGISTRY",
            message: format!(
                "witness schema {} is not in the registry",
                config.witness_schema_id
            ),
        })?;

        let cache = WitnessCache::new();
        let submitter = AttestationSubmitter::new(
            ledger.clone(),
            witness_schema,
            config.signer_key.clone(),
            config.approved_attesters.clone(),
            cache.clone(),
        );

        Ok(Self {
            gate: Arc::new(AllowlistGate::new(
                config.approved_contracts.clone(),
                config.schemas.clone(),
            )),
            ledger,
            evidence,
            cache,
            submitter,
        })
    }

    pub fn cache(&self) -> &WitnessCache {
        &self.cache
    }

    /// Validates `body` and runs the pipeline. Request fields are recorded
    /// on the caller's current span.
    pub async fn handle(&self, body: &serde_json::Value) -> Result<WitnessOutcome, WitnessError> {
        let request = validate_request(body)?;

        let span = tracing::Span::current();
        span.record("subject", request.subject.as_str());
        span.record("controller", request.controller.as_str());
        span.record("method", request.method.as_str());

        self.witness(&request).await
    }

    pub async fn witness(&self, request: &WitnessRequest) -> Result<WitnessOutcome, WitnessError> {
        if let Some(entry) = self
            .cache
            .lookup(&request.subject, &request.controller)
            .await
        {
            tracing::info!(
                uid = %entry.uid,
                subject = %request.subject,
                controller = %request.controller,
                "witness.cache_hit"
            );
            return Ok(WitnessOutcome {
                uid: entry.uid,
                tx_hash: None,
                block_number: None,
                observed_at: entry.observed_at,
                existing: true,
            });
        }

        let schema = staged(
            tracing::info_span!(
                "witness.gate",
                chain_id = request.chain_id,
                schema_uid = %request.schema_uid,
                latency_ms = tracing::field::Empty,
                outcome = tracing::field::Empty,
            ),
            async {
                self.gate
                    .check(request.chain_id, &request.eas_contract, &request.schema_uid)
                    .cloned()
            },
        )
        .await?;

        staged(
            tracing::info_span!(
                "witness.reader",
                attestation_uid = %request.attestation_uid,
                schema_id = %schema.id,
                latency_ms = tracing::field::Empty,
                outcome = tracing::field::Empty,
            ),
            verify_prior_attestation(self.ledger.as_ref(), request, &schema),
        )
        .await?;

        staged(
            tracing::info_span!(
                "witness.evidence",
                method = %request.method,
                latency_ms = tracing::field::Empty,
                outcome = tracing::field::Empty,
            ),
            self.evidence
                .verify(&request.subject, &request.controller, request.method),
        )
        .await?;

        let receipt = staged(
            tracing::info_span!(
                "witness.submit",
                chain_id = request.chain_id,
                latency_ms = tracing::field::Empty,
                outcome = tracing::field::Empty,
            ),
            self.submitter.submit(request, unix_now()),
        )
        .await?;

        Ok(WitnessOutcome {
            uid: receipt.uid,
            tx_hash: Some(receipt.tx_hash),
            block_number: Some(receipt.block_number),
            observed_at: receipt.observed_at,
            existing: false,
        })
    }
}

async fn staged<T, F>(span: tracing::Span, stage: F) -> Result<T, WitnessError>
where
    F: Future<Output = Result<T, WitnessError>>,
{
    let started = Instant::now();
    async move {
        let result = stage.await;
        let span = tracing::Span::current();
        span.record("latency_ms", started.elapsed().as_millis() as u64);
        match &result {
            Ok(_) => span.record("outcome", "ok"),
            Err(err) => span.record("outcome", err.code.as_str()),
        };
        result
    }
    .instrument(span)
    .await
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
