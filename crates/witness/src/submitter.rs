use std::collections::BTreeMap;
use std::sync::Arc;

use omatrust_contracts::{SchemaDescriptor, WitnessRequest};
use omatrust_ledger::schema::SchemaEncoding;
use omatrust_ledger::{
    AttestationLedger, AttestationRequest, AttestationRequestData, LedgerTarget, Wallet,
};

use crate::cache::WitnessCache;
use crate::config::SignerKey;
use crate::error::WitnessError;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessReceipt {
    pub uid: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub attester: String,
    pub observed_at: u64,
}

/// Encodes, signs and submits witness attestations, then records them in
/// the dedup cache.
#[derive(Clone)]
pub struct AttestationSubmitter {
    ledger: Arc<dyn AttestationLedger>,
    witness_schema: SchemaDescriptor,
    signer_key: Option<SignerKey>,
    approved_attesters: BTreeMap<u64, Vec<String>>,
    cache: WitnessCache,
}

impl AttestationSubmitter {
    pub fn new(
        ledger: Arc<dyn AttestationLedger>,
        witness_schema: SchemaDescriptor,
        signer_key: Option<SignerKey>,
        approved_attesters: BTreeMap<u64, Vec<String>>,
        cache: WitnessCache,
    ) -> Self {
        Self {
            ledger,
            witness_schema,
            signer_key,
            approved_attesters,
            cache,
        }
    }

    fn wallet(&self) -> Result<Wallet, WitnessError> {
        let key = self
            .signer_key
            .as_ref()
            .ok_or_else(|| WitnessError::server("server signing key is not configured"))?;
        Wallet::from_hex(key.expose())
            .map_err(|err| WitnessError::server(format!("server signing key is invalid: {}", err)))
    }

    pub async fn submit(
        &self,
        request: &WitnessRequest,
        observed_at: u64,
    ) -> Result<WitnessReceipt, WitnessError> {
        let wallet = self.wallet()?;
        let attester = wallet.address_hex();

        let schema_uid = self
            .witness_schema
            .deployed_uid(request.chain_id)
            .ok_or_else(|| {
                WitnessError::server(format!(
                    "witness schema {} is not deployed on chain {}",
                    self.witness_schema.id, request.chain_id
                ))
            })?;

        if let Some(approved) = self.approved_attesters.get(&request.chain_id)
            && !approved.is_empty()
            && !approved.iter().any(|a| a.eq_ignore_ascii_case(&attester))
        {
            return Err(WitnessError::server(format!(
                "signer {} is not an approved attester on chain {}",
                attester, request.chain_id
            )));
        }

        let values = BTreeMap::from([
            ("subject".to_string(), request.subject.clone()),
            ("controller".to_string(), request.controller.clone()),
            ("method".to_string(), request.method.as_str().to_string()),
            ("observedAt".to_string(), observed_at.to_string()),
        ]);
        let data = SchemaEncoding::parse(&self.witness_schema.encoding_string)
            .and_then(|encoding| encoding.encode_strings(&values))
            .map_err(|err| {
                WitnessError::server(format!("failed to encode witness payload: {}", err))
            })?;

        let target = LedgerTarget {
            chain_id: request.chain_id,
            contract: request.eas_contract.clone(),
        };
        let attestation = AttestationRequest {
            schema: schema_uid.to_string(),
            data: AttestationRequestData {
                recipient: ZERO_ADDRESS.to_string(),
                expiration_time: 0,
                revocable: true,
                ref_uid: request.attestation_uid.clone(),
                data,
                value: 0,
            },
        };

        let submitted = self
            .ledger
            .attest(&target, &wallet, &attestation)
            .await
            .map_err(|err| WitnessError::server(format!("attestation submission failed: {}", err)))?;
        let receipt = self
            .ledger
            .wait_for_attestation(&target, &submitted)
            .await
            .map_err(|err| {
                WitnessError::server(format!(
                    "attestation {} was not confirmed: {}",
                    submitted.tx_hash, err
                ))
            })?;

        self.cache
            .record(
                &request.subject,
                &request.controller,
                &receipt.uid,
                &attester,
                observed_at,
            )
            .await;
        crate::metrics::inc_submission();

        tracing::info!(
            uid = %receipt.uid,
            tx_hash = %receipt.tx_hash,
            block_number = receipt.block_number,
            attester = %attester,
            chain_id = request.chain_id,
            "witness.attestation_submitted"
        );

        Ok(WitnessReceipt {
            uid: receipt.uid,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            attester,
            observed_at,
        })
    }
}
