use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::hash::{hex_prefixed, keccak256};
use crate::{
    AttestationLedger, AttestationReceipt, AttestationRequest, Attestation, LedgerError,
    LedgerTarget, SubmittedTx, Wallet,
};

/// Process-local ledger with EAS lookup semantics. Used by tests and local
/// smoke runs; counts reads and submissions so callers can assert on them.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    attestations: HashMap<String, Attestation>,
    pending: HashMap<String, AttestationReceipt>,
    block_number: u64,
    reads: usize,
    submissions: usize,
    fail_submissions_with: Option<String>,
    fail_reads_with: Option<String>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, attestation: Attestation) {
        self.state()
            .attestations
            .insert(attestation.uid.to_ascii_lowercase(), attestation);
    }

    pub fn attestation(&self, uid: &str) -> Option<Attestation> {
        self.state()
            .attestations
            .get(&uid.to_ascii_lowercase())
            .cloned()
    }

    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    pub fn submission_count(&self) -> usize {
        self.state().submissions
    }

    /// Makes every later submission revert with `reason`.
    pub fn fail_submissions(&self, reason: impl Into<String>) {
        self.state().fail_submissions_with = Some(reason.into());
    }

    /// Makes every later lookup fail with a transport error carrying `reason`.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        self.state().fail_reads_with = Some(reason.into());
    }

    /// Submitted transactions whose receipt has not been collected yet.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl AttestationLedger for InMemoryLedger {
    async fn get_attestation(
        &self,
        _target: &LedgerTarget,
        uid: &str,
    ) -> Result<Attestation, LedgerError> {
        let mut state = self.state();
        state.reads += 1;
        if let Some(reason) = state.fail_reads_with.clone() {
            return Err(LedgerError::Transport(reason));
        }
        Ok(state
            .attestations
            .get(&uid.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(Attestation::empty))
    }

    async fn attest(
        &self,
        target: &LedgerTarget,
        wallet: &Wallet,
        request: &AttestationRequest,
    ) -> Result<SubmittedTx, LedgerError> {
        let mut state = self.state();
        if let Some(reason) = state.fail_submissions_with.clone() {
            return Err(LedgerError::Reverted(reason));
        }

        state.submissions += 1;
        state.block_number += 1;
        let time = unix_now();

        let mut preimage = Vec::new();
        preimage.extend_from_slice(request.schema.as_bytes());
        preimage.extend_from_slice(request.data.recipient.as_bytes());
        preimage.extend_from_slice(&wallet.address());
        preimage.extend_from_slice(&time.to_be_bytes());
        preimage.extend_from_slice(&target.chain_id.to_be_bytes());
        preimage.extend_from_slice(&(state.submissions as u64).to_be_bytes());
        preimage.extend_from_slice(&request.data.data);

        let uid = hex_prefixed(&keccak256(&preimage));
        let tx_hash = hex_prefixed(&keccak256(uid.as_bytes()));

        let attestation = Attestation {
            uid: uid.clone(),
            schema: request.schema.clone(),
            time,
            expiration_time: request.data.expiration_time,
            revocation_time: 0,
            ref_uid: request.data.ref_uid.clone(),
            recipient: request.data.recipient.clone(),
            attester: wallet.address_hex(),
            revocable: request.data.revocable,
            data: request.data.data.clone(),
        };
        state.attestations.insert(uid.clone(), attestation);

        let receipt = AttestationReceipt {
            uid,
            tx_hash: tx_hash.clone(),
            block_number: state.block_number,
        };
        state.pending.insert(tx_hash.clone(), receipt);

        Ok(SubmittedTx { tx_hash })
    }

    async fn wait_for_attestation(
        &self,
        _target: &LedgerTarget,
        tx: &SubmittedTx,
    ) -> Result<AttestationReceipt, LedgerError> {
        self.state()
            .pending
            .remove(&tx.tx_hash)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("unknown transaction {}", tx.tx_hash)))
    }
}
