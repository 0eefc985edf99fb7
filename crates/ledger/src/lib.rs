//! Attestation ledger seam.
//!
//! The witness service reads prior attestations from, and writes witness
//! attestations to, an EAS-style registry contract. [`AttestationLedger`] is
//! the boundary; [`rpc::RpcLedger`] talks to a chain over JSON-RPC and
//! [`memory::InMemoryLedger`] backs tests.

use async_trait::async_trait;

pub mod abi;
pub mod hash;
pub mod memory;
pub mod rpc;
pub mod schema;
pub mod tx;
pub mod wallet;

pub use wallet::Wallet;

#[derive(Debug)]
pub enum LedgerError {
    Timeout,
    UnknownChain(u64),
    Transport(String),
    Rpc { code: i64, message: String },
    Reverted(String),
    InvalidResponse(String),
    Signing(String),
    Abi(abi::AbiError),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Timeout => write!(f, "ledger operation timed out"),
            LedgerError::UnknownChain(chain_id) => {
                write!(f, "no ledger endpoint configured for chain {}", chain_id)
            }
            LedgerError::Transport(message) => write!(f, "ledger transport error: {}", message),
            LedgerError::Rpc { code, message } => {
                write!(f, "ledger rpc error {}: {}", code, message)
            }
            LedgerError::Reverted(reason) => write!(f, "transaction reverted: {}", reason),
            LedgerError::InvalidResponse(message) => {
                write!(f, "ledger returned invalid response: {}", message)
            }
            LedgerError::Signing(message) => write!(f, "signing failed: {}", message),
            LedgerError::Abi(err) => write!(f, "abi error: {}", err),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<abi::AbiError> for LedgerError {
    fn from(value: abi::AbiError) -> Self {
        LedgerError::Abi(value)
    }
}

/// Chain and registry contract a ledger call is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTarget {
    pub chain_id: u64,
    pub contract: String,
}

/// An attestation as stored by the registry contract. Unknown UIDs come
/// back as a record whose `uid` and `schema` are all zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub uid: String,
    pub schema: String,
    pub time: u64,
    pub expiration_time: u64,
    pub revocation_time: u64,
    pub ref_uid: String,
    pub recipient: String,
    pub attester: String,
    pub revocable: bool,
    pub data: Vec<u8>,
}

impl Attestation {
    pub fn empty() -> Self {
        let zero_bytes32 = omatrust_contracts::ids::ZERO_BYTES32.to_string();
        let zero_address = abi::checksum_address(&[0u8; 20]);
        Self {
            uid: zero_bytes32.clone(),
            schema: zero_bytes32.clone(),
            time: 0,
            expiration_time: 0,
            revocation_time: 0,
            ref_uid: zero_bytes32,
            recipient: zero_address.clone(),
            attester: zero_address,
            revocable: false,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        omatrust_contracts::ids::is_zero_bytes32(&self.uid)
            || omatrust_contracts::ids::is_zero_bytes32(&self.schema)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRequestData {
    pub recipient: String,
    pub expiration_time: u64,
    pub revocable: bool,
    pub ref_uid: String,
    pub data: Vec<u8>,
    pub value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRequest {
    pub schema: String,
    pub data: AttestationRequestData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationReceipt {
    pub uid: String,
    pub tx_hash: String,
    pub block_number: u64,
}

#[async_trait]
pub trait AttestationLedger: Send + Sync {
    async fn get_attestation(
        &self,
        target: &LedgerTarget,
        uid: &str,
    ) -> Result<Attestation, LedgerError>;

    /// Signs and broadcasts an attestation. Returns once the transaction is
    /// accepted by the node, before it is mined.
    async fn attest(
        &self,
        target: &LedgerTarget,
        wallet: &Wallet,
        request: &AttestationRequest,
    ) -> Result<SubmittedTx, LedgerError>;

    async fn wait_for_attestation(
        &self,
        target: &LedgerTarget,
        tx: &SubmittedTx,
    ) -> Result<AttestationReceipt, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_attestation_is_the_not_found_sentinel() {
        let empty = Attestation::empty();
        assert!(empty.is_empty());

        let mut found = Attestation::empty();
        found.uid = format!("0x{}", "11".repeat(32));
        assert!(found.is_empty(), "zero schema alone still means not found");

        found.schema = format!("0x{}", "22".repeat(32));
        assert!(!found.is_empty());
    }

    #[test]
    fn ledger_errors_render_their_cause() {
        assert_eq!(
            LedgerError::Reverted("Invalid schema".to_string()).to_string(),
            "transaction reverted: Invalid schema"
        );
        assert_eq!(
            LedgerError::UnknownChain(7).to_string(),
            "no ledger endpoint configured for chain 7"
        );
    }
}
