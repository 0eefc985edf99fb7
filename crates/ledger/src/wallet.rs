use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::LedgerError;
use crate::abi::{checksum_address, parse_hex_bytes};
use crate::hash::keccak256;

/// secp256k1 signing key held by the service, with its derived address.
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: [u8; 20],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl Wallet {
    pub fn from_hex(raw: &str) -> Result<Self, LedgerError> {
        let bytes = parse_hex_bytes(raw)
            .map_err(|_| LedgerError::Signing("signing key is not valid hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(LedgerError::Signing(
                "signing key must be 32 bytes".to_string(),
            ));
        }

        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| {
            LedgerError::Signing("signing key is not a valid secp256k1 scalar".to_string())
        })?;

        let public_key = k256::PublicKey::from(signing_key.verifying_key());
        let encoded = public_key.to_encoded_point(false);
        let hash = keccak256(&encoded.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> [u8; 20] {
        self.address
    }

    pub fn address_hex(&self) -> String {
        checksum_address(&self.address)
    }

    pub fn sign_prehash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, LedgerError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|_| LedgerError::Signing("failed to sign transaction hash".to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address_hex())
            .finish_non_exhaustive()
    }
}
