use std::collections::BTreeMap;

use omatrust_contracts::{ErrorCode, SchemaDescriptor};

use crate::error::WitnessError;

/// Chain/contract approval and schema witness-eligibility lookups.
#[derive(Debug, Clone)]
pub struct AllowlistGate {
    approved_contracts: BTreeMap<u64, String>,
    schemas: Vec<SchemaDescriptor>,
}

impl AllowlistGate {
    pub fn new(approved_contracts: BTreeMap<u64, String>, schemas: Vec<SchemaDescriptor>) -> Self {
        Self {
            approved_contracts,
            schemas,
        }
    }

    /// Returns the descriptor of the witness-eligible schema `schema_uid`
    /// belongs to, once `(chain_id, eas_contract)` is approved.
    pub fn check(
        &self,
        chain_id: u64,
        eas_contract: &str,
        schema_uid: &str,
    ) -> Result<&SchemaDescriptor, WitnessError> {
        let approved = self
            .approved_contracts
            .get(&chain_id)
            .is_some_and(|contract| contract.eq_ignore_ascii_case(eas_contract));
        if !approved {
            return Err(WitnessError::new(
                ErrorCode::ChainNotApproved,
                format!(
                    "contract {} on chain {} is not an approved attestation registry",
                    eas_contract, chain_id
                ),
            ));
        }

        self.schemas
            .iter()
            .find(|schema| schema.witness_field_mapping.is_some() && schema.knows_uid(schema_uid))
            .ok_or_else(|| {
                WitnessError::new(
                    ErrorCode::SchemaNotApproved,
                    format!("schema {} is not approved for witnessing", schema_uid),
                )
            })
    }
}
