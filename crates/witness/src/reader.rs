use omatrust_contracts::ids::same_hex;
use omatrust_contracts::{ErrorCode, SchemaDescriptor, WitnessRequest};
use omatrust_ledger::schema::SchemaEncoding;
use omatrust_ledger::{AttestationLedger, LedgerTarget};

use crate::error::WitnessError;

/// Confirms that the referenced attestation exists, is live, and binds the
/// requested subject to the requested controller.
pub async fn verify_prior_attestation(
    ledger: &dyn AttestationLedger,
    request: &WitnessRequest,
    schema: &SchemaDescriptor,
) -> Result<(), WitnessError> {
    let target = LedgerTarget {
        chain_id: request.chain_id,
        contract: request.eas_contract.clone(),
    };

    let attestation = ledger
        .get_attestation(&target, &request.attestation_uid)
        .await
        .map_err(|err| {
            WitnessError::new(
                ErrorCode::AttestationNotFound,
                format!(
                    "failed to fetch attestation {}: {}",
                    request.attestation_uid, err
                ),
            )
        })?;

    if attestation.is_empty() {
        return Err(WitnessError::new(
            ErrorCode::AttestationNotFound,
            format!(
                "attestation {} does not exist on chain {}",
                request.attestation_uid, request.chain_id
            ),
        ));
    }

    if !same_hex(&attestation.schema, &request.schema_uid) {
        return Err(WitnessError::new(
            ErrorCode::FieldsMismatch,
            format!(
                "attestation schema {} does not match requested schema {}",
                attestation.schema, request.schema_uid
            ),
        ));
    }

    if attestation.revocation_time != 0 {
        return Err(WitnessError::new(
            ErrorCode::AttestationRevoked,
            format!(
                "attestation {} was revoked at {}",
                request.attestation_uid, attestation.revocation_time
            ),
        ));
    }

    let mapping = schema.witness_field_mapping.as_ref().ok_or_else(|| {
        WitnessError::server(format!("schema {} has no witness field mapping", schema.id))
    })?;
    let decoded = SchemaEncoding::parse(&schema.encoding_string)
        .and_then(|encoding| encoding.decode_to_strings(&attestation.data))
        .map_err(|err| {
            WitnessError::server(format!(
                "failed to decode attestation {} with schema {}: {}",
                request.attestation_uid, schema.id, err
            ))
        })?;

    let subject = decoded.get(&mapping.subject_field).map(String::as_str);
    let controller = decoded.get(&mapping.controller_field).map(String::as_str);
    if subject != Some(request.subject.as_str()) || controller != Some(request.controller.as_str())
    {
        return Err(WitnessError::new(
            ErrorCode::FieldsMismatch,
            format!(
                "attestation binds subject={} controller={}, request has subject={} controller={}",
                subject.unwrap_or("<absent>"),
                controller.unwrap_or("<absent>"),
                request.subject,
                request.controller
            ),
        ));
    }

    Ok(())
}
