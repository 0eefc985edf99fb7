use omatrust_contracts::did::is_did;
use omatrust_contracts::ids::{is_address_hex, is_bytes32_hex};
use omatrust_contracts::{ErrorCode, EvidenceMethod, WitnessRequest};

use crate::error::WitnessError;

const REQUIRED_FIELDS: [&str; 7] = [
    "attestationUid",
    "chainId",
    "easContract",
    "schemaUid",
    "subject",
    "controller",
    "method",
];

/// Validates an untyped request body into a [`WitnessRequest`].
///
/// Every absent or malformed identifier field is reported in a single
/// `MISSING_FIELDS` error; subject, controller and method shape are
/// checked afterwards, in that order.
pub fn validate_request(body: &serde_json::Value) -> Result<WitnessRequest, WitnessError> {
    let Some(object) = body.as_object() else {
        return Err(missing_fields(&REQUIRED_FIELDS));
    };

    let text = |key: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let attestation_uid = text("attestationUid").filter(|v| is_bytes32_hex(v));
    let chain_id = object
        .get("chainId")
        .and_then(|v| v.as_u64())
        .filter(|v| *v > 0);
    let eas_contract = text("easContract").filter(|v| is_address_hex(v));
    let schema_uid = text("schemaUid").filter(|v| is_bytes32_hex(v));
    let subject = text("subject");
    let controller = text("controller");
    let method = text("method");

    let (
        Some(attestation_uid),
        Some(chain_id),
        Some(eas_contract),
        Some(schema_uid),
        Some(subject),
        Some(controller),
        Some(method),
    ) = (
        attestation_uid,
        chain_id,
        eas_contract,
        schema_uid,
        subject,
        controller,
        method,
    )
    else {
        let present = [
            attestation_uid.is_some(),
            chain_id.is_some(),
            eas_contract.is_some(),
            schema_uid.is_some(),
            subject.is_some(),
            controller.is_some(),
            method.is_some(),
        ];
        let missing = REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        return Err(missing_fields(&missing));
    };

    if !is_did(subject) {
        return Err(WitnessError::new(
            ErrorCode::InvalidSubject,
            format!("subject must be a DID (did:<method>:<id>), got {}", subject),
        ));
    }

    if !is_did(controller) {
        return Err(WitnessError::new(
            ErrorCode::InvalidController,
            format!(
                "controller must be a DID (did:<method>:<id>), got {}",
                controller
            ),
        ));
    }

    let Some(method) = EvidenceMethod::parse(method) else {
        let supported = EvidenceMethod::ALL.map(EvidenceMethod::as_str).join(", ");
        return Err(WitnessError::new(
            ErrorCode::InvalidMethod,
            format!("method must be one of {}, got {}", supported, method),
        ));
    };

    Ok(WitnessRequest {
        attestation_uid: attestation_uid.to_string(),
        chain_id,
        eas_contract: eas_contract.to_string(),
        schema_uid: schema_uid.to_string(),
        subject: subject.to_string(),
        controller: controller.to_string(),
        method,
    })
}

fn missing_fields(fields: &[&str]) -> WitnessError {
    WitnessError::new(
        ErrorCode::MissingFields,
        format!("missing or invalid fields: {}", fields.join(", ")),
    )
}
