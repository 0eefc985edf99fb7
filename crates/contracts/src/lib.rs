use serde::{Deserialize, Serialize};

pub mod did;
pub mod ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingFields,
    InvalidSubject,
    InvalidController,
    InvalidMethod,
    ChainNotApproved,
    SchemaNotApproved,
    AttestationNotFound,
    EvidenceNotFound,
    FieldsMismatch,
    AttestationRevoked,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingFields => "MISSING_FIELDS",
            ErrorCode::InvalidSubject => "INVALID_SUBJECT",
            ErrorCode::InvalidController => "INVALID_CONTROLLER",
            ErrorCode::InvalidMethod => "INVALID_METHOD",
            ErrorCode::ChainNotApproved => "CHAIN_NOT_APPROVED",
            ErrorCode::SchemaNotApproved => "SCHEMA_NOT_APPROVED",
            ErrorCode::AttestationNotFound => "ATTESTATION_NOT_FOUND",
            ErrorCode::EvidenceNotFound => "EVIDENCE_NOT_FOUND",
            ErrorCode::FieldsMismatch => "FIELDS_MISMATCH",
            ErrorCode::AttestationRevoked => "ATTESTATION_REVOKED",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::MissingFields
            | ErrorCode::InvalidSubject
            | ErrorCode::InvalidController
            | ErrorCode::InvalidMethod => 400,
            ErrorCode::ChainNotApproved | ErrorCode::SchemaNotApproved => 403,
            ErrorCode::AttestationNotFound | ErrorCode::EvidenceNotFound => 404,
            ErrorCode::AttestationRevoked => 409,
            ErrorCode::FieldsMismatch => 422,
            ErrorCode::ServerError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Off-chain evidence source used to corroborate a subject/controller claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceMethod {
    #[serde(rename = "dns-txt")]
    DnsTxt,
    #[serde(rename = "did-json")]
    DidJson,
}

impl EvidenceMethod {
    pub const ALL: [EvidenceMethod; 2] = [EvidenceMethod::DnsTxt, EvidenceMethod::DidJson];

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceMethod::DnsTxt => "dns-txt",
            EvidenceMethod::DidJson => "did-json",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == raw)
    }
}

impl std::fmt::Display for EvidenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated witness request. Only the input validator constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessRequest {
    pub attestation_uid: String,
    pub chain_id: u64,
    pub eas_contract: String,
    pub schema_uid: String,
    pub subject: String,
    pub controller: String,
    pub method: EvidenceMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessResponse {
    pub success: bool,
    pub uid: String,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub observed_at: u64,
    pub existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub http_status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessFieldMapping {
    pub subject_field: String,
    pub controller_field: String,
}

/// Registry entry describing an attestation schema and where it is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    pub id: String,
    #[serde(rename = "deployedUIDs", default)]
    pub deployed_uids: std::collections::BTreeMap<u64, String>,
    #[serde(rename = "priorUIDs", default, skip_serializing_if = "Option::is_none")]
    pub prior_uids: Option<std::collections::BTreeMap<u64, Vec<String>>>,
    pub encoding_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_field_mapping: Option<WitnessFieldMapping>,
}

impl SchemaDescriptor {
    /// True when `uid` is a deployed or prior UID of this schema on any chain.
    pub fn knows_uid(&self, uid: &str) -> bool {
        let deployed = self
            .deployed_uids
            .values()
            .any(|deployed| deployed.eq_ignore_ascii_case(uid));
        let prior = self.prior_uids.as_ref().is_some_and(|prior| {
            prior
                .values()
                .flatten()
                .any(|prior| prior.eq_ignore_ascii_case(uid))
        });
        deployed || prior
    }

    pub fn deployed_uid(&self, chain_id: u64) -> Option<&str> {
        self.deployed_uids.get(&chain_id).map(|uid| uid.as_str())
    }
}
