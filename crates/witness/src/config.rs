use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use omatrust_contracts::SchemaDescriptor;
use omatrust_contracts::ids::{is_address_hex, is_bytes32_hex};
use omatrust_ledger::schema::SchemaEncoding;

/// Fields the witness schema must declare; the submitter fills all four.
pub const WITNESS_FIELDS: [&str; 4] = ["subject", "controller", "method", "observedAt"];

#[derive(Debug, Clone)]
pub struct WitnessConfig {
    pub bind_addr: SocketAddr,
    pub approved_contracts: BTreeMap<u64, String>,
    pub approved_attesters: BTreeMap<u64, Vec<String>>,
    pub schemas: Vec<SchemaDescriptor>,
    pub witness_schema_id: String,
    pub signer_key: Option<SignerKey>,
    pub rpc_urls: BTreeMap<u64, String>,
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub evidence_timeout: Duration,
    pub doh_url: String,
    pub did_document_url_template: String,
}

/// Hex-encoded server signing key. Never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SignerKey(String);

impl SignerKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignerKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl WitnessConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("OMATRUST_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("OMATRUST_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8090),
            "OMATRUST_BIND_ADDR",
        )?;

        let approved_contracts = parse_json_config::<BTreeMap<u64, String>>(
            &require_nonempty(kv, "OMATRUST_APPROVED_CONTRACTS")?,
            "OMATRUST_APPROVED_CONTRACTS",
        )?;
        if let Some((chain_id, contract)) = approved_contracts
            .iter()
            .find(|(_, contract)| !is_address_hex(contract))
        {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "OMATRUST_APPROVED_CONTRACTS entry for chain {} is not a 20-byte hex address: {}",
                    chain_id, contract
                ),
            });
        }

        let approved_attesters = match optional_nonempty(kv, "OMATRUST_APPROVED_ATTESTERS") {
            Some(raw) => parse_json_config::<BTreeMap<u64, Vec<String>>>(
                &raw,
                "OMATRUST_APPROVED_ATTESTERS",
            )?,
            None => BTreeMap::new(),
        };
        if let Some(bad) = approved_attesters
            .values()
            .flatten()
            .find(|attester| !is_address_hex(attester))
        {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "OMATRUST_APPROVED_ATTESTERS contains an invalid address: {}",
                    bad
                ),
            });
        }

        let witness_schema_id = optional_nonempty(kv, "OMATRUST_WITNESS_SCHEMA_ID")
            .unwrap_or_else(|| "controller-witness".to_string());
        let schemas = load_schema_registry(kv)?;
        validate_schema_registry(&schemas, &witness_schema_id)?;

        let signer_key = optional_nonempty(kv, "OMATRUST_SIGNER_PRIVATE_KEY").map(SignerKey::new);

        let rpc_urls = parse_json_config::<BTreeMap<u64, String>>(
            &require_nonempty(kv, "OMATRUST_RPC_URLS")?,
            "OMATRUST_RPC_URLS",
        )?;
        if let Some(chain_id) = approved_contracts
            .keys()
            .find(|chain_id| !rpc_urls.contains_key(chain_id))
        {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!(
                    "OMATRUST_RPC_URLS has no endpoint for approved chain {}",
                    chain_id
                ),
            });
        }

        let rpc_timeout_ms = parse_u64(
            kv.get("OMATRUST_RPC_TIMEOUT_MS"),
            10_000,
            "OMATRUST_RPC_TIMEOUT_MS",
        )?;
        let receipt_timeout_ms = parse_u64(
            kv.get("OMATRUST_RECEIPT_TIMEOUT_MS"),
            120_000,
            "OMATRUST_RECEIPT_TIMEOUT_MS",
        )?;
        let receipt_poll_interval_ms = parse_u64(
            kv.get("OMATRUST_RECEIPT_POLL_INTERVAL_MS"),
            1_500,
            "OMATRUST_RECEIPT_POLL_INTERVAL_MS",
        )?;
        let evidence_timeout_ms = parse_u64(
            kv.get("OMATRUST_EVIDENCE_TIMEOUT_MS"),
            5_000,
            "OMATRUST_EVIDENCE_TIMEOUT_MS",
        )?;
        for (key, value) in [
            ("OMATRUST_RPC_TIMEOUT_MS", rpc_timeout_ms),
            ("OMATRUST_RECEIPT_TIMEOUT_MS", receipt_timeout_ms),
            ("OMATRUST_RECEIPT_POLL_INTERVAL_MS", receipt_poll_interval_ms),
            ("OMATRUST_EVIDENCE_TIMEOUT_MS", evidence_timeout_ms),
        ] {
            if value == 0 {
                return Err(StartupError {
                    code: "ERR_INVALID_CONFIG",
                    message: format!("{} must be > 0", key),
                });
            }
        }

        let doh_url = optional_nonempty(kv, "OMATRUST_DOH_URL")
            .unwrap_or_else(|| "https://cloudflare-dns.com/dns-query".to_string());
        let did_document_url_template =
            optional_nonempty(kv, "OMATRUST_DID_DOCUMENT_URL_TEMPLATE")
                .unwrap_or_else(|| "https://{domain}/.well-known/did.json".to_string());
        if !did_document_url_template.contains("{domain}") {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "OMATRUST_DID_DOCUMENT_URL_TEMPLATE must contain {domain}".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            approved_contracts,
            approved_attesters,
            schemas,
            witness_schema_id,
            signer_key,
            rpc_urls,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            receipt_timeout: Duration::from_millis(receipt_timeout_ms),
            receipt_poll_interval: Duration::from_millis(receipt_poll_interval_ms),
            evidence_timeout: Duration::from_millis(evidence_timeout_ms),
            doh_url,
            did_document_url_template,
        })
    }

    pub fn witness_schema(&self) -> Option<&SchemaDescriptor> {
        self.schemas
            .iter()
            .find(|schema| schema.id == self.witness_schema_id)
    }
}

fn load_schema_registry(kv: &HashMap<String, String>) -> Result<Vec<SchemaDescriptor>, StartupError> {
    if let Some(raw) = optional_nonempty(kv, "OMATRUST_SCHEMA_REGISTRY_JSON") {
        return parse_json_config(&raw, "OMATRUST_SCHEMA_REGISTRY_JSON");
    }

    let Some(path) = optional_nonempty(kv, "OMATRUST_SCHEMA_REGISTRY_PATH") else {
        return Err(StartupError {
            code: "ERR_MISSING_CONFIG",
            message:
                "missing schema registry: set OMATRUST_SCHEMA_REGISTRY_JSON or OMATRUST_SCHEMA_REGISTRY_PATH"
                    .to_string(),
        });
    };

    let contents = std::fs::read_to_string(&path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read schema registry at {}", path),
    })?;
    parse_json_config(&contents, "OMATRUST_SCHEMA_REGISTRY_PATH")
}

fn validate_schema_registry(
    schemas: &[SchemaDescriptor],
    witness_schema_id: &str,
) -> Result<(), StartupError> {
    let invalid = |message: String| StartupError {
        code: "ERR_INVALID_SCHEMA_REGISTRY",
        message,
    };

    let mut seen = BTreeSet::new();
    for schema in schemas {
        if schema.id.trim().is_empty() {
            return Err(invalid("schema id must be non-empty".to_string()));
        }
        if !seen.insert(schema.id.as_str()) {
            return Err(invalid(format!("duplicate schema id {}", schema.id)));
        }

        let prior = schema.prior_uids.iter().flat_map(|p| p.values().flatten());
        if let Some(uid) = schema.deployed_uids.values().chain(prior).find(|uid| !is_bytes32_hex(uid)) {
            return Err(invalid(format!(
                "schema {} lists a UID that is not 32-byte hex: {}",
                schema.id, uid
            )));
        }

        let encoding = SchemaEncoding::parse(&schema.encoding_string).map_err(|err| {
            invalid(format!("schema {} encoding string is invalid: {}", schema.id, err))
        })?;

        if let Some(mapping) = &schema.witness_field_mapping {
            for field in [&mapping.subject_field, &mapping.controller_field] {
                if !encoding.has_field(field) {
                    return Err(invalid(format!(
                        "schema {} maps witness field {} which its encoding does not declare",
                        schema.id, field
                    )));
                }
            }
        }

        if schema.id == witness_schema_id {
            if let Some(missing) = WITNESS_FIELDS.iter().find(|field| !encoding.has_field(field)) {
                return Err(invalid(format!(
                    "witness schema {} must declare field {}",
                    schema.id, missing
                )));
            }
            if let Some(extra) = encoding
                .fields()
                .iter()
                .find(|field| !WITNESS_FIELDS.contains(&field.name.as_str()))
            {
                return Err(invalid(format!(
                    "witness schema {} declares field {} which witness payloads do not carry",
                    schema.id, extra.name
                )));
            }
        }
    }

    if !seen.contains(witness_schema_id) {
        return Err(invalid(format!(
            "witness schema {} is not in the registry",
            witness_schema_id
        )));
    }

    Ok(())
}

fn parse_json_config<T: serde::de::DeserializeOwned>(
    raw: &str,
    key: &'static str,
) -> Result<T, StartupError> {
    serde_json::from_str::<T>(raw).map_err(|err| StartupError {
        code: "ERR_INVALID_CONFIG",
        message: format!("{} must be valid JSON: {}", key, err),
    })
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn optional_nonempty(kv: &HashMap<String, String>, key: &str) -> Option<String> {
    kv.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    optional_nonempty(kv, key).ok_or_else(|| StartupError {
        code: "ERR_MISSING_CONFIG",
        message: format!("missing required config key {}", key),
    })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITNESS_UID: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const KEY_BINDING_UID: &str =
        "0x2222222222222222222222222222222222222222222222222222222222222222";

    fn registry_json() -> String {
        serde_json::json!([
            {
                "id": "controller-witness",
                "deployedUIDs": { "66238": WITNESS_UID },
                "encodingString": "string subject, string controller, string method, uint256 observedAt"
            },
            {
                "id": "key-binding",
                "deployedUIDs": { "66238": KEY_BINDING_UID },
                "encodingString": "string subject, string keyId, uint256 issuedAt",
                "witnessFieldMapping": { "subjectField": "subject", "controllerField": "keyId" }
            }
        ])
        .to_string()
    }

    fn minimal_ok_env() -> HashMap<String, String> {
        HashMap::from([
            (
                "OMATRUST_APPROVED_CONTRACTS".to_string(),
                r#"{"66238":"0x4200000000000000000000000000000000000021"}"#.to_string(),
            ),
            ("OMATRUST_SCHEMA_REGISTRY_JSON".to_string(), registry_json()),
            (
                "OMATRUST_RPC_URLS".to_string(),
                r#"{"66238":"http://127.0.0.1:8545"}"#.to_string(),
            ),
        ])
    }

    #[test]
    fn minimal_env_loads_with_defaults() {
        let cfg = WitnessConfig::from_kv(&minimal_ok_env()).expect("config should load");

        assert_eq!(cfg.bind_addr, "127.0.0.1:8090".parse().expect("addr"));
        assert_eq!(cfg.witness_schema_id, "controller-witness");
        assert_eq!(cfg.rpc_timeout, Duration::from_secs(10));
        assert_eq!(cfg.receipt_timeout, Duration::from_secs(120));
        assert_eq!(cfg.receipt_poll_interval, Duration::from_millis(1500));
        assert_eq!(cfg.evidence_timeout, Duration::from_secs(5));
        assert_eq!(cfg.doh_url, "https://cloudflare-dns.com/dns-query");
        assert!(cfg.approved_attesters.is_empty());
        assert!(cfg.signer_key.is_none());
        assert_eq!(
            cfg.witness_schema().and_then(|s| s.deployed_uid(66238)),
            Some(WITNESS_UID)
        );
    }

    #[test]
    fn missing_approved_contracts_fails() {
        let mut env = minimal_ok_env();
        env.remove("OMATRUST_APPROVED_CONTRACTS");
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_MISSING_CONFIG");
    }

    #[test]
    fn malformed_contract_address_fails() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_APPROVED_CONTRACTS".to_string(),
            r#"{"66238":"0x1234"}"#.to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn approved_chain_without_rpc_url_fails() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_RPC_URLS".to_string(),
            r#"{"1":"http://127.0.0.1:8545"}"#.to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
        assert!(err.message.contains("66238"));
    }

    #[test]
    fn registry_requires_witness_schema() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_WITNESS_SCHEMA_ID".to_string(),
            "does-not-exist".to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_SCHEMA_REGISTRY");
    }

    #[test]
    fn witness_schema_must_declare_all_witness_fields() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_SCHEMA_REGISTRY_JSON".to_string(),
            serde_json::json!([{
                "id": "controller-witness",
                "deployedUIDs": { "66238": WITNESS_UID },
                "encodingString": "string subject, string controller"
            }])
            .to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_SCHEMA_REGISTRY");
        assert!(err.message.contains("method"));
    }

    #[test]
    fn witness_schema_with_extra_field_fails() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_SCHEMA_REGISTRY_JSON".to_string(),
            serde_json::json!([{
                "id": "controller-witness",
                "deployedUIDs": { "66238": WITNESS_UID },
                "encodingString": "string subject, string controller, string method, uint256 observedAt, bytes32 extra"
            }])
            .to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_SCHEMA_REGISTRY");
        assert!(err.message.contains("extra"));
    }

    #[test]
    fn field_mapping_must_name_declared_fields() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_SCHEMA_REGISTRY_JSON".to_string(),
            serde_json::json!([
                {
                    "id": "controller-witness",
                    "deployedUIDs": { "66238": WITNESS_UID },
                    "encodingString": "string subject, string controller, string method, uint256 observedAt"
                },
                {
                    "id": "key-binding",
                    "deployedUIDs": { "66238": KEY_BINDING_UID },
                    "encodingString": "string subject, string keyId",
                    "witnessFieldMapping": { "subjectField": "subject", "controllerField": "owner" }
                }
            ])
            .to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_SCHEMA_REGISTRY");
        assert!(err.message.contains("owner"));
    }

    #[test]
    fn duplicate_schema_ids_fail() {
        let mut env = minimal_ok_env();
        let schema = serde_json::json!({
            "id": "controller-witness",
            "deployedUIDs": { "66238": WITNESS_UID },
            "encodingString": "string subject, string controller, string method, uint256 observedAt"
        });
        env.insert(
            "OMATRUST_SCHEMA_REGISTRY_JSON".to_string(),
            serde_json::json!([schema.clone(), schema]).to_string(),
        );
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_SCHEMA_REGISTRY");
    }

    #[test]
    fn registry_path_is_read_when_json_is_absent() {
        let dir = std::env::temp_dir().join(format!("omatrust-witness-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("schemas.json");
        std::fs::write(&path, registry_json()).expect("write registry");

        let mut env = minimal_ok_env();
        env.remove("OMATRUST_SCHEMA_REGISTRY_JSON");
        env.insert(
            "OMATRUST_SCHEMA_REGISTRY_PATH".to_string(),
            path.to_string_lossy().to_string(),
        );

        let cfg = WitnessConfig::from_kv(&env).expect("config should load");
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(cfg.schemas.len(), 2);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut env = minimal_ok_env();
        env.insert("OMATRUST_EVIDENCE_TIMEOUT_MS".to_string(), "0".to_string());
        let err = WitnessConfig::from_kv(&env).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn signer_key_is_redacted_in_debug_output() {
        let mut env = minimal_ok_env();
        env.insert(
            "OMATRUST_SIGNER_PRIVATE_KEY".to_string(),
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
        );
        let cfg = WitnessConfig::from_kv(&env).expect("config should load");
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("4c0883a6"));
        assert!(cfg.signer_key.is_some());
    }

    #[test]
    fn env_file_lines_strip_quotes() {
        assert_eq!(strip_quotes("\"value\""), "value");
        assert_eq!(strip_quotes("'value'"), "value");
        assert_eq!(strip_quotes("value"), "value");
    }
}
