use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::abi::{self, AbiType, AbiValue, address_from_hex, bytes32_from_hex, parse_hex_bytes};
use crate::hash::{hex_prefixed, keccak256, selector};
use crate::tx::LegacyTransaction;
use crate::{
    Attestation, AttestationLedger, AttestationReceipt, AttestationRequest, LedgerError,
    LedgerTarget, SubmittedTx, Wallet,
};

const GET_ATTESTATION: &str = "getAttestation(bytes32)";
const ATTESTED_EVENT: &str = "Attested(address,address,bytes32,bytes32)";

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    pub endpoints: BTreeMap<u64, String>,
    pub request_timeout: Duration,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

/// EAS registry client over Ethereum JSON-RPC.
#[derive(Clone)]
pub struct RpcLedger {
    http: reqwest::Client,
    endpoints: BTreeMap<u64, String>,
    receipt_timeout: Duration,
    poll_interval: Duration,
    next_id: Arc<AtomicU64>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    status: Option<String>,
    block_number: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    data: String,
}

impl RpcLedger {
    pub fn new(config: RpcLedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| LedgerError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            endpoints: config.endpoints,
            receipt_timeout: config.receipt_timeout,
            poll_interval: config.poll_interval,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    fn endpoint(&self, chain_id: u64) -> Result<&str, LedgerError> {
        self.endpoints
            .get(&chain_id)
            .map(|url| url.as_str())
            .ok_or(LedgerError::UnknownChain(chain_id))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        chain_id: u64,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, LedgerError> {
        let url = self.endpoint(chain_id)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LedgerError::Timeout
                } else {
                    LedgerError::Transport(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "{} returned status {}",
                method,
                response.status()
            )));
        }

        let body = response
            .json::<RpcResponse<T>>()
            .await
            .map_err(|err| LedgerError::InvalidResponse(format!("{}: {}", method, err)))?;

        if let Some(error) = body.error {
            return Err(rpc_error(error));
        }

        Ok(body.result)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        chain_id: u64,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        self.call(chain_id, method, params)
            .await?
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn quantity(
        &self,
        chain_id: u64,
        method: &str,
        params: serde_json::Value,
    ) -> Result<u128, LedgerError> {
        let raw: String = self.call_required(chain_id, method, params).await?;
        parse_quantity(&raw)
    }

    async fn poll_receipt(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<RpcReceipt, LedgerError> {
        // Transient node errors keep polling; the caller bounds the wait.
        loop {
            let polled: Result<Option<RpcReceipt>, LedgerError> = self
                .call(
                    chain_id,
                    "eth_getTransactionReceipt",
                    serde_json::json!([tx_hash]),
                )
                .await;
            match polled {
                Ok(Some(receipt)) if receipt.block_number.is_some() => return Ok(receipt),
                Ok(_) => {}
                Err(
                    err @ (LedgerError::Transport(_)
                    | LedgerError::Timeout
                    | LedgerError::Rpc { .. }),
                ) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %err, "ledger.receipt_poll_failed");
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn rpc_error(error: RpcErrorBody) -> LedgerError {
    let reverted = error.code == 3 || error.message.contains("revert");
    if reverted {
        let reason = match error.data.as_ref().and_then(|d| d.as_str()) {
            Some(data) => decode_revert_reason(data)
                .map(|reason| format!("{} ({})", error.message, reason))
                .unwrap_or(error.message),
            None => error.message,
        };
        return LedgerError::Reverted(reason);
    }
    LedgerError::Rpc {
        code: error.code,
        message: error.message,
    }
}

/// Decodes `Error(string)` revert payloads.
fn decode_revert_reason(data: &str) -> Option<String> {
    let bytes = parse_hex_bytes(data).ok()?;
    let (head, body) = bytes.split_at_checked(4)?;
    if head != selector("Error(string)").as_slice() {
        return Some(hex_prefixed(&bytes));
    }
    match abi::decode(&[AbiType::String], body).ok()?.pop()? {
        AbiValue::String(reason) => Some(reason),
        _ => None,
    }
}

fn parse_quantity(raw: &str) -> Result<u128, LedgerError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| LedgerError::InvalidResponse(format!("invalid quantity {}", raw)))
}

fn quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

fn attestation_type() -> AbiType {
    AbiType::Tuple(vec![
        AbiType::FixedBytes(32),
        AbiType::FixedBytes(32),
        AbiType::Uint(64),
        AbiType::Uint(64),
        AbiType::Uint(64),
        AbiType::FixedBytes(32),
        AbiType::Address,
        AbiType::Address,
        AbiType::Bool,
        AbiType::Bytes,
    ])
}

fn attestation_request_type() -> AbiType {
    AbiType::Tuple(vec![
        AbiType::FixedBytes(32),
        AbiType::Tuple(vec![
            AbiType::Address,
            AbiType::Uint(64),
            AbiType::Bool,
            AbiType::FixedBytes(32),
            AbiType::Bytes,
            AbiType::Uint(256),
        ]),
    ])
}

pub(crate) fn get_attestation_calldata(uid: &str) -> Result<Vec<u8>, LedgerError> {
    let mut calldata = selector(GET_ATTESTATION).to_vec();
    calldata.extend(abi::encode(&[AbiValue::bytes32(bytes32_from_hex(uid)?)]));
    Ok(calldata)
}

pub(crate) fn attest_calldata(request: &AttestationRequest) -> Result<Vec<u8>, LedgerError> {
    let signature = format!("attest({})", attestation_request_type().canonical());
    let value = AbiValue::Tuple(vec![
        AbiValue::bytes32(bytes32_from_hex(&request.schema)?),
        AbiValue::Tuple(vec![
            AbiValue::Address(address_from_hex(&request.data.recipient)?),
            AbiValue::uint(u128::from(request.data.expiration_time)),
            AbiValue::Bool(request.data.revocable),
            AbiValue::bytes32(bytes32_from_hex(&request.data.ref_uid)?),
            AbiValue::Bytes(request.data.data.clone()),
            AbiValue::uint(request.data.value),
        ]),
    ]);

    let mut calldata = selector(&signature).to_vec();
    calldata.extend(abi::encode(&[value]));
    Ok(calldata)
}

pub(crate) fn decode_attestation(output: &[u8]) -> Result<Attestation, LedgerError> {
    let mut values = abi::decode(&[attestation_type()], output)?;
    let fields = match values.pop() {
        Some(AbiValue::Tuple(fields)) if fields.len() == 10 => fields,
        _ => {
            return Err(LedgerError::InvalidResponse(
                "getAttestation returned an unexpected shape".to_string(),
            ));
        }
    };

    let bytes_hex = |value: &AbiValue| value.as_bytes().map(hex_prefixed);
    let number = |value: &AbiValue| value.as_u64();
    let address = |value: &AbiValue| value.as_address().map(abi::checksum_address);
    let malformed = || LedgerError::InvalidResponse("malformed attestation tuple".to_string());

    Ok(Attestation {
        uid: bytes_hex(&fields[0]).ok_or_else(malformed)?,
        schema: bytes_hex(&fields[1]).ok_or_else(malformed)?,
        time: number(&fields[2]).ok_or_else(malformed)?,
        expiration_time: number(&fields[3]).ok_or_else(malformed)?,
        revocation_time: number(&fields[4]).ok_or_else(malformed)?,
        ref_uid: bytes_hex(&fields[5]).ok_or_else(malformed)?,
        recipient: address(&fields[6]).ok_or_else(malformed)?,
        attester: address(&fields[7]).ok_or_else(malformed)?,
        revocable: fields[8].as_bool().ok_or_else(malformed)?,
        data: fields[9].as_bytes().map(<[u8]>::to_vec).ok_or_else(malformed)?,
    })
}

fn attested_uid(receipt: &RpcReceipt, contract: &str) -> Option<String> {
    let topic = hex_prefixed(&keccak256(ATTESTED_EVENT.as_bytes()));
    receipt
        .logs
        .iter()
        .filter(|log| log.address.eq_ignore_ascii_case(contract))
        .find(|log| {
            log.topics
                .first()
                .is_some_and(|first| first.eq_ignore_ascii_case(&topic))
        })
        .and_then(|log| parse_hex_bytes(&log.data).ok())
        .and_then(|data| data.get(..32).map(hex_prefixed))
}

#[async_trait]
impl AttestationLedger for RpcLedger {
    async fn get_attestation(
        &self,
        target: &LedgerTarget,
        uid: &str,
    ) -> Result<Attestation, LedgerError> {
        let calldata = get_attestation_calldata(uid)?;
        let output: String = self
            .call_required(
                target.chain_id,
                "eth_call",
                serde_json::json!([
                    { "to": target.contract, "data": hex_prefixed(&calldata) },
                    "latest"
                ]),
            )
            .await?;

        let output = parse_hex_bytes(&output)?;
        decode_attestation(&output)
    }

    async fn attest(
        &self,
        target: &LedgerTarget,
        wallet: &Wallet,
        request: &AttestationRequest,
    ) -> Result<SubmittedTx, LedgerError> {
        let chain_id = target.chain_id;
        let from = wallet.address_hex();
        let calldata = attest_calldata(request)?;
        let data_hex = hex_prefixed(&calldata);

        let nonce = self
            .quantity(
                chain_id,
                "eth_getTransactionCount",
                serde_json::json!([from, "pending"]),
            )
            .await?;
        let gas_price = self
            .quantity(chain_id, "eth_gasPrice", serde_json::json!([]))
            .await?;
        let gas_estimate = self
            .quantity(
                chain_id,
                "eth_estimateGas",
                serde_json::json!([{
                    "from": from,
                    "to": target.contract,
                    "data": data_hex,
                    "value": quantity(request.data.value),
                }]),
            )
            .await?;

        let tx = LegacyTransaction {
            nonce: u64::try_from(nonce)
                .map_err(|_| LedgerError::InvalidResponse("nonce out of range".to_string()))?,
            gas_price,
            gas_limit: u64::try_from(gas_estimate.saturating_mul(6) / 5)
                .map_err(|_| LedgerError::InvalidResponse("gas out of range".to_string()))?,
            to: address_from_hex(&target.contract)?,
            value: request.data.value,
            data: calldata,
            chain_id,
        };
        let raw = tx.sign(wallet)?;

        let tx_hash: String = self
            .call_required(
                chain_id,
                "eth_sendRawTransaction",
                serde_json::json!([hex_prefixed(&raw)]),
            )
            .await?;

        tracing::info!(
            chain_id,
            tx_hash = %tx_hash,
            from = %from,
            "ledger.attestation_broadcast"
        );

        Ok(SubmittedTx { tx_hash })
    }

    async fn wait_for_attestation(
        &self,
        target: &LedgerTarget,
        tx: &SubmittedTx,
    ) -> Result<AttestationReceipt, LedgerError> {
        let receipt = tokio::time::timeout(
            self.receipt_timeout,
            self.poll_receipt(target.chain_id, &tx.tx_hash),
        )
        .await
        .map_err(|_| LedgerError::Timeout)??;

        let block_number = receipt
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| LedgerError::InvalidResponse("receipt missing block".to_string()))?;

        if receipt.status.as_deref() == Some("0x0") {
            return Err(LedgerError::Reverted(format!(
                "transaction {} reverted in block {}",
                tx.tx_hash, block_number
            )));
        }

        let uid = attested_uid(&receipt, &target.contract).ok_or_else(|| {
            LedgerError::InvalidResponse(format!(
                "transaction {} emitted no Attested event",
                tx.tx_hash
            ))
        })?;

        Ok(AttestationReceipt {
            uid,
            tx_hash: tx.tx_hash.clone(),
            block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const CONTRACT: &str = "0x4200000000000000000000000000000000000021";

    fn sample_attestation() -> Attestation {
        Attestation {
            uid: format!("0x{}", "11".repeat(32)),
            schema: format!("0x{}", "22".repeat(32)),
            time: 1_760_000_000,
            expiration_time: 0,
            revocation_time: 0,
            ref_uid: format!("0x{}", "00".repeat(32)),
            recipient: abi::checksum_address(&[0u8; 20]),
            attester: abi::checksum_address(&[0x33; 20]),
            revocable: true,
            data: b"payload".to_vec(),
        }
    }

    fn encode_attestation(attestation: &Attestation) -> Vec<u8> {
        abi::encode(&[AbiValue::Tuple(vec![
            AbiValue::bytes32(bytes32_from_hex(&attestation.uid).expect("uid")),
            AbiValue::bytes32(bytes32_from_hex(&attestation.schema).expect("schema")),
            AbiValue::uint(u128::from(attestation.time)),
            AbiValue::uint(u128::from(attestation.expiration_time)),
            AbiValue::uint(u128::from(attestation.revocation_time)),
            AbiValue::bytes32(bytes32_from_hex(&attestation.ref_uid).expect("ref")),
            AbiValue::Address(address_from_hex(&attestation.recipient).expect("recipient")),
            AbiValue::Address(address_from_hex(&attestation.attester).expect("attester")),
            AbiValue::Bool(attestation.revocable),
            AbiValue::Bytes(attestation.data.clone()),
        ])])
    }

    async fn spawn_mock_node(
        eth_call_output: String,
    ) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        async fn handle(
            axum::extract::State(output): axum::extract::State<String>,
            Json(req): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            let id = req["id"].clone();
            let method = req["method"].as_str().unwrap_or_default();
            let attested_topic = hex_prefixed(&keccak256(ATTESTED_EVENT.as_bytes()));
            let result = match method {
                "eth_call" => serde_json::json!(output),
                "eth_getTransactionCount" => serde_json::json!("0x7"),
                "eth_gasPrice" => serde_json::json!("0x3b9aca00"),
                "eth_estimateGas" => serde_json::json!("0x30d40"),
                "eth_sendRawTransaction" => serde_json::json!(format!("0x{}", "ee".repeat(32))),
                "eth_getTransactionReceipt" => serde_json::json!({
                    "status": "0x1",
                    "blockNumber": "0x2a",
                    "logs": [{
                        "address": CONTRACT,
                        "topics": [attested_topic],
                        "data": format!("0x{}", "99".repeat(32)),
                    }]
                }),
                _ => {
                    return Json(serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32601, "message": "method not found" }
                    }));
                }
            };
            Json(serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }))
        }

        let app = Router::new()
            .route("/", post(handle))
            .with_state(eth_call_output);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local_addr should succeed");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        (addr, shutdown_tx, handle)
    }

    fn ledger_for(addr: SocketAddr) -> RpcLedger {
        RpcLedger::new(RpcLedgerConfig {
            endpoints: BTreeMap::from([(66238, format!("http://{}", addr))]),
            request_timeout: Duration::from_secs(5),
            receipt_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        })
        .expect("client should build")
    }

    fn target() -> LedgerTarget {
        LedgerTarget {
            chain_id: 66238,
            contract: CONTRACT.to_string(),
        }
    }

    #[test]
    fn decodes_attestation_tuple() {
        let attestation = sample_attestation();
        let decoded =
            decode_attestation(&encode_attestation(&attestation)).expect("tuple must decode");
        assert_eq!(decoded, attestation);
    }

    #[test]
    fn attest_calldata_uses_eas_selector() {
        let request = AttestationRequest {
            schema: format!("0x{}", "22".repeat(32)),
            data: crate::AttestationRequestData {
                recipient: format!("0x{}", "00".repeat(20)),
                expiration_time: 0,
                revocable: true,
                ref_uid: format!("0x{}", "11".repeat(32)),
                data: b"witness".to_vec(),
                value: 0,
            },
        };
        let calldata = attest_calldata(&request).expect("calldata must encode");
        assert_eq!(
            &calldata[..4],
            &selector("attest((bytes32,(address,uint64,bool,bytes32,bytes,uint256)))")
        );
        // single dynamic tuple argument: offset word first
        assert_eq!(calldata[4 + 31], 0x20);
    }

    #[test]
    fn revert_reason_is_decoded_from_error_string() {
        let mut payload = selector("Error(string)").to_vec();
        payload.extend(abi::encode(&[AbiValue::String("InvalidSchema".to_string())]));
        assert_eq!(
            decode_revert_reason(&hex_prefixed(&payload)).as_deref(),
            Some("InvalidSchema")
        );

        let err = rpc_error(RpcErrorBody {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(serde_json::json!(hex_prefixed(&payload))),
        });
        assert!(err.to_string().contains("InvalidSchema"));
    }

    #[test]
    fn quantities_parse_hex() {
        assert_eq!(parse_quantity("0x0").expect("zero"), 0);
        assert_eq!(parse_quantity("0x2a").expect("42"), 42);
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(quantity(255), "0xff");
    }

    #[tokio::test]
    async fn reads_attestation_over_json_rpc() {
        let attestation = sample_attestation();
        let (addr, shutdown, task) =
            spawn_mock_node(hex_prefixed(&encode_attestation(&attestation))).await;

        let found = ledger_for(addr)
            .get_attestation(&target(), &attestation.uid)
            .await
            .expect("lookup should succeed");

        shutdown.send(()).ok();
        let _ = task.await;

        assert_eq!(found, attestation);
    }

    #[tokio::test]
    async fn submits_and_reads_uid_from_attested_log() {
        let (addr, shutdown, task) = spawn_mock_node("0x".to_string()).await;
        let ledger = ledger_for(addr);
        let wallet = Wallet::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .expect("key must load");

        let request = AttestationRequest {
            schema: format!("0x{}", "22".repeat(32)),
            data: crate::AttestationRequestData {
                recipient: format!("0x{}", "00".repeat(20)),
                expiration_time: 0,
                revocable: true,
                ref_uid: format!("0x{}", "11".repeat(32)),
                data: b"witness".to_vec(),
                value: 0,
            },
        };

        let tx = ledger
            .attest(&target(), &wallet, &request)
            .await
            .expect("attest should succeed");
        let receipt = ledger
            .wait_for_attestation(&target(), &tx)
            .await
            .expect("receipt should resolve");

        shutdown.send(()).ok();
        let _ = task.await;

        assert_eq!(tx.tx_hash, format!("0x{}", "ee".repeat(32)));
        assert_eq!(receipt.uid, format!("0x{}", "99".repeat(32)));
        assert_eq!(receipt.block_number, 42);
    }

    struct FlakyNode {
        polls: AtomicU64,
        failures: u64,
    }

    async fn spawn_flaky_receipt_node(
        failures: u64,
    ) -> (SocketAddr, Arc<FlakyNode>, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        async fn handle(
            axum::extract::State(node): axum::extract::State<Arc<FlakyNode>>,
            Json(req): Json<serde_json::Value>,
        ) -> axum::response::Response {
            use axum::response::IntoResponse;

            if node.polls.fetch_add(1, Ordering::Relaxed) < node.failures {
                return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            Json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": req["id"].clone(),
                "result": {
                    "status": "0x1",
                    "blockNumber": "0x2b",
                    "logs": [{
                        "address": CONTRACT,
                        "topics": [hex_prefixed(&keccak256(ATTESTED_EVENT.as_bytes()))],
                        "data": format!("0x{}", "98".repeat(32)),
                    }]
                }
            }))
            .into_response()
        }

        let node = Arc::new(FlakyNode {
            polls: AtomicU64::new(0),
            failures,
        });
        let app = Router::new()
            .route("/", post(handle))
            .with_state(node.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local_addr should succeed");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        (addr, node, shutdown_tx, handle)
    }

    fn broadcast_tx() -> SubmittedTx {
        SubmittedTx {
            tx_hash: format!("0x{}", "ee".repeat(32)),
        }
    }

    #[tokio::test]
    async fn receipt_wait_survives_transient_node_errors() {
        let (addr, node, shutdown, task) = spawn_flaky_receipt_node(2).await;

        let receipt = ledger_for(addr)
            .wait_for_attestation(&target(), &broadcast_tx())
            .await
            .expect("receipt should resolve after transient errors");

        shutdown.send(()).ok();
        let _ = task.await;

        assert_eq!(receipt.uid, format!("0x{}", "98".repeat(32)));
        assert_eq!(receipt.block_number, 43);
        assert_eq!(node.polls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn receipt_wait_is_bounded_when_node_keeps_failing() {
        let (addr, _node, shutdown, task) = spawn_flaky_receipt_node(u64::MAX).await;
        let ledger = RpcLedger::new(RpcLedgerConfig {
            endpoints: BTreeMap::from([(66238, format!("http://{}", addr))]),
            request_timeout: Duration::from_secs(1),
            receipt_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
        })
        .expect("client should build");

        let err = ledger
            .wait_for_attestation(&target(), &broadcast_tx())
            .await
            .expect_err("wait must time out");

        shutdown.send(()).ok();
        let _ = task.await;

        assert!(matches!(err, LedgerError::Timeout));
    }

    #[tokio::test]
    async fn unknown_chain_fails_without_network() {
        let ledger = RpcLedger::new(RpcLedgerConfig {
            endpoints: BTreeMap::new(),
            request_timeout: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        })
        .expect("client should build");

        let err = ledger
            .get_attestation(&target(), &format!("0x{}", "11".repeat(32)))
            .await
            .expect_err("lookup must fail");
        assert!(matches!(err, LedgerError::UnknownChain(66238)));
    }
}
