//! One mock server stands in for both the mirror REST node and the consensus
//! endpoint; the paths never overlap. Submitted transactions are recovered
//! from the recorded requests by deserializing the borsh body hex, so the
//! assertions see exactly what a node would have seen.

use alloy::dyn_abi::DynSolValue;
use borsh::BorshDeserialize;
use lazykit::abi::ContractInterface;
use lazykit::entity::{AccountId, ContractId, TokenId};
use lazykit::env::NetworkEnvironment;
use lazykit::error::KitResult;
use lazykit::tx::{
    ConsensusClient, FrozenTransaction, Receipt, SignableBody, SubmitAck, TransactionBody, TransactionId,
    TransactionRecord, SUCCESS_STATUS,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_partial_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Throwaway ED25519 seed; never funded on any network.
pub const SEED_HEX: &str = "7f7c92f0382d3d02f3e0d5d1446f2e4e5a0f6aa8a8c9f2d7b2a1c0f9e8d7c6b5";

pub const OPERATOR: AccountId = AccountId::new(0, 0, 1001);
pub const LOTTO: ContractId = ContractId::new(0, 0, 777);
pub const STORAGE: ContractId = ContractId::new(0, 0, 778);
pub const GAS_STATION: ContractId = ContractId::new(0, 0, 779);
pub const LAZY_TOKEN: TokenId = TokenId::new(0, 0, 500);

/// A resolved environment pointing every endpoint at `base`, with mirror
/// propagation pauses disabled so flows run instantly.
pub fn test_env(base: &str) -> NetworkEnvironment {
    let vars: Vec<(&str, String)> = vec![
        ("ENVIRONMENT", "local".to_string()),
        ("ACCOUNT_ID", OPERATOR.to_string()),
        ("PRIVATE_KEY", SEED_HEX.to_string()),
        ("MIRROR_BASE_URL", base.to_string()),
        ("CONSENSUS_NODES", format!("0.0.3={base}")),
        ("LAZY_LOTTO_CONTRACT_ID", LOTTO.to_string()),
        ("LAZY_LOTTO_STORAGE", STORAGE.to_string()),
        ("LAZY_GAS_STATION_CONTRACT_ID", GAS_STATION.to_string()),
        ("LAZY_TRADE_LOTTO_CONTRACT_ID", "0.0.780".to_string()),
        ("LAZY_DELEGATE_REGISTRY_CONTRACT_ID", "0.0.781".to_string()),
        ("LAZY_TOKEN_ID", LAZY_TOKEN.to_string()),
        ("LAZY_DECIMALS", "2".to_string()),
        ("MIRROR_PROPAGATION_DELAY_MS", "0".to_string()),
    ];
    NetworkEnvironment::from_vars(|name| vars.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone()))
        .expect("test environment resolves")
}

/// `0x`-hex calldata for a function call, the form the mirror receives.
pub fn calldata_hex(iface: &ContractInterface, function: &str, args: &[DynSolValue]) -> String {
    format!("0x{}", hex::encode(iface.encode_call(function, args).expect("call encodes")))
}

/// `0x`-hex of an output tuple, the form the mirror and records return.
pub fn encode_outputs(values: Vec<DynSolValue>) -> String {
    format!("0x{}", hex::encode(DynSolValue::Tuple(values).abi_encode_params()))
}

/// Stub one mirror read: exact calldata in, encoded outputs back.
pub async fn mount_read(server: &MockServer, to: ContractId, data: &str, result: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/contracts/call"))
        .and(body_partial_json(json!({
            "to": format!("{:#x}", to.to_evm()),
            "data": data,
            "estimate": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
        .mount(server)
        .await;
}

/// One flat gas figure for every estimate request.
pub async fn mount_gas_estimate(server: &MockServer, gas: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/contracts/call"))
        .and(body_partial_json(json!({ "estimate": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": format!("{gas:#x}") })))
        .mount(server)
        .await;
}

pub async fn mount_hbar_balance(server: &MockServer, balance: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/accounts/{OPERATOR}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balance": { "balance": balance } })))
        .mount(server)
        .await;
}

/// The operator's three allowance tables; pass `json!([])` for empty ones.
pub async fn mount_allowance_tables(server: &MockServer, fungible: Value, nft: Value, crypto: Value) {
    for (kind, allowances) in [("tokens", fungible), ("nfts", nft), ("crypto", crypto)] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/accounts/{OPERATOR}/allowances/{kind}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "allowances": allowances, "links": { "next": null } })),
            )
            .mount(server)
            .await;
    }
}

/// The operator's relationship with one token; `None` means not associated.
pub async fn mount_token_relationship(server: &MockServer, token: TokenId, balance: Option<u64>) {
    let tokens = match balance {
        Some(b) => json!([{ "token_id": token.to_string(), "balance": b }]),
        None => json!([]),
    };
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/accounts/{OPERATOR}/tokens")))
        .and(query_param("token.id", token.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tokens": tokens })))
        .mount(server)
        .await;
}

pub async fn mount_token_info(server: &MockServer, token: TokenId, symbol: &str, decimals: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/tokens/{token}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "symbol": symbol, "decimals": decimals.to_string() })),
        )
        .mount(server)
        .await;
}

/// Accept every submission with an OK ack and a SUCCESS receipt; the record
/// carries `call_result` so the primary call's outputs decode.
pub async fn mount_consensus(server: &MockServer, call_result: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/transactions/.+/receipt$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": SUCCESS_STATUS })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/transactions/.+/record$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transaction_id": format!("{OPERATOR}@0.0"),
            "status": SUCCESS_STATUS,
            "call_result": call_result,
        })))
        .mount(server)
        .await;
}

/// Every transaction body POSTed to the consensus endpoint, in submit order,
/// recovered from the recorded borsh hex.
pub async fn submitted_bodies(server: &MockServer) -> Vec<TransactionBody> {
    let requests = server.received_requests().await.expect("request recording is enabled");
    requests
        .iter()
        .filter(|r| r.url.path() == "/api/v1/transactions" && r.method.as_str() == "POST")
        .map(|r| {
            let envelope: Value = serde_json::from_slice(&r.body).expect("submit envelope is json");
            let body_hex = envelope["body"].as_str().expect("envelope carries hex body");
            let bytes = hex::decode(body_hex).expect("body hex decodes");
            SignableBody::try_from_slice(&bytes).expect("borsh body decodes").body
        })
        .collect()
}

/// In-memory consensus node for flows that never touch HTTP: records every
/// submission, acks with OK and settles everything as SUCCESS.
#[derive(Clone, Default)]
pub struct MockConsensus {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    submitted: Vec<FrozenTransaction>,
    call_result: Option<String>,
}

impl MockConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_result(result: &str) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().call_result = Some(result.to_string());
        mock
    }

    pub fn submitted(&self) -> Vec<TransactionBody> {
        self.state.lock().unwrap().submitted.iter().map(|tx| tx.body().clone()).collect()
    }

    pub fn signature_counts(&self) -> Vec<usize> {
        self.state.lock().unwrap().submitted.iter().map(|tx| tx.signatures().len()).collect()
    }
}

impl ConsensusClient for MockConsensus {
    async fn submit(&self, tx: &FrozenTransaction) -> KitResult<SubmitAck> {
        self.state.lock().unwrap().submitted.push(tx.clone());
        Ok(SubmitAck { status: "OK".into() })
    }

    async fn get_receipt(&self, _id: TransactionId) -> KitResult<Receipt> {
        Ok(Receipt { status: SUCCESS_STATUS.into() })
    }

    async fn get_record(&self, id: TransactionId) -> KitResult<TransactionRecord> {
        Ok(TransactionRecord {
            transaction_id: id.to_string(),
            status: SUCCESS_STATUS.into(),
            call_result: self.state.lock().unwrap().call_result.clone(),
            error_message: None,
            gas_used: Some(100_000),
        })
    }
}
