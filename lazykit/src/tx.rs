//! Build, freeze, sign and submit transactions, then surface receipts and
//! records.
//!
//! The signable body is canonical borsh bytes; freezing fixes the transaction
//! ID (payer + valid start), the node account and the validity window, and
//! from that point the SHA-384 body hash is invariant. Signatures attach to
//! the frozen body; any re-freeze produces a new hash and silently invalidates
//! previously collected signatures, which is exactly what the offline
//! multi-sig workflow relies on.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::dyn_abi::DynSolValue;
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};

use crate::abi::{ContractInterface, InterfaceRegistry};
use crate::entity::{AccountId, ContractId, TokenId};
use crate::env::NetworkEnvironment;
use crate::error::{KitError, KitResult};

pub const BODY_VERSION: u8 = 1;
pub const VALID_DURATION_SECS: u64 = 120;
pub const SUCCESS_STATUS: &str = "SUCCESS";
const SUBMIT_OK: &str = "OK";
const DEFAULT_RECEIPT_POLL_MS: u64 = 1_500;
const DEFAULT_RECEIPT_ATTEMPTS: u32 = 20;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FungibleApproval {
    pub token: TokenId,
    pub spender: AccountId,
    pub amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NftOperatorApproval {
    pub token: TokenId,
    pub spender: AccountId,
    pub approved_for_all: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct HbarApproval {
    pub spender: AccountId,
    pub amount_tinybar: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TokenMovement {
    Fungible { token: TokenId, to: AccountId, amount: u128 },
    Nft { token: TokenId, serial: u64, to: AccountId },
}

/// Everything the network can be asked to do through this toolkit.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TransactionBody {
    ContractExecute { contract: ContractId, call_data: Vec<u8>, gas: u64, value_tinybar: u64 },
    TokenAssociate { account: AccountId, tokens: Vec<TokenId> },
    ApproveAllowances { fungible: Vec<FungibleApproval>, nft: Vec<NftOperatorApproval>, hbar: Vec<HbarApproval> },
    CryptoTransfer { from: AccountId, movements: Vec<TokenMovement> },
}

/// Globally-unique transaction identifier fixed at freeze time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct TransactionId {
    pub payer: AccountId,
    pub valid_start_nanos: u64,
}

impl TransactionId {
    pub fn generate(payer: AccountId) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        TransactionId { payer, valid_start_nanos: now.as_nanos() as u64 }
    }

    /// Mirror-style path form: `0.0.1001-1700000000-123456789`.
    pub fn path_form(&self) -> String {
        let secs = self.valid_start_nanos / 1_000_000_000;
        let nanos = self.valid_start_nanos % 1_000_000_000;
        format!("{}-{}-{}", self.payer, secs, nanos)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.valid_start_nanos / 1_000_000_000;
        let nanos = self.valid_start_nanos % 1_000_000_000;
        write!(f, "{}@{}.{}", self.payer, secs, nanos)
    }
}

/// The borsh-serialized portion a signature covers.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignableBody {
    pub version: u8,
    pub id: TransactionId,
    pub node: AccountId,
    pub valid_duration_secs: u64,
    pub body: TransactionBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePair {
    pub public_key: [u8; 32],
    #[serde(with = "sig_hex")]
    pub signature: [u8; 64],
}

mod sig_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sig: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(sig))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.as_slice().try_into().map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))
    }
}

/// A frozen transaction: body bytes fixed, signatures attachable.
#[derive(Clone, Debug)]
pub struct FrozenTransaction {
    signable: SignableBody,
    body_bytes: Vec<u8>,
    signatures: Vec<SignaturePair>,
}

impl FrozenTransaction {
    pub fn freeze(body: TransactionBody, payer: AccountId, node: AccountId) -> KitResult<Self> {
        Self::freeze_with_id(body, TransactionId::generate(payer), node)
    }

    pub fn freeze_with_id(body: TransactionBody, id: TransactionId, node: AccountId) -> KitResult<Self> {
        let signable = SignableBody { version: BODY_VERSION, id, node, valid_duration_secs: VALID_DURATION_SECS, body };
        let body_bytes = borsh::to_vec(&signable)
            .map_err(|e| KitError::SubmitFailed { status: format!("body serialization: {e}") })?;
        Ok(FrozenTransaction { signable, body_bytes, signatures: Vec::new() })
    }

    /// Rebuild a frozen transaction from serialized body bytes (multi-sig
    /// merge path). The bytes themselves are the source of truth.
    pub fn thaw(body_bytes: Vec<u8>) -> KitResult<Self> {
        let signable = SignableBody::try_from_slice(&body_bytes)
            .map_err(|e| KitError::SubmitFailed { status: format!("body deserialization: {e}") })?;
        Ok(FrozenTransaction { signable, body_bytes, signatures: Vec::new() })
    }

    pub fn id(&self) -> TransactionId {
        self.signable.id
    }

    pub fn node(&self) -> AccountId {
        self.signable.node
    }

    pub fn body(&self) -> &TransactionBody {
        &self.signable.body
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn valid_duration(&self) -> Duration {
        Duration::from_secs(self.signable.valid_duration_secs)
    }

    /// SHA-384 over the frozen body bytes; what every signature covers.
    pub fn body_hash(&self) -> [u8; 48] {
        let digest = Sha384::digest(&self.body_bytes);
        digest.into()
    }

    pub fn sign(&mut self, key: &SigningKey) {
        let signature = key.sign(&self.body_hash());
        self.signatures.push(SignaturePair {
            public_key: key.verifying_key().to_bytes(),
            signature: signature.to_bytes(),
        });
    }

    /// Attach an externally produced signature after verifying it against
    /// the frozen body hash.
    pub fn attach_signature(&mut self, public_key: [u8; 32], signature: [u8; 64]) -> KitResult<()> {
        let key = VerifyingKey::from_bytes(&public_key)
            .map_err(|e| KitError::SubmitFailed { status: format!("bad signer public key: {e}") })?;
        key.verify(&self.body_hash(), &Signature::from_bytes(&signature))
            .map_err(|_| KitError::SubmitFailed { status: "signature does not match frozen body".into() })?;
        self.signatures.push(SignaturePair { public_key, signature });
        Ok(())
    }

    pub fn signatures(&self) -> &[SignaturePair] {
        &self.signatures
    }
}

/// Pre-consensus acknowledgement from the node.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAck {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    pub status: String,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    pub fn is_pending(&self) -> bool {
        self.status == "UNKNOWN" || self.status == "PENDING"
    }
}

/// Post-consensus record; `call_result` is the raw EVM output when the
/// transaction was a contract execute.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub status: String,
    #[serde(default)]
    pub call_result: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub gas_used: Option<u64>,
}

impl TransactionRecord {
    pub fn call_result_bytes(&self) -> KitResult<Option<Vec<u8>>> {
        match &self.call_result {
            Some(s) if !s.is_empty() && s != "0x" => {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                Ok(Some(hex::decode(stripped).map_err(|e| KitError::AbiDecode {
                    context: "record call result".into(),
                    reason: e.to_string(),
                })?))
            }
            _ => Ok(None),
        }
    }

    pub fn revert_bytes(&self) -> Option<Vec<u8>> {
        let raw = self.error_message.as_ref()?;
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        hex::decode(stripped).ok()
    }
}

/// Consensus-node transport. Kept as a trait so the submit pipeline and the
/// multi-sig coordinator test against an in-memory network.
pub trait ConsensusClient {
    fn submit(&self, tx: &FrozenTransaction) -> impl std::future::Future<Output = KitResult<SubmitAck>> + Send;
    fn get_receipt(&self, id: TransactionId) -> impl std::future::Future<Output = KitResult<Receipt>> + Send;
    fn get_record(&self, id: TransactionId) -> impl std::future::Future<Output = KitResult<TransactionRecord>> + Send;
}

#[derive(Debug, Serialize)]
struct SubmitEnvelope<'a> {
    node: String,
    transaction_id: String,
    body: String,
    signatures: &'a [SignaturePair],
}

/// HTTP implementation against the environment's node endpoint set.
pub struct HttpConsensusClient {
    http: reqwest::Client,
    nodes: Vec<(AccountId, String)>,
}

impl HttpConsensusClient {
    pub fn new(env: &NetworkEnvironment) -> KitResult<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(HttpConsensusClient { http, nodes: env.nodes.clone() })
    }

    fn endpoint_for(&self, node: AccountId) -> KitResult<&str> {
        self.nodes
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, url)| url.as_str())
            .ok_or_else(|| KitError::SubmitFailed { status: format!("no endpoint for node {node}") })
    }
}

impl ConsensusClient for HttpConsensusClient {
    async fn submit(&self, tx: &FrozenTransaction) -> KitResult<SubmitAck> {
        let url = format!("{}/api/v1/transactions", self.endpoint_for(tx.node())?);
        let envelope = SubmitEnvelope {
            node: tx.node().to_string(),
            transaction_id: tx.id().to_string(),
            body: hex::encode(tx.body_bytes()),
            signatures: tx.signatures(),
        };
        let rsp = self.http.post(&url).json(&envelope).send().await?;
        if !rsp.status().is_success() {
            return Err(KitError::SubmitFailed { status: format!("http {}", rsp.status()) });
        }
        Ok(rsp.json().await?)
    }

    async fn get_receipt(&self, id: TransactionId) -> KitResult<Receipt> {
        let (_, url) = self.nodes.first().ok_or_else(|| KitError::Env("empty node set".into()))?;
        let rsp = self.http.get(format!("{url}/api/v1/transactions/{}/receipt", id.path_form())).send().await?;
        Ok(rsp.json().await?)
    }

    async fn get_record(&self, id: TransactionId) -> KitResult<TransactionRecord> {
        let (_, url) = self.nodes.first().ok_or_else(|| KitError::Env("empty node set".into()))?;
        let rsp = self.http.get(format!("{url}/api/v1/transactions/{}/record", id.path_form())).send().await?;
        Ok(rsp.json().await?)
    }
}

/// `(contract, function, args, gas, value, sender)` — immutable once built.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub contract: ContractId,
    pub function: String,
    pub args: Vec<DynSolValue>,
    pub gas_limit: u64,
    pub value_tinybar: u64,
    pub sender: AccountId,
}

/// Outcome of a state-changing call. Callers match on fields by name; the
/// shape is deliberately not a tuple.
#[derive(Debug)]
pub struct CallOutcome {
    pub status: String,
    pub outputs: Option<Vec<DynSolValue>>,
    pub record: TransactionRecord,
}

/// Drives the direct-submit pipeline end to end.
pub struct Submitter<'a, C> {
    env: &'a NetworkEnvironment,
    registry: &'a InterfaceRegistry,
    client: C,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl<'a, C: ConsensusClient> Submitter<'a, C> {
    pub fn new(env: &'a NetworkEnvironment, registry: &'a InterfaceRegistry, client: C) -> Self {
        Submitter {
            env,
            registry,
            client,
            poll_interval: Duration::from_millis(DEFAULT_RECEIPT_POLL_MS),
            poll_attempts: DEFAULT_RECEIPT_ATTEMPTS,
        }
    }

    pub fn with_receipt_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    fn pick_node(&self) -> KitResult<AccountId> {
        self.env.nodes.first().map(|(id, _)| *id).ok_or_else(|| KitError::Env("empty node set".into()))
    }

    /// Freeze a contract-execute call without submitting (multi-sig export).
    pub fn freeze_call(&self, iface: &ContractInterface, req: &CallRequest) -> KitResult<FrozenTransaction> {
        if req.value_tinybar > 0 && !iface.is_payable(&req.function)? {
            return Err(KitError::AbiEncode {
                function: req.function.clone(),
                reason: "attached value on a non-payable function".into(),
            });
        }
        let call_data = iface.encode_call(&req.function, &req.args)?;
        let body = TransactionBody::ContractExecute {
            contract: req.contract,
            call_data,
            gas: req.gas_limit,
            value_tinybar: req.value_tinybar,
        };
        FrozenTransaction::freeze(body, req.sender, self.pick_node()?)
    }

    /// The direct-submit pipeline: freeze, sign with the operator key,
    /// submit, await receipt, fetch record, decode outputs.
    pub async fn execute(&self, iface: &ContractInterface, req: &CallRequest) -> KitResult<CallOutcome> {
        let mut tx = self.freeze_call(iface, req)?;
        tx.sign(self.env.operator_key());
        info!("submitting {}.{} as {} (gas {})", iface.name(), req.function, tx.id(), req.gas_limit);
        let record = self.submit_frozen(tx, Some(iface.name())).await?;
        let outputs = match record.call_result_bytes()? {
            Some(bytes) => Some(iface.decode_result(&req.function, &bytes)?),
            None => None,
        };
        Ok(CallOutcome { status: record.status.clone(), outputs, record })
    }

    /// Submit an already-signed frozen transaction, await its receipt and
    /// return the record. Shared by direct submit, the preflight ancillary
    /// operations and the multi-sig merge phase.
    pub async fn submit_frozen(&self, tx: FrozenTransaction, target: Option<&str>) -> KitResult<TransactionRecord> {
        let id = tx.id();
        let ack = self.client.submit(&tx).await?;
        if ack.status != SUBMIT_OK {
            return Err(KitError::SubmitFailed { status: ack.status });
        }
        let receipt = self.await_receipt(id).await?;
        if !receipt.is_success() {
            let revert = match self.client.get_record(id).await {
                Ok(record) => record.revert_bytes().and_then(|data| self.registry.decode_revert(target, &data)),
                Err(_) => None,
            };
            return Err(KitError::ExecutionFailed { status: receipt.status, revert });
        }
        self.client.get_record(id).await
    }

    async fn await_receipt(&self, id: TransactionId) -> KitResult<Receipt> {
        for attempt in 1..=self.poll_attempts {
            let receipt = self.client.get_receipt(id).await?;
            if !receipt.is_pending() {
                debug!("receipt for {id}: {} (attempt {attempt})", receipt.status);
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(KitError::SubmitFailed { status: format!("no receipt for {id} after {} polls", self.poll_attempts) })
    }

    async fn run_ancillary(&self, body: TransactionBody, what: &str) -> KitResult<TransactionRecord> {
        let mut tx = FrozenTransaction::freeze(body, self.env.operator_id, self.pick_node()?)?;
        tx.sign(self.env.operator_key());
        info!("submitting {what} as {}", tx.id());
        self.submit_frozen(tx, None).await.map_err(|e| e.context(what.to_string()))
    }

    // --- ancillary primitives, used by the preflight reconciler ------------

    pub async fn associate_tokens(&self, tokens: Vec<TokenId>) -> KitResult<TransactionRecord> {
        let what = format!("token associate {}", tokens.iter().join(", "));
        self.run_ancillary(TransactionBody::TokenAssociate { account: self.env.operator_id, tokens }, &what).await
    }

    pub async fn approve_fungible(&self, token: TokenId, spender: AccountId, amount: u128) -> KitResult<TransactionRecord> {
        let what = format!("fungible allowance {token} -> {spender} = {amount}");
        let body = TransactionBody::ApproveAllowances {
            fungible: vec![FungibleApproval { token, spender, amount }],
            nft: vec![],
            hbar: vec![],
        };
        self.run_ancillary(body, &what).await
    }

    /// One batched transaction covering every pending collection.
    pub async fn approve_nft_all(&self, approvals: Vec<(TokenId, AccountId)>) -> KitResult<TransactionRecord> {
        let what = format!("nft operator approval for {} collections", approvals.len());
        let body = TransactionBody::ApproveAllowances {
            fungible: vec![],
            nft: approvals
                .into_iter()
                .map(|(token, spender)| NftOperatorApproval { token, spender, approved_for_all: true })
                .collect(),
            hbar: vec![],
        };
        self.run_ancillary(body, &what).await
    }

    pub async fn approve_hbar(&self, spender: AccountId, amount_tinybar: u64) -> KitResult<TransactionRecord> {
        let what = format!("hbar allowance -> {spender} = {amount_tinybar} tinybar");
        let body = TransactionBody::ApproveAllowances {
            fungible: vec![],
            nft: vec![],
            hbar: vec![HbarApproval { spender, amount_tinybar }],
        };
        self.run_ancillary(body, &what).await
    }

    pub async fn transfer(&self, movements: Vec<TokenMovement>) -> KitResult<TransactionRecord> {
        let body = TransactionBody::CryptoTransfer { from: self.env.operator_id, movements };
        self.run_ancillary(body, "token transfer").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::parse_private_key;

    const SEED_HEX: &str = "7f7c92f0382d3d02f3e0d5d1446f2e4e5a0f6aa8a8c9f2d7b2a1c0f9e8d7c6b5";

    fn sample_body() -> TransactionBody {
        TransactionBody::ContractExecute {
            contract: ContractId::new(0, 0, 777),
            call_data: vec![1, 2, 3, 4],
            gas: 300_000,
            value_tinybar: 0,
        }
    }

    #[test]
    fn freeze_fixes_body_hash() {
        let id = TransactionId { payer: AccountId::new(0, 0, 1001), valid_start_nanos: 1_700_000_000_123_456_789 };
        let a = FrozenTransaction::freeze_with_id(sample_body(), id, AccountId::new(0, 0, 3)).unwrap();
        let b = FrozenTransaction::thaw(a.body_bytes().to_vec()).unwrap();
        assert_eq!(a.body_hash(), b.body_hash());
        assert_eq!(b.id(), id);
        assert_eq!(b.body(), &sample_body());
    }

    #[test]
    fn refreeze_invalidates_signatures() {
        let key = parse_private_key(SEED_HEX).unwrap();
        let id = TransactionId { payer: AccountId::new(0, 0, 1001), valid_start_nanos: 42 };
        let mut first = FrozenTransaction::freeze_with_id(sample_body(), id, AccountId::new(0, 0, 3)).unwrap();
        first.sign(&key);
        let pair = first.signatures()[0].clone();

        // Same body, different valid start: a re-freeze.
        let id2 = TransactionId { payer: AccountId::new(0, 0, 1001), valid_start_nanos: 43 };
        let mut refrozen = FrozenTransaction::freeze_with_id(sample_body(), id2, AccountId::new(0, 0, 3)).unwrap();
        let err = refrozen.attach_signature(pair.public_key, pair.signature).unwrap_err();
        assert!(matches!(err, KitError::SubmitFailed { .. }));
    }

    #[test]
    fn attach_verifies_against_body_hash() {
        let key = parse_private_key(SEED_HEX).unwrap();
        let id = TransactionId { payer: AccountId::new(0, 0, 1001), valid_start_nanos: 42 };
        let mut tx = FrozenTransaction::freeze_with_id(sample_body(), id, AccountId::new(0, 0, 3)).unwrap();
        let sig = key.sign(&tx.body_hash());
        tx.attach_signature(key.verifying_key().to_bytes(), sig.to_bytes()).unwrap();
        assert_eq!(tx.signatures().len(), 1);
    }

    #[test]
    fn transaction_id_forms() {
        let id = TransactionId { payer: AccountId::new(0, 0, 1001), valid_start_nanos: 1_700_000_000_000_000_042 };
        assert_eq!(id.to_string(), "0.0.1001@1700000000.42");
        assert_eq!(id.path_form(), "0.0.1001-1700000000-42");
    }

    #[test]
    fn record_hex_accessors() {
        let record = TransactionRecord {
            transaction_id: "x".into(),
            status: SUCCESS_STATUS.into(),
            call_result: Some("0x0001".into()),
            error_message: None,
            gas_used: Some(21_000),
        };
        assert_eq!(record.call_result_bytes().unwrap().unwrap(), vec![0, 1]);
        assert!(record.revert_bytes().is_none());
        let empty = TransactionRecord { call_result: Some("0x".into()), ..record };
        assert!(empty.call_result_bytes().unwrap().is_none());
    }
}
