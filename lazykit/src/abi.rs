//! Contract interface descriptors and the call/result/error codec.
//!
//! One JSON artifact is loaded per contract at process start and cached in an
//! [`InterfaceRegistry`]. The registry is also the revert decoder for
//! delegated calls: a revert bubbling out of the gas station or the storage
//! contract decodes against their interfaces, not just the call target's.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Event, Function, JsonAbi, StateMutability};
use alloy::primitives::{B256, U256};
use itertools::Itertools;
use log::debug;

use crate::entity::EvmAddress;
use crate::error::{KitError, KitResult};

/// `Error(string)` and `Panic(uint256)` selectors from the Solidity runtime.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// An immutable view of one contract's callable surface.
#[derive(Debug)]
pub struct ContractInterface {
    name: String,
    abi: JsonAbi,
}

impl ContractInterface {
    /// Parse an artifact: either a raw ABI array or a Hardhat-style object
    /// with an `"abi"` field.
    pub fn from_artifact(name: impl Into<String>, text: &str) -> KitResult<Self> {
        let name = name.into();
        let abi = match serde_json::from_str::<JsonAbi>(text) {
            Ok(abi) => abi,
            Err(_) => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                let inner = value
                    .get("abi")
                    .ok_or_else(|| KitError::AbiDecode {
                        context: name.clone(),
                        reason: "artifact is neither an ABI array nor an object with an `abi` field".into(),
                    })?
                    .clone();
                serde_json::from_value(inner)?
            }
        };
        debug!(
            "loaded interface {name}: {} functions, {} errors, {} events",
            abi.functions().count(),
            abi.errors().count(),
            abi.events().count()
        );
        Ok(ContractInterface { name, abi })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> KitResult<&Function> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| KitError::AbiEncode {
                function: name.into(),
                reason: format!("no such function on {}", self.name),
            })
    }

    pub fn is_payable(&self, function: &str) -> KitResult<bool> {
        Ok(self.function(function)?.state_mutability == StateMutability::Payable)
    }

    pub fn is_view(&self, function: &str) -> KitResult<bool> {
        Ok(matches!(self.function(function)?.state_mutability, StateMutability::View | StateMutability::Pure))
    }

    /// Selector-prefixed calldata for `function(args)`.
    pub fn encode_call(&self, function: &str, args: &[DynSolValue]) -> KitResult<Vec<u8>> {
        let f = self.function(function)?;
        f.abi_encode_input(args).map_err(|e| KitError::AbiEncode { function: function.into(), reason: e.to_string() })
    }

    /// Decode a call result against the function's output tuple.
    pub fn decode_result(&self, function: &str, data: &[u8]) -> KitResult<Vec<DynSolValue>> {
        let f = self.function(function)?;
        f.abi_decode_output(data).map_err(|e| KitError::AbiDecode {
            context: format!("{}.{function} output", self.name),
            reason: e.to_string(),
        })
    }

    /// Decode one event log by topic0; `None` when this interface does not
    /// define the event.
    pub fn decode_log(&self, topics: &[B256], data: &[u8]) -> Option<DecodedLog> {
        let first = topics.first()?;
        let event = self.abi.events().find(|e| !e.anonymous && e.selector() == *first)?;
        let decoded = event.decode_log_parts(topics.iter().copied(), data).ok()?;
        Some(DecodedLog::assemble(event, decoded.indexed, decoded.body))
    }

    fn decode_own_error(&self, data: &[u8]) -> Option<RevertInfo> {
        let selector = data.get(..4)?;
        for err in self.abi.errors() {
            if err.selector().as_slice() == selector {
                let params = err.abi_decode_input(&data[4..]).ok()?;
                return Some(RevertInfo {
                    interface: Some(self.name.clone()),
                    error: err.name.clone(),
                    detail: format_values(&params),
                });
            }
        }
        None
    }
}

/// A decoded event with named parameters in declaration order.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub name: String,
    pub params: Vec<(String, DynSolValue)>,
}

impl DecodedLog {
    fn assemble(event: &Event, indexed: Vec<DynSolValue>, body: Vec<DynSolValue>) -> Self {
        let mut indexed = indexed.into_iter();
        let mut body = body.into_iter();
        let params = event
            .inputs
            .iter()
            .map(|input| {
                let value = if input.indexed { indexed.next() } else { body.next() };
                (input.name.clone(), value.unwrap_or(DynSolValue::Bool(false)))
            })
            .collect();
        DecodedLog { name: event.name.clone(), params }
    }
}

/// A decoded revert reason, possibly from a delegated contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertInfo {
    /// Interface that recognised the selector; `None` for the standard
    /// `Error(string)` / `Panic(uint256)` shapes.
    pub interface: Option<String>,
    pub error: String,
    pub detail: String,
}

impl fmt::Display for RevertInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(iface) => write!(f, "{iface}.{}({})", self.error, self.detail),
            None => write!(f, "{}({})", self.error, self.detail),
        }
    }
}

/// Process-level cache of interfaces, keyed by contract name.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    by_name: HashMap<String, Arc<ContractInterface>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, name: &str, artifact_text: &str) -> KitResult<Arc<ContractInterface>> {
        if let Some(existing) = self.by_name.get(name) {
            return Ok(existing.clone());
        }
        let iface = Arc::new(ContractInterface::from_artifact(name, artifact_text)?);
        self.by_name.insert(name.to_string(), iface.clone());
        Ok(iface)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ContractInterface>> {
        self.by_name.get(name).cloned()
    }

    /// Decode revert bytes: the call target's errors first, then every other
    /// registered interface, then the standard Solidity shapes.
    pub fn decode_revert(&self, target: Option<&str>, data: &[u8]) -> Option<RevertInfo> {
        if data.len() < 4 {
            return None;
        }
        if let Some(primary) = target.and_then(|n| self.by_name.get(n)) {
            if let Some(info) = primary.decode_own_error(data) {
                return Some(info);
            }
        }
        for (name, iface) in &self.by_name {
            if Some(name.as_str()) == target {
                continue;
            }
            if let Some(info) = iface.decode_own_error(data) {
                return Some(info);
            }
        }
        decode_standard_revert(data)
    }
}

fn decode_standard_revert(data: &[u8]) -> Option<RevertInfo> {
    let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
    let tail = &data[4..];
    if selector == ERROR_STRING_SELECTOR {
        let decoded = alloy::dyn_abi::DynSolType::String.abi_decode(tail).ok()?;
        if let DynSolValue::String(message) = decoded {
            return Some(RevertInfo { interface: None, error: "Error".into(), detail: format!("\"{message}\"") });
        }
        None
    } else if selector == PANIC_SELECTOR {
        let decoded = alloy::dyn_abi::DynSolType::Uint(256).abi_decode(tail).ok()?;
        if let DynSolValue::Uint(code, _) = decoded {
            return Some(RevertInfo { interface: None, error: "Panic".into(), detail: format!("0x{code:x}") });
        }
        None
    } else {
        None
    }
}

/// Render a decoded tuple for diagnostics and human output.
pub fn format_values(values: &[DynSolValue]) -> String {
    values.iter().map(format_value).join(", ")
}

pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(a) => format!("{a:#x}"),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::String(s) => format!("\"{s}\""),
        DynSolValue::Bytes(b) => format!("0x{}", hex::encode(b)),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word.as_slice()[..*size])),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            format!("[{}]", format_values(items))
        }
        DynSolValue::Tuple(items) => format!("({})", format_values(items)),
        other => format!("{other:?}"),
    }
}

// --- argument construction helpers -----------------------------------------
// Identifier inputs must already be EVM-form; integers widen to 256 bits.

pub fn addr_arg(addr: EvmAddress) -> DynSolValue {
    DynSolValue::Address(addr)
}

pub fn uint_arg(value: u128) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

pub fn uint_array_arg(values: impl IntoIterator<Item = u128>) -> DynSolValue {
    DynSolValue::Array(values.into_iter().map(uint_arg).collect())
}

pub fn addr_array_arg(values: impl IntoIterator<Item = EvmAddress>) -> DynSolValue {
    DynSolValue::Array(values.into_iter().map(addr_arg).collect())
}

pub fn bool_arg(value: bool) -> DynSolValue {
    DynSolValue::Bool(value)
}

pub fn string_arg(value: impl Into<String>) -> DynSolValue {
    DynSolValue::String(value.into())
}

// --- decoded-value accessors ------------------------------------------------

fn decode_err(context: &str, want: &str, got: &DynSolValue) -> KitError {
    KitError::AbiDecode { context: context.into(), reason: format!("expected {want}, got {got:?}") }
}

pub fn as_u256(context: &str, value: &DynSolValue) -> KitResult<U256> {
    value.as_uint().map(|(v, _)| v).ok_or_else(|| decode_err(context, "uint", value))
}

pub fn as_u128(context: &str, value: &DynSolValue) -> KitResult<u128> {
    let v = as_u256(context, value)?;
    v.try_into().map_err(|_| KitError::AbiDecode { context: context.into(), reason: format!("{v} exceeds u128") })
}

pub fn as_u64(context: &str, value: &DynSolValue) -> KitResult<u64> {
    let v = as_u128(context, value)?;
    v.try_into().map_err(|_| KitError::AbiDecode { context: context.into(), reason: format!("{v} exceeds u64") })
}

pub fn as_u32(context: &str, value: &DynSolValue) -> KitResult<u32> {
    let v = as_u128(context, value)?;
    v.try_into().map_err(|_| KitError::AbiDecode { context: context.into(), reason: format!("{v} exceeds u32") })
}

pub fn as_bool(context: &str, value: &DynSolValue) -> KitResult<bool> {
    value.as_bool().ok_or_else(|| decode_err(context, "bool", value))
}

pub fn as_address(context: &str, value: &DynSolValue) -> KitResult<EvmAddress> {
    value.as_address().ok_or_else(|| decode_err(context, "address", value))
}

pub fn as_string(context: &str, value: &DynSolValue) -> KitResult<String> {
    value.as_str().map(str::to_owned).ok_or_else(|| decode_err(context, "string", value))
}

pub fn as_tuple<'a>(context: &str, value: &'a DynSolValue) -> KitResult<&'a [DynSolValue]> {
    value.as_tuple().ok_or_else(|| decode_err(context, "tuple", value))
}

pub fn as_array<'a>(context: &str, value: &'a DynSolValue) -> KitResult<&'a [DynSolValue]> {
    value.as_array().ok_or_else(|| decode_err(context, "array", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ContractId;

    const TEST_ABI: &str = r#"[
        {"type":"function","name":"buyEntry","stateMutability":"payable",
         "inputs":[{"name":"poolId","type":"uint256"},{"name":"count","type":"uint256"}],
         "outputs":[{"name":"totalEntries","type":"uint256"}]},
        {"type":"function","name":"isPaused","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"error","name":"PoolNotFound","inputs":[{"name":"poolId","type":"uint256"}]},
        {"type":"event","name":"EntryPurchased","anonymous":false,
         "inputs":[{"name":"buyer","type":"address","indexed":true},
                   {"name":"poolId","type":"uint256","indexed":false},
                   {"name":"count","type":"uint256","indexed":false}]}
    ]"#;

    fn iface() -> ContractInterface {
        ContractInterface::from_artifact("LazyLotto", TEST_ABI).unwrap()
    }

    #[test]
    fn hardhat_artifact_shape_is_accepted() {
        let wrapped = format!("{{\"contractName\":\"LazyLotto\",\"abi\":{TEST_ABI}}}");
        assert!(ContractInterface::from_artifact("LazyLotto", &wrapped).is_ok());
    }

    #[test]
    fn encodes_selector_and_args() {
        let data = iface().encode_call("buyEntry", &[uint_arg(2), uint_arg(5)]).unwrap();
        // selector plus two 32-byte words
        assert_eq!(data.len(), 4 + 32 + 32);
        // last word carries count = 5
        assert_eq!(data[data.len() - 1], 5);
    }

    #[test]
    fn encode_rejects_arity_mismatch() {
        let err = iface().encode_call("buyEntry", &[uint_arg(2)]).unwrap_err();
        assert!(matches!(err, KitError::AbiEncode { .. }));
    }

    #[test]
    fn decodes_result_tuple() {
        let mut out = vec![0u8; 32];
        out[31] = 9;
        let values = iface().decode_result("buyEntry", &out).unwrap();
        assert_eq!(as_u64("totalEntries", &values[0]).unwrap(), 9);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = iface().decode_result("buyEntry", &[0u8; 7]).unwrap_err();
        assert!(matches!(err, KitError::AbiDecode { .. }));
    }

    #[test]
    fn payability_is_exposed() {
        let iface = iface();
        assert!(iface.is_payable("buyEntry").unwrap());
        assert!(!iface.is_payable("isPaused").unwrap());
        assert!(iface.is_view("isPaused").unwrap());
    }

    #[test]
    fn registry_decodes_custom_error_from_target() {
        let mut registry = InterfaceRegistry::new();
        registry.load("LazyLotto", TEST_ABI).unwrap();
        let iface = registry.get("LazyLotto").unwrap();
        let err = iface.abi.errors().next().unwrap();
        let mut data = err.selector().to_vec();
        data.extend_from_slice(&[0u8; 32]);
        data[4 + 31] = 3;
        let info = registry.decode_revert(Some("LazyLotto"), &data).unwrap();
        assert_eq!(info.error, "PoolNotFound");
        assert_eq!(info.detail, "3");
        assert_eq!(info.interface.as_deref(), Some("LazyLotto"));
    }

    #[test]
    fn registry_falls_back_to_standard_error_string() {
        let registry = InterfaceRegistry::new();
        // Error("nope"): selector then the canonical single-string encoding
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(&DynSolValue::Tuple(vec![DynSolValue::String("nope".into())]).abi_encode_params());
        let info = registry.decode_revert(None, &data).unwrap();
        assert_eq!(info.error, "Error");
        assert_eq!(info.detail, "\"nope\"");
    }

    #[test]
    fn event_log_decodes_with_names() {
        let iface = iface();
        let buyer = ContractId::new(0, 0, 888).to_evm();
        let event = iface.abi.events().next().unwrap();
        let topic0 = event.selector();
        let mut topic1 = [0u8; 32];
        topic1[12..].copy_from_slice(buyer.as_slice());
        let body = DynSolValue::Tuple(vec![uint_arg(1), uint_arg(4)]).abi_encode_params();
        let log = iface.decode_log(&[topic0, B256::from(topic1)], &body).unwrap();
        assert_eq!(log.name, "EntryPurchased");
        assert_eq!(log.params[0].0, "buyer");
        assert_eq!(as_address("buyer", &log.params[0].1).unwrap(), buyer);
        assert_eq!(as_u64("count", &log.params[2].1).unwrap(), 4);
    }
}
