//! Process-environment resolution. Built once per command by the dispatcher
//! and passed by reference; nothing else in the engine reads `std::env`.

use std::fmt;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use log::debug;

use crate::entity::{AccountId, ContractId, TokenId};
use crate::error::{KitError, KitResult};

/// DER prefix Hedera-style tooling puts in front of a raw ED25519 seed.
const ED25519_DER_PREFIX: &str = "302e020100300506032b657004220420";

pub const DEFAULT_LAZY_DECIMALS: u32 = 8;
pub const DEFAULT_PROPAGATION_DELAY_MS: u64 = 5_000;
pub const DEFAULT_HBAR_ALLOWANCE_TINYBAR: u64 = 1;
pub const DEFAULT_MIRROR_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Previewnet,
    Local,
}

impl Network {
    pub fn parse(value: &str) -> KitResult<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MAIN" | "MAINNET" => Ok(Network::Mainnet),
            "TEST" | "TESTNET" => Ok(Network::Testnet),
            "PREVIEW" | "PREVIEWNET" => Ok(Network::Previewnet),
            "LOCAL" => Ok(Network::Local),
            other => Err(KitError::Env(format!("unknown ENVIRONMENT `{other}`"))),
        }
    }

    pub fn default_mirror_base(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet-public.mirrornode.hedera.com",
            Network::Testnet => "https://testnet.mirrornode.hedera.com",
            Network::Previewnet => "https://previewnet.mirrornode.hedera.com",
            Network::Local => "http://127.0.0.1:5551",
        }
    }

    fn default_nodes(&self) -> Vec<(AccountId, String)> {
        let hosts: &[(u64, &str)] = match self {
            Network::Mainnet => &[(3, "https://node00.mainnet.lazy.network"), (4, "https://node01.mainnet.lazy.network")],
            Network::Testnet => &[(3, "https://node00.testnet.lazy.network"), (4, "https://node01.testnet.lazy.network")],
            Network::Previewnet => &[(3, "https://node00.previewnet.lazy.network")],
            Network::Local => &[(3, "http://127.0.0.1:50211")],
        };
        hosts.iter().map(|(num, url)| (AccountId::new(0, 0, *num), (*url).to_string())).collect()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Previewnet => "previewnet",
            Network::Local => "local",
        };
        f.write_str(name)
    }
}

/// Everything a command needs to talk to the network, resolved once.
pub struct NetworkEnvironment {
    pub network: Network,
    pub mirror_base: String,
    pub nodes: Vec<(AccountId, String)>,
    pub operator_id: AccountId,
    operator_key: SigningKey,

    pub lotto_contract: Option<ContractId>,
    pub lotto_storage: Option<ContractId>,
    pub pool_manager: Option<ContractId>,
    pub trade_lotto_contract: Option<ContractId>,
    pub gas_station_contract: Option<ContractId>,
    pub delegate_registry_contract: Option<ContractId>,

    pub lazy_token: Option<TokenId>,
    pub lazy_decimals: u32,

    pub test_ft_token: Option<TokenId>,
    pub prng_contract: Option<ContractId>,
    pub mock_prng_contract: Option<ContractId>,

    pub propagation_delay: Duration,
    pub mirror_timeout: Duration,
    pub hbar_allowance_tinybar: u64,
}

impl NetworkEnvironment {
    pub fn from_env() -> KitResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary lookup, so tests never mutate process env.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> KitResult<Self> {
        let required = |name: &str| get(name).ok_or_else(|| KitError::Env(format!("{name} is required")));

        let network = Network::parse(&required("ENVIRONMENT")?)?;
        let operator_id: AccountId =
            required("ACCOUNT_ID")?.parse().map_err(|e: KitError| KitError::Env(format!("ACCOUNT_ID: {e}")))?;
        let operator_key = parse_private_key(&required("PRIVATE_KEY")?)?;

        let contract = |name: &str| -> KitResult<Option<ContractId>> {
            match get(name) {
                Some(v) => v.parse().map(Some).map_err(|e: KitError| KitError::Env(format!("{name}: {e}"))),
                None => Ok(None),
            }
        };
        let token = |name: &str| -> KitResult<Option<TokenId>> {
            match get(name) {
                Some(v) => v.parse().map(Some).map_err(|e: KitError| KitError::Env(format!("{name}: {e}"))),
                None => Ok(None),
            }
        };

        let mirror_base = get("MIRROR_BASE_URL").unwrap_or_else(|| network.default_mirror_base().to_string());
        let nodes = match get("CONSENSUS_NODES") {
            Some(spec) => parse_node_spec(&spec)?,
            None => network.default_nodes(),
        };

        let lazy_decimals = match get("LAZY_DECIMALS") {
            Some(v) => v.parse().map_err(|_| KitError::Env(format!("LAZY_DECIMALS: `{v}` is not a number")))?,
            None => DEFAULT_LAZY_DECIMALS,
        };
        let propagation_delay_ms = match get("MIRROR_PROPAGATION_DELAY_MS") {
            Some(v) => v.parse().map_err(|_| KitError::Env("MIRROR_PROPAGATION_DELAY_MS must be a number".into()))?,
            None => DEFAULT_PROPAGATION_DELAY_MS,
        };
        let hbar_allowance_tinybar = match get("HBAR_ALLOWANCE_TINYBAR") {
            Some(v) => v.parse().map_err(|_| KitError::Env("HBAR_ALLOWANCE_TINYBAR must be a number".into()))?,
            None => DEFAULT_HBAR_ALLOWANCE_TINYBAR,
        };

        debug!("environment resolved: {network}, operator {operator_id}, mirror {mirror_base}");

        Ok(NetworkEnvironment {
            network,
            mirror_base,
            nodes,
            operator_id,
            operator_key,
            lotto_contract: contract("LAZY_LOTTO_CONTRACT_ID")?,
            lotto_storage: contract("LAZY_LOTTO_STORAGE")?,
            pool_manager: contract("LAZY_LOTTO_POOL_MANAGER_ID")?,
            trade_lotto_contract: contract("LAZY_TRADE_LOTTO_CONTRACT_ID")?,
            gas_station_contract: contract("LAZY_GAS_STATION_CONTRACT_ID")?,
            delegate_registry_contract: contract("LAZY_DELEGATE_REGISTRY_CONTRACT_ID")?,
            lazy_token: token("LAZY_TOKEN_ID")?,
            lazy_decimals,
            test_ft_token: token("TEST_FT_TOKEN_ID")?,
            prng_contract: contract("PRNG_CONTRACT_ID")?,
            mock_prng_contract: contract("MOCK_PRNG_CONTRACT_ID")?,
            propagation_delay: Duration::from_millis(propagation_delay_ms),
            mirror_timeout: Duration::from_millis(DEFAULT_MIRROR_TIMEOUT_MS),
            hbar_allowance_tinybar,
        })
    }

    pub fn operator_key(&self) -> &SigningKey {
        &self.operator_key
    }

    /// Required-contract accessors: commands that touch a contract fail fast
    /// with the variable name when it is unset.
    pub fn require_lotto(&self) -> KitResult<ContractId> {
        self.lotto_contract.ok_or_else(|| KitError::Env("LAZY_LOTTO_CONTRACT_ID is required".into()))
    }

    pub fn require_storage(&self) -> KitResult<ContractId> {
        self.lotto_storage.ok_or_else(|| KitError::Env("LAZY_LOTTO_STORAGE is required".into()))
    }

    pub fn require_gas_station(&self) -> KitResult<ContractId> {
        self.gas_station_contract.ok_or_else(|| KitError::Env("LAZY_GAS_STATION_CONTRACT_ID is required".into()))
    }

    pub fn require_trade_lotto(&self) -> KitResult<ContractId> {
        self.trade_lotto_contract.ok_or_else(|| KitError::Env("LAZY_TRADE_LOTTO_CONTRACT_ID is required".into()))
    }

    pub fn require_delegate_registry(&self) -> KitResult<ContractId> {
        self.delegate_registry_contract
            .ok_or_else(|| KitError::Env("LAZY_DELEGATE_REGISTRY_CONTRACT_ID is required".into()))
    }

    pub fn require_lazy_token(&self) -> KitResult<TokenId> {
        self.lazy_token.ok_or_else(|| KitError::Env("LAZY_TOKEN_ID is required".into()))
    }
}

/// Parse `PRIVATE_KEY`: a raw 32-byte hex seed, optionally `0x`-prefixed or
/// wrapped in the common ED25519 DER envelope.
pub fn parse_private_key(value: &str) -> KitResult<SigningKey> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let seed_hex = stripped.strip_prefix(ED25519_DER_PREFIX).unwrap_or(stripped);
    if seed_hex.len() != 64 {
        return Err(KitError::Env("PRIVATE_KEY must be a 32-byte ED25519 seed in hex".into()));
    }
    let mut seed = [0u8; 32];
    faster_hex::hex_decode(seed_hex.as_bytes(), &mut seed)
        .map_err(|_| KitError::Env("PRIVATE_KEY contains invalid hex".into()))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn parse_node_spec(spec: &str) -> KitResult<Vec<(AccountId, String)>> {
    let mut nodes = Vec::new();
    for entry in spec.split(',').filter(|s| !s.trim().is_empty()) {
        let (id, url) = entry
            .split_once('=')
            .ok_or_else(|| KitError::Env(format!("CONSENSUS_NODES entry `{entry}` must be `account=url`")))?;
        nodes.push((id.trim().parse::<AccountId>()?, url.trim().to_string()));
    }
    if nodes.is_empty() {
        return Err(KitError::Env("CONSENSUS_NODES resolved to an empty node set".into()));
    }
    Ok(nodes)
}
