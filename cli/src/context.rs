//! Per-command context: the resolved environment, the mirror client and the
//! interface registry, built once by the dispatcher and passed by reference.

use std::io::{self, Write};
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use lazykit::abi::{ContractInterface, InterfaceRegistry};
use lazykit::entity::ContractId;
use lazykit::env::NetworkEnvironment;
use lazykit::error::{KitError, KitResult};
use lazykit::mirror::MirrorClient;
use lazykit::preflight::Prompter;
use lazykit::tx::{HttpConsensusClient, Submitter};

use crate::output::Output;

pub const LOTTO: &str = "LazyLotto";
pub const STORAGE: &str = "LazyLottoStorage";
pub const GAS_STATION: &str = "LazyGasStation";
pub const TRADE_LOTTO: &str = "LazyTradeLotto";
pub const DELEGATE_REGISTRY: &str = "LazyDelegateRegistry";

/// ABI artifacts ship inside the binary; one per contract.
const ARTIFACTS: &[(&str, &str)] = &[
    (LOTTO, include_str!("../abi/LazyLotto.json")),
    (STORAGE, include_str!("../abi/LazyLottoStorage.json")),
    (GAS_STATION, include_str!("../abi/LazyGasStation.json")),
    (TRADE_LOTTO, include_str!("../abi/LazyTradeLotto.json")),
    (DELEGATE_REGISTRY, include_str!("../abi/LazyDelegateRegistry.json")),
];

pub struct CommandContext {
    pub env: NetworkEnvironment,
    pub mirror: MirrorClient,
    pub registry: InterfaceRegistry,
    pub out: Output,
    pub assume_yes: bool,
}

impl CommandContext {
    pub fn resolve(json: bool, yes: bool) -> KitResult<Self> {
        Self::with_env(NetworkEnvironment::from_env()?, json, yes)
    }

    pub fn with_env(env: NetworkEnvironment, json: bool, yes: bool) -> KitResult<Self> {
        let mirror = MirrorClient::new(&env)?;
        let mut registry = InterfaceRegistry::new();
        for (name, text) in ARTIFACTS {
            registry.load(name, text)?;
        }
        Ok(CommandContext { env, mirror, registry, out: Output::new(json), assume_yes: yes })
    }

    pub fn iface(&self, name: &str) -> KitResult<Arc<ContractInterface>> {
        self.registry.get(name).ok_or_else(|| KitError::Env(format!("no interface loaded for {name}")))
    }

    /// Encode, post to the mirror as the operator, decode.
    pub async fn read(
        &self,
        iface: &ContractInterface,
        contract: ContractId,
        function: &str,
        args: &[DynSolValue],
    ) -> KitResult<Vec<DynSolValue>> {
        let data = iface.encode_call(function, args)?;
        let raw = self.mirror.contract_call(contract, self.env.operator_id, &data).await?;
        iface.decode_result(function, &raw)
    }

    pub fn submitter(&self) -> KitResult<Submitter<'_, HttpConsensusClient>> {
        Ok(Submitter::new(&self.env, &self.registry, HttpConsensusClient::new(&self.env)?))
    }

    pub fn prompter(&self) -> StdinPrompter {
        StdinPrompter { assume_yes: self.assume_yes || self.out.is_json() }
    }
}

/// Blocking y/N prompt on stdin. EOF counts as cancellation, not consent.
pub struct StdinPrompter {
    pub assume_yes: bool,
}

impl Prompter for StdinPrompter {
    fn confirm(&self, message: &str) -> KitResult<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        print!("{message} [y/N] ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Err(KitError::UserCancelled);
        }
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}
