//! `events <contract>`: decoded event log listing, oldest first.

use lazykit::abi::format_value;
use lazykit::entity::ContractId;
use lazykit::error::{KitError, KitResult};
use serde_json::{json, Map, Value};

use crate::context::{CommandContext, DELEGATE_REGISTRY, GAS_STATION, LOTTO, STORAGE, TRADE_LOTTO};

pub async fn run(ctx: &CommandContext, contract_arg: &str) -> KitResult<Value> {
    let (name, contract) = resolve(ctx, contract_arg)?;
    let iface = ctx.iface(name)?;

    let logs = ctx.mirror.fetch_events(contract).await?;
    let mut events = Vec::with_capacity(logs.len());
    for log in &logs {
        let entry = match iface.decode_log(&log.topics, &log.data) {
            Some(decoded) => {
                let params: Map<String, Value> = decoded
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(format_value(value))))
                    .collect();
                ctx.out.human(format!(
                    "{}  {}({})",
                    log.timestamp,
                    decoded.name,
                    decoded.params.iter().map(|(n, v)| format!("{n}={}", format_value(v))).collect::<Vec<_>>().join(", ")
                ));
                json!({
                    "name": decoded.name,
                    "params": params,
                    "timestamp": log.timestamp,
                    "transactionHash": log.transaction_hash,
                })
            }
            None => {
                let topic0 = log.topics.first().map(|t| format!("{t:#x}")).unwrap_or_default();
                ctx.out.human(format!("{}  <unknown event {topic0}>", log.timestamp));
                json!({ "name": null, "topic0": topic0, "timestamp": log.timestamp })
            }
        };
        events.push(entry);
    }
    if events.is_empty() {
        ctx.out.human(format!("no events for {name} {contract}"));
    }

    Ok(json!({ "contract": name, "id": contract.to_string(), "events": events }))
}

fn resolve(ctx: &CommandContext, arg: &str) -> KitResult<(&'static str, ContractId)> {
    match arg {
        "lotto" => Ok((LOTTO, ctx.env.require_lotto()?)),
        "storage" => Ok((STORAGE, ctx.env.require_storage()?)),
        "gas-station" => Ok((GAS_STATION, ctx.env.require_gas_station()?)),
        "trade-lotto" => Ok((TRADE_LOTTO, ctx.env.require_trade_lotto()?)),
        "delegate-registry" => Ok((DELEGATE_REGISTRY, ctx.env.require_delegate_registry()?)),
        other => Err(KitError::Env(format!(
            "unknown contract `{other}`; expected lotto|storage|gas-station|trade-lotto|delegate-registry"
        ))),
    }
}
