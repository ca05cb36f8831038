//! `health`: probe one cheap read on every configured contract, concurrently,
//! and report which are reachable.

use lazykit::abi::{as_bool, as_u128, format_values};
use lazykit::entity::ContractId;
use lazykit::error::KitResult;
use serde_json::{json, Value};

use crate::context::{CommandContext, DELEGATE_REGISTRY, GAS_STATION, LOTTO, STORAGE, TRADE_LOTTO};

pub async fn run(ctx: &CommandContext) -> KitResult<Value> {
    let (lotto, storage, gas_station, trade, registry) = tokio::join!(
        probe(ctx, LOTTO, ctx.env.lotto_contract, "isPaused"),
        probe(ctx, STORAGE, ctx.env.lotto_storage, "getTotalEntries"),
        probe(ctx, GAS_STATION, ctx.env.gas_station_contract, "getLazyBalance"),
        probe(ctx, TRADE_LOTTO, ctx.env.trade_lotto_contract, "isPaused"),
        probe(ctx, DELEGATE_REGISTRY, ctx.env.delegate_registry_contract, "totalDelegations"),
    );
    let probes = vec![lotto, storage, gas_station, trade, registry];

    let mut all_ok = true;
    for p in &probes {
        if p["status"] == "error" {
            all_ok = false;
        }
        ctx.out.human(format!(
            "{:<22} {:<12} {}",
            p["contract"].as_str().unwrap_or(""),
            p["status"].as_str().unwrap_or(""),
            p["detail"].as_str().unwrap_or("")
        ));
    }

    Ok(json!({
        "healthy": all_ok,
        "contracts": probes,
        "network": ctx.env.network.to_string(),
        "mirror": ctx.mirror.base_url(),
    }))
}

async fn probe(ctx: &CommandContext, name: &str, contract: Option<ContractId>, function: &str) -> Value {
    let Some(contract) = contract else {
        return json!({ "contract": name, "status": "unconfigured", "detail": "" });
    };
    let result = async {
        let iface = ctx.iface(name)?;
        let values = ctx.read(&iface, contract, function, &[]).await?;
        // Render the probe value the way the function returned it.
        let detail = match values.first() {
            Some(v) if as_bool(function, v).is_ok() => format!("{function}={}", as_bool(function, v)?),
            Some(v) if as_u128(function, v).is_ok() => format!("{function}={}", as_u128(function, v)?),
            Some(v) => format!("{function}={}", format_values(std::slice::from_ref(v))),
            None => function.to_string(),
        };
        KitResult::Ok(detail)
    }
    .await;
    match result {
        Ok(detail) => json!({ "contract": name, "id": contract.to_string(), "status": "ok", "detail": detail }),
        Err(e) => json!({ "contract": name, "id": contract.to_string(), "status": "error", "detail": e.to_string() }),
    }
}
