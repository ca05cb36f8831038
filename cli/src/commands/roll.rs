//! `roll <pool> [count]`: rolls pending entries with the pseudo-random gas
//! class; defaults to rolling everything.

use lazykit::abi::{addr_arg, as_u128, uint_arg};
use lazykit::error::{KitError, KitResult};
use lazykit::gas::{plan_gas, GasPolicy};
use lazykit::tx::CallRequest;
use serde_json::{json, Value};

use crate::commands::views::UserPoolState;
use crate::context::{CommandContext, LOTTO};

const ROLL_GAS_FALLBACK: u64 = 1_200_000;

pub async fn run(ctx: &CommandContext, pool_id: u64, count: Option<u64>) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let operator = ctx.env.operator_id;

    let pending = pending_entries(ctx, pool_id).await?;
    let rolling = match count {
        Some(n) if n as u128 > pending => {
            return Err(KitError::InvalidRequest(format!(
                "cannot roll {n}: only {pending} entries pending in pool {pool_id}"
            )))
        }
        Some(n) => n as u128,
        None => pending,
    };
    if rolling == 0 {
        return Err(KitError::InvalidRequest(format!("no entries to roll in pool {pool_id}")));
    }

    // Execution branches on consensus randomness the mirror cannot simulate;
    // the Random class doubles whatever the estimate says.
    let (function, args) = match count {
        Some(n) => ("rollEntries", vec![uint_arg(pool_id as u128), uint_arg(n as u128)]),
        None => ("rollAll", vec![uint_arg(pool_id as u128)]),
    };
    let call_data = iface.encode_call(function, &args)?;
    let gas = plan_gas(&ctx.mirror, contract, operator, &call_data, ROLL_GAS_FALLBACK, GasPolicy::random()).await?;

    let submitter = ctx.submitter()?;
    let req =
        CallRequest { contract, function: function.into(), args, gas_limit: gas, value_tinybar: 0, sender: operator };
    let outcome = submitter.execute(&iface, &req).await?;

    let (wins, remaining) = match &outcome.outputs {
        Some(outputs) => (as_u128("wins", &outputs[0])?, as_u128("remainingEntries", &outputs[1])?),
        None => (0, 0),
    };
    let actual_rate = actual_rate(wins, rolling);

    ctx.out.human(format!(
        "rolled {rolling} entries in pool {pool_id}: {wins} wins ({actual_rate}), {remaining} entries remaining"
    ));
    Ok(json!({
        "poolId": pool_id,
        "rolled": rolling.to_string(),
        "wins": wins.to_string(),
        "actualRate": actual_rate,
        "remainingEntries": remaining.to_string(),
        "transactionId": outcome.record.transaction_id,
    }))
}

/// Observed win percentage over one roll batch, two decimals.
pub fn actual_rate(wins: u128, rolled: u128) -> String {
    format!("{:.2}%", wins as f64 * 100.0 / rolled as f64)
}

async fn pending_entries(ctx: &CommandContext, pool_id: u64) -> KitResult<u128> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let values = ctx.read(&iface, contract, "getUserPoolState", &[addr_arg(ctx.env.operator_id.to_evm())]).await?;
    for entry in values[0].as_array().unwrap_or_default() {
        let state = UserPoolState::decode(entry)?;
        if state.pool_id == pool_id {
            return Ok(state.pending_entries);
        }
    }
    Ok(0)
}
