//! `buy <pool> <count>`: balance check, fee-token allowance (or HBAR value)
//! preflight, then one `buyEntry` submit.

use lazykit::abi::{as_u128, uint_arg};
use lazykit::error::{KitError, KitResult};
use lazykit::gas::{plan_gas, GasPolicy};
use lazykit::preflight::{fee_spender, Condition, PreflightPlan, Reconciler};
use lazykit::tx::CallRequest;
use serde_json::{json, Value};

use crate::commands::views::PoolView;
use crate::context::{CommandContext, LOTTO};

const BUY_GAS_FALLBACK: u64 = 800_000;

pub async fn run(ctx: &CommandContext, pool_id: u64, count: u64) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let operator = ctx.env.operator_id;

    let values = ctx.read(&iface, contract, "getPoolDetails", &[uint_arg(pool_id as u128)]).await?;
    let pool = PoolView::decode(pool_id, &values)?;
    // The fee comes straight off the chain; never trust it not to overflow.
    let required = pool
        .entry_fee
        .checked_mul(count as u128)
        .ok_or_else(|| KitError::InvalidRequest(format!("entry fee {} x {count} overflows", pool.entry_fee)))?;

    let submitter = ctx.submitter()?;
    let mut value_tinybar = 0u64;
    match pool.fee_token {
        None => {
            let available = ctx.mirror.hbar_balance(operator).await? as u128;
            if available < required {
                return Err(KitError::InsufficientBalance { token: "HBAR".into(), required, available });
            }
            value_tinybar = required as u64;
        }
        Some(token) => {
            let available = ctx.mirror.token_balance(operator, token).await?;
            if available < required {
                return Err(KitError::InsufficientBalance { token: token.to_string(), required, available });
            }
            let spender = fee_spender(&ctx.env, token)?;
            let plan = PreflightPlan::new()
                .require(Condition::FungibleAllowance { token, spender, amount: required });
            let prompter = ctx.prompter();
            let report = Reconciler::new(&ctx.env, &ctx.mirror, &submitter, &prompter).run(&plan).await?;
            for action in &report.actions {
                ctx.out.human(format!("preflight: {action:?}"));
            }
        }
    }

    let args = vec![uint_arg(pool_id as u128), uint_arg(count as u128)];
    let call_data = iface.encode_call("buyEntry", &args)?;
    let gas = plan_gas(&ctx.mirror, contract, operator, &call_data, BUY_GAS_FALLBACK, GasPolicy::mutate()).await?;

    let req = CallRequest { contract, function: "buyEntry".into(), args, gas_limit: gas, value_tinybar, sender: operator };
    let outcome = submitter.execute(&iface, &req).await?;
    let total_entries = match &outcome.outputs {
        Some(outputs) => as_u128("totalEntries", &outputs[0])?,
        None => 0,
    };

    ctx.out.human(format!(
        "bought {count} entries in pool {pool_id}; total entries now {total_entries} ({})",
        outcome.record.transaction_id
    ));
    Ok(json!({
        "poolId": pool_id,
        "count": count,
        "totalEntries": total_entries.to_string(),
        "transactionId": outcome.record.transaction_id,
    }))
}
