//! `claim`: associate with every prize collection, grant the storage contract
//! its HBAR allowance, then claim everything in one call.

use lazykit::abi::{addr_arg, as_u64};
use lazykit::error::{KitError, KitResult};
use lazykit::gas::{plan_gas, GasPolicy};
use lazykit::preflight::{contract_spender, Condition, PreflightPlan, Reconciler};
use lazykit::tx::CallRequest;
use serde_json::{json, Value};

use crate::commands::views::PendingPrize;
use crate::context::{CommandContext, LOTTO};

const CLAIM_GAS_FALLBACK: u64 = 1_500_000;

pub async fn run(ctx: &CommandContext) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let operator = ctx.env.operator_id;

    let values = ctx.read(&iface, contract, "getPendingPrizes", &[addr_arg(operator.to_evm())]).await?;
    let prizes = values[0]
        .as_array()
        .unwrap_or_default()
        .iter()
        .map(PendingPrize::decode)
        .collect::<KitResult<Vec<_>>>()?;
    if prizes.is_empty() {
        return Err(KitError::InvalidRequest("no pending prizes to claim".into()));
    }
    for prize in &prizes {
        ctx.out.human(format!("pending {}", prize.describe()));
    }

    // The storage contract moves the prizes on the operator's behalf: it
    // needs every involved token associated and a nonzero HBAR allowance.
    let storage_spender = contract_spender(ctx.env.require_storage()?);
    let mut plan = PreflightPlan::new();
    for prize in &prizes {
        if let Some(token) = prize.fungible_token {
            plan = plan.require(Condition::Associated { token });
        }
        for (collection, _) in &prize.nfts {
            plan = plan.require(Condition::Associated { token: *collection });
        }
    }
    plan = plan.require(Condition::HbarAllowance {
        spender: storage_spender,
        min_tinybar: ctx.env.hbar_allowance_tinybar,
    });

    let submitter = ctx.submitter()?;
    let prompter = ctx.prompter();
    let report = Reconciler::new(&ctx.env, &ctx.mirror, &submitter, &prompter).run(&plan).await?;
    for action in &report.actions {
        ctx.out.human(format!("preflight: {action:?}"));
    }

    let call_data = iface.encode_call("claimAllPrizes", &[])?;
    let gas = plan_gas(&ctx.mirror, contract, operator, &call_data, CLAIM_GAS_FALLBACK, GasPolicy::mutate()).await?;
    let req = CallRequest {
        contract,
        function: "claimAllPrizes".into(),
        args: vec![],
        gas_limit: gas,
        value_tinybar: 0,
        sender: operator,
    };
    let outcome = submitter.execute(&iface, &req).await?;

    let pool_ids = match &outcome.outputs {
        Some(outputs) => outputs[0]
            .as_array()
            .unwrap_or_default()
            .iter()
            .map(|v| as_u64("claimed pool id", v))
            .collect::<KitResult<Vec<_>>>()?,
        None => vec![],
    };

    ctx.out.human(format!("claimed prizes from pools {pool_ids:?} ({})", outcome.record.transaction_id));
    Ok(json!({
        "poolIds": pool_ids,
        "prizes": prizes.iter().map(|p| p.describe()).collect::<Vec<_>>(),
        "transactionId": outcome.record.transaction_id,
    }))
}
