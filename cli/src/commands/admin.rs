//! `admin pause|unpause|set-burn`: direct or multi-sig admin setters.

use lazykit::abi::uint_arg;
use lazykit::error::KitResult;
use lazykit::gas::{plan_gas, GasPolicy};
use lazykit::tx::CallRequest;
use serde_json::{json, Value};

use crate::cli::{AdminAction, MultiSigOpts};
use crate::commands::multisig;
use crate::context::{CommandContext, LOTTO};

const ADMIN_GAS_FALLBACK: u64 = 400_000;

pub async fn run(ctx: &CommandContext, action: &AdminAction, opts: &MultiSigOpts) -> KitResult<Value> {
    if opts.multisig_help {
        ctx.out.human(multisig::MULTISIG_HELP);
        return Ok(json!({ "help": multisig::MULTISIG_HELP }));
    }

    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let operator = ctx.env.operator_id;

    let (function, args) = match action {
        AdminAction::Pause => ("pause", vec![]),
        AdminAction::Unpause => ("unpause", vec![]),
        AdminAction::SetBurn { percent } => ("setBurnPercentage", vec![uint_arg(*percent as u128)]),
    };
    let call_data = iface.encode_call(function, &args)?;
    let gas = plan_gas(&ctx.mirror, contract, operator, &call_data, ADMIN_GAS_FALLBACK, GasPolicy::mutate()).await?;
    let req =
        CallRequest { contract, function: function.into(), args, gas_limit: gas, value_tinybar: 0, sender: operator };

    let submitter = ctx.submitter()?;
    if opts.multisig {
        return multisig::run_call(ctx, &submitter, &iface, &req, opts).await;
    }

    let outcome = submitter.execute(&iface, &req).await?;
    ctx.out.human(format!("{function} succeeded ({})", outcome.record.transaction_id));
    Ok(json!({
        "function": function,
        "status": outcome.status,
        "transactionId": outcome.record.transaction_id,
    }))
}
