//! `user [account]`: per-pool pending entries and prizes.

use lazykit::abi::addr_arg;
use lazykit::entity::AccountId;
use lazykit::error::KitResult;
use serde_json::{json, Value};

use crate::commands::views::UserPoolState;
use crate::context::{CommandContext, LOTTO};

pub async fn run(ctx: &CommandContext, account: Option<String>) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;
    let account: AccountId = match account {
        Some(s) => s.parse()?,
        None => ctx.env.operator_id,
    };

    let values = ctx.read(&iface, contract, "getUserPoolState", &[addr_arg(account.to_evm())]).await?;
    let state = values[0]
        .as_array()
        .unwrap_or_default()
        .iter()
        .map(UserPoolState::decode)
        .collect::<KitResult<Vec<_>>>()?;

    ctx.out.human(format!("account {account}"));
    if state.is_empty() {
        ctx.out.human("  no pending entries or prizes");
    }
    for entry in &state {
        ctx.out.human(format!(
            "  pool {:>3}: {} pending entries, {} pending prizes",
            entry.pool_id, entry.pending_entries, entry.pending_prizes
        ));
    }

    Ok(json!({
        "account": account.to_string(),
        "pools": state
            .iter()
            .map(|s| json!({
                "poolId": s.pool_id,
                "pendingEntries": s.pending_entries.to_string(),
                "pendingPrizes": s.pending_prizes.to_string(),
            }))
            .collect::<Vec<_>>(),
    }))
}
