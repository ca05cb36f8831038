//! `pools` and `pool <id>`: pool listings and the single-pool prize manifest.

use lazykit::abi::{as_u64, uint_arg};
use lazykit::error::KitResult;
use serde_json::{json, Value};

use crate::commands::views::{PendingPrize, PoolView};
use crate::context::{CommandContext, LOTTO};

pub async fn list(ctx: &CommandContext) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;

    let total = as_u64("totalPools", &ctx.read(&iface, contract, "getTotalPools", &[]).await?[0])?;
    let mut entries = Vec::with_capacity(total as usize);
    for pool_id in 0..total {
        let values = ctx.read(&iface, contract, "getPoolDetails", &[uint_arg(pool_id as u128)]).await?;
        let view = PoolView::decode(pool_id, &values)?;
        let fee = view.entry_fee_display(&ctx.mirror).await?;
        ctx.out.human(format!(
            "pool {:>3}  {:<24} {:>8}  win {:>9}  fee {}",
            view.pool_id,
            view.name,
            view.status.as_str(),
            view.win_rate_display(),
            fee,
        ));
        entries.push(json!({
            "poolId": view.pool_id,
            "name": view.name,
            "status": view.status.as_str(),
            "winRate": view.win_rate_display(),
            "entryFee": fee,
            "feeToken": view.fee_token.map(|t| t.to_string()).unwrap_or_else(|| "HBAR".to_string()),
        }));
    }
    if total == 0 {
        ctx.out.human("no pools configured");
    }
    Ok(json!({ "pools": entries }))
}

pub async fn detail(ctx: &CommandContext, pool_id: u64) -> KitResult<Value> {
    let contract = ctx.env.require_lotto()?;
    let iface = ctx.iface(LOTTO)?;

    let values = ctx.read(&iface, contract, "getPoolDetails", &[uint_arg(pool_id as u128)]).await?;
    let view = PoolView::decode(pool_id, &values)?;
    let fee = view.entry_fee_display(&ctx.mirror).await?;

    let prize_values = ctx.read(&iface, contract, "getPoolPrizes", &[uint_arg(pool_id as u128)]).await?;
    let prizes = prize_values[0]
        .as_array()
        .unwrap_or_default()
        .iter()
        .map(|v| decode_pool_prize(pool_id, v))
        .collect::<KitResult<Vec<_>>>()?;

    ctx.out.human(format!("pool {pool_id}: {} ({})", view.name, view.status.as_str()));
    ctx.out.human(format!("  win rate:     {}", view.win_rate_display()));
    ctx.out.human(format!("  entry fee:    {fee}"));
    ctx.out.human(format!("  open entries: {}", view.outstanding_entries));
    ctx.out.human(format!("  prizes:       {}", prizes.len()));
    for prize in &prizes {
        ctx.out.human(format!("    {}", prize.describe()));
    }

    Ok(json!({
        "pool": {
            "poolId": view.pool_id,
            "name": view.name,
            "status": view.status.as_str(),
            "winRate": view.win_rate_display(),
            "entryFee": fee,
            "feeToken": view.fee_token.map(|t| t.to_string()).unwrap_or_else(|| "HBAR".to_string()),
            "outstandingEntries": view.outstanding_entries.to_string(),
            "prizes": prizes.iter().map(|p| p.describe()).collect::<Vec<_>>(),
        },
    }))
}

/// `getPoolPrizes` packages have no pool-id field; reuse the pending-prize
/// shape with the queried pool filled in.
fn decode_pool_prize(pool_id: u64, value: &alloy::dyn_abi::DynSolValue) -> KitResult<PendingPrize> {
    use lazykit::abi::{as_tuple, as_u128};
    use lazykit::error::KitError;

    use crate::commands::views::optional_token;

    let fields = as_tuple("pool prize", value)?;
    if fields.len() != 4 {
        return Err(KitError::AbiDecode {
            context: "pool prize".into(),
            reason: format!("expected 4 fields, got {}", fields.len()),
        });
    }
    let nfts = fields[3]
        .as_array()
        .ok_or_else(|| KitError::AbiDecode { context: "prize nfts".into(), reason: "not an array".into() })?
        .iter()
        .map(|pair| {
            let parts = as_tuple("prize nft", pair)?;
            let collection = optional_token("prize nft collection", &parts[0])?.ok_or_else(|| {
                KitError::AbiDecode { context: "prize nft collection".into(), reason: "zero address".into() }
            })?;
            Ok((collection, as_u64("prize nft serial", &parts[1])?))
        })
        .collect::<KitResult<Vec<_>>>()?;
    Ok(PendingPrize {
        pool_id,
        fungible_token: optional_token("prize token", &fields[0])?,
        fungible_amount: as_u128("prize amount", &fields[1])?,
        hbar_tinybar: as_u128("prize hbar", &fields[2])?,
        nfts,
    })
}
