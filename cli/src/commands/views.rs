//! Read-only projections of on-chain structs, decoded once per command.

use alloy::dyn_abi::DynSolValue;
use lazykit::abi::{as_address, as_string, as_tuple, as_u128, as_u32, as_u64};
use lazykit::entity::{EvmAddress, TokenId};
use lazykit::error::{KitError, KitResult};
use lazykit::mirror::MirrorClient;
use lazykit::units::{display_amount, display_tinybar, display_win_rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Active,
    Paused,
    Closed,
}

impl PoolStatus {
    fn from_raw(raw: u32) -> KitResult<Self> {
        match raw {
            0 => Ok(PoolStatus::Active),
            1 => Ok(PoolStatus::Paused),
            2 => Ok(PoolStatus::Closed),
            other => Err(KitError::AbiDecode { context: "pool status".into(), reason: format!("tag {other}") }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Active => "active",
            PoolStatus::Paused => "paused",
            PoolStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolView {
    pub pool_id: u64,
    pub name: String,
    /// `None` means the entry fee is paid in HBAR.
    pub fee_token: Option<TokenId>,
    pub entry_fee: u128,
    pub win_rate: u32,
    pub status: PoolStatus,
    pub outstanding_entries: u128,
    pub prize_count: u128,
}

impl PoolView {
    /// Decode the `getPoolDetails` output tuple.
    pub fn decode(pool_id: u64, values: &[DynSolValue]) -> KitResult<Self> {
        if values.len() != 7 {
            return Err(KitError::AbiDecode {
                context: "pool details".into(),
                reason: format!("expected 7 fields, got {}", values.len()),
            });
        }
        Ok(PoolView {
            pool_id,
            name: as_string("pool name", &values[0])?,
            fee_token: optional_token("pool fee token", &values[1])?,
            entry_fee: as_u128("pool entry fee", &values[2])?,
            win_rate: as_u32("pool win rate", &values[3])?,
            status: PoolStatus::from_raw(as_u32("pool status", &values[4])?)?,
            outstanding_entries: as_u128("pool entries", &values[5])?,
            prize_count: as_u128("pool prize count", &values[6])?,
        })
    }

    pub fn win_rate_display(&self) -> String {
        display_win_rate(self.win_rate)
    }

    /// `"1 ℏ"` for HBAR fees, `"0.5 LAZY"` for token fees (symbol and
    /// decimals from the mirror).
    pub async fn entry_fee_display(&self, mirror: &MirrorClient) -> KitResult<String> {
        match self.fee_token {
            None => Ok(display_tinybar(self.entry_fee)),
            Some(token) => {
                let info = mirror.token_info(token).await?;
                Ok(display_amount(self.entry_fee, info.decimals, &info.symbol))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserPoolState {
    pub pool_id: u64,
    pub pending_entries: u128,
    pub pending_prizes: u128,
}

impl UserPoolState {
    pub fn decode(value: &DynSolValue) -> KitResult<Self> {
        let fields = as_tuple("user pool state", value)?;
        Ok(UserPoolState {
            pool_id: as_u64("pool id", &fields[0])?,
            pending_entries: as_u128("pending entries", &fields[1])?,
            pending_prizes: as_u128("pending prizes", &fields[2])?,
        })
    }
}

/// One pending prize package: fungible part, HBAR part, NFT part.
#[derive(Debug, Clone)]
pub struct PendingPrize {
    pub pool_id: u64,
    pub fungible_token: Option<TokenId>,
    pub fungible_amount: u128,
    pub hbar_tinybar: u128,
    pub nfts: Vec<(TokenId, u64)>,
}

impl PendingPrize {
    pub fn decode(value: &DynSolValue) -> KitResult<Self> {
        let fields = as_tuple("pending prize", value)?;
        if fields.len() != 5 {
            return Err(KitError::AbiDecode {
                context: "pending prize".into(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }
        let nfts = fields[4]
            .as_array()
            .ok_or_else(|| KitError::AbiDecode { context: "prize nfts".into(), reason: "not an array".into() })?
            .iter()
            .map(|pair| {
                let parts = as_tuple("prize nft", pair)?;
                Ok((required_token("prize nft collection", &parts[0])?, as_u64("prize nft serial", &parts[1])?))
            })
            .collect::<KitResult<Vec<_>>>()?;
        Ok(PendingPrize {
            pool_id: as_u64("prize pool id", &fields[0])?,
            fungible_token: optional_token("prize token", &fields[1])?,
            fungible_amount: as_u128("prize amount", &fields[2])?,
            hbar_tinybar: as_u128("prize hbar", &fields[3])?,
            nfts,
        })
    }

    /// Textual prize contents for human output and claim summaries.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.fungible_amount > 0 {
            match self.fungible_token {
                Some(token) => parts.push(format!("{} units of {token}", self.fungible_amount)),
                None => parts.push(display_tinybar(self.fungible_amount)),
            }
        }
        if self.hbar_tinybar > 0 {
            parts.push(display_tinybar(self.hbar_tinybar));
        }
        for (collection, serial) in &self.nfts {
            parts.push(format!("{collection} #{serial}"));
        }
        if parts.is_empty() {
            parts.push("empty package".to_string());
        }
        format!("pool {}: {}", self.pool_id, parts.join(" + "))
    }
}

/// The zero address is the "HBAR / none" sentinel in fungible-token fields.
pub fn optional_token(context: &str, value: &DynSolValue) -> KitResult<Option<TokenId>> {
    let addr = as_address(context, value)?;
    if addr.is_zero() {
        return Ok(None);
    }
    TokenId::from_evm(addr).map(Some)
}

fn required_token(context: &str, value: &DynSolValue) -> KitResult<TokenId> {
    optional_token(context, value)?
        .ok_or_else(|| KitError::AbiDecode { context: context.into(), reason: "zero address".into() })
}

/// Render an address-valued config field: the entity form when it is a
/// long-zero alias, `"none"` for the zero sentinel.
pub fn address_label(addr: EvmAddress) -> String {
    if addr.is_zero() {
        return "none".to_string();
    }
    match TokenId::from_evm(addr) {
        Ok(id) if lazykit::entity::is_long_zero(addr) => id.to_string(),
        _ => format!("{addr:#x}"),
    }
}
