//! Network-native identifiers and their 20-byte EVM forms.
//!
//! Accounts, tokens and contracts all live in the same `shard.realm.num`
//! namespace but are deliberately disjoint types: passing a token where a
//! contract is expected should not compile. The EVM ("long-zero") form packs
//! the triple big-endian into 20 bytes: shard in bytes 0-3, realm in 4-11,
//! num in 12-19. The zero address has no entity form at all; fungible-token
//! contexts read it as "HBAR / none".

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KitError, KitResult};

/// 20-byte EVM address, re-exported so callers do not reach into alloy.
pub type EvmAddress = Address;

/// Parse a 40-hex-digit EVM address, `0x` prefix optional.
pub fn parse_evm_address(s: &str) -> KitResult<EvmAddress> {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    if hex_part.len() != 40 {
        return Err(KitError::BadIdentifier(format!("evm address must be 40 hex chars, got {}", hex_part.len())));
    }
    let mut bytes = [0u8; 20];
    faster_hex::hex_decode(hex_part.as_bytes(), &mut bytes)
        .map_err(|_| KitError::BadIdentifier(format!("invalid hex in evm address `{s}`")))?;
    Ok(Address::from(bytes))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
struct Triple {
    shard: u32,
    realm: u64,
    num: u64,
}

impl Triple {
    fn parse(s: &str) -> KitResult<Self> {
        let bad = || KitError::BadIdentifier(format!("expected `shard.realm.num`, got `{s}`"));
        let mut parts = s.split('.');
        let shard = parts.next().ok_or_else(bad)?.parse::<u32>().map_err(|_| bad())?;
        let realm = parts.next().ok_or_else(bad)?.parse::<u64>().map_err(|_| bad())?;
        let num = parts.next().ok_or_else(bad)?.parse::<u64>().map_err(|_| bad())?;
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Triple { shard, realm, num })
    }

    fn to_evm(self) -> EvmAddress {
        let mut bytes = [0u8; 20];
        bytes[0..4].copy_from_slice(&self.shard.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.realm.to_be_bytes());
        bytes[12..20].copy_from_slice(&self.num.to_be_bytes());
        Address::from(bytes)
    }

    fn from_evm(addr: EvmAddress) -> KitResult<Self> {
        if addr.is_zero() {
            return Err(KitError::BadIdentifier("zero evm address has no entity form".into()));
        }
        let bytes: [u8; 20] = addr.into();
        Ok(Triple {
            shard: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            realm: u64::from_be_bytes(bytes[4..12].try_into().unwrap()),
            num: u64::from_be_bytes(bytes[12..20].try_into().unwrap()),
        })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

/// Is this address a "long-zero" alias, i.e. directly decodable to a triple
/// without consulting the network? Short (EVM-native) aliases carry entropy
/// in the upper bytes and need a mirror lookup instead.
pub fn is_long_zero(addr: EvmAddress) -> bool {
    let bytes: [u8; 20] = addr.into();
    // Short aliases are keccak-derived and carry entropy across the upper
    // bytes; a long-zero form keeps shard and realm (zero on every deployed
    // environment) in the leading 12 bytes.
    bytes[0..12].iter().all(|b| *b == 0)
}

macro_rules! entity_id {
    ($name:ident, $what:literal) => {
        #[doc = concat!("A ", $what, " identifier (`shard.realm.num`).")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
        pub struct $name(Triple);

        impl $name {
            pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
                $name(Triple { shard, realm, num })
            }

            pub fn shard(&self) -> u32 {
                self.0.shard
            }

            pub fn realm(&self) -> u64 {
                self.0.realm
            }

            pub fn num(&self) -> u64 {
                self.0.num
            }

            pub fn to_evm(&self) -> EvmAddress {
                self.0.to_evm()
            }

            pub fn from_evm(addr: EvmAddress) -> KitResult<Self> {
                Triple::from_evm(addr).map($name)
            }
        }

        impl FromStr for $name {
            type Err = KitError;

            fn from_str(s: &str) -> KitResult<Self> {
                Triple::parse(s).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_id!(AccountId, "account");
entity_id!(TokenId, "token");
entity_id!(ContractId, "contract");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_string() {
        let id: AccountId = "0.0.4321".parse().unwrap();
        assert_eq!(id, AccountId::new(0, 0, 4321));
        assert_eq!(id.to_string(), "0.0.4321");
    }

    #[test]
    fn round_trips_evm_form() {
        let id = ContractId::new(0, 0, 0x1234);
        let addr = id.to_evm();
        assert_eq!(format!("{addr:#x}"), "0x0000000000000000000000000000000000001234");
        assert_eq!(ContractId::from_evm(addr).unwrap(), id);
    }

    #[test]
    fn packs_all_three_fields() {
        let id = TokenId::new(1, 2, 3);
        let bytes: [u8; 20] = id.to_evm().into();
        assert_eq!(bytes[3], 1);
        assert_eq!(bytes[11], 2);
        assert_eq!(bytes[19], 3);
        assert_eq!(TokenId::from_evm(id.to_evm()).unwrap(), id);
    }

    #[test]
    fn zero_address_is_no_entity() {
        assert!(TokenId::from_evm(Address::ZERO).is_err());
    }

    #[test]
    fn rejects_malformed_strings() {
        for s in ["", "0.0", "0.0.0.0", "a.b.c", "0.0.-5", "0x123"] {
            assert!(s.parse::<AccountId>().is_err(), "{s} should not parse");
        }
    }

    #[test]
    fn rejects_wrong_length_hex() {
        assert!(parse_evm_address("0xabcd").is_err());
        assert!(parse_evm_address("0x00000000000000000000000000000000000004d2").is_ok());
    }

    #[test]
    fn long_zero_detection() {
        assert!(is_long_zero(AccountId::new(0, 0, 7).to_evm()));
        assert!(!is_long_zero(parse_evm_address("0xdeadbeef00000000000000000000000000000001").unwrap()));
    }
}
