//! Gas planning: mirror preflight estimate plus a class-dependent safety
//! margin. Deterministic mutations get 1.2×; anything whose execution path
//! depends on consensus pseudo-randomness gets 2× because the mirror
//! simulation cannot reproduce the winning branch. Calls that may
//! auto-associate tokens pay a flat 1,000,000 gas per expected association
//! on top.

use log::debug;

use crate::entity::{AccountId, ContractId};
use crate::error::KitResult;
use crate::mirror::MirrorClient;

pub const AUTO_ASSOCIATION_GAS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    /// Deterministic state mutation.
    Mutate,
    /// Pseudo-random-dependent (roll / draw).
    Random,
}

impl CallClass {
    fn apply(self, gas: u64) -> u64 {
        match self {
            CallClass::Mutate => gas.saturating_mul(12).div_ceil(10),
            CallClass::Random => gas.saturating_mul(2),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    pub class: CallClass,
    pub expected_auto_associations: u64,
}

impl GasPolicy {
    pub fn mutate() -> Self {
        GasPolicy { class: CallClass::Mutate, expected_auto_associations: 0 }
    }

    pub fn random() -> Self {
        GasPolicy { class: CallClass::Random, expected_auto_associations: 0 }
    }

    pub fn with_auto_associations(mut self, count: u64) -> Self {
        self.expected_auto_associations = count;
        self
    }

    /// Safety margin over a base estimate.
    pub fn apply(&self, base: u64) -> u64 {
        self.class.apply(base).saturating_add(self.expected_auto_associations * AUTO_ASSOCIATION_GAS)
    }
}

/// Consult the mirror and return the gas limit to submit with: the class
/// margin applied over `max(mirror estimate, caller fallback)`. The fallback
/// alone carries calls the mirror refuses to simulate.
pub async fn plan_gas(
    mirror: &MirrorClient,
    to: ContractId,
    from: AccountId,
    call_data: &[u8],
    fallback: u64,
    policy: GasPolicy,
) -> KitResult<u64> {
    let estimate = mirror.estimate_gas(to, from, call_data, fallback).await?;
    let base = estimate.gas_limit.max(fallback);
    let limit = policy.apply(base);
    debug!(
        "gas plan for {to}: base {base} (mirror={}), limit {limit}",
        if estimate.used_mirror_estimate { "yes" } else { "fallback" }
    );
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutate_class_is_twenty_percent_margin() {
        assert_eq!(GasPolicy::mutate().apply(100_000), 120_000);
        assert_eq!(GasPolicy::mutate().apply(1), 2); // rounds up
    }

    #[test]
    fn random_class_doubles() {
        assert_eq!(GasPolicy::random().apply(250_000), 500_000);
    }

    #[test]
    fn auto_associations_are_additive_after_the_multiplier() {
        let policy = GasPolicy::mutate().with_auto_associations(2);
        assert_eq!(policy.apply(100_000), 120_000 + 2 * AUTO_ASSOCIATION_GAS);
    }

    #[test]
    fn random_class_meets_invariant_over_max_of_estimate_and_fallback() {
        // Submitted gas must be >= 2 * max(estimate, fallback).
        let estimate = 180_000u64;
        let fallback = 240_000u64;
        let base = estimate.max(fallback);
        assert!(GasPolicy::random().apply(base) >= 2 * base);
    }
}
