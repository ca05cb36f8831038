//! Preflight reconciliation: compare a write command's required on-chain
//! conditions against the mirror and issue only the missing corrective
//! transactions, in a fixed order, before the primary call.
//!
//! Planning is pure (conditions + snapshot in, actions out) so the ordering
//! and idempotence guarantees are testable without a network. Execution walks
//! the planned actions through the submitter and waits out mirror propagation
//! between steps.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::{info, warn};

use crate::entity::{AccountId, ContractId, TokenId};
use crate::env::NetworkEnvironment;
use crate::error::{KitError, KitResult};
use crate::mirror::{AllowanceSnapshot, MirrorClient};
use crate::tx::{ConsensusClient, Submitter};

/// A required on-chain condition, checked against the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Operator is associated with the token (a zero balance still counts).
    Associated { token: TokenId },
    /// Operator has granted at least `amount` of `token` to `spender`.
    FungibleAllowance { token: TokenId, spender: AccountId, amount: u128 },
    /// Operator has an operator-for-all approval on the collection.
    NftApprovalForAll { collection: TokenId, spender: AccountId },
    /// Operator has an HBAR allowance of at least `min_tinybar` (floored at
    /// 1 tinybar: the contract transfers NFTs on the operator's behalf and
    /// the native layer rejects a zero allowance).
    HbarAllowance { spender: AccountId, min_tinybar: u64 },
    /// Diagnostic only: never reconciled, fails fast when unmet.
    OwnsSerial { token: TokenId, serial: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct PreflightPlan {
    pub conditions: Vec<Condition>,
}

impl PreflightPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A corrective transaction the reconciler decided to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// One batched associate covering every missing token.
    Associate { tokens: Vec<TokenId> },
    /// Exact-amount allowance set; never a union or max with the old value.
    SetFungibleAllowance { token: TokenId, spender: AccountId, amount: u128 },
    /// One batched set-approval-for-all covering every pending collection.
    ApproveNftAll { approvals: Vec<(TokenId, AccountId)> },
    SetHbarAllowance { spender: AccountId, amount_tinybar: u64 },
}

/// The mirror state the planner reconciles against.
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    pub associated: HashSet<TokenId>,
    pub allowances: AllowanceSnapshot,
    pub serial_owners: HashMap<(TokenId, u64), AccountId>,
}

/// Pure planning: which corrective actions are needed, in issue order —
/// associations, then fungible allowances, then NFT approvals, then the HBAR
/// allowance (independent, but sequenced last for determinism).
pub fn plan(conditions: &[Condition], operator: AccountId, view: &ChainView) -> KitResult<Vec<Action>> {
    let mut missing_assoc: Vec<TokenId> = Vec::new();
    let mut fungible: Vec<Action> = Vec::new();
    let mut nft_pending: Vec<(TokenId, AccountId)> = Vec::new();
    let mut hbar: Vec<Action> = Vec::new();

    for condition in conditions {
        match condition {
            Condition::Associated { token } => {
                if !view.associated.contains(token) && !missing_assoc.contains(token) {
                    missing_assoc.push(*token);
                }
            }
            Condition::FungibleAllowance { token, spender, amount } => {
                let existing = view.allowances.fungible_to(*token, *spender);
                if existing < *amount {
                    fungible.push(Action::SetFungibleAllowance { token: *token, spender: *spender, amount: *amount });
                }
            }
            Condition::NftApprovalForAll { collection, spender } => {
                if !view.allowances.nft_approved(*collection, *spender)
                    && !nft_pending.contains(&(*collection, *spender))
                {
                    nft_pending.push((*collection, *spender));
                }
            }
            Condition::HbarAllowance { spender, min_tinybar } => {
                let required = (*min_tinybar).max(1);
                if view.allowances.hbar_to(*spender) < required {
                    hbar.push(Action::SetHbarAllowance { spender: *spender, amount_tinybar: required });
                }
            }
            Condition::OwnsSerial { token, serial } => {
                let owner = view.serial_owners.get(&(*token, *serial));
                if owner != Some(&operator) {
                    return Err(KitError::NotOwner { token: token.to_string(), serial: *serial });
                }
            }
        }
    }

    let mut actions = Vec::new();
    if !missing_assoc.is_empty() {
        actions.push(Action::Associate { tokens: missing_assoc });
    }
    actions.extend(fungible);
    if !nft_pending.is_empty() {
        actions.push(Action::ApproveNftAll { approvals: nft_pending });
    }
    actions.extend(hbar);
    Ok(actions)
}

/// The spender for a pool's fee token: the gas station holds LAZY spending
/// rights; everything else routes through the lottery's storage contract.
pub fn fee_spender(env: &NetworkEnvironment, fee_token: TokenId) -> KitResult<AccountId> {
    let contract = match env.lazy_token {
        Some(lazy) if lazy == fee_token => env.require_gas_station()?,
        _ => env.require_storage()?,
    };
    Ok(contract_spender(contract))
}

/// Contracts appear in the allowance tables under their account-form ID.
pub fn contract_spender(contract: ContractId) -> AccountId {
    AccountId::new(contract.shard(), contract.realm(), contract.num())
}

/// Answers confirmation prompts before corrective allowance transactions.
pub trait Prompter {
    fn confirm(&self, message: &str) -> KitResult<bool>;
}

/// Non-interactive policy: every reconciliation is pre-approved.
pub struct AutoApprove;

impl Prompter for AutoApprove {
    fn confirm(&self, _message: &str) -> KitResult<bool> {
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub actions: Vec<Action>,
    pub waited: Duration,
}

pub struct Reconciler<'a, C, P> {
    env: &'a NetworkEnvironment,
    mirror: &'a MirrorClient,
    submitter: &'a Submitter<'a, C>,
    prompter: &'a P,
}

impl<'a, C: ConsensusClient, P: Prompter> Reconciler<'a, C, P> {
    pub fn new(
        env: &'a NetworkEnvironment,
        mirror: &'a MirrorClient,
        submitter: &'a Submitter<'a, C>,
        prompter: &'a P,
    ) -> Self {
        Reconciler { env, mirror, submitter, prompter }
    }

    /// Reconcile every condition, issuing only the missing operations.
    /// Running the same plan again right after a successful run issues
    /// nothing: every check reads the post-propagation mirror state.
    pub async fn run(&self, plan_spec: &PreflightPlan) -> KitResult<PreflightReport> {
        if plan_spec.is_empty() {
            return Ok(PreflightReport::default());
        }
        let view = self.gather(plan_spec).await?;
        let actions = plan(&plan_spec.conditions, self.env.operator_id, &view)?;
        let mut report = PreflightReport { actions: actions.clone(), waited: Duration::ZERO };

        for action in actions {
            match action {
                Action::Associate { ref tokens } => {
                    self.submitter.associate_tokens(tokens.clone()).await?;
                    report.waited += self.await_association(tokens).await?;
                }
                Action::SetFungibleAllowance { token, spender, amount } => {
                    let existing = view.allowances.fungible_to(token, spender);
                    let message =
                        format!("set allowance of {amount} units of {token} to {spender} (currently {existing})");
                    if !self.prompter.confirm(&message)? {
                        return Err(KitError::InsufficientAllowance {
                            token: token.to_string(),
                            spender: spender.to_string(),
                            required: amount,
                            available: existing,
                        });
                    }
                    self.submitter.approve_fungible(token, spender, amount).await?;
                    report.waited += self.propagation_pause().await;
                }
                Action::ApproveNftAll { ref approvals } => {
                    self.submitter.approve_nft_all(approvals.clone()).await?;
                    report.waited += self.propagation_pause().await;
                }
                Action::SetHbarAllowance { spender, amount_tinybar } => {
                    self.submitter.approve_hbar(spender, amount_tinybar).await?;
                    report.waited += self.propagation_pause().await;
                }
            }
        }
        Ok(report)
    }

    async fn gather(&self, plan_spec: &PreflightPlan) -> KitResult<ChainView> {
        let operator = self.env.operator_id;
        let mut view = ChainView { allowances: self.mirror.allowance_snapshot(operator).await?, ..Default::default() };
        for condition in &plan_spec.conditions {
            match condition {
                Condition::Associated { token } => {
                    if self.mirror.token_relationship(operator, *token).await?.is_some() {
                        view.associated.insert(*token);
                    }
                }
                Condition::OwnsSerial { token, serial } => {
                    match self.mirror.nft_owner(*token, *serial).await {
                        Ok(owner) => {
                            view.serial_owners.insert((*token, *serial), owner);
                        }
                        Err(KitError::ExecutionFailed { .. }) => {
                            // Serial unknown to the mirror: planning treats a
                            // missing entry as not-owned.
                        }
                        Err(other) => return Err(other),
                    }
                }
                _ => {}
            }
        }
        Ok(view)
    }

    /// After an associate, poll the mirror for the new relationship instead
    /// of sleeping blind; cap the poll at twice the configured delay.
    async fn await_association(&self, tokens: &[TokenId]) -> KitResult<Duration> {
        let step = Duration::from_millis(500).min(self.env.propagation_delay.max(Duration::from_millis(1)));
        let deadline = self.env.propagation_delay * 2;
        let mut waited = Duration::ZERO;
        'outer: while waited < deadline {
            for token in tokens {
                if self.mirror.token_relationship(self.env.operator_id, *token).await?.is_none() {
                    tokio::time::sleep(step).await;
                    waited += step;
                    continue 'outer;
                }
            }
            info!("association visible on mirror after {waited:?}");
            return Ok(waited);
        }
        warn!("association not visible after {waited:?}; proceeding");
        Ok(waited)
    }

    async fn propagation_pause(&self) -> Duration {
        tokio::time::sleep(self.env.propagation_delay).await;
        self.env.propagation_delay
    }
}
