//! Read client for the mirror (read-replica) REST node.
//!
//! Every method here is an idempotent read. Transient failures (timeouts,
//! HTTP 5xx) are retried with capped exponential backoff at this boundary
//! only; higher layers must not wrap their own retries around these calls.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::B256;
use log::{debug, warn};
use lru::LruCache;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::{is_long_zero, AccountId, ContractId, EvmAddress, TokenId};
use crate::env::NetworkEnvironment;
use crate::error::{KitError, KitResult};

const RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE_MS: u64 = 400;
const RETRY_FACTOR: u64 = 2;
const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 20;
const ALIAS_CACHE_CAPACITY: usize = 128;

/// Wire shape of the mirror's contract-call endpoint.
#[derive(Debug, Serialize)]
struct ContractCallRequest<'a> {
    block: &'a str,
    data: String,
    to: String,
    from: String,
    estimate: bool,
}

#[derive(Debug, Deserialize)]
struct ContractCallResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct MirrorStatus {
    #[serde(default)]
    messages: Vec<MirrorStatusMessage>,
}

#[derive(Debug, Deserialize)]
struct MirrorStatusMessage {
    #[serde(default)]
    message: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MirrorErrorBody {
    #[serde(rename = "_status", default)]
    status: Option<MirrorStatus>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: AccountBalance,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct TokenRelationshipPage {
    #[serde(default)]
    tokens: Vec<TokenRelationship>,
}

#[derive(Debug, Deserialize)]
struct TokenRelationship {
    token_id: TokenId,
    balance: u128,
}

#[derive(Debug, Deserialize)]
struct TokenAllowancePage {
    #[serde(default)]
    allowances: Vec<TokenAllowanceEntry>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct TokenAllowanceEntry {
    token_id: TokenId,
    spender: AccountId,
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct NftAllowancePage {
    #[serde(default)]
    allowances: Vec<NftAllowanceEntry>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct NftAllowanceEntry {
    token_id: TokenId,
    spender: AccountId,
    approved_for_all: bool,
}

#[derive(Debug, Deserialize)]
struct CryptoAllowancePage {
    #[serde(default)]
    allowances: Vec<CryptoAllowanceEntry>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct CryptoAllowanceEntry {
    spender: AccountId,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct NftInfo {
    account_id: AccountId,
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    symbol: String,
    decimals: String,
}

#[derive(Debug, Deserialize)]
struct ContractInfoResponse {
    contract_id: ContractId,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResponse {
    account: AccountId,
}

#[derive(Debug, Deserialize)]
struct LogsPage {
    #[serde(default)]
    logs: Vec<LogEntry>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    transaction_hash: Option<String>,
}

/// One raw event log, oldest-first after page reassembly.
#[derive(Debug, Clone)]
pub struct EventLog {
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub timestamp: String,
    pub transaction_hash: Option<String>,
}

/// Token metadata needed to render raw amounts for humans.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
}

/// Mirror-side gas estimate, or the caller's floor when the mirror refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub used_mirror_estimate: bool,
}

/// Per-owner allowance view, consumed read-only by the preflight reconciler.
#[derive(Debug, Clone, Default)]
pub struct AllowanceSnapshot {
    pub fungible: Vec<(TokenId, AccountId, u128)>,
    pub nft: Vec<(TokenId, AccountId, bool)>,
    pub hbar: Vec<(AccountId, u64)>,
}

impl AllowanceSnapshot {
    pub fn fungible_to(&self, token: TokenId, spender: AccountId) -> u128 {
        self.fungible.iter().find(|(t, s, _)| *t == token && *s == spender).map(|(_, _, a)| *a).unwrap_or(0)
    }

    pub fn nft_approved(&self, token: TokenId, spender: AccountId) -> bool {
        self.nft.iter().any(|(t, s, approved)| *t == token && *s == spender && *approved)
    }

    pub fn hbar_to(&self, spender: AccountId) -> u64 {
        self.hbar.iter().find(|(s, _)| *s == spender).map(|(_, a)| *a).unwrap_or(0)
    }
}

pub struct MirrorClient {
    http: reqwest::Client,
    base: String,
    alias_cache: Mutex<LruCache<EvmAddress, u64>>,
}

impl MirrorClient {
    pub fn new(env: &NetworkEnvironment) -> KitResult<Self> {
        let http = reqwest::Client::builder().timeout(env.mirror_timeout).build()?;
        Ok(Self::with_http(http, env.mirror_base.clone()))
    }

    pub fn with_http(http: reqwest::Client, base: String) -> Self {
        MirrorClient {
            http,
            base: base.trim_end_matches('/').to_string(),
            alias_cache: Mutex::new(LruCache::new(NonZeroUsize::new(ALIAS_CACHE_CAPACITY).unwrap())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// POST an ABI-encoded read call; the returned bytes decode against the
    /// function's output schema.
    pub async fn contract_call(&self, to: ContractId, from: AccountId, data: &[u8]) -> KitResult<Vec<u8>> {
        let body = ContractCallRequest {
            block: "latest",
            data: hex_0x(data),
            to: format!("{:#x}", to.to_evm()),
            from: format!("{:#x}", from.to_evm()),
            estimate: false,
        };
        let url = format!("{}/api/v1/contracts/call", self.base);
        let rsp: ContractCallResponse = self.post_with_retry(&url, &body).await?;
        parse_hex_blob(&rsp.result)
    }

    /// Mirror-side gas estimate. The mirror refuses some simulations (e.g.
    /// calls that only succeed with real consensus randomness); those fall
    /// back to the caller's floor.
    pub async fn estimate_gas(&self, to: ContractId, from: AccountId, data: &[u8], fallback: u64) -> KitResult<GasEstimate> {
        let body = ContractCallRequest {
            block: "latest",
            data: hex_0x(data),
            to: format!("{:#x}", to.to_evm()),
            from: format!("{:#x}", from.to_evm()),
            estimate: true,
        };
        let url = format!("{}/api/v1/contracts/call", self.base);
        match self.post_with_retry::<_, ContractCallResponse>(&url, &body).await {
            Ok(rsp) => {
                let gas = parse_hex_quantity(&rsp.result)?;
                Ok(GasEstimate { gas_limit: gas, used_mirror_estimate: true })
            }
            Err(KitError::ExecutionFailed { status, .. }) => {
                debug!("mirror refused gas estimate ({status}); using fallback {fallback}");
                Ok(GasEstimate { gas_limit: fallback, used_mirror_estimate: false })
            }
            Err(other) => Err(other),
        }
    }

    pub async fn hbar_balance(&self, account: AccountId) -> KitResult<u64> {
        let url = format!("{}/api/v1/accounts/{account}", self.base);
        let rsp: AccountResponse = self.get_with_retry(&url).await?;
        Ok(rsp.balance.balance)
    }

    /// `Some(balance)` iff the account has a relationship with the token
    /// (a zero balance still counts as associated).
    pub async fn token_relationship(&self, account: AccountId, token: TokenId) -> KitResult<Option<u128>> {
        let url = format!("{}/api/v1/accounts/{account}/tokens?token.id={token}", self.base);
        let rsp: TokenRelationshipPage = self.get_with_retry(&url).await?;
        Ok(rsp.tokens.iter().find(|t| t.token_id == token).map(|t| t.balance))
    }

    pub async fn token_balance(&self, account: AccountId, token: TokenId) -> KitResult<u128> {
        Ok(self.token_relationship(account, token).await?.unwrap_or(0))
    }

    pub async fn fungible_allowances(&self, owner: AccountId) -> KitResult<Vec<(TokenId, AccountId, u128)>> {
        let first = format!("{}/api/v1/accounts/{owner}/allowances/tokens?limit={PAGE_LIMIT}", self.base);
        let pages: Vec<TokenAllowancePage> = self.paged_get(&first, |p: &TokenAllowancePage| p.links.as_ref()).await?;
        Ok(pages.into_iter().flat_map(|p| p.allowances).map(|a| (a.token_id, a.spender, a.amount)).collect())
    }

    pub async fn nft_operator_approvals(&self, owner: AccountId) -> KitResult<Vec<(TokenId, AccountId, bool)>> {
        let first = format!("{}/api/v1/accounts/{owner}/allowances/nfts?limit={PAGE_LIMIT}", self.base);
        let pages: Vec<NftAllowancePage> = self.paged_get(&first, |p: &NftAllowancePage| p.links.as_ref()).await?;
        Ok(pages.into_iter().flat_map(|p| p.allowances).map(|a| (a.token_id, a.spender, a.approved_for_all)).collect())
    }

    pub async fn hbar_allowances(&self, owner: AccountId) -> KitResult<Vec<(AccountId, u64)>> {
        let first = format!("{}/api/v1/accounts/{owner}/allowances/crypto?limit={PAGE_LIMIT}", self.base);
        let pages: Vec<CryptoAllowancePage> = self.paged_get(&first, |p: &CryptoAllowancePage| p.links.as_ref()).await?;
        Ok(pages.into_iter().flat_map(|p| p.allowances).map(|a| (a.spender, a.amount)).collect())
    }

    pub async fn allowance_snapshot(&self, owner: AccountId) -> KitResult<AllowanceSnapshot> {
        Ok(AllowanceSnapshot {
            fungible: self.fungible_allowances(owner).await?,
            nft: self.nft_operator_approvals(owner).await?,
            hbar: self.hbar_allowances(owner).await?,
        })
    }

    /// Symbol and decimal exponent of a token. The mirror serves decimals as
    /// a decimal string.
    pub async fn token_info(&self, token: TokenId) -> KitResult<TokenInfo> {
        let url = format!("{}/api/v1/tokens/{token}", self.base);
        let rsp: TokenInfoResponse = self.get_with_retry(&url).await?;
        let decimals = rsp
            .decimals
            .parse()
            .map_err(|_| KitError::AbiDecode { context: format!("token {token} decimals"), reason: rsp.decimals.clone() })?;
        Ok(TokenInfo { symbol: rsp.symbol, decimals })
    }

    pub async fn nft_owner(&self, token: TokenId, serial: u64) -> KitResult<AccountId> {
        let url = format!("{}/api/v1/tokens/{token}/nfts/{serial}", self.base);
        let rsp: NftInfo = self.get_with_retry(&url).await?;
        Ok(rsp.account_id)
    }

    /// Paginated event-log retrieval: the mirror serves newest-first pages;
    /// the reassembled result is oldest-first.
    pub async fn fetch_events(&self, contract: ContractId) -> KitResult<Vec<EventLog>> {
        let first = format!("{}/api/v1/contracts/{contract}/results/logs?limit={PAGE_LIMIT}&order=desc", self.base);
        let pages: Vec<LogsPage> = self.paged_get(&first, |p: &LogsPage| p.links.as_ref()).await?;
        let mut logs = Vec::new();
        for entry in pages.into_iter().flat_map(|p| p.logs) {
            let topics = entry
                .topics
                .iter()
                .map(|t| parse_hex_blob(t).and_then(word32))
                .collect::<KitResult<Vec<_>>>()?;
            let data = match &entry.data {
                Some(d) if !d.is_empty() && d != "0x" => parse_hex_blob(d)?,
                _ => Vec::new(),
            };
            logs.push(EventLog { topics, data, timestamp: entry.timestamp, transaction_hash: entry.transaction_hash });
        }
        logs.reverse();
        Ok(logs)
    }

    /// Recover a contract ID from an EVM address found in decoded output.
    /// Long-zero forms decode locally and never touch the network; short
    /// aliases go through the mirror behind an LRU cache.
    pub async fn resolve_contract(&self, addr: EvmAddress) -> KitResult<ContractId> {
        if is_long_zero(addr) {
            return ContractId::from_evm(addr);
        }
        if let Some(num) = self.alias_cache.lock().unwrap().get(&addr).copied() {
            return Ok(ContractId::new(0, 0, num));
        }
        let url = format!("{}/api/v1/contracts/{:#x}", self.base, addr);
        let rsp: ContractInfoResponse = self.get_with_retry(&url).await?;
        self.alias_cache.lock().unwrap().put(addr, rsp.contract_id.num());
        Ok(rsp.contract_id)
    }

    pub async fn resolve_account(&self, addr: EvmAddress) -> KitResult<AccountId> {
        if is_long_zero(addr) {
            return AccountId::from_evm(addr);
        }
        if let Some(num) = self.alias_cache.lock().unwrap().get(&addr).copied() {
            return Ok(AccountId::new(0, 0, num));
        }
        let url = format!("{}/api/v1/accounts/{:#x}", self.base, addr);
        let rsp: AccountInfoResponse = self.get_with_retry(&url).await?;
        self.alias_cache.lock().unwrap().put(addr, rsp.account.num());
        Ok(rsp.account)
    }

    // --- transport ---------------------------------------------------------

    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> KitResult<T> {
        self.send_with_retry(|| self.http.get(url)).await
    }

    async fn post_with_retry<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> KitResult<T> {
        let payload = serde_json::to_value(body)?;
        self.send_with_retry(|| self.http.post(url).json(&payload)).await
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> KitResult<T> {
        let mut last_reason = String::new();
        for attempt in 1..=RETRY_ATTEMPTS {
            match build().send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(rsp.json::<T>().await?);
                    }
                    let body = rsp.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        last_reason = format!("http {status}");
                        warn!("mirror {status} (attempt {attempt}/{RETRY_ATTEMPTS})");
                    } else {
                        // 4xx: not transient. Contract-call rejections carry
                        // the revert detail in the `_status` envelope.
                        return Err(client_rejection(status.as_u16(), &body));
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    last_reason = e.to_string();
                    warn!("mirror request failed (attempt {attempt}/{RETRY_ATTEMPTS}): {last_reason}");
                }
                Err(e) => return Err(e.into()),
            }
            if attempt < RETRY_ATTEMPTS {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
        Err(KitError::MirrorUnavailable { attempts: RETRY_ATTEMPTS, reason: last_reason })
    }

    async fn paged_get<T: DeserializeOwned>(
        &self,
        first_url: &str,
        next_of: impl Fn(&T) -> Option<&Links>,
    ) -> KitResult<Vec<T>> {
        let mut pages = Vec::new();
        let mut url = first_url.to_string();
        for _ in 0..MAX_PAGES {
            let page: T = self.get_with_retry(&url).await?;
            let next = next_of(&page).and_then(|l| l.next.clone());
            pages.push(page);
            match next {
                Some(path) => url = format!("{}{}", self.base, path),
                None => return Ok(pages),
            }
        }
        warn!("mirror pagination stopped after {MAX_PAGES} pages");
        Ok(pages)
    }
}

fn client_rejection(code: u16, body: &str) -> KitError {
    let parsed: Option<MirrorErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .and_then(|b| b.status)
        .and_then(|s| s.messages.into_iter().next())
        .map(|m| match m.detail {
            Some(detail) if !detail.is_empty() => format!("{} ({detail})", m.message),
            _ => m.message,
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("http {code}"));
    KitError::ExecutionFailed { status: message, revert: None }
}

/// Exponential backoff with ±25% jitter: 400 ms, 800 ms, 1600 ms, ...
fn backoff_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_MS * RETRY_FACTOR.pow(attempt - 1);
    let jitter_span = base / 4;
    let jitter = rand::thread_rng().gen_range(0..=jitter_span * 2);
    Duration::from_millis(base - jitter_span + jitter)
}

fn hex_0x(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn parse_hex_blob(s: &str) -> KitResult<Vec<u8>> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(stripped)
        .map_err(|e| KitError::AbiDecode { context: "mirror hex".into(), reason: e.to_string() })
}

fn parse_hex_quantity(s: &str) -> KitResult<u64> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| KitError::AbiDecode { context: "mirror gas quantity".into(), reason: e.to_string() })
}

fn word32(bytes: Vec<u8>) -> KitResult<B256> {
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KitError::AbiDecode { context: "log topic".into(), reason: format!("{} bytes", bytes.len()) })?;
    Ok(B256::from(arr))
}
