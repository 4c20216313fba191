use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, FlowConfig};
use crate::error::{Result, WalletError};
use crate::model::chain::{BSC_CHAIN_ID, ChainDescriptor, parse_chain_id};
use crate::model::price::Price;
use crate::model::token::{TokenBalance, usd_value};
use crate::network::NetworkGuard;
use crate::provider::{ProviderEvent, WalletProvider, methods, request_as};
use crate::token::{TokenReader, normalize_address};

const EVENT_CAPACITY: usize = 64;

const MSG_WRONG_NETWORK: &str = "Please switch to BNB Smart Chain network";
const MSG_SWITCH_FAILED: &str = "Failed to switch to BNB Smart Chain. Please switch manually.";
const MSG_MANUAL_SWITCH_FAILED: &str = "Failed to switch network. Please switch manually in your wallet.";

// ── State ────────────────────────────────────────────────────────────

/// User-visible stage of a connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStep {
    #[default]
    Authorization,
    Connecting,
    Switching,
    Fetching,
    Connected,
}

impl ConnectionStep {
    /// A connection attempt is between the handshake and `Connected`.
    pub fn is_attempting(&self) -> bool {
        matches!(
            self,
            ConnectionStep::Connecting | ConnectionStep::Switching | ConnectionStep::Fetching
        )
    }
}

impl std::fmt::Display for ConnectionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStep::Authorization => "authorization",
            ConnectionStep::Connecting => "connecting",
            ConnectionStep::Switching => "switching",
            ConnectionStep::Fetching => "fetching",
            ConnectionStep::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletState {
    pub step: ConnectionStep,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub balance: Option<TokenBalance>,
    pub error: Option<String>,
    pub loading: bool,
}

impl WalletState {
    pub fn is_bsc(&self) -> bool {
        self.chain_id == Some(BSC_CHAIN_ID)
    }

    pub fn is_connected(&self) -> bool {
        self.step == ConnectionStep::Connected && self.account.is_some()
    }

    /// The balance, only while an account is connected on BSC. Anything
    /// else displays as the zero placeholder.
    pub fn valid_balance(&self) -> Option<&TokenBalance> {
        match (&self.account, self.is_bsc()) {
            (Some(_), true) => self.balance.as_ref(),
            _ => None,
        }
    }
}

/// Pushed to observers as the session changes.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    Step(ConnectionStep),
    Balance(Option<TokenBalance>),
    Error(String),
}

// ── Listener handle ──────────────────────────────────────────────────

/// Provider event subscription owned by the session. Dropping it stops
/// the listener task and releases the subscription.
struct ListenerHandle {
    task: JoinHandle<()>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── Flow ─────────────────────────────────────────────────────────────

/// One wallet session: the connection state machine over a single provider.
pub struct ConnectionFlow {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn WalletProvider>,
    guard: NetworkGuard,
    reader: TokenReader,
    chain: ChainDescriptor,
    delays: FlowConfig,
    state: Mutex<WalletState>,
    /// Bumped by connect, disconnect and drop. Async work started under an
    /// older epoch must not touch state.
    epoch: AtomicU64,
    listener: Mutex<Option<ListenerHandle>>,
    events: broadcast::Sender<FlowEvent>,
}

impl ConnectionFlow {
    pub fn new(provider: Arc<dyn WalletProvider>, config: &AppConfig) -> Self {
        let reader = TokenReader::new(provider.clone(), config.token.clone())
            .with_balance_policy(config.balance_policy());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        ConnectionFlow {
            inner: Arc::new(Inner {
                guard: NetworkGuard::new(provider.clone()),
                provider,
                reader,
                chain: config.chain.clone(),
                delays: config.flow.clone(),
                state: Mutex::new(WalletState::default()),
                epoch: AtomicU64::new(0),
                listener: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn state(&self) -> WalletState {
        self.inner.lock_state().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.inner.events.subscribe()
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.inner.provider
    }

    /// Whether provider events are currently being handled.
    pub fn is_listening(&self) -> bool {
        self.inner.lock_listener().is_some()
    }

    /// Run one connection attempt from the authorization step.
    ///
    /// Only a failed handshake (or failing to learn the chain) is an error;
    /// it leaves the session back at `Authorization`. A failed switch or
    /// balance read still ends at `Connected` with the error recorded.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let epoch = inner.begin();
        inner.stop_listening();

        inner.update(epoch, |s| {
            *s = WalletState {
                step: ConnectionStep::Connecting,
                loading: true,
                ..WalletState::default()
            }
        });

        let account = match inner.handshake().await {
            Ok(account) => account,
            Err(e) => return inner.fail(epoch, e),
        };
        if !inner.update(epoch, |s| s.account = Some(account)) {
            return Ok(());
        }
        info!(%account, "wallet authorized");
        Inner::listen(inner, epoch);

        let chain_id = match inner.guard.current_chain_id().await {
            Ok(id) => id,
            Err(e) => return inner.fail(epoch, e),
        };
        if !inner.update(epoch, |s| s.chain_id = Some(chain_id)) {
            return Ok(());
        }

        if chain_id == BSC_CHAIN_ID {
            inner.update(epoch, |s| s.step = ConnectionStep::Fetching);
            sleep_if_set(inner.delays.fetch_delay()).await;
            inner.fetch_balance(epoch).await;
        } else {
            info!(chain_id, "not on BSC, requesting switch");
            inner.update(epoch, |s| s.step = ConnectionStep::Switching);
            match inner.switch_and_confirm().await {
                Ok(()) => {
                    inner.update(epoch, |s| {
                        s.chain_id = Some(BSC_CHAIN_ID);
                        s.step = ConnectionStep::Fetching;
                    });
                    inner.fetch_balance(epoch).await;
                }
                Err(now) => {
                    inner.update(epoch, |s| {
                        s.chain_id = Some(now.unwrap_or(chain_id));
                        s.error = Some(MSG_SWITCH_FAILED.into());
                    });
                }
            }
        }

        inner.update(epoch, |s| {
            s.step = ConnectionStep::Connected;
            s.loading = false;
        });
        Ok(())
    }

    /// Resume a session the wallet already authorized, without prompting.
    /// Returns whether an account was found.
    pub async fn restore(&self) -> bool {
        let inner = &self.inner;
        let epoch = inner.begin();
        inner.stop_listening();

        let accounts: Vec<String> = match request_as(inner.provider.as_ref(), methods::ETH_ACCOUNTS, json!([])).await {
            Ok(a) => a,
            Err(e) => {
                debug!("no existing connection: {e}");
                return false;
            }
        };
        let Some(account) = accounts.first().and_then(|a| normalize_address(a).ok()) else {
            return false;
        };

        inner.update(epoch, |s| {
            *s = WalletState {
                step: ConnectionStep::Connected,
                account: Some(account),
                ..WalletState::default()
            }
        });
        info!(%account, "restored existing connection");

        match inner.guard.current_chain_id().await {
            Ok(id) => {
                inner.update(epoch, |s| {
                    s.chain_id = Some(id);
                    if id != BSC_CHAIN_ID {
                        s.error = Some(MSG_WRONG_NETWORK.into());
                    }
                });
            }
            Err(e) => warn!("checking network: {e}"),
        }

        Inner::listen(inner, epoch);
        inner.fetch_balance(epoch).await;
        true
    }

    /// Re-read the balance of the connected account.
    pub async fn refresh_balance(&self) -> bool {
        let epoch = self.inner.current_epoch();
        self.inner.fetch_balance(epoch).await
    }

    /// User-requested switch to BSC from the connected state.
    pub async fn switch_network(&self) -> bool {
        let inner = &self.inner;
        let epoch = inner.current_epoch();
        let has_account = inner.lock_state().account.is_some();
        if !has_account {
            return false;
        }

        inner.update(epoch, |s| {
            s.loading = true;
            s.error = None;
        });
        if let Err(now) = inner.switch_and_confirm().await {
            inner.update(epoch, |s| {
                if let Some(id) = now {
                    s.chain_id = Some(id);
                }
                s.loading = false;
                s.error = Some(MSG_MANUAL_SWITCH_FAILED.into());
            });
            return false;
        }

        inner.update(epoch, |s| s.chain_id = Some(BSC_CHAIN_ID));
        inner.fetch_balance(epoch).await;
        true
    }

    /// Forget the account and stop listening to the provider.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// USD value of the valid balance at `price`, two decimals.
    pub fn usd_value(&self, price: &Price) -> Option<String> {
        let state = self.inner.lock_state();
        state
            .valid_balance()
            .map(|b| usd_value(&b.formatted_amount, price.usd_price))
    }
}

impl Drop for ConnectionFlow {
    fn drop(&mut self) {
        self.inner.begin();
        self.inner.stop_listening();
    }
}

// ── Internals ────────────────────────────────────────────────────────

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<ListenerHandle>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    fn stop_listening(&self) {
        let old = self.lock_listener().take();
        drop(old);
    }

    /// Apply `f` if `epoch` is still the active session, publishing what
    /// changed. Returns false for a stale epoch.
    fn update(&self, epoch: u64, f: impl FnOnce(&mut WalletState)) -> bool {
        let mut state = self.lock_state();
        if !self.is_current(epoch) {
            debug!(epoch, "dropping stale update");
            return false;
        }
        let before = state.clone();
        f(&mut state);
        let after = state.clone();
        drop(state);
        self.publish(&before, &after);
        true
    }

    fn publish(&self, before: &WalletState, after: &WalletState) {
        if before.step != after.step {
            info!(from = %before.step, to = %after.step, "connection step");
            let _ = self.events.send(FlowEvent::Step(after.step));
        }
        if before.balance != after.balance {
            let _ = self.events.send(FlowEvent::Balance(after.balance.clone()));
        }
        if before.error != after.error {
            if let Some(msg) = &after.error {
                let _ = self.events.send(FlowEvent::Error(msg.clone()));
            }
        }
    }

    async fn handshake(&self) -> Result<Address> {
        let accounts: Vec<String> =
            request_as(self.provider.as_ref(), methods::ETH_REQUEST_ACCOUNTS, json!([])).await?;
        let first = accounts.first().ok_or(WalletError::NoAccounts)?;
        normalize_address(first)
    }

    /// Fatal error during connecting: back to authorization.
    fn fail(&self, epoch: u64, err: WalletError) -> Result<()> {
        warn!("connection failed: {err}");
        self.update(epoch, |s| {
            *s = WalletState {
                error: Some(err.to_string()),
                ..WalletState::default()
            }
        });
        Err(err)
    }

    fn disconnect(&self) {
        self.begin();
        self.stop_listening();

        let mut state = self.lock_state();
        let before = std::mem::take(&mut *state);
        let after = state.clone();
        drop(state);
        self.publish(&before, &after);
        info!("disconnected");
    }

    /// Ask the wallet for BSC, then check it actually moved. `Err` carries
    /// the chain the wallet still reports, when known.
    async fn switch_and_confirm(&self) -> std::result::Result<(), Option<u64>> {
        if !self.guard.switch_to_chain(&self.chain).await {
            return Err(None);
        }
        sleep_if_set(self.delays.switch_settle()).await;
        match self.guard.current_chain_id().await {
            Ok(BSC_CHAIN_ID) => Ok(()),
            Ok(other) => {
                warn!(chain_id = other, "wallet accepted the switch but stayed on another chain");
                Err(Some(other))
            }
            Err(e) => {
                warn!("re-reading chain after switch: {e}");
                Ok(())
            }
        }
    }

    /// Read the balance for the current account. Skipped without an
    /// account; off BSC the wrong-network error is shown instead.
    async fn fetch_balance(&self, epoch: u64) -> bool {
        let (account, chain_id) = {
            let state = self.lock_state();
            (state.account, state.chain_id)
        };
        let Some(account) = account else {
            debug!("no account, skipping balance fetch");
            return false;
        };
        if chain_id != Some(BSC_CHAIN_ID) {
            debug!(?chain_id, "not on BSC, skipping balance fetch");
            self.update(epoch, |s| {
                s.loading = false;
                s.balance = None;
                if chain_id.is_some() {
                    s.error = Some(MSG_WRONG_NETWORK.into());
                }
            });
            return false;
        }

        if !self.update(epoch, |s| {
            s.loading = true;
            s.error = None;
        }) {
            return false;
        }

        let result = self.reader.read_balance(&account.to_checksum(None)).await;
        let ok = result.is_ok();
        self.update(epoch, |s| {
            s.loading = false;
            match result {
                Ok(balance) => s.balance = Some(balance),
                Err(e) => {
                    warn!("balance fetch failed: {e}");
                    s.balance = None;
                    s.error = Some(e.to_string());
                }
            }
        });
        ok
    }

    /// Replace any previous subscription with one bound to `epoch`.
    fn listen(this: &Arc<Self>, epoch: u64) {
        let mut slot = this.lock_listener();
        if !this.is_current(epoch) {
            return;
        }
        let mut rx = this.provider.subscribe();
        let inner = this.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !inner.is_current(epoch) {
                            break;
                        }
                        inner.handle_event(epoch, event).await;
                    }
                    Err(RecvError::Lagged(n)) => warn!("missed {n} provider events"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *slot = Some(ListenerHandle { task });
        debug!(epoch, "listening for provider events");
    }

    async fn handle_event(&self, epoch: u64, event: ProviderEvent) {
        debug!(?event, "provider event");
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let Some(first) = accounts.first() else {
                    self.disconnect();
                    return;
                };
                let account = match normalize_address(first) {
                    Ok(a) => a,
                    Err(e) => {
                        warn!("ignoring account change: {e}");
                        return;
                    }
                };
                if !self.update(epoch, |s| s.account = Some(account)) {
                    return;
                }
                // an attempt in flight reads the balance itself
                let refetch = {
                    let state = self.lock_state();
                    state.is_bsc() && !state.step.is_attempting()
                };
                if refetch {
                    self.fetch_balance(epoch).await;
                }
            }
            ProviderEvent::ChainChanged(raw) => {
                let Some(id) = parse_chain_id(&raw) else {
                    warn!("ignoring malformed chain id `{raw}`");
                    return;
                };
                let (has_account, attempting) = {
                    let state = self.lock_state();
                    (state.account.is_some(), state.step.is_attempting())
                };
                if !has_account || attempting {
                    self.update(epoch, |s| s.chain_id = Some(id));
                    return;
                }
                if id == BSC_CHAIN_ID {
                    self.update(epoch, |s| {
                        s.chain_id = Some(id);
                        s.step = ConnectionStep::Connected;
                        s.error = None;
                    });
                    self.fetch_balance(epoch).await;
                } else {
                    self.update(epoch, |s| {
                        s.chain_id = Some(id);
                        s.step = ConnectionStep::Connected;
                        s.balance = None;
                        s.error = Some(MSG_WRONG_NETWORK.into());
                    });
                }
            }
        }
    }
}

async fn sleep_if_set(d: std::time::Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
