//! Swap Engine
//!
//! One [`SwapEngine`] drives one swap session: it debounces amount edits, polls every
//! provider through a single-flight scheduler, selects the provider to show, and runs the
//! approval and swap flows. State changes are reported as [`EngineEvent`]s on the channel
//! returned by [`SwapEngine::new`].
//!
//! Polling pauses while the screen is stopped, while an approval dialog is open, while a
//! transaction is broadcast and after a failed poll. Only a user action restarts it; balance
//! updates re-poll only while [`PollingState::Active`].
//!
//! Lock order: scheduler slot, then selection memory, then session state, then polling
//! state. The scheduler is never called while any of the other locks is held.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::balance::BalanceSubscription;
use super::classifier;
use super::events::{EngineEvent, PollingState, QuotesSnapshot, Side};
use super::executor::SwapExecutor;
use super::fee::resolve_fee;
use super::permission::PermissionFlowController;
use super::search::filter_tokens;
use super::selector::{self, SelectionMemory};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::models::{
    cut_amount_with_decimals, AggregateQuotes, ApproveType, AssetStatus, FeeTier,
    PermissionState, Provider, SwapProcessState, SwapState, TokenGroup, TokensData,
};
use crate::sources::{
    ApprovalOutcome, BalanceStream, MinimumAmountSource, QuoteRequest, QuoteSource,
    TransactionFacade, TxOutcome,
};
use crate::utils::{lock, Debouncer, PeriodicTask, SingleTaskScheduler, TaskFlow, TaskFuture};

/// External collaborators of a swap session
#[derive(Clone)]
pub struct SwapEngineDeps {
    pub quote_source: Arc<dyn QuoteSource>,
    pub transactions: Arc<dyn TransactionFacade>,
    pub balances: Arc<dyn BalanceStream>,
    pub minimums: Arc<dyn MinimumAmountSource>,
}

/// Latest amount typed by the user, not yet necessarily quoted
#[derive(Debug, Clone, Default)]
struct AmountInput {
    amount: String,
    reduce_balance_by: Decimal,
}

struct EngineInner {
    session_id: Uuid,
    span: Span,
    config: EngineConfig,
    quote_source: Arc<dyn QuoteSource>,
    balances: Arc<dyn BalanceStream>,
    minimums: Arc<dyn MinimumAmountSource>,
    executor: SwapExecutor,
    permissions: PermissionFlowController,
    state: RwLock<SwapProcessState>,
    input: Mutex<AmountInput>,
    selection: Mutex<SelectionMemory>,
    polling: Mutex<PollingState>,
    scheduler: SingleTaskScheduler<AggregateQuotes>,
    amount_debouncer: Debouncer,
    search_debouncer: Debouncer,
    from_balance: BalanceSubscription,
    to_balance: BalanceSubscription,
    events: mpsc::UnboundedSender<EngineEvent>,
}

/// Handle to a swap session. Cloning shares the session.
#[derive(Clone)]
pub struct SwapEngine {
    inner: Arc<EngineInner>,
}

impl SwapEngine {
    /// Start a session swapping out of `from`
    pub fn new(
        config: EngineConfig,
        deps: SwapEngineDeps,
        from: AssetStatus,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        let span = info_span!("swap_session", %session_id, from = %from.asset.id);

        let executor = SwapExecutor::new(
            deps.transactions,
            Arc::clone(&deps.balances),
            config.balance_refresh_delay(),
        );

        let inner = EngineInner {
            session_id,
            span,
            config,
            quote_source: deps.quote_source,
            balances: deps.balances,
            minimums: deps.minimums,
            executor,
            permissions: PermissionFlowController::new(),
            state: RwLock::new(SwapProcessState {
                from_asset: Some(from),
                ..SwapProcessState::default()
            }),
            input: Mutex::new(AmountInput::default()),
            selection: Mutex::new(SelectionMemory::default()),
            polling: Mutex::new(PollingState::Active),
            scheduler: SingleTaskScheduler::new(),
            amount_debouncer: Debouncer::new(),
            search_debouncer: Debouncer::new(),
            from_balance: BalanceSubscription::new(Side::From),
            to_balance: BalanceSubscription::new(Side::To),
            events,
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Copy of the current session state
    pub fn state(&self) -> SwapProcessState {
        self.inner.state()
    }

    pub fn snapshot(&self) -> QuotesSnapshot {
        QuotesSnapshot::from_state(&self.inner.state())
    }

    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.is_active()
    }

    pub fn polling_state(&self) -> PollingState {
        *lock(&self.inner.polling)
    }

    /// Asset id watched by each side's balance subscription
    pub fn watched_balances(&self) -> (Option<String>, Option<String>) {
        (
            self.inner.from_balance.watched_asset(),
            self.inner.to_balance.watched_asset(),
        )
    }

    /// Provide the selectable token lists. The first call also picks the destination asset,
    /// preferring `initial_to`, subscribes to balances and starts polling.
    pub fn set_tokens(&self, tokens: TokensData, initial_to: Option<&str>) {
        let _entered = self.inner.span.enter();
        let state = self.inner.update_state(|current| {
            let mut next = current.clone();
            if next.to_asset.is_none() && !next.is_order_reversed {
                let group = &tokens.to_group;
                next.to_asset = initial_to
                    .and_then(|id| group.find_available(id))
                    .or_else(|| group.available.first())
                    .map(|entry| entry.status.clone());
            }
            next.tokens = Some(tokens);
            next
        });

        if let Some(group) = state.selectable_group() {
            self.inner.emit(EngineEvent::TokensUpdated(group.clone()));
        }
        self.inner.subscribe_balances(&state);

        match &state.to_asset {
            Some(to) => {
                info!(to = %to.asset.id, "Destination selected");
                self.inner.start_loading_quotes(false);
            }
            None => warn!("No destination asset is available"),
        }
    }

    /// Record an amount edit and schedule a poll after the debounce period, or right away
    /// when `force_update` is set
    pub async fn on_amount_changed(
        &self,
        value: &str,
        force_update: bool,
        reduce_balance_by: Decimal,
    ) {
        let inner = &self.inner;
        async move {
            let state = inner.state();
            let Some(from) = state.from_asset else {
                return;
            };

            let amount = cut_amount_with_decimals(from.asset.decimals, value);
            *lock(&inner.input) = AmountInput {
                amount: amount.clone(),
                reduce_balance_by,
            };
            let minimum = inner.minimums.minimum_amount(&from.asset).await;
            inner.emit(EngineEvent::AmountUpdated { amount, minimum });

            if state.to_asset.is_none() {
                return;
            }
            lock(&inner.selection).amount_changed_by_user = true;

            let weak = Arc::downgrade(inner);
            inner.amount_debouncer.debounce(
                inner.config.amount_debounce(),
                force_update,
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.start_loading_quotes(false);
                    }
                },
            );
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Use the whole source balance
    pub async fn on_max_amount(&self) {
        let balance = self
            .inner
            .state()
            .from_asset
            .map(|from| from.available_balance())
            .unwrap_or(Decimal::ZERO);
        self.on_amount_changed(&balance.normalize().to_string(), true, Decimal::ZERO)
            .await;
    }

    /// Replace the amount with one reduced to leave room for fees
    pub async fn on_reduce_amount(&self, amount: Decimal, reduce_balance_by: Decimal) {
        self.on_amount_changed(&amount.normalize().to_string(), true, reduce_balance_by)
            .await;
    }

    /// Pick the asset on the selectable side. Resets the provider selection.
    pub fn on_token_selected(&self, asset_id: &str) -> Result<(), Error> {
        let _entered = self.inner.span.enter();
        let current = self.inner.state();
        let chosen = current
            .selectable_group()
            .ok_or_else(|| Error::MissingAsset("token list is not loaded".to_string()))?
            .find_available(asset_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| Error::MissingAsset(asset_id.to_string()))?;

        self.inner.scheduler.cancel_task();
        let state = self.inner.update_state(|current| {
            let mut next = current.clone();
            if next.is_order_reversed {
                next.from_asset = Some(chosen);
            } else {
                next.to_asset = Some(chosen);
            }
            next.selected_provider = None;
            next
        });
        *lock(&self.inner.selection) = SelectionMemory {
            selected_provider: None,
            amount_changed_by_user: true,
        };

        if state.is_order_reversed {
            self.inner.cut_input_to_source(&state);
        }
        info!(asset = %asset_id, reversed = state.is_order_reversed, "Token selected");

        self.inner.subscribe_balances(&state);
        if let Some(group) = state.selectable_group() {
            self.inner.emit(EngineEvent::TokensUpdated(group.clone()));
        }
        self.inner.start_loading_quotes(false);
        Ok(())
    }

    /// Explicit user choice of a provider among the last loaded quotes
    pub fn on_provider_selected(&self, provider_id: &str) -> Option<Provider> {
        let _entered = self.inner.span.enter();
        let provider = self
            .inner
            .state()
            .last_loaded_quotes
            .provider(provider_id)
            .cloned()?;

        lock(&self.inner.selection).selected_provider = Some(provider.clone());
        let state = self.inner.update_state(|current| {
            refresh_derived(SwapProcessState {
                selected_provider: Some(provider.clone()),
                ..current.clone()
            })
        });
        debug!(provider = %provider_id, "Provider selected");
        self.inner.emit_quotes(&state);
        Some(provider)
    }

    /// Change the fee tier. The shown fee updates at once, then quotes are reloaded.
    pub fn on_fee_tier_selected(&self, tier: FeeTier) {
        let _entered = self.inner.span.enter();
        let state = self.inner.update_state(|current| {
            refresh_derived(SwapProcessState {
                selected_fee_tier: tier,
                ..current.clone()
            })
        });
        self.inner.emit_quotes(&state);
        self.inner.start_loading_quotes(false);
    }

    /// Swap source and destination. Returns `false` when one side is missing.
    pub async fn on_reverse_assets(&self) -> bool {
        let inner = &self.inner;
        async move {
            let current = inner.state();
            if current.from_asset.is_none() || current.to_asset.is_none() {
                return false;
            }

            inner.scheduler.cancel_task();
            let state = inner.update_state(|current| SwapProcessState {
                from_asset: current.to_asset.clone(),
                to_asset: current.from_asset.clone(),
                is_order_reversed: !current.is_order_reversed,
                selected_provider: None,
                ..current.clone()
            });
            *lock(&inner.selection) = SelectionMemory {
                selected_provider: None,
                amount_changed_by_user: true,
            };

            let amount = inner.cut_input_to_source(&state);
            if let Some(from) = &state.from_asset {
                let minimum = inner.minimums.minimum_amount(&from.asset).await;
                inner.emit(EngineEvent::AmountUpdated { amount, minimum });
            }

            inner.subscribe_balances(&state);
            if let Some(group) = state.selectable_group() {
                inner.emit(EngineEvent::TokensUpdated(group.clone()));
            }
            info!(reversed = state.is_order_reversed, "Assets reversed");
            inner.start_loading_quotes(false);
            true
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Filter the selectable token list after the search debounce period
    pub fn on_search_entered(&self, query: &str) {
        let weak = Arc::downgrade(&self.inner);
        let query = query.to_string();
        self.inner
            .search_debouncer
            .debounce(self.inner.config.search_debounce(), false, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let state = inner.state();
                if let Some(group) = state.selectable_group() {
                    inner.emit(EngineEvent::TokensUpdated(filter_tokens(&query, group)));
                }
            });
    }

    /// The user opened the approval dialog. Polling pauses until the dialog is resolved.
    pub fn on_permission_requested(&self) -> Result<(), Error> {
        let _entered = self.inner.span.enter();
        self.inner.suspend(PollingState::AwaitingPermission);

        let state = self.inner.state();
        let requested = state
            .pending_approval_payload
            .ok_or(Error::MissingApprovalData)
            .and_then(|approve_data| {
                PermissionFlowController::approval_fee(approve_data.fee.as_ref())
                    .map(|fee| (approve_data, fee))
            });

        match requested {
            Ok((approve_data, fee)) => {
                self.inner
                    .emit(EngineEvent::PermissionRequested { approve_data, fee });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Cannot request permission");
                self.inner.start_loading_quotes(true);
                Err(e)
            }
        }
    }

    pub fn on_permission_dismissed(&self) {
        let _entered = self.inner.span.enter();
        self.inner.start_loading_quotes(true);
    }

    /// Grant the allowance for the selected quote. Polling resumes silently afterwards,
    /// whatever the outcome.
    pub async fn on_give_permission(
        &self,
        approve_type: ApproveType,
    ) -> Result<ApprovalOutcome, Error> {
        let inner = &self.inner;
        async move {
            inner.suspend(PollingState::Executing);

            let request = match PermissionFlowController::prepare(&inner.state(), approve_type) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Approval preconditions not met");
                    inner.start_loading_quotes(true);
                    return Err(e);
                }
            };
            let provider_id = request.provider.provider_id.clone();
            info!(provider = %provider_id, ?approve_type, "Giving permission");

            inner.set_permission_state(&provider_id, PermissionState::InProgress);
            let outcome = inner
                .permissions
                .give_permission(inner.executor.transactions(), &request)
                .await;

            match &outcome {
                TxOutcome::TxSent { .. } => {
                    inner
                        .executor
                        .schedule_balance_refresh(request.asset.network.clone());
                }
                TxOutcome::DemoMode => {
                    inner.set_permission_state(
                        &provider_id,
                        PermissionState::ReadyForRequest(request.approve_data.clone()),
                    );
                    inner.emit(EngineEvent::DemoMode);
                }
                TxOutcome::Error { message } => {
                    inner.set_permission_state(
                        &provider_id,
                        PermissionState::ReadyForRequest(request.approve_data.clone()),
                    );
                    inner.emit(EngineEvent::ApprovalFailed {
                        message: message.clone(),
                    });
                }
            }

            inner.start_loading_quotes(true);
            Ok(outcome)
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Execute the selected quote. Polling stays stopped after a sent swap and resumes
    /// otherwise.
    pub async fn on_swap_confirmed(&self) -> Result<TxOutcome, Error> {
        let inner = &self.inner;
        async move {
            inner.suspend(PollingState::Executing);

            let request = match SwapExecutor::prepare(&inner.state()) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Swap preconditions not met");
                    inner.start_loading_quotes(false);
                    return Err(e);
                }
            };

            let outcome = inner.executor.execute(&request).await;
            match &outcome {
                TxOutcome::TxSent {
                    tx_hash,
                    explorer_url,
                } => {
                    info!(
                        tx_hash = %tx_hash,
                        provider = %request.provider.provider_id,
                        "Swap sent"
                    );
                    inner.suspend(PollingState::SwapSent);
                    inner
                        .executor
                        .schedule_balance_refresh(request.from.asset.network.clone());
                    if request.to.asset.network != request.from.asset.network {
                        inner
                            .executor
                            .schedule_balance_refresh(request.to.asset.network.clone());
                    }
                    inner.emit(EngineEvent::SwapSucceeded {
                        provider_id: request.provider.provider_id.clone(),
                        tx_hash: tx_hash.clone(),
                        explorer_url: explorer_url.clone(),
                        timestamp: Utc::now(),
                    });
                }
                TxOutcome::DemoMode => {
                    inner.emit(EngineEvent::DemoMode);
                    inner.start_loading_quotes(true);
                }
                TxOutcome::Error { message } => {
                    inner.emit(EngineEvent::SwapFailed {
                        message: message.clone(),
                    });
                    inner.start_loading_quotes(false);
                }
            }
            Ok(outcome)
        }
        .instrument(self.inner.span.clone())
        .await
    }

    pub fn on_screen_started(&self) {
        let _entered = self.inner.span.enter();
        self.inner.start_loading_quotes(true);
    }

    /// Stop polling and drop pending debounced work
    pub fn on_screen_stopped(&self) {
        let _entered = self.inner.span.enter();
        self.inner.suspend(PollingState::ScreenStopped);
        self.inner.search_debouncer.cancel();
    }

    /// Restart polling after a failed poll
    pub fn on_retry_quotes(&self) {
        let _entered = self.inner.span.enter();
        self.inner.start_loading_quotes(false);
    }
}

impl EngineInner {
    fn state(&self) -> SwapProcessState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the state with `update(current)` and return the new value
    fn update_state<F>(&self, update: F) -> SwapProcessState
    where
        F: FnOnce(&SwapProcessState) -> SwapProcessState,
    {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = update(&guard);
        *guard = next.clone();
        next
    }

    /// Stop polling and drop a pending amount poll until a resume path starts loading again
    fn suspend(&self, reason: PollingState) {
        self.scheduler.cancel_task();
        self.amount_debouncer.cancel();
        *lock(&self.polling) = reason;
        debug!(?reason, "Polling suspended");
    }

    fn is_suspended(&self) -> bool {
        *lock(&self.polling) != PollingState::Active
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn emit_quotes(&self, state: &SwapProcessState) {
        self.emit(EngineEvent::QuotesUpdated(QuotesSnapshot::from_state(state)));
    }

    /// Re-cut the typed amount to the current source decimals
    fn cut_input_to_source(&self, state: &SwapProcessState) -> String {
        let mut input = lock(&self.input);
        if let Some(from) = &state.from_asset {
            input.amount = cut_amount_with_decimals(from.asset.decimals, &input.amount);
        }
        input.reduce_balance_by = Decimal::ZERO;
        input.amount.clone()
    }

    fn subscribe_balances(self: &Arc<Self>, state: &SwapProcessState) {
        let sides = [
            (&state.from_asset, &self.from_balance),
            (&state.to_asset, &self.to_balance),
        ];
        for (status, subscription) in sides {
            let Some(status) = status else {
                continue;
            };
            let weak = Arc::downgrade(self);
            let result = subscription.subscribe(
                self.balances.as_ref(),
                &status.asset,
                move |side, status| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_balance_update(side, status);
                    }
                },
            );
            if let Err(e) = result {
                warn!(asset = %status.asset.id, error = %e, "Balance subscription failed");
            }
        }
    }

    fn on_balance_update(self: &Arc<Self>, side: Side, status: AssetStatus) {
        let _entered = self.span.enter();
        let mut changed = false;
        let state = self.update_state(|current| {
            let mut next = current.clone();
            let slot = match side {
                Side::From => &mut next.from_asset,
                Side::To => &mut next.to_asset,
            };
            let same_asset = slot
                .as_ref()
                .map_or(false, |existing| existing.asset.id == status.asset.id);
            if same_asset && slot.as_ref() != Some(&status) {
                *slot = Some(status.clone());
                changed = true;
            }
            next
        });
        if !changed {
            return;
        }

        debug!(?side, asset = %status.asset.id, balance = ?status.balance, "Balance changed");
        self.emit(EngineEvent::BalanceUpdated { side, status });
        if state.tokens.is_none() {
            return;
        }
        if self.is_suspended() {
            debug!("Polling suspended, balance change not re-polled");
            return;
        }
        self.start_loading_quotes(true);
    }

    fn set_permission_state(&self, provider_id: &str, permission: PermissionState) {
        let state = self.update_state(|current| {
            refresh_derived(SwapProcessState {
                last_loaded_quotes: current
                    .last_loaded_quotes
                    .with_permission_state(provider_id, permission),
                ..current.clone()
            })
        });
        self.emit_quotes(&state);
    }

    /// Cancel the running poll and start a new periodic one with the latest input
    fn start_loading_quotes(self: &Arc<Self>, silent: bool) {
        let state = self.state();
        let (Some(from), Some(to)) = (state.from_asset.clone(), state.to_asset.clone()) else {
            debug!("Quotes not requested, swap pair is incomplete");
            return;
        };

        let input = lock(&self.input).clone();
        let request = QuoteRequest {
            from,
            to,
            amount: input.amount,
            reduce_balance_by: input.reduce_balance_by,
            providers: swap_providers(&state),
            fee_tier: state.selected_fee_tier,
        };
        debug!(
            amount = %request.amount,
            providers = request.providers.len(),
            silent,
            "Loading quotes"
        );
        self.emit(EngineEvent::QuotesLoading { silent });
        *lock(&self.polling) = PollingState::Active;

        let weak = Arc::downgrade(self);
        let task = {
            let weak = weak.clone();
            let request = request.clone();
            move || {
                let weak = weak.clone();
                let request = request.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => inner.fetch_quotes(&request).await,
                        None => Err(Error::Other("swap session closed".to_string())),
                    }
                }) as TaskFuture<AggregateQuotes>
            }
        };
        let on_success = {
            let weak = weak.clone();
            move |quotes: AggregateQuotes| match weak.upgrade() {
                Some(inner) => {
                    inner.apply_quotes(&request, quotes);
                    TaskFlow::Continue
                }
                None => TaskFlow::Stop,
            }
        };
        let on_error = move |e: Error| {
            if let Some(inner) = weak.upgrade() {
                inner.on_fetch_failed(e);
            }
            TaskFlow::Stop
        };

        self.scheduler.schedule_task(PeriodicTask::new(
            self.config.update_period(),
            task,
            on_success,
            on_error,
        ));
    }

    async fn fetch_quotes(&self, request: &QuoteRequest) -> Result<AggregateQuotes, Error> {
        let amount = match request.parsed_amount() {
            Some(amount) if !amount.is_zero() => amount,
            _ => return Ok(classifier::empty_amount(&request.providers)),
        };
        if request.providers.is_empty() {
            return Ok(AggregateQuotes::default());
        }

        let outcomes = tokio::time::timeout(
            self.config.quote_timeout(),
            self.quote_source.fetch(request),
        )
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "quote fetch exceeded {} ms",
                self.config.quote_timeout_ms
            ))
        })??;

        Ok(classifier::classify(
            request,
            amount,
            outcomes,
            &self.permissions,
        ))
    }

    /// Runs under the scheduler lock; must not touch the scheduler
    fn apply_quotes(&self, request: &QuoteRequest, quotes: AggregateQuotes) {
        *lock(&self.polling) = PollingState::Active;
        if quotes.is_empty() {
            warn!("No provider supports this pair");
        }

        let selection = {
            let mut memory = lock(&self.selection);
            selector::select(&quotes, &mut memory)
        };

        let state = self.update_state(|current| {
            refresh_derived(SwapProcessState {
                amount: request.amount.clone(),
                reduce_balance_by: request.reduce_balance_by,
                selected_provider: selection.selected.clone(),
                last_loaded_quotes: quotes,
                ..current.clone()
            })
        });

        if let Some(promo) = selection.promo {
            self.emit(EngineEvent::PromoProvider {
                provider_id: promo.provider_id,
                state: promo.state,
            });
        }
        info!(
            providers = state.last_loaded_quotes.len(),
            selected = ?state.selected_provider.as_ref().map(|p| p.provider_id.as_str()),
            "Quotes loaded"
        );
        self.emit_quotes(&state);
    }

    fn on_fetch_failed(&self, e: Error) {
        error!(error = %e, "Quote fetch failed");
        *lock(&self.polling) = PollingState::FetchFailed;
        self.emit(EngineEvent::QuotesFetchFailed {
            message: e.to_string(),
        });
    }
}

/// Providers able to swap the current pair, taken from the selectable token group
fn swap_providers(state: &SwapProcessState) -> Vec<Provider> {
    let chosen = if state.is_order_reversed {
        state.from_asset.as_ref()
    } else {
        state.to_asset.as_ref()
    };
    match (state.selectable_group(), chosen) {
        (Some(group), Some(chosen)) => providers_for(group, &chosen.asset.id),
        _ => Vec::new(),
    }
}

fn providers_for(group: &TokenGroup, asset_id: &str) -> Vec<Provider> {
    group
        .find_available(asset_id)
        .map(|entry| entry.providers.clone())
        .unwrap_or_default()
}

/// Recompute the fee and pending payloads from the displayed quote
fn refresh_derived(state: SwapProcessState) -> SwapProcessState {
    let loaded = state.displayed_state().and_then(SwapState::as_loaded);
    let (pending_swap_payload, pending_approval_payload, selected_fee) = match loaded {
        Some(loaded) => {
            let fee = loaded
                .fee_info
                .as_ref()
                .map(|info| resolve_fee(info, state.selected_fee_tier));
            match &loaded.permission_state {
                PermissionState::ReadyForRequest(data) => (None, Some(data.clone()), fee),
                _ => (loaded.swap_payload.clone(), None, fee),
            }
        }
        None => (None, None, None),
    };

    SwapProcessState {
        pending_swap_payload,
        pending_approval_payload,
        selected_fee,
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Asset, Fee, FeeInfo, ProviderType, QuotesLoaded, SwapAvailability, TokenSwapInfo,
    };

    fn quote(fee_info: Option<FeeInfo>, permission_state: PermissionState) -> SwapState {
        SwapState::QuotesLoaded(QuotesLoaded {
            from: TokenSwapInfo {
                asset: Asset::coin("eth", "ETH", "Ethereum", 18, "ethereum"),
                amount: Decimal::ONE,
                amount_fiat: None,
            },
            to: TokenSwapInfo {
                asset: Asset::coin("bnb", "BNB", "BNB", 18, "bsc"),
                amount: Decimal::TEN,
                amount_fiat: None,
            },
            fee_info,
            permission_state,
            swap_payload: None,
            include_fee_in_amount: false,
            price_impact: None,
            warnings: Vec::new(),
        })
    }

    #[test]
    fn test_refresh_derived_follows_tier() {
        let provider = Provider::new("a", "A", ProviderType::Dex);
        let fee_info = FeeInfo::Choosable {
            minimum: Fee::new(Decimal::new(1, 2)),
            normal: Fee::new(Decimal::new(2, 2)),
            priority: Fee::new(Decimal::new(4, 2)),
        };
        let state = SwapProcessState {
            selected_provider: Some(provider.clone()),
            selected_fee_tier: FeeTier::Priority,
            last_loaded_quotes: AggregateQuotes::new(vec![(
                provider,
                quote(Some(fee_info), PermissionState::NotNeeded),
            )]),
            ..SwapProcessState::default()
        };

        let derived = refresh_derived(state);
        assert_eq!(derived.selected_fee.unwrap().amount, Decimal::new(4, 2));
        assert!(derived.pending_approval_payload.is_none());
    }

    #[test]
    fn test_swap_providers_uses_selectable_side() {
        let provider = Provider::new("a", "A", ProviderType::Dex);
        let bnb = AssetStatus::new(Asset::coin("bnb", "BNB", "BNB", 18, "bsc"), None, None);
        let state = SwapProcessState {
            to_asset: Some(bnb.clone()),
            tokens: Some(TokensData {
                from_group: TokenGroup::default(),
                to_group: TokenGroup {
                    available: vec![SwapAvailability {
                        status: bnb,
                        providers: vec![provider],
                    }],
                    ..TokenGroup::default()
                },
            }),
            ..SwapProcessState::default()
        };

        assert_eq!(swap_providers(&state).len(), 1);

        let reversed = SwapProcessState {
            is_order_reversed: true,
            ..state
        };
        assert!(swap_providers(&reversed).is_empty());
    }
}
