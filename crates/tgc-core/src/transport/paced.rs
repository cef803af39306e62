use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{AccountId, ChannelId},
    transport::{
        port::{ChannelTransport, TransportProvider, TransportResult},
        types::{HistoryQuery, OutgoingContent, ResolvedChannel, SentMessage, SourceMessage},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingConfig {
    /// Minimum spacing between *any* calls made through one account session.
    pub global_min_interval: Duration,
    /// Minimum spacing between sends into the same target channel.
    pub per_channel_min_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_channel_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Limiters shared by every session opened for the same account.
struct AccountLimiters {
    cfg: PacingConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<ChannelId, Arc<Mutex<IntervalLimiter>>>>,
}

impl AccountLimiters {
    fn new(cfg: PacingConfig) -> Self {
        Self {
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_channel(&self, channel: ChannelId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_channel.lock().await;
        map.entry(channel)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_channel_min_interval,
                )))
            })
            .clone()
    }

    async fn reserve_channel(&self, channel: ChannelId) -> Duration {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let lim = self.limiter_for_channel(channel).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };
        global_wait.max(channel_wait)
    }

    async fn throttle_channel(&self, channel: ChannelId) {
        let wait = self.reserve_channel(channel).await;
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

/// ChannelTransport decorator that spaces outbound calls.
///
/// Matters when several jobs share one account. The platform can still answer with
/// FLOOD_WAIT; the pipeline absorbs those `Throttled` signals.
///
/// Sends booked through `reserve_send` leave the wait to the caller. Anything else
/// (resolve, fetch, unbooked sends) sleeps here and cannot be interrupted.
pub struct PacedTransport {
    inner: Arc<dyn ChannelTransport>,
    limiters: Arc<AccountLimiters>,
    booked: StdMutex<HashMap<ChannelId, usize>>,
}

impl PacedTransport {
    fn take_booked(&self, channel: ChannelId) -> bool {
        let mut booked = self.booked.lock().unwrap_or_else(|p| p.into_inner());
        match booked.get_mut(&channel) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ChannelTransport for PacedTransport {
    async fn resolve_channel(&self, channel: ChannelId) -> TransportResult<ResolvedChannel> {
        self.limiters.throttle_global().await;
        self.inner.resolve_channel(channel).await
    }

    async fn fetch_history(
        &self,
        channel: &ResolvedChannel,
        query: HistoryQuery,
    ) -> TransportResult<Vec<SourceMessage>> {
        self.limiters.throttle_global().await;
        self.inner.fetch_history(channel, query).await
    }

    async fn send(
        &self,
        target: &ResolvedChannel,
        content: &OutgoingContent,
    ) -> TransportResult<SentMessage> {
        if !self.take_booked(target.id) {
            self.limiters.throttle_channel(target.id).await;
        }
        self.inner.send(target, content).await
    }

    async fn reserve_send(&self, target: &ResolvedChannel) -> Duration {
        let wait = self.limiters.reserve_channel(target.id).await;
        *self
            .booked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(target.id)
            .or_insert(0) += 1;
        wait
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await;
    }
}

/// TransportProvider decorator handing out [`PacedTransport`]s with per-account limiters.
pub struct PacedProvider {
    inner: Arc<dyn TransportProvider>,
    cfg: PacingConfig,
    accounts: Mutex<HashMap<AccountId, Arc<AccountLimiters>>>,
}

impl PacedProvider {
    pub fn new(inner: Arc<dyn TransportProvider>, cfg: PacingConfig) -> Self {
        Self {
            inner,
            cfg,
            accounts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TransportProvider for PacedProvider {
    async fn open(&self, account: &AccountId) -> TransportResult<Arc<dyn ChannelTransport>> {
        let inner = self.inner.open(account).await?;
        let limiters = {
            let mut map = self.accounts.lock().await;
            map.entry(account.clone())
                .or_insert_with(|| Arc::new(AccountLimiters::new(self.cfg)))
                .clone()
        };
        Ok(Arc::new(PacedTransport {
            inner,
            limiters,
            booked: StdMutex::new(HashMap::new()),
        }))
    }
}
