use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{AccountId, ChannelId},
    errors::TransportError,
    transport::types::{HistoryQuery, OutgoingContent, ResolvedChannel, SentMessage, SourceMessage},
};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// An authenticated platform session, as far as cloning needs it.
///
/// Implementations report provider backpressure as [`TransportError::Throttled`] and
/// never sleep on it themselves; waiting is the caller's job so it stays cancellable.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn resolve_channel(&self, channel: ChannelId) -> TransportResult<ResolvedChannel>;

    /// One page of history, newest first, honoring `query.offset` / `query.floor`.
    async fn fetch_history(
        &self,
        channel: &ResolvedChannel,
        query: HistoryQuery,
    ) -> TransportResult<Vec<SourceMessage>>;

    async fn send(
        &self,
        target: &ResolvedChannel,
        content: &OutgoingContent,
    ) -> TransportResult<SentMessage>;

    /// Book the next send slot into `target` and return how long to wait before using it.
    ///
    /// The caller does the waiting (so it can be cancelled); the following `send` into
    /// `target` then goes out without pacing again.
    async fn reserve_send(&self, _target: &ResolvedChannel) -> Duration {
        Duration::ZERO
    }

    /// Release the session. Called once on every pipeline exit path.
    async fn disconnect(&self) {}
}

/// Opens transport sessions keyed by account (the login handshake happens elsewhere).
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn open(&self, account: &AccountId) -> TransportResult<Arc<dyn ChannelTransport>>;
}
