use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    domain::MessageId,
    errors::{Error, TransportError},
    job::CloneRequest,
    pipeline::Progress,
    transport::{
        retry::{call_with_throttle, CallError, ThrottlePolicy},
        ChannelTransport, HistoryQuery, ResolvedChannel, SourceMessage,
    },
    utils::pause,
};

#[derive(Clone, Copy, Debug)]
pub struct CollectParams {
    pub floor: MessageId,
    pub page_size: u32,
    /// Unconditional pause between successful page fetches.
    pub poll_delay: Duration,
    pub throttle: ThrottlePolicy,
}

impl CollectParams {
    pub fn from_request(req: &CloneRequest) -> Self {
        Self {
            floor: req.floor,
            page_size: req.page_size,
            poll_delay: req.source_poll_delay,
            throttle: req.throttle_policy(),
        }
    }
}

/// Why collection stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectEnd {
    /// An empty page: history exhausted or the floor reached.
    Exhausted,
    /// A non-throttling fetch error; the batch holds everything gathered before it.
    Failed(TransportError),
    Cancelled,
}

#[derive(Debug)]
pub struct Collected {
    pub batch: Vec<SourceMessage>,
    pub end: CollectEnd,
}

/// Page backwards through `source` from the newest message down to `params.floor`.
pub async fn collect(
    transport: &dyn ChannelTransport,
    source: &ResolvedChannel,
    params: CollectParams,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Collected {
    let mut batch: Vec<SourceMessage> = Vec::new();
    let mut offset = MessageId::LATEST;

    let end = loop {
        let query = HistoryQuery {
            offset,
            floor: params.floor,
            limit: params.page_size,
        };
        let res = call_with_throttle(cancel, params.throttle, "fetch_history", move || {
            transport.fetch_history(source, query)
        })
        .await;

        let page = match res {
            Ok(page) => page,
            Err(CallError::Cancelled) => break CollectEnd::Cancelled,
            Err(CallError::Failed(e)) => {
                warn!(
                    channel = %source.id,
                    offset = %offset,
                    collected = batch.len(),
                    error = %e,
                    "history fetch failed, keeping partial batch"
                );
                progress.fetch_failed(&Error::Fetch(e.clone()).to_string());
                break CollectEnd::Failed(e);
            }
        };

        let Some(oldest) = page.iter().map(|m| m.id).min() else {
            break CollectEnd::Exhausted;
        };
        if offset != MessageId::LATEST && oldest >= offset {
            warn!(
                channel = %source.id,
                offset = %offset,
                oldest = %oldest,
                "history page did not move backwards, stopping"
            );
            break CollectEnd::Exhausted;
        }

        let before = batch.len();
        batch.extend(
            page.into_iter()
                .filter(|m| m.id >= params.floor)
                .filter(|m| offset == MessageId::LATEST || m.id < offset),
        );
        debug!(
            channel = %source.id,
            page = batch.len() - before,
            total = batch.len(),
            next_offset = %oldest,
            "fetched history page"
        );
        offset = oldest;
        progress.fetched(batch.len());

        if pause(cancel, params.poll_delay).await.is_err() {
            break CollectEnd::Cancelled;
        }
    };

    Collected { batch, end }
}
