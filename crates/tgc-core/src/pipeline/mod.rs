//! Clone pipeline: resolve → collect history → sort/filter → replay.
//!
//! Every stage reports through [`Progress`] and stops at its next suspension point once
//! the job's cancellation token fires.

pub mod collector;
pub mod prepare;
pub mod replay;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    domain::MessageId,
    errors::Error,
    job::CloneRequest,
    transport::{
        retry::{call_with_throttle, CallError},
        ChannelTransport, ResolvedChannel, SourceMessage, TransportProvider,
    },
};

pub use collector::{collect, CollectEnd, CollectParams, Collected};
pub use prepare::prepare;
pub use replay::{replay, ReplayOutcome, ReplayParams};

/// Coarse pipeline position, exposed on the job state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Fetching,
    Sorting,
    Replaying,
    Done,
}

/// Sink for live job counters. Implementations must be cheap; they are called inline.
pub trait Progress: Send + Sync {
    fn stage(&self, stage: Stage);
    fn fetched(&self, total: usize);
    fn cloned(&self, total: u64, last: MessageId);
    fn skipped(&self, id: MessageId);
    fn emission_failed(&self, id: MessageId, detail: &str);
    fn fetch_failed(&self, detail: &str);
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(ReplayOutcome),
    Failed(Error),
    Cancelled,
}

struct Channels {
    source: ResolvedChannel,
    target: ResolvedChannel,
}

enum Step {
    Resolving,
    Fetching(Channels),
    Sorting(Channels, Vec<SourceMessage>),
    Replaying(Channels, Vec<SourceMessage>),
    Finished(PipelineOutcome),
}

/// Drive one clone job to a terminal outcome. Never panics on transport errors.
pub async fn run_clone(
    provider: &dyn TransportProvider,
    req: &CloneRequest,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> PipelineOutcome {
    progress.stage(Stage::Resolving);
    let transport = match provider.open(&req.account).await {
        Ok(t) => t,
        Err(e) => {
            warn!(account = %req.account, error = %e, "failed to open transport session");
            return PipelineOutcome::Failed(Error::Transport(e));
        }
    };

    let outcome = drive(transport.as_ref(), req, progress, cancel).await;
    transport.disconnect().await;
    outcome
}

async fn drive(
    transport: &dyn ChannelTransport,
    req: &CloneRequest,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> PipelineOutcome {
    let mut step = Step::Resolving;
    loop {
        step = match step {
            Step::Resolving => match resolve(transport, req, cancel).await {
                Ok(channels) => Step::Fetching(channels),
                Err(outcome) => Step::Finished(outcome),
            },
            Step::Fetching(channels) => {
                progress.stage(Stage::Fetching);
                let params = CollectParams::from_request(req);
                let collected = collect(transport, &channels.source, params, progress, cancel).await;
                match collected.end {
                    CollectEnd::Cancelled => Step::Finished(PipelineOutcome::Cancelled),
                    CollectEnd::Exhausted | CollectEnd::Failed(_) => {
                        Step::Sorting(channels, collected.batch)
                    }
                }
            }
            Step::Sorting(channels, batch) => {
                progress.stage(Stage::Sorting);
                let fetched = batch.len();
                let ordered = prepare(batch);
                info!(
                    fetched,
                    replayable = ordered.len(),
                    "history collected, starting replay"
                );
                Step::Replaying(channels, ordered)
            }
            Step::Replaying(channels, messages) => {
                progress.stage(Stage::Replaying);
                let params = ReplayParams::from_request(req);
                let out = replay(&messages, transport, &channels.target, params, progress, cancel).await;
                if out.cancelled {
                    Step::Finished(PipelineOutcome::Cancelled)
                } else {
                    progress.stage(Stage::Done);
                    Step::Finished(PipelineOutcome::Completed(out))
                }
            }
            Step::Finished(outcome) => return outcome,
        };
    }
}

async fn resolve(
    transport: &dyn ChannelTransport,
    req: &CloneRequest,
    cancel: &CancellationToken,
) -> Result<Channels, PipelineOutcome> {
    let policy = req.throttle_policy();
    let mut resolved = Vec::with_capacity(2);
    for channel in [req.source, req.target] {
        let res = call_with_throttle(cancel, policy, "resolve_channel", move || {
            transport.resolve_channel(channel)
        })
        .await;
        match res {
            Ok(r) => resolved.push(r),
            Err(CallError::Cancelled) => return Err(PipelineOutcome::Cancelled),
            Err(CallError::Failed(source)) => {
                warn!(channel = %channel, error = %source, "channel resolution failed");
                return Err(PipelineOutcome::Failed(Error::EntityResolution {
                    channel,
                    source,
                }));
            }
        }
    }

    let target = resolved.pop();
    let source = resolved.pop();
    match (source, target) {
        (Some(source), Some(target)) => Ok(Channels { source, target }),
        _ => Err(PipelineOutcome::Failed(Error::External(
            "channel resolution produced no result".to_string(),
        ))),
    }
}
