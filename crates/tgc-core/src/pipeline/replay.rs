use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::MessageId,
    errors::Error,
    job::CloneRequest,
    pipeline::Progress,
    transport::{
        retry::{call_with_throttle, CallError, ThrottlePolicy},
        ChannelTransport, ResolvedChannel, SourceMessage,
    },
    utils::pause,
};

#[derive(Clone, Copy, Debug)]
pub struct ReplayParams {
    /// Pause after every successful emission.
    pub delay: Duration,
    /// Long pause after every N-th successful emission; 0 disables it.
    pub cooldown_every: u64,
    pub cooldown: Duration,
    pub throttle: ThrottlePolicy,
}

impl ReplayParams {
    pub fn from_request(req: &CloneRequest) -> Self {
        Self {
            delay: req.per_message_delay,
            cooldown_every: req.cooldown_every,
            cooldown: req.cooldown,
            throttle: req.throttle_policy(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub cloned: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_cloned: Option<MessageId>,
    pub cancelled: bool,
}

/// Re-emit `messages` (already ordered) into `target`, one at a time.
pub async fn replay(
    messages: &[SourceMessage],
    transport: &dyn ChannelTransport,
    target: &ResolvedChannel,
    params: ReplayParams,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> ReplayOutcome {
    let mut out = ReplayOutcome::default();

    for (idx, msg) in messages.iter().enumerate() {
        if cancel.is_cancelled() {
            out.cancelled = true;
            break;
        }

        let Some(content) = msg.outgoing() else {
            debug!(message_id = %msg.id, "message has neither media nor text, skipping");
            out.skipped += 1;
            progress.skipped(msg.id);
            continue;
        };

        let slot = transport.reserve_send(target).await;
        if pause(cancel, slot).await.is_err() {
            out.cancelled = true;
            break;
        }

        let content = &content;
        let res = call_with_throttle(cancel, params.throttle, "send", move || {
            transport.send(target, content)
        })
        .await;

        match res {
            Ok(_) => {
                out.cloned += 1;
                out.last_cloned = Some(msg.id);
                progress.cloned(out.cloned, msg.id);
            }
            Err(CallError::Cancelled) => {
                out.cancelled = true;
                break;
            }
            Err(CallError::Failed(source)) => {
                let err = Error::Emission {
                    message_id: msg.id.0,
                    source,
                };
                warn!(message_id = %msg.id, error = %err, "failed to clone message, skipping");
                out.failed += 1;
                progress.emission_failed(msg.id, &err.to_string());
                continue;
            }
        }

        let more_left = idx + 1 < messages.len();
        if more_left && params.cooldown_every > 0 && out.cloned % params.cooldown_every == 0 {
            info!(
                cloned = out.cloned,
                cooldown_secs = params.cooldown.as_secs(),
                "cooldown after sustained sending"
            );
            if pause(cancel, params.cooldown).await.is_err() {
                out.cancelled = true;
                break;
            }
        }

        if pause(cancel, params.delay).await.is_err() {
            out.cancelled = true;
            break;
        }
    }

    out
}
