use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::CloneDefaults,
    domain::{AccountId, ChannelId, JobId, MessageId},
    pipeline::Stage,
    transport::retry::ThrottlePolicy,
};

/// Everything a clone job needs; immutable once the job starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloneRequest {
    pub account: AccountId,
    pub source: ChannelId,
    pub target: ChannelId,
    /// Lowest message id to include.
    pub floor: MessageId,
    pub page_size: u32,
    pub per_message_delay: Duration,
    pub source_poll_delay: Duration,
    pub cooldown_every: u64,
    pub cooldown: Duration,
    pub max_throttle_retries: Option<u32>,
}

impl CloneRequest {
    pub fn new(
        account: AccountId,
        source: ChannelId,
        target: ChannelId,
        floor: MessageId,
        defaults: &CloneDefaults,
    ) -> Self {
        Self {
            account,
            source,
            target,
            floor,
            page_size: defaults.page_size,
            per_message_delay: defaults.send_delay,
            source_poll_delay: defaults.fetch_delay,
            cooldown_every: defaults.cooldown_every,
            cooldown: defaults.cooldown,
            max_throttle_retries: defaults.max_throttle_retries,
        }
    }

    pub fn throttle_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            max_retries: self.max_throttle_retries,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// `starting -> running -> {completed, error, cancelled}`; a job may also fail or be
    /// cancelled before it starts running. Terminal states are final.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Starting, Self::Running) => true,
            (Self::Starting | Self::Running, Self::Error | Self::Cancelled) => true,
            (Self::Running, Self::Completed) => true,
            _ => false,
        }
    }
}

/// Observable state of one clone job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stage: Option<Stage>,
    pub source_channel_id: ChannelId,
    pub target_channel_id: ChannelId,
    pub total_fetched: u64,
    pub total_cloned: u64,
    pub skipped_empty: u64,
    pub failed_emissions: u64,
    pub last_cloned_id: Option<MessageId>,
    pub last_emission_error: Option<String>,
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(job_id: JobId, req: &CloneRequest) -> Self {
        Self {
            job_id,
            status: JobStatus::Starting,
            stage: None,
            source_channel_id: req.source,
            target_channel_id: req.target,
            total_fetched: 0,
            total_cloned: 0,
            skipped_empty: 0,
            failed_emissions: 0,
            last_cloned_id: None,
            last_emission_error: None,
            error_detail: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Apply a status change if the state machine allows it. Returns whether it did.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }
}

/// Compact listing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
}
