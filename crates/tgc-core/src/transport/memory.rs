//! In-process transport: channels are plain vectors, sends append to the target.
//!
//! Used for local dry runs (`TGC_TRANSPORT=memory`) and as the fake behind the
//! pipeline/registry tests. Faults can be scripted per fetch call or per sent content.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::{AccountId, ChannelId, MessageId},
    errors::{Error, TransportError},
    transport::{
        port::{ChannelTransport, TransportProvider, TransportResult},
        types::{HistoryQuery, OutgoingContent, ResolvedChannel, SentMessage, SourceMessage},
    },
    Result,
};

#[derive(Default)]
struct MemoryState {
    channels: HashMap<ChannelId, Vec<SourceMessage>>,
    fetch_calls: usize,
    send_calls: usize,
    fetch_faults: HashMap<usize, TransportError>,
    send_faults: HashMap<String, VecDeque<TransportError>>,
    disconnects: usize,
}

#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

/// Seed file shape: `{"channels": {"-1001": [{"id": 1, "text": "hi"}]}}`.
#[derive(Deserialize)]
struct Seed {
    channels: HashMap<i64, Vec<SourceMessage>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_json(json: &str) -> Result<Self> {
        let seed: Seed = serde_json::from_str(json).map_err(Error::Json)?;
        let t = Self::new();
        for (id, messages) in seed.channels {
            t.add_channel(ChannelId(id), messages);
        }
        Ok(t)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // State is plain data; a panic mid-update cannot leave it half-written.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_channel(&self, channel: ChannelId, messages: Vec<SourceMessage>) {
        self.lock().channels.insert(channel, messages);
    }

    /// Make the `call`-th (0-based) history fetch fail once with `err`.
    pub fn fail_fetch_call(&self, call: usize, err: TransportError) {
        self.lock().fetch_faults.insert(call, err);
    }

    /// Queue a failure for the next send whose text / caption / media handle equals `key`.
    pub fn fail_send_of(&self, key: &str, err: TransportError) {
        self.lock()
            .send_faults
            .entry(key.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<SourceMessage> {
        self.lock()
            .channels
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Text (or caption) of every message currently in `channel`, oldest first.
    pub fn sent_texts(&self, channel: ChannelId) -> Vec<String> {
        self.messages(channel)
            .into_iter()
            .map(|m| m.text.unwrap_or_default())
            .collect()
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    pub fn send_calls(&self) -> usize {
        self.lock().send_calls
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

fn content_key(content: &OutgoingContent) -> &str {
    match content {
        OutgoingContent::Text(t) => t,
        OutgoingContent::Media { media, caption } if caption.is_empty() => &media.0,
        OutgoingContent::Media { caption, .. } => caption,
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    async fn resolve_channel(&self, channel: ChannelId) -> TransportResult<ResolvedChannel> {
        if !self.lock().channels.contains_key(&channel) {
            return Err(TransportError::ChannelNotFound(channel.to_string()));
        }
        Ok(ResolvedChannel {
            id: channel,
            peer: format!("memory:{channel}"),
        })
    }

    async fn fetch_history(
        &self,
        channel: &ResolvedChannel,
        query: HistoryQuery,
    ) -> TransportResult<Vec<SourceMessage>> {
        let mut st = self.lock();
        let call = st.fetch_calls;
        st.fetch_calls += 1;
        if let Some(err) = st.fetch_faults.remove(&call) {
            return Err(err);
        }

        let messages = st
            .channels
            .get(&channel.id)
            .ok_or_else(|| TransportError::ChannelNotFound(channel.id.to_string()))?;

        let mut page: Vec<SourceMessage> = messages
            .iter()
            .filter(|m| m.id >= query.floor)
            .filter(|m| query.offset == MessageId::LATEST || m.id < query.offset)
            .cloned()
            .collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(query.limit as usize);
        Ok(page)
    }

    async fn send(
        &self,
        target: &ResolvedChannel,
        content: &OutgoingContent,
    ) -> TransportResult<SentMessage> {
        let mut st = self.lock();
        st.send_calls += 1;
        if let Some(err) = st
            .send_faults
            .get_mut(content_key(content))
            .and_then(|q| q.pop_front())
        {
            return Err(err);
        }

        let messages = st
            .channels
            .get_mut(&target.id)
            .ok_or_else(|| TransportError::ChannelNotFound(target.id.to_string()))?;
        let id = MessageId(messages.iter().map(|m| m.id.0).max().unwrap_or(0) + 1);
        let copy = match content {
            OutgoingContent::Text(t) => SourceMessage::text(id.0, t.clone()),
            OutgoingContent::Media { media, caption } => SourceMessage::media(
                id.0,
                media.0.clone(),
                Some(caption.as_str()).filter(|c| !c.is_empty()),
            ),
        };
        messages.push(copy);

        Ok(SentMessage {
            channel: target.id,
            id,
        })
    }

    async fn disconnect(&self) {
        self.lock().disconnects += 1;
    }
}

/// Hands out the same in-memory session for every account.
pub struct MemoryProvider {
    transport: Arc<MemoryTransport>,
}

impl MemoryProvider {
    pub fn new(transport: Arc<MemoryTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransportProvider for MemoryProvider {
    async fn open(&self, _account: &AccountId) -> TransportResult<Arc<dyn ChannelTransport>> {
        Ok(self.transport.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_pages_are_newest_first_and_bounded() {
        let t = MemoryTransport::new();
        t.add_channel(
            ChannelId(1),
            (1..=10).map(|i| SourceMessage::text(i, format!("m{i}"))).collect(),
        );
        let ch = t.resolve_channel(ChannelId(1)).await.unwrap();

        let page = t
            .fetch_history(
                &ch,
                HistoryQuery {
                    offset: MessageId(8),
                    floor: MessageId(3),
                    limit: 4,
                },
            )
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![7, 6, 5, 4]);
    }

    #[tokio::test]
    async fn seed_json_loads_channels() {
        let t = MemoryTransport::from_seed_json(
            r#"{"channels": {"-1001": [{"id": 1, "text": "hi"}, {"id": 2, "action": true}], "-1002": []}}"#,
        )
        .unwrap();
        assert_eq!(t.messages(ChannelId(-1001)).len(), 2);
        assert!(t.resolve_channel(ChannelId(-1002)).await.is_ok());
        assert!(matches!(
            t.resolve_channel(ChannelId(5)).await,
            Err(TransportError::ChannelNotFound(_))
        ));
    }
}
