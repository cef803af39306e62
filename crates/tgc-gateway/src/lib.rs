//! Session gateway adapter.
//!
//! The MTProto client (login, session files, flood-wait bookkeeping) runs behind a small
//! HTTP gateway. This crate implements the `tgc-core` transport ports over that gateway.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use tgc_core::{
    domain::{AccountId, ChannelId, MessageId},
    errors::{Error, TransportError},
    transport::{
        ChannelTransport, HistoryQuery, OutgoingContent, ResolvedChannel, SentMessage,
        SourceMessage, TransportProvider, TransportResult,
    },
    Result,
};

/// Used when the gateway signals FLOOD_WAIT without saying for how long.
const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct GatewayClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SessionStatus {
    authorized: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveBody {
    channel_id: i64,
}

#[derive(Deserialize)]
struct ResolveResponse {
    peer: String,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<SourceMessage>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum SendBody<'a> {
    Text { text: &'a str },
    Media { media: &'a str, caption: &'a str },
}

#[derive(Deserialize)]
struct SendResponse {
    id: i64,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "retry_after", alias = "seconds")]
    retry_after: Option<u64>,
}

impl GatewayClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self> {
        let base = Url::parse(&cfg.base_url)
            .map_err(|e| Error::Config(format!("invalid gateway url {:?}: {e}", cfg.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "gateway url {:?} cannot carry a path",
                cfg.base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("gateway http client build failed: {e}")))?;

        Ok(Self {
            base,
            token: cfg.token.clone(),
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn call<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> TransportResult<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("gateway request error: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| TransportError::Decode(format!("gateway json error: {e}")));
        }

        let header_retry = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let text = resp.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        Err(map_status(status, header_retry, body, &text))
    }
}

fn map_status(
    status: StatusCode,
    header_retry: Option<u64>,
    body: ErrorBody,
    raw: &str,
) -> TransportError {
    let message = body
        .error
        .unwrap_or_else(|| raw.chars().take(200).collect::<String>());

    match status.as_u16() {
        // 420 is how MTProto reports FLOOD_WAIT; gateways usually translate it to 429.
        420 | 429 => TransportError::Throttled {
            retry_after: header_retry
                .or(body.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FLOOD_WAIT),
        },
        401 | 403 => TransportError::Unauthorized(message),
        code => TransportError::Rejected {
            status: code,
            message,
        },
    }
}

/// Opens gateway sessions for logged-in accounts.
#[derive(Clone, Debug)]
pub struct GatewayProvider {
    client: GatewayClient,
}

impl GatewayProvider {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportProvider for GatewayProvider {
    async fn open(&self, account: &AccountId) -> TransportResult<Arc<dyn ChannelTransport>> {
        let url = self.client.endpoint(&["sessions", &account.0]);
        let status: SessionStatus = self
            .client
            .call(self.client.request(Method::GET, url))
            .await?;
        if !status.authorized {
            return Err(TransportError::Unauthorized(format!(
                "account {account} has no authorized session; complete the login flow first"
            )));
        }

        debug!(account = %account, "gateway session opened");
        Ok(Arc::new(GatewaySession {
            client: self.client.clone(),
            account: account.clone(),
        }))
    }
}

/// One account's authorized session on the gateway.
pub struct GatewaySession {
    client: GatewayClient,
    account: AccountId,
}

impl GatewaySession {
    fn peer_url(&self, peer: &str, tail: &str) -> Url {
        self.client
            .endpoint(&["sessions", &self.account.0, "peers", peer, tail])
    }
}

#[async_trait]
impl ChannelTransport for GatewaySession {
    async fn resolve_channel(&self, channel: ChannelId) -> TransportResult<ResolvedChannel> {
        let url = self.client.endpoint(&["sessions", &self.account.0, "resolve"]);
        let req = self
            .client
            .request(Method::POST, url)
            .json(&ResolveBody { channel_id: channel.0 });

        match self.client.call::<ResolveResponse>(req).await {
            Ok(r) => Ok(ResolvedChannel {
                id: channel,
                peer: r.peer,
            }),
            Err(TransportError::Rejected { status: 404, .. }) => {
                Err(TransportError::ChannelNotFound(channel.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_history(
        &self,
        channel: &ResolvedChannel,
        query: HistoryQuery,
    ) -> TransportResult<Vec<SourceMessage>> {
        // The platform's min_id bound is exclusive; the port's floor is inclusive.
        let min_id = (query.floor.0 - 1).max(0);
        let mut url = self.peer_url(&channel.peer, "history");
        url.query_pairs_mut()
            .append_pair("offsetId", &query.offset.0.to_string())
            .append_pair("minId", &min_id.to_string())
            .append_pair("limit", &query.limit.to_string());

        let resp: HistoryResponse = self
            .client
            .call(self.client.request(Method::GET, url))
            .await?;
        Ok(resp.messages)
    }

    async fn send(
        &self,
        target: &ResolvedChannel,
        content: &OutgoingContent,
    ) -> TransportResult<SentMessage> {
        let body = match content {
            OutgoingContent::Text(text) => SendBody::Text { text },
            OutgoingContent::Media { media, caption } => SendBody::Media {
                media: &media.0,
                caption,
            },
        };
        let url = self.peer_url(&target.peer, "messages");
        let resp: SendResponse = self
            .client
            .call(self.client.request(Method::POST, url).json(&body))
            .await?;

        Ok(SentMessage {
            channel: target.id,
            id: MessageId(resp.id),
        })
    }
}
