//! The chat-platform collaborator boundary.
//!
//! The wire protocol (authentication, gateway events, rate-limit headers,
//! widget rendering) lives in the embedding adapter. The core depends only
//! on this trait: point lookup of a message and paginated channel history.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{ChannelId, MessageId, ServerId};

/// Errors surfaced by the platform adapter.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("access to channel {0} denied")]
    AccessDenied(ChannelId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A reaction type on a message with its running count.
#[derive(Debug, Clone)]
pub struct ReactionSnapshot {
    pub emoji: String,
    pub count: i64,
}

/// An attachment with the content type reported by the platform.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub url: String,
    pub content_type: Option<String>,
}

/// The message author as seen at event time.
#[derive(Debug, Clone)]
pub struct AuthorRef {
    pub id: i64,
    pub name: String,
    pub is_bot: bool,
}

/// A point-in-time snapshot of a platform message.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub server_id: ServerId,
    pub content: String,
    pub author: AuthorRef,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<ReactionSnapshot>,
}

/// Pagination bounds for a history fetch. Bounds are exclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub limit: usize,
    /// Return only messages older than this id, newest first.
    pub before: Option<MessageId>,
    /// Return only messages newer than this id, oldest first.
    pub after: Option<MessageId>,
}

/// Read access to the chat platform.
///
/// Implementations wrap the platform SDK. `fetch_history` follows the
/// platform convention: `after` queries return oldest to newest, `before`
/// queries return newest to oldest.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Fetch a single message by id.
    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<MessageSnapshot, GatewayError>;

    /// Fetch a page of channel history.
    async fn fetch_history(
        &self,
        channel_id: ChannelId,
        query: HistoryQuery,
    ) -> Result<Vec<MessageSnapshot>, GatewayError>;
}

/// Deterministic deep link back to a message.
#[must_use]
pub fn canonical_message_url(
    server_id: ServerId,
    channel_id: ChannelId,
    message_id: MessageId,
) -> String {
    format!("https://discord.com/channels/{server_id}/{channel_id}/{message_id}")
}
