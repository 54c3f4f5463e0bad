//! Archival decision logic.
//!
//! Pure functions over a [`MessageSnapshot`]; the duplicate check against
//! the store happens in the pipeline between [`screen`] and
//! [`build_record`] so rejection reasons keep their documented order.

use crate::db::NewArchivedRecord;
use crate::gateway::{canonical_message_url, MessageSnapshot};

/// Why a candidate message was not archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Posted by a bot or automated account.
    BotAuthor,
    /// Empty or whitespace-only content (image-only posts included).
    EmptyContent,
    /// A record already exists for this message.
    AlreadyArchived,
    /// No reaction type reached the configured threshold.
    BelowThreshold,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotAuthor => "bot author",
            Self::EmptyContent => "empty content",
            Self::AlreadyArchived => "already archived",
            Self::BelowThreshold => "below reaction threshold",
        }
    }
}

/// Store-independent screening: bot authors and contentless messages are
/// never archived, regardless of reactions.
#[must_use]
pub fn screen(message: &MessageSnapshot) -> Option<RejectReason> {
    if message.author.is_bot {
        return Some(RejectReason::BotAuthor);
    }
    if message.content.trim().is_empty() {
        return Some(RejectReason::EmptyContent);
    }
    None
}

/// Build the archive record for a message that passed screening.
///
/// Rejects with [`RejectReason::BelowThreshold`] unless some reaction's
/// count meets the threshold. The stored emoji is the first reaction in
/// iteration order that satisfies the threshold (not necessarily the one
/// with the highest count); the stored count is the maximum observed across
/// all reaction types.
pub fn build_record(
    message: &MessageSnapshot,
    threshold: u32,
) -> Result<NewArchivedRecord, RejectReason> {
    let threshold = i64::from(threshold);

    let reaction_emoji = message
        .reactions
        .iter()
        .find(|r| r.count >= threshold)
        .map(|r| r.emoji.clone());

    if reaction_emoji.is_none() {
        return Err(RejectReason::BelowThreshold);
    }

    let reactions = message.reactions.iter().map(|r| r.count).max().unwrap_or(0);

    Ok(NewArchivedRecord {
        message_id: message.message_id,
        content: message.content.clone(),
        reactions,
        channel_id: message.channel_id,
        server_id: message.server_id,
        author_name: message.author.name.clone(),
        message_url: canonical_message_url(
            message.server_id,
            message.channel_id,
            message.message_id,
        ),
        image_url: first_image_url(message),
        reaction_emoji,
    })
}

/// URL of the first attachment whose content type marks it as an image.
fn first_image_url(message: &MessageSnapshot) -> Option<String> {
    message
        .attachments
        .iter()
        .find(|a| {
            a.content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"))
        })
        .map(|a| a.url.clone())
}
