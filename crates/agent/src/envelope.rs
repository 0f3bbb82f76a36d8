//! Channel webhook envelope and message normalization.
//!
//! The provider posts a nested `entry[].changes[].value` envelope. Every
//! optional path is an explicit default here, so any shape the provider
//! sends deserializes into *something* and normalization degrades to a
//! no-op instead of erroring. Providers retry aggressively on non-2xx, so
//! a malformed payload must never surface as a webhook failure.

use serde::Deserialize;

/// Raw webhook envelope as posted by the channel provider.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub metadata: ChannelMetadata,
}

/// Which tenant-side number the provider delivered this event for.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChannelMetadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// One customer message, canonicalized. Ephemeral: never persisted beyond
/// the pipeline invocation. The provider message id feeds redelivery
/// de-duplication.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub destination: String,
    pub body: String,
    pub provider_message_id: String,
}

/// Result of normalizing one envelope.
#[derive(Debug)]
pub enum Normalized {
    Message(InboundMessage),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No entries in the envelope.
    NoEntry,
    /// Entry present but no changes.
    NoChanges,
    /// Status callback or similar: no messages array.
    NoMessages,
    /// Message kinds other than plain text are acknowledged and dropped.
    UnsupportedKind(String),
    /// Text message with an empty body.
    EmptyBody,
}

/// Pure parse from envelope to at most one inbound message. Never errors.
pub fn normalize(envelope: &WebhookEnvelope) -> Normalized {
    let Some(entry) = envelope.entry.first() else {
        return Normalized::Ignored(IgnoreReason::NoEntry);
    };
    let Some(change) = entry.changes.first() else {
        return Normalized::Ignored(IgnoreReason::NoChanges);
    };
    let value = &change.value;
    let Some(message) = value.messages.first() else {
        return Normalized::Ignored(IgnoreReason::NoMessages);
    };

    if message.kind != "text" {
        return Normalized::Ignored(IgnoreReason::UnsupportedKind(message.kind.clone()));
    }

    let body = message
        .text
        .as_ref()
        .map(|t| t.body.clone())
        .unwrap_or_default();
    if body.is_empty() {
        return Normalized::Ignored(IgnoreReason::EmptyBody);
    }

    Normalized::Message(InboundMessage {
        sender: message.from.clone(),
        destination: value.metadata.display_phone_number.clone(),
        body,
        provider_message_id: message.id.clone(),
    })
}
