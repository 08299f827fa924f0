//! Update classification.
//!
//! Every inbound [`Update`] is classified into exactly one [`UpdateKind`] by
//! testing its slots in a fixed precedence order:
//!
//! ```text
//! message → edited_message → callback_query → inline_query → pre_checkout_query → (unmatched)
//! ```
//!
//! The order is part of the dispatch contract and holds even for envelopes
//! that populate more than one slot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CallbackQuery, InlineQuery, Message, PreCheckoutQuery, Update};

/// The closed set of update categories a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// A new message; routed by prefix over its text (commands).
    Message,
    /// An edited message; every registered handler runs.
    EditedMessage,
    /// A callback query; routed by prefix over its data.
    #[serde(rename = "callback_query")]
    Callback,
    /// An inline query; routed by prefix over its identifier.
    #[serde(rename = "inline_query")]
    Inline,
    /// A pre-checkout query; at most one handler.
    #[serde(rename = "pre_checkout_query")]
    PreCheckout,
    /// Anything else; every registered handler runs.
    Unmatched,
}

impl UpdateKind {
    /// All kinds, in classification order.
    pub const ALL: [UpdateKind; 6] = [
        UpdateKind::Message,
        UpdateKind::EditedMessage,
        UpdateKind::Callback,
        UpdateKind::Inline,
        UpdateKind::PreCheckout,
        UpdateKind::Unmatched,
    ];

    /// Returns the stable snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::Callback => "callback_query",
            Self::Inline => "inline_query",
            Self::PreCheckout => "pre_checkout_query",
            Self::Unmatched => "unmatched",
        }
    }

    /// Returns true for kinds resolved through a prefix key.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Message | Self::Callback | Self::Inline)
    }

    /// Returns true for kinds that invoke every registered handler.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::EditedMessage | Self::Unmatched)
    }

    /// Returns true for kinds with a single handler slot.
    pub fn is_single(&self) -> bool {
        matches!(self, Self::PreCheckout)
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown update kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown update kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for UpdateKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// The typed content of a classified update.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Message(Message),
    EditedMessage(Message),
    Callback(CallbackQuery),
    Inline(InlineQuery),
    PreCheckout(PreCheckoutQuery),
    /// No known slot was populated; carries the whole envelope.
    Unmatched(Update),
}

impl Payload {
    /// Classifies an update, cloning the winning slot.
    pub fn classify(update: &Update) -> Self {
        if let Some(message) = &update.message {
            Self::Message(message.clone())
        } else if let Some(message) = &update.edited_message {
            Self::EditedMessage(message.clone())
        } else if let Some(query) = &update.callback_query {
            Self::Callback(query.clone())
        } else if let Some(query) = &update.inline_query {
            Self::Inline(query.clone())
        } else if let Some(query) = &update.pre_checkout_query {
            Self::PreCheckout(query.clone())
        } else {
            Self::Unmatched(update.clone())
        }
    }

    /// Returns the kind this payload was classified as.
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Message(_) => UpdateKind::Message,
            Self::EditedMessage(_) => UpdateKind::EditedMessage,
            Self::Callback(_) => UpdateKind::Callback,
            Self::Inline(_) => UpdateKind::Inline,
            Self::PreCheckout(_) => UpdateKind::PreCheckout,
            Self::Unmatched(_) => UpdateKind::Unmatched,
        }
    }

    /// Returns the routing key for keyed kinds.
    ///
    /// `None` for non-keyed kinds and for keyed payloads whose key is missing
    /// or empty.
    pub fn match_key(&self) -> Option<&str> {
        let key = match self {
            Self::Message(message) => message.text.as_deref(),
            Self::Callback(query) => query.data.as_deref(),
            Self::Inline(query) => Some(query.id.as_str()),
            _ => None,
        };
        key.filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(data: &str) -> CallbackQuery {
        CallbackQuery {
            id: "cb".to_string(),
            data: Some(data.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_precedence_message_wins() {
        let update = Update {
            update_id: 1,
            message: Some(Message::text(1, "/start")),
            edited_message: Some(Message::text(1, "edited")),
            callback_query: Some(callback("act-1")),
            ..Default::default()
        };

        assert_eq!(Payload::classify(&update).kind(), UpdateKind::Message);
    }

    #[test]
    fn test_precedence_order() {
        let mut update = Update {
            update_id: 1,
            edited_message: Some(Message::text(1, "edited")),
            callback_query: Some(callback("act-1")),
            inline_query: Some(InlineQuery::default()),
            pre_checkout_query: Some(PreCheckoutQuery::default()),
            ..Default::default()
        };
        assert_eq!(Payload::classify(&update).kind(), UpdateKind::EditedMessage);

        update.edited_message = None;
        assert_eq!(Payload::classify(&update).kind(), UpdateKind::Callback);

        update.callback_query = None;
        assert_eq!(Payload::classify(&update).kind(), UpdateKind::Inline);

        update.inline_query = None;
        assert_eq!(Payload::classify(&update).kind(), UpdateKind::PreCheckout);

        update.pre_checkout_query = None;
        assert_eq!(Payload::classify(&update).kind(), UpdateKind::Unmatched);
    }

    #[test]
    fn test_match_key_extraction() {
        let message = Payload::Message(Message::text(1, "/start extra"));
        assert_eq!(message.match_key(), Some("/start extra"));

        let empty = Payload::Message(Message::text(1, ""));
        assert_eq!(empty.match_key(), None);

        let no_text = Payload::Message(Message::default());
        assert_eq!(no_text.match_key(), None);

        let query = Payload::Callback(callback("act-42"));
        assert_eq!(query.match_key(), Some("act-42"));

        let edited = Payload::EditedMessage(Message::text(1, "/start"));
        assert_eq!(edited.match_key(), None);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("callback_query".parse::<UpdateKind>(), Ok(UpdateKind::Callback));
        assert_eq!(
            "pre_checkout_query".parse::<UpdateKind>(),
            Ok(UpdateKind::PreCheckout)
        );
        assert!("poll".parse::<UpdateKind>().is_err());
    }
}
