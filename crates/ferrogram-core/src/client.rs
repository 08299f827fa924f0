//! Gateway client handle.
//!
//! A [`Client`] is the handle handlers use to talk back to the gateway
//! (send replies, answer callback queries, ...). It is owned by the transport
//! and shared read-only across all in-flight handler invocations.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::ApiResult;

/// The gateway client trait.
///
/// # API Design
///
/// - `call_api`: raw API call with method name and JSON parameters
/// - the provided methods are typed shortcuts built on `call_api`
///
/// Concrete transports implement `call_api`; everything else has a default.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Returns an identifier for the bot account behind this client.
    fn id(&self) -> &str;

    /// Calls a raw gateway method with the given parameters.
    ///
    /// # Arguments
    ///
    /// * `method` - The API method name (e.g., "sendMessage")
    /// * `params` - JSON object with the method parameters
    ///
    /// # Returns
    ///
    /// The `result` field of the gateway response.
    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value>;

    /// Sends a text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Value> {
        self.call_api("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    /// Answers a callback query, optionally showing a notification.
    async fn answer_callback_query(&self, query_id: &str, text: Option<&str>) -> ApiResult<Value> {
        let mut params = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            params["text"] = Value::from(text);
        }
        self.call_api("answerCallbackQuery", params).await
    }

    /// Answers a pre-checkout query.
    ///
    /// When `ok` is false, `error_message` is shown to the user.
    async fn answer_pre_checkout_query(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> ApiResult<Value> {
        let mut params = json!({ "pre_checkout_query_id": query_id, "ok": ok });
        if let Some(message) = error_message {
            params["error_message"] = Value::from(message);
        }
        self.call_api("answerPreCheckoutQuery", params).await
    }

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared client trait object.
pub type BoxedClient = Arc<dyn Client>;
