//! Shared test doubles.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use ferrogram_core::{ApiResult, BoxedClient, BoxedReporter, Client, reporter_fn};

#[derive(Default)]
pub(crate) struct MockClient {
    pub calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl Client for MockClient {
    fn id(&self) -> &str {
        "test-bot"
    }

    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.calls.lock().push((method.to_string(), params));
        Ok(Value::Bool(true))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub(crate) fn mock_client() -> BoxedClient {
    Arc::new(MockClient::default())
}

/// A reporter that records the display form of every report.
pub(crate) fn recorder() -> (BoxedReporter, Arc<Mutex<Vec<String>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let reporter = reporter_fn(move |_client, error, _cancel| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(error.to_string());
        }
    });
    (reporter, reports)
}
