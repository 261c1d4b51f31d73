//! Mock payment provider API server for testing
//!
//! Wraps a wiremock server speaking the provider's REST dialect so the HTTP
//! client can be exercised end to end.

use gymbooking::config::PaymentsConfig;
use gymbooking::payments::StripeClient;
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_SECRET_KEY: &str = "sk_test_engine";

pub struct ProviderMockServer {
    pub server: MockServer,
}

impl ProviderMockServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn config(&self) -> PaymentsConfig {
        PaymentsConfig {
            api_url: self.server.uri(),
            secret_key: TEST_SECRET_KEY.to_string(),
            timeout_seconds: 2,
            refund_concurrency: 4,
        }
    }

    pub fn client(&self) -> StripeClient {
        StripeClient::new(&self.config()).expect("Failed to build provider client")
    }

    /// Respond to GET /v1/payment_intents/{id}
    pub async fn mock_retrieve(&self, intent_id: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/payment_intents/{}", intent_id)))
            .and(header("authorization", format!("Bearer {}", TEST_SECRET_KEY).as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

pub fn intent_json(id: &str, status: &str, amount: i64, created: i64) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "status": status,
        "amount": amount,
        "currency": "eur",
        "created": created,
        "client_secret": format!("{}_secret_abc", id),
        "metadata": {
            "event_id": "11",
            "user_id": "22",
            "gym_id": "7"
        }
    })
}

pub fn error_json(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "type": "invalid_request_error",
            "code": code,
            "message": message
        }
    })
}
