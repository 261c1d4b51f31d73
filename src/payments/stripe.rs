//! Stripe-compatible HTTP client
//!
//! Implements [`PaymentProvider`] over the provider's REST API: bearer
//! authentication, form-encoded bodies, idempotency keys on writes and
//! connected-account routing through the `Stripe-Account` header.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use crate::config::PaymentsConfig;
use crate::payments::provider::{
    CreateIntentRequest, IntentSearch, PaymentIntent, PaymentProvider, Refund, RefundRequest,
};
use crate::utils::errors::{EngineError, ProviderError, ProviderResult, Result};

const SEARCH_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct SearchResult {
    data: Vec<PaymentIntent>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Payment provider client
#[derive(Clone, Debug)]
pub struct StripeClient {
    client: Client,
    api_url: String,
    secret_key: String,
}

impl StripeClient {
    /// Create a new StripeClient instance
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent("GymBooking-Engine/1.0")
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, account: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.api_url, path);
        let mut builder = self.client.request(method, url).bearer_auth(&self.secret_key);
        if let Some(account) = account {
            builder = builder.header("Stripe-Account", account);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, operation: &str, builder: RequestBuilder) -> ProviderResult<T> {
        debug!(operation = operation, "Sending payment provider request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else if e.is_connect() {
                ProviderError::Transient(format!("connection failed: {}", e))
            } else {
                ProviderError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn map_error_status(status: StatusCode, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::NOT_FOUND => {
            let code = parsed.and_then(|e| e.error.code).unwrap_or_else(|| "resource_missing".to_string());
            ProviderError::NotFound(format!("{}: {}", code, message))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        s if s.is_server_error() => ProviderError::Transient(format!("HTTP {}: {}", s.as_u16(), message)),
        s => ProviderError::Api { status: s.as_u16(), message },
    }
}

fn metadata_params(prefix: &str, metadata: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = metadata
        .into_iter()
        .map(|(k, v)| (format!("{}[{}]", prefix, k), v))
        .collect();
    params.sort();
    params
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_payment_intent(&self, account: Option<&str>, request: &CreateIntentRequest) -> ProviderResult<PaymentIntent> {
        let mut params = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        params.extend(metadata_params("metadata", request.metadata.to_map()));

        let builder = self
            .request(Method::POST, "/v1/payment_intents", account)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params);
        self.send("create_payment_intent", builder).await
    }

    async fn retrieve_payment_intent(&self, account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent> {
        let builder = self.request(Method::GET, &format!("/v1/payment_intents/{}", intent_id), account);
        self.send("retrieve_payment_intent", builder).await
    }

    async fn cancel_payment_intent(&self, account: Option<&str>, intent_id: &str) -> ProviderResult<PaymentIntent> {
        let builder = self
            .request(Method::POST, &format!("/v1/payment_intents/{}/cancel", intent_id), account)
            .form(&[("cancellation_reason", "abandoned")]);
        self.send("cancel_payment_intent", builder).await
    }

    async fn create_refund(&self, account: Option<&str>, request: &RefundRequest) -> ProviderResult<Refund> {
        let mut params = vec![
            ("payment_intent".to_string(), request.payment_intent_id.clone()),
            ("amount".to_string(), request.amount.to_string()),
            ("reason".to_string(), request.reason.as_str().to_string()),
        ];
        params.extend(metadata_params("metadata", request.metadata.clone()));

        let builder = self
            .request(Method::POST, "/v1/refunds", account)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&params);
        self.send("create_refund", builder).await
    }

    async fn search_payment_intents(&self, account: Option<&str>, search: &IntentSearch) -> ProviderResult<Vec<PaymentIntent>> {
        let query = search.to_query();
        let builder = self
            .request(Method::GET, "/v1/payment_intents/search", account)
            .query(&[("query", query.as_str()), ("limit", SEARCH_LIMIT)]);
        let result: SearchResult = self.send("search_payment_intents", builder).await?;
        Ok(result.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_not_found() {
        let body = r#"{"error":{"code":"resource_missing","message":"No such payment_intent: 'pi_x'"}}"#;
        match map_error_status(StatusCode::NOT_FOUND, body) {
            ProviderError::NotFound(msg) => assert!(msg.contains("resource_missing")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_error_status(StatusCode::TOO_MANY_REQUESTS, ""), ProviderError::RateLimited);
        assert!(map_error_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert_eq!(
            map_error_status(StatusCode::BAD_REQUEST, r#"{"error":{"message":"amount too large"}}"#),
            ProviderError::Api { status: 400, message: "amount too large".to_string() }
        );
    }

    #[test]
    fn test_metadata_params_are_bracketed_and_sorted() {
        let params = metadata_params(
            "metadata",
            vec![("user_id".to_string(), "7".to_string()), ("event_id".to_string(), "1".to_string())],
        );
        assert_eq!(params[0], ("metadata[event_id]".to_string(), "1".to_string()));
        assert_eq!(params[1], ("metadata[user_id]".to_string(), "7".to_string()));
    }
}
