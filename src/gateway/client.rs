use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use super::types::{
    RegisterIpnRequest, RegisterIpnResponse, SubmitOrderRequest, SubmitOrderResponse, TokenRequest,
    TokenResponse, TransactionStatusResponse,
};
use super::{
    GatewayError, OrderSubmission, PaymentGateway, SessionToken, SubmittedOrder, TransactionStatus,
};
use crate::config::GatewayConfig;

/// Raw outcome of one REST call, before the caller decides which error kind a
/// non-2xx status represents.
enum RestOutcome<T> {
    Success(T),
    Rejected { status: u16, message: String },
}

/// HTTP client for a Pesapal v3 style gateway API.
#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        token: Option<&SessionToken>,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<RestOutcome<T>, GatewayError> {
        let url = self.url(path);
        trace!("Sending gateway request: {method} {url}");
        let mut req: RequestBuilder = self.client.request(method, url);
        if let Some(token) = token {
            req = req.bearer_auth(token.reveal());
        }
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("Gateway request successful. {status}");
            let value =
                response.json::<T>().await.map_err(|e| GatewayError::Json(e.to_string()))?;
            Ok(RestOutcome::Success(value))
        } else {
            let message =
                response.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
            Ok(RestOutcome::Rejected { status: status.as_u16(), message })
        }
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn acquire_token(&self) -> Result<SessionToken, GatewayError> {
        let body = TokenRequest {
            consumer_key: self.config.consumer_key.reveal(),
            consumer_secret: self.config.consumer_secret.reveal(),
        };
        let outcome = self
            .rest_query::<TokenResponse, _>(
                Method::POST,
                "/api/Auth/RequestToken",
                None,
                &[],
                Some(body),
            )
            .await;
        let response = match outcome {
            Ok(RestOutcome::Success(r)) => r,
            Ok(RestOutcome::Rejected { status, message }) => {
                return Err(GatewayError::Auth(format!("Error {status}. {message}")))
            }
            Err(GatewayError::Transport(e)) => return Err(GatewayError::Auth(e)),
            Err(e) => return Err(e),
        };
        match response.token.filter(|t| !t.is_empty()) {
            Some(token) => {
                debug!("Acquired gateway session token");
                Ok(SessionToken::new(token, response.expiry_date))
            }
            None => {
                let detail = response
                    .error
                    .filter(|e| e.is_present())
                    .map(|e| e.describe())
                    .or(response.message)
                    .unwrap_or_else(|| "no token in response".to_string());
                Err(GatewayError::Auth(detail))
            }
        }
    }

    async fn register_notification_channel(
        &self,
        token: &SessionToken,
        url: &str,
    ) -> Result<String, GatewayError> {
        let body = RegisterIpnRequest { url, ipn_notification_type: "GET" };
        let outcome = self
            .rest_query::<RegisterIpnResponse, _>(
                Method::POST,
                "/api/URLSetup/RegisterIPN",
                Some(token),
                &[],
                Some(body),
            )
            .await?;
        let response = match outcome {
            RestOutcome::Success(r) => r,
            RestOutcome::Rejected { status, message } => {
                return Err(GatewayError::Registration { status, message })
            }
        };
        match response.ipn_id.filter(|id| !id.is_empty()) {
            Some(ipn_id) => {
                info!("Registered notification channel {url} as {ipn_id}");
                Ok(ipn_id)
            }
            None => {
                let message = response
                    .error
                    .map(|e| e.describe())
                    .unwrap_or_else(|| "no ipn_id in response".into());
                Err(GatewayError::Registration { status: 200, message })
            }
        }
    }

    async fn submit_order(
        &self,
        token: &SessionToken,
        order: &OrderSubmission,
    ) -> Result<SubmittedOrder, GatewayError> {
        let body =
            SubmitOrderRequest::from_submission(order).ok_or_else(|| GatewayError::Submission {
                status: 0,
                message: format!("amount {} cannot be represented", order.amount),
            })?;
        debug!(
            "Submitting order {} for {} {}",
            order.merchant_reference, order.amount, order.currency
        );
        let outcome = self
            .rest_query::<SubmitOrderResponse, _>(
                Method::POST,
                "/api/Transactions/SubmitOrderRequest",
                Some(token),
                &[],
                Some(body),
            )
            .await?;
        let response = match outcome {
            RestOutcome::Success(r) => r,
            RestOutcome::Rejected { status, message } => {
                return Err(GatewayError::Submission { status, message })
            }
        };
        if let Some(error) = response.error.as_ref().filter(|e| e.is_present()) {
            return Err(GatewayError::Submission { status: 200, message: error.describe() });
        }
        match (response.order_tracking_id, response.redirect_url) {
            (Some(tracking_handle), Some(redirect_url)) if !tracking_handle.is_empty() => {
                info!("Gateway accepted order {} as {tracking_handle}", order.merchant_reference);
                Ok(SubmittedOrder {
                    tracking_handle,
                    merchant_reference: response.merchant_reference,
                    redirect_url,
                })
            }
            _ => Err(GatewayError::Submission {
                status: 200,
                message: "response is missing order_tracking_id or redirect_url".to_string(),
            }),
        }
    }

    async fn query_status(
        &self,
        token: &SessionToken,
        tracking_handle: &str,
    ) -> Option<TransactionStatus> {
        let outcome = self
            .rest_query::<TransactionStatusResponse, ()>(
                Method::GET,
                "/api/Transactions/GetTransactionStatus",
                Some(token),
                &[("orderTrackingId", tracking_handle)],
                None,
            )
            .await;
        match outcome {
            Ok(RestOutcome::Success(response)) => {
                if let Some(error) = response.error.as_ref().filter(|e| e.is_present()) {
                    // The provider also reports errors for transactions it has not settled yet.
                    let detail = error.describe();
                    debug!("Status query for {tracking_handle} carried an error: {detail}");
                }
                Some(TransactionStatus::from(response))
            }
            Ok(RestOutcome::Rejected { status, message }) => {
                warn!("Status query for {tracking_handle} rejected. Error {status}. {message}");
                None
            }
            Err(e) => {
                warn!("Status query for {tracking_handle} failed: {e}");
                None
            }
        }
    }
}
