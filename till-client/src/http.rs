//! HTTP implementation of the order service

use crate::{ClientConfig, ClientError, ClientResult, OrderService};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::error::ApiResponse;
use shared::order::{
    FinalizedOrder, OrderType, PromotionResolution, ReceiptSnapshot, StagedOrderCreated,
    StagedOrderPatch, StagedOrderSnapshot, StagedOrderSummary, TransitionRequest,
};

#[derive(Serialize)]
struct CreateStagedOrderRequest {
    order_type: OrderType,
}

#[derive(Serialize)]
struct LineItemRequest<'a> {
    variant_id: &'a str,
    quantity: u32,
}

#[derive(Serialize)]
struct ResolvePromotionRequest<'a> {
    code: &'a str,
}

/// Order service client over REST
#[derive(Debug, Clone)]
pub struct HttpOrderService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpOrderService {
    /// Create a new HTTP order service from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base URL is empty".into()));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<ApiResponse<T>> {
        let request = match self.auth_header() {
            Some(auth) => request.header(reqwest::header::AUTHORIZATION, auth),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = %status, body = %text, "Order service rejected request");
            return Err(ClientError::from_status(status, &text));
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
        if !envelope.is_success() {
            return Err(ClientError::from_app_error(envelope.to_app_error()));
        }
        Ok(envelope)
    }

    /// Send a request whose envelope must carry data
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ClientResult<T> {
        self.send::<T>(request)
            .await?
            .data
            .ok_or_else(|| ClientError::InvalidResponse(format!("Missing {} data", what)))
    }

    /// Send a request whose envelope data is ignored
    async fn execute(&self, request: RequestBuilder) -> ClientResult<()> {
        self.send::<serde_json::Value>(request).await.map(|_| ())
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn create_staged_order(&self, order_type: OrderType) -> ClientResult<StagedOrderCreated> {
        let req = self
            .client
            .post(self.url("api/staged-orders"))
            .json(&CreateStagedOrderRequest { order_type });
        self.fetch(req, "staged order").await
    }

    async fn get_staged_order(&self, order_id: &str) -> ClientResult<StagedOrderSnapshot> {
        let req = self
            .client
            .get(self.url(&format!("api/staged-orders/{}", order_id)));
        self.fetch(req, "staged order").await
    }

    async fn add_line_item(
        &self,
        order_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> ClientResult<()> {
        let req = self
            .client
            .post(self.url(&format!("api/staged-orders/{}/items", order_id)))
            .json(&LineItemRequest {
                variant_id,
                quantity,
            });
        self.execute(req).await
    }

    async fn set_line_item_quantity(
        &self,
        order_id: &str,
        variant_id: &str,
        quantity: u32,
    ) -> ClientResult<()> {
        let req = self
            .client
            .put(self.url(&format!("api/staged-orders/{}/items", order_id)))
            .json(&LineItemRequest {
                variant_id,
                quantity,
            });
        self.execute(req).await
    }

    async fn remove_line_item(&self, line_id: &str) -> ClientResult<()> {
        let req = self
            .client
            .delete(self.url(&format!("api/line-items/{}", line_id)));
        self.execute(req).await
    }

    async fn update_staged_order(
        &self,
        order_id: &str,
        patch: &StagedOrderPatch,
    ) -> ClientResult<()> {
        let req = self
            .client
            .patch(self.url(&format!("api/staged-orders/{}", order_id)))
            .json(patch);
        self.execute(req).await
    }

    async fn finalize_payment(&self, order_id: &str) -> ClientResult<ReceiptSnapshot> {
        let req = self
            .client
            .post(self.url(&format!("api/staged-orders/{}/finalize", order_id)));
        self.fetch(req, "receipt").await
    }

    async fn delete_staged_order(&self, order_id: &str) -> ClientResult<()> {
        let req = self
            .client
            .delete(self.url(&format!("api/staged-orders/{}", order_id)));
        self.execute(req).await
    }

    async fn list_staged_orders(&self) -> ClientResult<Vec<StagedOrderSummary>> {
        let req = self.client.get(self.url("api/staged-orders"));
        let list: Option<Vec<StagedOrderSummary>> = self.send(req).await?.data;
        Ok(list.unwrap_or_default())
    }

    async fn resolve_promotion(&self, code: &str) -> ClientResult<PromotionResolution> {
        let req = self
            .client
            .post(self.url("api/promotions/resolve"))
            .json(&ResolvePromotionRequest { code });
        self.fetch(req, "promotion").await
    }

    async fn transition_order_status(
        &self,
        order_id: &str,
        request: &TransitionRequest,
    ) -> ClientResult<FinalizedOrder> {
        let req = self
            .client
            .post(self.url(&format!("api/orders/{}/transitions", order_id)))
            .json(request);
        self.fetch(req, "order").await
    }

    async fn get_finalized_order(&self, order_id: &str) -> ClientResult<FinalizedOrder> {
        let req = self.client.get(self.url(&format!("api/orders/{}", order_id)));
        self.fetch(req, "order").await
    }
}
