//! HTTP client for the kiosk server API

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::request::{
    AdvanceRequest, HealthResponse, QuantityRequest, ReplaceItemsRequest, StockResponse,
};
use shared::{
    ApiResponse, Order, OrderId, OrderItem, OrderStatus, Product, ProductId, StatusChange,
    StockChange, StockLevel, UnknownStatus, UserId,
};

use crate::feed::EventFeed;
use crate::{ClientConfig, ClientError, ClientResult};

const USER_ID_HEADER: &str = "x-user-id";

/// HTTP client for making network requests to the kiosk server
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Event streams stay open indefinitely, so they get a client without
    /// the request timeout
    stream_client: Client,
    base_url: String,
    user_id: Option<UserId>,
}

/// Status as it appears on the wire, before vocabulary checks
#[derive(serde::Deserialize)]
struct RawStatus {
    status: serde_json::Value,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        let stream_client = Client::builder().build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_id: config.user_id,
        })
    }

    /// Act as another caller
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn identify(&self, request: RequestBuilder) -> RequestBuilder {
        match self.user_id {
            Some(id) => request.header(USER_ID_HEADER, id.to_string()),
            None => request,
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.identify(self.client.get(self.url(path)));
        Self::handle_response(request.send().await?).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ClientResult<T> {
        let request = self.identify(self.client.post(self.url(path)).json(body));
        Self::handle_response(request.send().await?).await
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ClientResult<T> {
        let request = self.identify(self.client.put(self.url(path)).json(body));
        Self::handle_response(request.send().await?).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.identify(self.client.delete(self.url(path)));
        Self::handle_response(request.send().await?).await
    }

    /// Open an event stream
    pub async fn stream<T>(&self, path: &str) -> ClientResult<EventFeed<T>>
    where
        T: std::str::FromStr<Err = shared::message::WireError>,
    {
        let request = self
            .identify(self.stream_client.get(self.url(path)))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from(status, response.text().await?));
        }
        Ok(EventFeed::from_response(response))
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Self::error_from(status, text));
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Decode the error envelope, falling back to the HTTP status
    fn error_from(status: StatusCode, text: String) -> ClientError {
        if let Ok(envelope) = serde_json::from_str::<ApiResponse<()>>(&text)
            && !envelope.is_success()
        {
            return envelope.into_error().into();
        }

        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::FORBIDDEN => ClientError::Forbidden(text),
            StatusCode::NOT_FOUND => ClientError::NotFound(text),
            StatusCode::BAD_REQUEST => ClientError::Validation(text),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                ClientError::Unavailable(text)
            }
            _ => ClientError::InvalidResponse(format!("{status}: {text}")),
        }
    }

    // ========== Inventory API ==========

    pub async fn reserve(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
        let resp: StockResponse = self
            .post(&format!("/api/inventory/{product_id}/reserve"), &QuantityRequest { quantity })
            .await?;
        level_of(resp)
    }

    pub async fn release(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
        let resp: StockResponse = self
            .post(&format!("/api/inventory/{product_id}/release"), &QuantityRequest { quantity })
            .await?;
        level_of(resp)
    }

    pub async fn confirm(&self, product_id: ProductId, quantity: u32) -> ClientResult<StockLevel> {
        let resp: StockResponse = self
            .post(&format!("/api/inventory/{product_id}/confirm"), &QuantityRequest { quantity })
            .await?;
        level_of(resp)
    }

    /// Live `(productId, stock, reserved)` changes
    pub async fn stock_feed(&self) -> ClientResult<EventFeed<StockChange>> {
        self.stream("/api/products/quantity/stream").await
    }

    // ========== Product API ==========

    pub async fn list_products(&self) -> ClientResult<Vec<Product>> {
        self.get("/api/products").await
    }

    pub async fn get_product(&self, product_id: ProductId) -> ClientResult<Product> {
        self.get(&format!("/api/products/{product_id}")).await
    }

    // ========== Order API ==========

    pub async fn current_order(&self) -> ClientResult<Order> {
        self.get("/api/orders/current").await
    }

    pub async fn get_order(&self, order_id: OrderId) -> ClientResult<Order> {
        self.get(&format!("/api/orders/{order_id}")).await
    }

    pub async fn replace_items(&self, order_id: OrderId, items: Vec<OrderItem>) -> ClientResult<Order> {
        self.put(&format!("/api/orders/{order_id}/items"), &ReplaceItemsRequest { items })
            .await
    }

    /// Current status; values outside the known vocabulary are an error
    pub async fn order_status(&self, order_id: OrderId) -> ClientResult<OrderStatus> {
        let raw: RawStatus = self.get(&format!("/api/orders/{order_id}/status")).await?;
        parse_status(raw.status)
    }

    /// Advance one step, optionally only from `from`
    pub async fn advance_order(
        &self,
        order_id: OrderId,
        from: Option<OrderStatus>,
    ) -> ClientResult<OrderStatus> {
        let body = AdvanceRequest {
            from: from.map(|s| s.name().to_string()),
        };
        let raw: RawStatus = self
            .post(&format!("/api/orders/{order_id}/advance"), &body)
            .await?;
        parse_status(raw.status)
    }

    /// Status stream: current status first, ends after `Delivered`
    pub async fn status_feed(&self, order_id: OrderId) -> ClientResult<EventFeed<StatusChange>> {
        self.stream(&format!("/api/orders/{order_id}/status/stream")).await
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        self.get("/health").await
    }
}

fn level_of(resp: StockResponse) -> ClientResult<StockLevel> {
    StockLevel::new(resp.stock, resp.reserved).ok_or_else(|| {
        ClientError::InvalidResponse(format!(
            "product {} reports {} reserved of {}",
            resp.product_id, resp.reserved, resp.stock
        ))
    })
}

fn parse_status(value: serde_json::Value) -> ClientResult<OrderStatus> {
    let status = match value {
        serde_json::Value::String(name) => name.parse::<OrderStatus>()?,
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|code| u8::try_from(code).ok())
            .ok_or_else(|| UnknownStatus(n.to_string()))
            .and_then(OrderStatus::try_from)?,
        other => return Err(UnknownStatus(other.to_string()).into()),
    };
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_status_accepts_name_and_code() {
        assert_eq!(parse_status(json!("Assembling")).unwrap(), OrderStatus::Assembling);
        assert_eq!(parse_status(json!(3)).unwrap(), OrderStatus::Delivered);
    }

    #[test]
    fn test_parse_status_rejects_unknown() {
        assert!(matches!(
            parse_status(json!("Cooking")),
            Err(ClientError::UnknownStatus(_))
        ));
        assert!(matches!(parse_status(json!(9)), Err(ClientError::UnknownStatus(_))));
        assert!(matches!(parse_status(json!(null)), Err(ClientError::UnknownStatus(_))));
    }

    #[test]
    fn test_error_envelope_maps_to_typed_error() {
        let body = json!({
            "code": 6003,
            "message": "Not enough stock",
            "details": {"product_id": 4, "requested": 2, "available": 1}
        })
        .to_string();
        let err = HttpClient::error_from(StatusCode::CONFLICT, body);
        assert!(matches!(
            err,
            ClientError::InsufficientStock { product_id: 4, requested: 2, available: 1 }
        ));
    }

    #[test]
    fn test_error_without_envelope_uses_status() {
        let err = HttpClient::error_from(StatusCode::UNAUTHORIZED, "nope".into());
        assert!(matches!(err, ClientError::Unauthorized));
    }
}
