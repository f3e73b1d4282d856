pub mod dry_run;

use super::{FeedClientError, FeedProcessingReport, FeedProcessingStatus, FeedSubmissionClient};
use crate::shared::config::AmazonConfig;
use async_trait::async_trait;
use contracts::domain::a002_sync_feed::aggregate::{
    AggregatedEntry, FeedLineResult, FeedPhase, LineOutcome,
};
use serde::Deserialize;
use serde_json::json;

/// Клиент Amazon Selling Partner API (Feeds + Product Pricing)
///
/// Формат посылки держим минимальным: построчный JSON с ASIN и значением.
/// Подпись запросов и обмен OAuth-токена живут во внешнем сервисе — сюда
/// приходит уже готовый токен доступа.
pub struct SpApiFeedClient {
    http: reqwest::Client,
    endpoint: String,
    merchant_id: String,
    marketplace_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct SubmitFeedResponse {
    #[serde(rename = "feedId")]
    feed_id: String,
}

#[derive(Debug, Deserialize)]
struct FeedStatusResponse {
    #[serde(rename = "processingStatus")]
    processing_status: String,
    #[serde(rename = "resultSummaries", default)]
    result_summaries: Vec<FeedLineSummary>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedLineSummary {
    asin: String,
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LivePriceResponse {
    price: f64,
}

impl SpApiFeedClient {
    pub fn new(config: &AmazonConfig) -> Result<Self, FeedClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FeedClientError::Fatal(format!("HTTP клиент не создан: {}", e)))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            merchant_id: config.merchant_id.clone(),
            marketplace_id: config.marketplace_id.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// Классификация сетевой ошибки reqwest: таймаут и обрыв соединения —
    /// транзиентные, ошибка построения запроса — фатальная.
    fn classify_request_error(e: reqwest::Error) -> FeedClientError {
        if e.is_timeout() || e.is_connect() {
            FeedClientError::Transient(format!("сеть: {}", e))
        } else if e.is_builder() || e.is_request() {
            FeedClientError::Fatal(format!("запрос не построен: {}", e))
        } else {
            FeedClientError::Transient(format!("{}", e))
        }
    }

    /// 5xx — транзиентная (Amazon перегружен), 4xx — фатальная
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FeedClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(FeedClientError::Transient(format!(
                "Amazon вернул HTTP {}: {}",
                status.as_u16(),
                body
            )))
        } else {
            Err(FeedClientError::Fatal(format!(
                "Amazon отклонил запрос (HTTP {}): {}",
                status.as_u16(),
                body
            )))
        }
    }

    async fn submit_feed(
        &self,
        feed_type: &str,
        messages: Vec<serde_json::Value>,
    ) -> Result<String, FeedClientError> {
        let url = format!("{}/feeds/2021-06-30/feeds", self.endpoint);
        let body = json!({
            "feedType": feed_type,
            "merchantId": self.merchant_id,
            "marketplaceIds": [self.marketplace_id],
            "messages": messages,
        });

        let response = self
            .http
            .post(&url)
            .header("x-amz-access-token", &self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_request_error)?;
        let response = Self::check_status(response).await?;

        let parsed: SubmitFeedResponse = response
            .json()
            .await
            .map_err(|e| FeedClientError::Fatal(format!("ответ Amazon не разобран: {}", e)))?;
        Ok(parsed.feed_id)
    }

    fn parse_line_results(summaries: Vec<FeedLineSummary>, phase: FeedPhase) -> Vec<FeedLineResult> {
        summaries
            .into_iter()
            .map(|s| {
                let outcome = match s.status.to_lowercase().as_str() {
                    "success" => LineOutcome::Success,
                    "warning" => LineOutcome::Warning,
                    _ => LineOutcome::Error,
                };
                FeedLineResult {
                    asin: s.asin,
                    phase,
                    outcome,
                    message: s.message,
                }
            })
            .collect()
    }

    /// Фаза, к которой относится фид, зашита в его тип при отправке и
    /// восстанавливается из префикса id документа
    fn phase_for_feed_id(feed_id: &str) -> FeedPhase {
        if feed_id.starts_with("QTY-") {
            FeedPhase::Quantity
        } else {
            FeedPhase::Price
        }
    }
}

#[async_trait]
impl FeedSubmissionClient for SpApiFeedClient {
    async fn submit_price_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        let messages = entries
            .iter()
            .map(|e| json!({"asin": e.asin, "price": e.price}))
            .collect();
        self.submit_feed("POST_PRODUCT_PRICING_DATA", messages).await
    }

    async fn submit_quantity_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        let messages = entries
            .iter()
            .map(|e| json!({"asin": e.asin, "quantity": e.quantity}))
            .collect();
        let feed_id = self
            .submit_feed("POST_INVENTORY_AVAILABILITY_DATA", messages)
            .await?;
        Ok(format!("QTY-{}", feed_id))
    }

    async fn submit_price_quantity_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        let messages = entries
            .iter()
            .map(|e| json!({"asin": e.asin, "price": e.price, "quantity": e.quantity}))
            .collect();
        self.submit_feed("POST_FLAT_FILE_PRICEANDQUANTITYONLY_UPDATE_DATA", messages)
            .await
    }

    async fn get_feed_status(
        &self,
        feed_id: &str,
    ) -> Result<FeedProcessingReport, FeedClientError> {
        let raw_id = feed_id.strip_prefix("QTY-").unwrap_or(feed_id);
        let url = format!(
            "{}/feeds/2021-06-30/feeds/{}",
            self.endpoint,
            urlencoding::encode(raw_id)
        );
        let response = self
            .http
            .get(&url)
            .header("x-amz-access-token", &self.api_token)
            .send()
            .await
            .map_err(Self::classify_request_error)?;
        let response = Self::check_status(response).await?;

        let parsed: FeedStatusResponse = response
            .json()
            .await
            .map_err(|e| FeedClientError::Fatal(format!("ответ Amazon не разобран: {}", e)))?;

        let status = match parsed.processing_status.as_str() {
            "IN_PROGRESS" | "IN_QUEUE" => FeedProcessingStatus::InProgress,
            "DONE" => FeedProcessingStatus::Done,
            _ => FeedProcessingStatus::Fatal,
        };
        let phase = Self::phase_for_feed_id(feed_id);
        Ok(FeedProcessingReport {
            status,
            line_results: Self::parse_line_results(parsed.result_summaries, phase),
            error_message: parsed.error_message,
        })
    }

    async fn get_live_price(&self, asin: &str) -> Result<f64, FeedClientError> {
        let url = format!(
            "{}/products/pricing/v0/price?Asins={}&MarketplaceId={}",
            self.endpoint,
            urlencoding::encode(asin),
            urlencoding::encode(&self.marketplace_id)
        );
        let response = self
            .http
            .get(&url)
            .header("x-amz-access-token", &self.api_token)
            .send()
            .await
            .map_err(Self::classify_request_error)?;
        let response = Self::check_status(response).await?;

        let parsed: LivePriceResponse = response
            .json()
            .await
            .map_err(|e| FeedClientError::Fatal(format!("ответ Amazon не разобран: {}", e)))?;
        Ok(parsed.price)
    }
}
