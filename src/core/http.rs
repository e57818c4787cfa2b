use crate::domain::model::CarrierId;
use crate::utils::error::{FreightError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const BODY_SNIPPET_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// 所有承運商共用的 HTTP 呼叫封裝：逾時 + 固定次數重試
#[derive(Debug, Clone)]
pub struct HttpHelper {
    client: Client,
    settings: HttpSettings,
}

impl HttpHelper {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// 共用同一個連線池，只換掉逾時設定
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            client: self.client.clone(),
            settings: HttpSettings {
                timeout,
                ..self.settings
            },
        }
    }

    /// 發送請求並將 2xx 回應解析為 `T`。
    ///
    /// `build` 每次嘗試都會重新呼叫，因為 `RequestBuilder` 不能重複送出。
    /// 只有逾時、連線失敗與 5xx 會重試；其餘非 2xx 直接轉為
    /// `FreightError::CarrierStatus` 並保留原始狀態碼。
    pub async fn fetch_json<T, F>(&self, carrier: CarrierId, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let body = self.fetch_text(carrier, build).await?;
        serde_json::from_str(&body).map_err(|e| FreightError::UnexpectedResponse {
            carrier,
            message: format!("{} in body: {}", e, snippet(&body)),
        })
    }

    pub async fn fetch_text<F>(&self, carrier: CarrierId, build: F) -> Result<String>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.settings.retry_attempts + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!("{} request attempt {}/{}", carrier, attempt, max_attempts);

            let outcome = build(&self.client)
                .timeout(self.settings.timeout)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!("{} response status: {}", carrier, status);
                    let body = response.text().await?;

                    if status.is_success() {
                        return Ok(body);
                    }

                    if is_retryable_status(status) && attempt < max_attempts {
                        tracing::warn!(
                            "⚠️ {} answered HTTP {}, retrying in {:?}",
                            carrier,
                            status,
                            self.settings.retry_delay
                        );
                        tokio::time::sleep(self.settings.retry_delay).await;
                        continue;
                    }

                    return Err(FreightError::CarrierStatus {
                        carrier,
                        status: status.as_u16(),
                        body: snippet(&body),
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_attempts => {
                    tracing::warn!(
                        "⚠️ {} request failed ({}), retrying in {:?}",
                        carrier,
                        e,
                        self.settings.retry_delay
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => return Err(FreightError::ApiError(e)),
            }
        }
    }
}

impl Default for HttpHelper {
    fn default() -> Self {
        Self::new(HttpSettings::default())
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn snippet(body: &str) -> String {
    if body.chars().count() <= BODY_SNIPPET_LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(BODY_SNIPPET_LIMIT).collect();
        format!("{}…", cut)
    }
}

/// 將 API 回傳的數字或數字字串統一轉成 f64
pub fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}
