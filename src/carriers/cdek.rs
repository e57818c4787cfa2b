//! CDEK API v2: OAuth client-credentials token, city lookup, tariff list.

use crate::carriers::{best_match, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::cache::TtlCache;
use crate::core::http::HttpHelper;
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.cdek.ru";

/// 提前這麼多秒視為過期，避免送出即將失效的 token
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct City {
    code: u64,
    city: Option<String>,
}

#[derive(Debug, Serialize)]
struct Location {
    code: u64,
}

#[derive(Debug, Serialize)]
struct Package {
    /// 公克
    weight: u64,
    length: u64,
    width: u64,
    height: u64,
}

#[derive(Debug, Serialize)]
struct TariffListRequest {
    from_location: Location,
    to_location: Location,
    packages: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct TariffListResponse {
    #[serde(default)]
    tariff_codes: Vec<Tariff>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct Tariff {
    tariff_code: u32,
    tariff_name: String,
    delivery_mode: Option<u8>,
    delivery_sum: f64,
    period_min: Option<u32>,
    period_max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: Option<String>,
    message: String,
}

pub struct CdekAdapter {
    http: HttpHelper,
    base_url: String,
    client_id: String,
    client_secret: String,
    token_ttl: Duration,
    token: TtlCache<String>,
}

impl CdekAdapter {
    pub fn new(
        http: HttpHelper,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_ttl,
            token: TtlCache::new(token_ttl),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper, token_ttl: Duration) -> Result<Self> {
        require_resolved(CarrierId::Cdek, &config.auth)?;
        match &config.auth {
            AuthConfig::ClientCredentials {
                client_id,
                client_secret,
            } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                client_id,
                client_secret,
                token_ttl,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::Cdek,
                message: format!("expected client_credentials auth, got {}", other.kind()),
            }),
        }
    }

    async fn access_token(&self) -> Result<String> {
        self.token
            .get_or_refresh_with_ttl(|| async {
                tracing::debug!("Requesting CDEK access token");
                let url = endpoint(&self.base_url, "/v2/oauth/token");
                let response: TokenResponse = self
                    .http
                    .fetch_json(CarrierId::Cdek, |client| {
                        client.post(&url).form(&[
                            ("grant_type", "client_credentials"),
                            ("client_id", self.client_id.as_str()),
                            ("client_secret", self.client_secret.as_str()),
                        ])
                    })
                    .await?;

                let ttl = response.expires_in.map(token_lifetime).unwrap_or(self.token_ttl);
                Ok((response.access_token, ttl))
            })
            .await
    }

    async fn city_code(&self, token: &str, name: &str) -> Result<u64> {
        let url = endpoint(&self.base_url, "/v2/location/cities");
        let cities: Vec<City> = self
            .http
            .fetch_json(CarrierId::Cdek, |client| {
                client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("city", name), ("country_codes", "RU"), ("size", "5")])
            })
            .await?;

        best_match(&cities, name, |c| c.city.as_deref())
            .map(|c| c.code)
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::Cdek,
                location: name.to_string(),
            })
    }

    async fn tariffs(&self, token: &str, request: &TariffListRequest) -> Result<TariffListResponse> {
        let url = endpoint(&self.base_url, "/v2/calculator/tarifflist");
        self.http
            .fetch_json(CarrierId::Cdek, |client| {
                client.post(&url).bearer_auth(token).json(request)
            })
            .await
    }

    async fn quote_with_token(&self, token: &str, shipment: &Shipment) -> Result<Quote> {
        let from = self.city_code(token, &shipment.origin).await?;
        let to = self.city_code(token, &shipment.destination).await?;
        tracing::debug!("CDEK locations resolved: {} -> {}", from, to);

        let request = TariffListRequest {
            from_location: Location { code: from },
            to_location: Location { code: to },
            packages: packages(shipment),
        };
        let response = self.tariffs(token, &request).await?;

        let wanted_mode = delivery_mode(shipment);
        let cheapest = response
            .tariff_codes
            .iter()
            .filter(|t| t.delivery_mode.map(|m| m == wanted_mode).unwrap_or(true))
            .min_by(|a, b| a.delivery_sum.total_cmp(&b.delivery_sum));

        let Some(tariff) = cheapest else {
            let message = response
                .errors
                .iter()
                .map(|e| match &e.code {
                    Some(code) => format!("{}: {}", code, e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FreightError::UnexpectedResponse {
                carrier: CarrierId::Cdek,
                message: if message.is_empty() {
                    format!("no tariff for delivery mode {}", wanted_mode)
                } else {
                    message
                },
            });
        };

        let transit = match (tariff.period_min, tariff.period_max) {
            (Some(min), Some(max)) => Some(TransitTime::new(min, max)),
            (Some(days), None) | (None, Some(days)) => Some(TransitTime::exact(days)),
            (None, None) => None,
        };

        Ok(Quote::new(CarrierId::Cdek, tariff.delivery_sum)
            .with_transit(transit)
            .with_tariff(format!("{} ({})", tariff.tariff_name, tariff.tariff_code))
            .with_services(vec![ServiceLine::new(
                tariff.tariff_name.clone(),
                tariff.delivery_sum,
            )]))
    }
}

/// 扣掉安全邊際；壽命太短時改用一半，至少 1 秒
fn token_lifetime(expires_in: u64) -> Duration {
    let with_margin = expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
    Duration::from_secs(with_margin.max(expires_in / 2).max(1))
}

/// CDEK 的 delivery_mode: 1 門-門, 2 門-站, 3 站-門, 4 站-站
fn delivery_mode(shipment: &Shipment) -> u8 {
    match (shipment.services.pickup_from_door, shipment.services.deliver_to_door) {
        (true, true) => 1,
        (true, false) => 2,
        (false, true) => 3,
        (false, false) => 4,
    }
}

fn packages(shipment: &Shipment) -> Vec<Package> {
    shipment
        .packages
        .iter()
        .flat_map(|p| {
            (0..p.quantity).map(move |_| Package {
                weight: (p.weight_kg * 1000.0).round() as u64,
                length: p.length_cm.ceil() as u64,
                width: p.width_cm.ceil() as u64,
                height: p.height_cm.ceil() as u64,
            })
        })
        .collect()
}

#[async_trait]
impl CarrierAdapter for CdekAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::Cdek
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let token = self.access_token().await?;
        match self.quote_with_token(&token, shipment).await {
            Err(FreightError::CarrierStatus { status: 401, .. }) => {
                tracing::warn!("⚠️ CDEK rejected cached token, requesting a new one");
                self.token.invalidate().await;
                let token = self.access_token().await?;
                self.quote_with_token(&token, shipment).await
            }
            other => other,
        }
    }
}
