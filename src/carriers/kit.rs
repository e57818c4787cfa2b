//! ТК КИТ (Kit) API 1.1: bearer token, cached city directory, order calculation.

use crate::carriers::{best_match, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::cache::TtlCache;
use crate::core::http::{json_number, HttpHelper};
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://capi.tk-kit.com";

#[derive(Debug, Clone, Deserialize)]
pub struct KitCity {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
struct Place {
    count_place: u32,
    weight: f64,
    length: f64,
    width: f64,
    height: f64,
    volume: f64,
}

#[derive(Debug, Serialize)]
struct CalculateRequest {
    city_pickup_code: String,
    city_delivery_code: String,
    declared_price: f64,
    insurance: u8,
    pick_up: u8,
    delivery: u8,
    places: Vec<Place>,
}

pub struct KitAdapter {
    http: HttpHelper,
    base_url: String,
    token: String,
    cities: TtlCache<Arc<Vec<KitCity>>>,
}

impl KitAdapter {
    pub fn new(
        http: HttpHelper,
        base_url: impl Into<String>,
        token: impl Into<String>,
        reference_ttl: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            cities: TtlCache::new(reference_ttl),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper, reference_ttl: Duration) -> Result<Self> {
        require_resolved(CarrierId::Kit, &config.auth)?;
        match &config.auth {
            AuthConfig::Bearer { token } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                token,
                reference_ttl,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::Kit,
                message: format!("expected bearer auth, got {}", other.kind()),
            }),
        }
    }

    /// 城市目錄整份下載後快取
    pub async fn cities(&self) -> Result<Arc<Vec<KitCity>>> {
        self.cities
            .get_or_refresh(|| async {
                let url = endpoint(&self.base_url, "/1.1/tdd/city/get-list");
                let cities: Vec<KitCity> = self
                    .http
                    .fetch_json(CarrierId::Kit, |client| {
                        client.post(&url).bearer_auth(&self.token).json(&json!({}))
                    })
                    .await?;
                tracing::info!("🏙️ Loaded {} Kit cities", cities.len());
                Ok(Arc::new(cities))
            })
            .await
    }

    async fn city_code(&self, name: &str) -> Result<String> {
        let cities = self.cities().await?;
        let wanted = name.trim().to_lowercase();
        let candidates: Vec<&KitCity> = cities
            .iter()
            .filter(|c| c.name.to_lowercase().starts_with(&wanted))
            .collect();

        best_match(&candidates, name, |c| Some(c.name.as_str()))
            .map(|c| c.code.clone())
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::Kit,
                location: name.to_string(),
            })
    }
}

fn places(shipment: &Shipment) -> Vec<Place> {
    shipment
        .packages
        .iter()
        .map(|p| Place {
            count_place: p.quantity,
            weight: p.weight_kg,
            length: p.length_cm,
            width: p.width_cm,
            height: p.height_cm,
            volume: p.volume_m3(),
        })
        .collect()
}

pub(crate) fn parse_calculation(body: &Value) -> Result<Quote> {
    let first = match body {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let standart = first
        .and_then(|v| v.get("standart"))
        .ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::Kit,
            message: "no standard tariff in response".to_string(),
        })?;

    let price = standart
        .get("cost")
        .and_then(json_number)
        .ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::Kit,
            message: "standart.cost is missing".to_string(),
        })?;

    let transit = standart
        .get("time")
        .and_then(json_number)
        .map(|days| TransitTime::exact(days.ceil() as u32));

    let services = standart
        .get("detail")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| {
                    let name = line.get("name").and_then(Value::as_str)?;
                    let price = line.get("price").and_then(json_number)?;
                    Some(ServiceLine::new(name, price))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Quote::new(CarrierId::Kit, price)
        .with_transit(transit)
        .with_tariff("Стандарт")
        .with_services(services))
}

#[async_trait]
impl CarrierAdapter for KitAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::Kit
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let request = CalculateRequest {
            city_pickup_code: self.city_code(&shipment.origin).await?,
            city_delivery_code: self.city_code(&shipment.destination).await?,
            declared_price: shipment.services.declared_value.unwrap_or_default(),
            insurance: u8::from(shipment.services.insured()),
            pick_up: u8::from(shipment.services.pickup_from_door),
            delivery: u8::from(shipment.services.deliver_to_door),
            places: places(shipment),
        };

        let url = endpoint(&self.base_url, "/1.1/order/calculate");
        let body: Value = self
            .http
            .fetch_json(CarrierId::Kit, |client| {
                client.post(&url).bearer_auth(&self.token).json(&request)
            })
            .await?;

        parse_calculation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calculation_array_response() {
        let body = json!([{
            "standart": {
                "cost": "3150.00",
                "time": 3,
                "detail": [
                    { "name": "Перевозка", "price": 2900 },
                    { "name": "Страхование", "price": "250" }
                ]
            },
            "express": { "cost": 5100, "time": 2 }
        }]);

        let quote = parse_calculation(&body).unwrap();
        assert_eq!(quote.price, 3150.0);
        assert_eq!(quote.transit, Some(TransitTime::exact(3)));
        assert_eq!(quote.services[1].price, 250.0);
    }

    #[test]
    fn test_parse_calculation_without_standard() {
        let body = json!([{ "express": { "cost": 5100 } }]);
        assert!(parse_calculation(&body).is_err());
    }
}
