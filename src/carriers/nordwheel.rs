//! NordWheel calculator (X-Api-Key header).

use crate::carriers::{best_match, breakdown, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::http::HttpHelper;
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://nordw.ru";
const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct City {
    id: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CargoBlock {
    weight: f64,
    volume: f64,
    places: u32,
    max_length: f64,
    max_width: f64,
    max_height: f64,
}

#[derive(Debug, Serialize)]
struct ServicesBlock {
    pickup: bool,
    delivery: bool,
    insurance_value: Option<f64>,
    hard_packaging: bool,
}

#[derive(Debug, Serialize)]
struct CalculateRequest {
    from_city_id: i64,
    to_city_id: i64,
    cargo: CargoBlock,
    services: ServicesBlock,
}

#[derive(Debug, Deserialize)]
struct Calculation {
    total: f64,
    days_min: Option<u32>,
    days_max: Option<u32>,
    #[serde(default)]
    items: Vec<CalculationItem>,
}

#[derive(Debug, Deserialize)]
struct CalculationItem {
    title: String,
    amount: f64,
}

pub struct NordWheelAdapter {
    http: HttpHelper,
    base_url: String,
    api_key: String,
}

impl NordWheelAdapter {
    pub fn new(http: HttpHelper, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper) -> Result<Self> {
        require_resolved(CarrierId::NordWheel, &config.auth)?;
        match &config.auth {
            AuthConfig::ApiKey { key } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                key,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::NordWheel,
                message: format!("expected api_key auth, got {}", other.kind()),
            }),
        }
    }

    async fn city_id(&self, name: &str) -> Result<i64> {
        let url = endpoint(&self.base_url, "/api/v1/cities");
        let envelope: Envelope<Vec<City>> = self
            .http
            .fetch_json(CarrierId::NordWheel, |client| {
                client
                    .get(&url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .query(&[("search", name)])
            })
            .await?;

        let cities = envelope.data.unwrap_or_default();
        best_match(&cities, name, |c| Some(c.name.as_str()))
            .map(|c| c.id)
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::NordWheel,
                location: name.to_string(),
            })
    }
}

fn build_request(shipment: &Shipment, from_city_id: i64, to_city_id: i64) -> CalculateRequest {
    let (max_length, max_width, max_height) = shipment.max_dimensions_cm();
    CalculateRequest {
        from_city_id,
        to_city_id,
        cargo: CargoBlock {
            weight: shipment.total_weight_kg(),
            volume: shipment.total_volume_m3(),
            places: shipment.total_places(),
            max_length,
            max_width,
            max_height,
        },
        services: ServicesBlock {
            pickup: shipment.services.pickup_from_door,
            delivery: shipment.services.deliver_to_door,
            insurance_value: shipment.services.declared_value.filter(|v| *v > 0.0),
            hard_packaging: shipment.services.rigid_packaging,
        },
    }
}

fn to_quote(calculation: Calculation) -> Quote {
    let transit = match (calculation.days_min, calculation.days_max) {
        (Some(min), Some(max)) => Some(TransitTime::new(min, max)),
        (Some(days), None) | (None, Some(days)) => Some(TransitTime::exact(days)),
        (None, None) => None,
    };
    let services = calculation
        .items
        .into_iter()
        .map(|item| ServiceLine::new(item.title, item.amount))
        .collect();

    Quote::new(CarrierId::NordWheel, calculation.total)
        .with_transit(transit)
        .with_services(services)
}

#[async_trait]
impl CarrierAdapter for NordWheelAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::NordWheel
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let from = self.city_id(&shipment.origin).await?;
        let to = self.city_id(&shipment.destination).await?;
        let request = build_request(shipment, from, to);

        let url = endpoint(&self.base_url, "/api/v1/calculate");
        let envelope: Envelope<Calculation> = self
            .http
            .fetch_json(CarrierId::NordWheel, |client| {
                client
                    .post(&url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .json(&request)
            })
            .await?;

        let calculation = envelope.data.ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::NordWheel,
            message: envelope
                .message
                .unwrap_or_else(|| "calculation has no data".to_string()),
        })?;

        let mut quote = to_quote(calculation);
        breakdown::fill_missing(&mut quote, &shipment.services);
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CargoPackage;

    #[test]
    fn test_build_request_aggregates_cargo() {
        let shipment = Shipment::new("Мурманск", "Москва")
            .with_package(CargoPackage::new(100.0, 100.0, 100.0, 80.0).with_quantity(2));
        let request = build_request(&shipment, 1, 2);
        assert_eq!(request.cargo.places, 2);
        assert_eq!(request.cargo.weight, 160.0);
        assert_eq!(request.cargo.volume, 2.0);
        assert_eq!(request.services.insurance_value, None);
    }

    #[test]
    fn test_to_quote_single_day_bound() {
        let calculation: Calculation = serde_json::from_value(serde_json::json!({
            "total": 7400.0,
            "days_max": 6
        }))
        .unwrap();
        let quote = to_quote(calculation);
        assert_eq!(quote.transit, Some(TransitTime::exact(6)));
        assert!(quote.services.is_empty());
    }
}
