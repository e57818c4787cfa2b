//! RailContinent rail freight calculator (HTTP basic auth).

use crate::carriers::{best_match, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::http::HttpHelper;
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://railcontinent.ru";

#[derive(Debug, Deserialize)]
struct Station {
    code: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CalculateRequest<'a> {
    departure: &'a str,
    destination: &'a str,
    weight: f64,
    volume: f64,
    places: u32,
    declared_value: f64,
    door_pickup: bool,
    door_delivery: bool,
}

#[derive(Debug, Deserialize)]
struct CalculateResponse {
    success: bool,
    message: Option<String>,
    result: Option<CalculateResult>,
}

#[derive(Debug, Deserialize)]
struct CalculateResult {
    price: f64,
    term: Option<String>,
    #[serde(default)]
    services: Vec<ResultService>,
}

#[derive(Debug, Deserialize)]
struct ResultService {
    name: String,
    cost: f64,
}

pub struct RailContinentAdapter {
    http: HttpHelper,
    base_url: String,
    login: String,
    password: String,
}

impl RailContinentAdapter {
    pub fn new(
        http: HttpHelper,
        base_url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper) -> Result<Self> {
        require_resolved(CarrierId::RailContinent, &config.auth)?;
        match &config.auth {
            AuthConfig::Basic { username, password } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                username,
                password,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::RailContinent,
                message: format!("expected basic auth, got {}", other.kind()),
            }),
        }
    }

    async fn station_code(&self, name: &str) -> Result<String> {
        let url = endpoint(&self.base_url, "/api/cities");
        let stations: Vec<Station> = self
            .http
            .fetch_json(CarrierId::RailContinent, |client| {
                client
                    .get(&url)
                    .basic_auth(&self.login, Some(&self.password))
                    .query(&[("name", name)])
            })
            .await?;

        best_match(&stations, name, |s| Some(s.name.as_str()))
            .map(|s| s.code.clone())
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::RailContinent,
                location: name.to_string(),
            })
    }
}

/// 期限字串形如 "5-7" 或 "от 5 до 7 суток"
fn parse_term(raw: &str) -> Option<TransitTime> {
    let mut numbers = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse::<u32>().ok());
    let first = numbers.next()?;
    Some(match numbers.next() {
        Some(second) => TransitTime::new(first, second),
        None => TransitTime::exact(first),
    })
}

fn to_quote(response: CalculateResponse) -> Result<Quote> {
    let result = match (response.success, response.result) {
        (true, Some(result)) => result,
        _ => {
            return Err(FreightError::UnexpectedResponse {
                carrier: CarrierId::RailContinent,
                message: response
                    .message
                    .unwrap_or_else(|| "calculation failed".to_string()),
            })
        }
    };

    let services = result
        .services
        .into_iter()
        .map(|s| ServiceLine::new(s.name, s.cost))
        .collect();

    Ok(Quote::new(CarrierId::RailContinent, result.price)
        .with_transit(result.term.as_deref().and_then(parse_term))
        .with_tariff("Ж/Д сборный груз")
        .with_services(services))
}

#[async_trait]
impl CarrierAdapter for RailContinentAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::RailContinent
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let departure = self.station_code(&shipment.origin).await?;
        let destination = self.station_code(&shipment.destination).await?;

        let request = CalculateRequest {
            departure: &departure,
            destination: &destination,
            weight: shipment.total_weight_kg(),
            volume: shipment.total_volume_m3(),
            places: shipment.total_places(),
            declared_value: shipment.services.declared_value.unwrap_or_default(),
            door_pickup: shipment.services.pickup_from_door,
            door_delivery: shipment.services.deliver_to_door,
        };

        let url = endpoint(&self.base_url, "/api/calculate");
        let response: CalculateResponse = self
            .http
            .fetch_json(CarrierId::RailContinent, |client| {
                client
                    .post(&url)
                    .basic_auth(&self.login, Some(&self.password))
                    .json(&request)
            })
            .await?;

        to_quote(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_term() {
        assert_eq!(parse_term("5-7"), Some(TransitTime::new(5, 7)));
        assert_eq!(parse_term("от 5 до 7 суток"), Some(TransitTime::new(5, 7)));
        assert_eq!(parse_term("10"), Some(TransitTime::exact(10)));
        assert_eq!(parse_term("по запросу"), None);
    }

    #[test]
    fn test_unsuccessful_response_is_error() {
        let response: CalculateResponse = serde_json::from_value(serde_json::json!({
            "success": false,
            "message": "Станция не обслуживается"
        }))
        .unwrap();
        assert!(matches!(
            to_quote(response),
            Err(FreightError::UnexpectedResponse { .. })
        ));
    }
}
