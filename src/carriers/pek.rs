//! ПЭК (PEK) calculator: HTTP basic auth with login + API key.

use crate::carriers::{best_match, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::http::HttpHelper;
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://kabinet.pecom.ru/api/v1";

/// 1 = 公路運輸
const AUTO_TRANSPORTING: u8 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchSearch {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items: Vec<Branch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Branch {
    city_id: i64,
    city_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CargoItem {
    length: f64,
    width: f64,
    height: f64,
    volume: f64,
    weight: f64,
    max_size: f64,
    #[serde(rename = "isHP")]
    is_hard_packaging: bool,
    over_size: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculateRequest {
    sender_city_id: i64,
    receiver_city_id: i64,
    calc_date: String,
    is_pick_up: bool,
    is_delivery: bool,
    is_insurance: bool,
    is_insurance_price: f64,
    cargos: Vec<CargoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculateResponse {
    #[serde(default)]
    transfers: Vec<Transfer>,
    #[serde(default)]
    common_terms: Vec<Terms>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Transfer {
    transporting_type: u8,
    #[serde(default)]
    has_error: bool,
    error_message: Option<String>,
    cost_total: Option<f64>,
    #[serde(default)]
    services: Vec<TransferService>,
}

#[derive(Debug, Deserialize)]
struct TransferService {
    info: Option<String>,
    #[serde(rename = "serviceType")]
    service_type: Option<String>,
    cost: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Terms {
    transporting_type: u8,
    #[serde(default)]
    transporting: Vec<String>,
}

pub struct PekAdapter {
    http: HttpHelper,
    base_url: String,
    login: String,
    api_key: String,
}

impl PekAdapter {
    pub fn new(
        http: HttpHelper,
        base_url: impl Into<String>,
        login: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            login: login.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper) -> Result<Self> {
        require_resolved(CarrierId::Pek, &config.auth)?;
        match &config.auth {
            AuthConfig::Basic { username, password } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                username,
                password,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::Pek,
                message: format!("expected basic auth, got {}", other.kind()),
            }),
        }
    }

    async fn city_id(&self, name: &str) -> Result<i64> {
        let url = endpoint(&self.base_url, "/branches/findbytitle/");
        let search: BranchSearch = self
            .http
            .fetch_json(CarrierId::Pek, |client| {
                client
                    .post(&url)
                    .basic_auth(&self.login, Some(&self.api_key))
                    .json(&json!({ "title": name }))
            })
            .await?;

        if !search.success {
            return Err(FreightError::LocationNotFound {
                carrier: CarrierId::Pek,
                location: name.to_string(),
            });
        }

        best_match(&search.items, name, |b| b.city_title.as_deref())
            .map(|b| b.city_id)
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::Pek,
                location: name.to_string(),
            })
    }
}

fn cargos(shipment: &Shipment) -> Vec<CargoItem> {
    let hard_packaging = shipment.services.rigid_packaging;
    shipment
        .packages
        .iter()
        .flat_map(|p| {
            let (l, w, h) = (p.length_cm / 100.0, p.width_cm / 100.0, p.height_cm / 100.0);
            (0..p.quantity).map(move |_| CargoItem {
                length: l,
                width: w,
                height: h,
                volume: l * w * h,
                weight: p.weight_kg,
                max_size: l.max(w).max(h),
                is_hard_packaging: hard_packaging,
                over_size: false,
            })
        })
        .collect()
}

/// "2-3" 或 "4" 之類的期限字串
fn parse_terms(raw: &str) -> Option<TransitTime> {
    let numbers: Vec<u32> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect();
    match numbers.as_slice() {
        [] => None,
        [days] => Some(TransitTime::exact(*days)),
        [min, max, ..] => Some(TransitTime::new(*min, *max)),
    }
}

fn to_quote(response: CalculateResponse) -> Result<Quote> {
    let errors: Vec<String> = response
        .transfers
        .iter()
        .filter(|t| t.has_error)
        .filter_map(|t| t.error_message.clone())
        .collect();

    let transfer = response
        .transfers
        .iter()
        .filter(|t| !t.has_error && t.transporting_type == AUTO_TRANSPORTING)
        .filter(|t| t.cost_total.is_some())
        .min_by(|a, b| {
            a.cost_total
                .unwrap_or(f64::MAX)
                .total_cmp(&b.cost_total.unwrap_or(f64::MAX))
        })
        .ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::Pek,
            message: if errors.is_empty() {
                "no auto transfer in response".to_string()
            } else {
                errors.join("; ")
            },
        })?;

    let transit = response
        .common_terms
        .iter()
        .find(|t| t.transporting_type == transfer.transporting_type)
        .and_then(|t| t.transporting.first())
        .and_then(|raw| parse_terms(raw));

    let services = transfer
        .services
        .iter()
        .filter(|s| s.cost > 0.0)
        .map(|s| {
            let name = s
                .info
                .clone()
                .or_else(|| s.service_type.clone())
                .unwrap_or_else(|| "Услуга".to_string());
            ServiceLine::new(name, s.cost)
        })
        .collect();

    Ok(Quote::new(CarrierId::Pek, transfer.cost_total.unwrap_or_default())
        .with_transit(transit)
        .with_tariff("Автоперевозка")
        .with_services(services))
}

#[async_trait]
impl CarrierAdapter for PekAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::Pek
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let sender_city_id = self.city_id(&shipment.origin).await?;
        let receiver_city_id = self.city_id(&shipment.destination).await?;

        let request = CalculateRequest {
            sender_city_id,
            receiver_city_id,
            calc_date: Local::now().format("%Y-%m-%d").to_string(),
            is_pick_up: shipment.services.pickup_from_door,
            is_delivery: shipment.services.deliver_to_door,
            is_insurance: shipment.services.insured(),
            is_insurance_price: shipment.services.declared_value.unwrap_or_default(),
            cargos: cargos(shipment),
        };

        let url = endpoint(&self.base_url, "/calculator/calculateprice/");
        let response: CalculateResponse = self
            .http
            .fetch_json(CarrierId::Pek, |client| {
                client
                    .post(&url)
                    .basic_auth(&self.login, Some(&self.api_key))
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
    fn test_parse_terms() {
        assert_eq!(parse_terms("2-3"), Some(TransitTime::new(2, 3)));
        assert_eq!(parse_terms("5 дней"), Some(TransitTime::exact(5)));
        assert_eq!(parse_terms("—"), None);
    }

    #[test]
    fn test_to_quote_skips_errored_transfers() {
        let response: CalculateResponse = serde_json::from_value(json!({
            "transfers": [
                { "transportingType": 1, "hasError": true, "errorMessage": "Негабарит" },
                { "transportingType": 1, "hasError": false, "costTotal": 5120.0,
                  "services": [
                    { "info": "Перевозка", "cost": 4800.0 },
                    { "serviceType": "insurance", "cost": 320.0 },
                    { "info": "Забор", "cost": 0.0 }
                  ] },
                { "transportingType": 2, "hasError": false, "costTotal": 900.0 }
            ],
            "commonTerms": [{ "transportingType": 1, "transporting": ["3-5"] }]
        }))
        .unwrap();

        let quote = to_quote(response).unwrap();
        assert_eq!(quote.price, 5120.0);
        assert_eq!(quote.transit, Some(TransitTime::new(3, 5)));
        assert_eq!(quote.services.len(), 2);
        assert_eq!(quote.services[1].name, "insurance");
    }

    #[test]
    fn test_to_quote_reports_carrier_errors() {
        let response: CalculateResponse = serde_json::from_value(json!({
            "transfers": [{ "transportingType": 1, "hasError": true, "errorMessage": "Нет направления" }]
        }))
        .unwrap();

        match to_quote(response) {
            Err(FreightError::UnexpectedResponse { message, .. }) => assert_eq!(message, "Нет направления"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
