//! Vozovoz price API.
//!
//! 單一 API 呼叫取得總價；API 沒有回傳服務明細時，
//! 以 [`breakdown`] 依比例合成，對齊官網的明細呈現。

use crate::carriers::{breakdown, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::http::{json_number, HttpHelper};
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://vozovoz.ru";

pub struct VozovozAdapter {
    http: HttpHelper,
    base_url: String,
    token: String,
}

impl VozovozAdapter {
    pub fn new(http: HttpHelper, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper) -> Result<Self> {
        require_resolved(CarrierId::Vozovoz, &config.auth)?;
        match &config.auth {
            AuthConfig::ApiKey { key } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                key,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::Vozovoz,
                message: format!("expected api_key auth, got {}", other.kind()),
            }),
        }
    }
}

fn point(location: &str, door: bool) -> Value {
    if door {
        json!({ "location": location, "address": location })
    } else {
        json!({ "location": location, "terminal": "default" })
    }
}

pub(crate) fn build_request(shipment: &Shipment) -> Value {
    let (length, width, height) = shipment.max_dimensions_cm();
    let mut cargo = json!({
        "dimension": {
            "quantity": shipment.total_places(),
            "volume": shipment.total_volume_m3(),
            "weight": shipment.total_weight_kg(),
            "max": {
                "length": length / 100.0,
                "width": width / 100.0,
                "height": height / 100.0,
                "weight": shipment.max_piece_weight_kg(),
            }
        }
    });
    if let Some(value) = shipment.services.declared_value.filter(|_| shipment.services.insured()) {
        cargo["insurance"] = json!(value);
    }
    if shipment.services.rigid_packaging {
        cargo["wrapping"] = json!({ "hardPackageVolume": shipment.total_volume_m3() });
    }

    json!({
        "object": "price",
        "action": "get",
        "params": {
            "cargo": cargo,
            "gateway": {
                "dispatch": { "point": point(&shipment.origin, shipment.services.pickup_from_door) },
                "destination": { "point": point(&shipment.destination, shipment.services.deliver_to_door) },
            }
        }
    })
}

pub(crate) fn parse_price(body: &Value) -> Result<Quote> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(FreightError::UnexpectedResponse {
            carrier: CarrierId::Vozovoz,
            message,
        });
    }

    let response = body.get("response").unwrap_or(body);
    let price = response
        .get("price")
        .and_then(json_number)
        .ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::Vozovoz,
            message: "response.price is missing".to_string(),
        })?;

    let transit = response.get("deliveryTime").and_then(|t| {
        let from = t.get("from").and_then(Value::as_u64)?;
        let to = t.get("to").and_then(Value::as_u64).unwrap_or(from);
        Some(TransitTime::new(
            u32::try_from(from).ok()?,
            u32::try_from(to).ok()?,
        ))
    });

    let services = response
        .get("service")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name").and_then(Value::as_str)?;
                    let price = item.get("price").and_then(json_number)?;
                    Some(ServiceLine::new(name, price))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Quote::new(CarrierId::Vozovoz, price)
        .with_transit(transit)
        .with_services(services))
}

#[async_trait]
impl CarrierAdapter for VozovozAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::Vozovoz
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let request = build_request(shipment);
        let url = endpoint(&self.base_url, "/api/");
        let body: Value = self
            .http
            .fetch_json(CarrierId::Vozovoz, |client| {
                client
                    .post(&url)
                    .query(&[("token", self.token.as_str())])
                    .json(&request)
            })
            .await?;

        let mut quote = parse_price(&body)?;
        breakdown::fill_missing(&mut quote, &shipment.services);
        if quote.breakdown_synthesized {
            tracing::debug!("Vozovoz returned no service lines, synthesized {}", quote.services.len());
        }
        Ok(quote)
    }
}
