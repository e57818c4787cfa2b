//! Деловые Линии (Dellin) calculator v2.
//!
//! 參考資料 (包裝類型、貨物類別 UID) 以 TTL 快取保存；
//! 貨物類別查詢失敗時退回固定的「Сборный груз」UID。

use crate::carriers::{best_match, endpoint, require_resolved};
use crate::config::toml_config::{AuthConfig, CarrierConfig};
use crate::core::cache::TtlCache;
use crate::core::http::{json_number, HttpHelper};
use crate::domain::model::{CarrierId, Quote, ServiceLine, Shipment, TransitTime};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.dellin.ru";

pub const FREIGHT_SEARCH: &str = "Сборный груз";
pub const FALLBACK_FREIGHT_UID: &str = "0xa4a904bd5a0f1e2e4d4e3b6fb2a6a10d";
const RIGID_PACKAGE_MARKER: &str = "жесткая";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageType {
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ReferenceLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct KladrResponse {
    #[serde(default)]
    cities: Vec<KladrCity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KladrCity {
    code: String,
    search_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FreightSearchResponse {
    #[serde(default)]
    data: Vec<FreightType>,
}

#[derive(Debug, Deserialize)]
struct FreightType {
    uid: String,
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Cargo {
    quantity: u32,
    /// 以下尺寸單位為公尺
    length: f64,
    width: f64,
    height: f64,
    total_volume: f64,
    total_weight: f64,
    weight: f64,
    #[serde(rename = "freightUID")]
    freight_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    insurance: Option<Value>,
}

pub struct DellinAdapter {
    http: HttpHelper,
    base_url: String,
    appkey: String,
    package_types: TtlCache<Vec<PackageType>>,
    freight_uid: TtlCache<String>,
}

impl DellinAdapter {
    pub fn new(
        http: HttpHelper,
        base_url: impl Into<String>,
        appkey: impl Into<String>,
        reference_ttl: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            appkey: appkey.into(),
            package_types: TtlCache::new(reference_ttl),
            freight_uid: TtlCache::new(reference_ttl),
        }
    }

    pub fn from_config(config: &CarrierConfig, http: HttpHelper, reference_ttl: Duration) -> Result<Self> {
        require_resolved(CarrierId::Dellin, &config.auth)?;
        match &config.auth {
            AuthConfig::ApiKey { key } => Ok(Self::new(
                http,
                config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
                key,
                reference_ttl,
            )),
            other => Err(FreightError::CredentialsMissing {
                carrier: CarrierId::Dellin,
                message: format!("expected api_key auth, got {}", other.kind()),
            }),
        }
    }

    /// 包裝類型清單：API 先回傳 CSV 下載連結，再下載並解析 CSV
    pub async fn package_types(&self) -> Result<Vec<PackageType>> {
        self.package_types
            .get_or_refresh(|| async {
                let url = endpoint(&self.base_url, "/v1/references/packages.json");
                let link: ReferenceLink = self
                    .http
                    .fetch_json(CarrierId::Dellin, |client| {
                        client.post(&url).json(&json!({ "appkey": self.appkey }))
                    })
                    .await?;

                let csv_body = self
                    .http
                    .fetch_text(CarrierId::Dellin, |client| client.get(&link.url))
                    .await?;
                let types = parse_package_csv(&csv_body)?;
                tracing::info!("📦 Loaded {} Dellin package types", types.len());
                Ok(types)
            })
            .await
    }

    /// 貨物類別 UID，查詢失敗時使用固定值
    pub async fn freight_uid(&self) -> String {
        let result = self
            .freight_uid
            .get_or_refresh(|| async {
                let url = endpoint(&self.base_url, "/v1/references/freight_types/search.json");
                let response: FreightSearchResponse = self
                    .http
                    .fetch_json(CarrierId::Dellin, |client| {
                        client.post(&url).json(&json!({
                            "appkey": self.appkey,
                            "searchString": FREIGHT_SEARCH,
                        }))
                    })
                    .await?;

                best_match(&response.data, FREIGHT_SEARCH, |f| f.name.as_deref())
                    .map(|f| f.uid.clone())
                    .ok_or_else(|| FreightError::UnexpectedResponse {
                        carrier: CarrierId::Dellin,
                        message: "freight type search returned nothing".to_string(),
                    })
            })
            .await;

        match result {
            Ok(uid) => uid,
            Err(e) => {
                tracing::warn!("⚠️ Dellin freight type lookup failed ({}), using fallback UID", e);
                FALLBACK_FREIGHT_UID.to_string()
            }
        }
    }

    async fn city_code(&self, name: &str) -> Result<String> {
        let url = endpoint(&self.base_url, "/v2/public/kladr.json");
        let response: KladrResponse = self
            .http
            .fetch_json(CarrierId::Dellin, |client| {
                client.post(&url).json(&json!({
                    "appkey": self.appkey,
                    "q": name,
                    "limit": 5,
                }))
            })
            .await?;

        best_match(&response.cities, name, |c| c.search_string.as_deref())
            .map(|c| c.code.clone())
            .ok_or_else(|| FreightError::LocationNotFound {
                carrier: CarrierId::Dellin,
                location: name.to_string(),
            })
    }

    async fn rigid_package_uid(&self) -> Option<String> {
        match self.package_types().await {
            Ok(types) => types
                .into_iter()
                .find(|t| t.name.to_lowercase().contains(RIGID_PACKAGE_MARKER))
                .map(|t| t.uid),
            Err(e) => {
                tracing::warn!("⚠️ Dellin package types unavailable: {}", e);
                None
            }
        }
    }

    async fn build_request(&self, shipment: &Shipment, produce_date: NaiveDate) -> Result<Value> {
        let derival_code = self.city_code(&shipment.origin).await?;
        let arrival_code = self.city_code(&shipment.destination).await?;
        let freight_uid = self.freight_uid().await;

        let (length, width, height) = shipment.max_dimensions_cm();
        let insurance = shipment
            .services
            .declared_value
            .filter(|_| shipment.services.insured())
            .map(|value| json!({ "statedValue": value, "term": true }));

        let cargo = Cargo {
            quantity: shipment.total_places(),
            length: length / 100.0,
            width: width / 100.0,
            height: height / 100.0,
            total_volume: shipment.total_volume_m3(),
            total_weight: shipment.total_weight_kg(),
            weight: shipment.max_piece_weight_kg(),
            freight_uid,
            insurance,
        };

        let mut delivery = json!({
            "deliveryType": { "type": "auto" },
            "derival": location_block(&derival_code, &shipment.origin, shipment.services.pickup_from_door, Some(produce_date)),
            "arrival": location_block(&arrival_code, &shipment.destination, shipment.services.deliver_to_door, None),
        });

        if shipment.services.rigid_packaging {
            match self.rigid_package_uid().await {
                Some(uid) => {
                    delivery["packages"] = json!([{ "uid": uid, "count": shipment.total_places() }]);
                }
                None => tracing::warn!("⚠️ Dellin has no rigid packaging type, requesting without it"),
            }
        }

        Ok(json!({
            "appkey": self.appkey,
            "delivery": delivery,
            "cargo": cargo,
        }))
    }
}

fn location_block(code: &str, name: &str, door: bool, produce_date: Option<NaiveDate>) -> Value {
    let mut block = if door {
        json!({ "variant": "address", "city": code, "address": { "search": name } })
    } else {
        json!({ "variant": "terminal", "city": code })
    };
    if let Some(date) = produce_date {
        block["produceDate"] = json!(date.format("%Y-%m-%d").to_string());
    }
    block
}

pub fn parse_package_csv(body: &str) -> Result<Vec<PackageType>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let mut types = Vec::new();
    for row in reader.deserialize::<PackageType>() {
        types.push(row?);
    }
    Ok(types)
}

fn component_price(data: &Value, key: &str) -> Option<f64> {
    data.get(key)
        .and_then(|v| v.get("price").or(Some(v)))
        .and_then(json_number)
        .filter(|p| *p > 0.0)
}

fn transit_from_dates(data: &Value, produce_date: NaiveDate) -> Option<TransitTime> {
    let dates = data.get("orderDates")?;
    let arrival = ["giveoutFromOspReceiver", "arrivalToOspReceiver", "derivalToAddress"]
        .iter()
        .filter_map(|key| dates.get(*key).and_then(Value::as_str))
        .find_map(|raw| NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok())?;

    let days = (arrival - produce_date).num_days();
    u32::try_from(days).ok().map(TransitTime::exact)
}

pub(crate) fn parse_calculation(body: &Value, produce_date: NaiveDate) -> Result<Quote> {
    let data = body.get("data").ok_or_else(|| FreightError::UnexpectedResponse {
        carrier: CarrierId::Dellin,
        message: "response has no data block".to_string(),
    })?;

    let price = data
        .get("price")
        .and_then(json_number)
        .ok_or_else(|| FreightError::UnexpectedResponse {
            carrier: CarrierId::Dellin,
            message: "data.price is missing".to_string(),
        })?;

    let services: Vec<ServiceLine> = [
        ("intercity", "Межтерминальная перевозка"),
        ("derival", "Забор груза"),
        ("arrival", "Доставка груза"),
        ("packages", "Упаковка"),
        ("insurance", "Страхование"),
        ("notify", "Уведомления"),
    ]
    .iter()
    .filter_map(|(key, name)| component_price(data, key).map(|p| ServiceLine::new(*name, p)))
    .collect();

    Ok(Quote::new(CarrierId::Dellin, price)
        .with_transit(transit_from_dates(data, produce_date))
        .with_tariff("Авто")
        .with_services(services))
}

#[async_trait]
impl CarrierAdapter for DellinAdapter {
    fn id(&self) -> CarrierId {
        CarrierId::Dellin
    }

    async fn quote(&self, shipment: &Shipment) -> Result<Quote> {
        let produce_date = Local::now().date_naive();
        let request = self.build_request(shipment, produce_date).await?;
        tracing::debug!("Dellin calculator request: {}", request);

        let url = endpoint(&self.base_url, "/v2/calculator.json");
        let body: Value = self
            .http
            .fetch_json(CarrierId::Dellin, |client| client.post(&url).json(&request))
            .await?;

        parse_calculation(&body, produce_date)
    }
}
