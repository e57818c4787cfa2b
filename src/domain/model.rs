use crate::core::aggregator::Comparison;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierId {
    Cdek,
    Dellin,
    Vozovoz,
    Pek,
    Kit,
    NordWheel,
    RailContinent,
}

impl CarrierId {
    pub const ALL: [CarrierId; 7] = [
        CarrierId::Cdek,
        CarrierId::Dellin,
        CarrierId::Vozovoz,
        CarrierId::Pek,
        CarrierId::Kit,
        CarrierId::NordWheel,
        CarrierId::RailContinent,
    ];

    /// 設定檔與 CLI 使用的小寫代號
    pub fn slug(&self) -> &'static str {
        match self {
            CarrierId::Cdek => "cdek",
            CarrierId::Dellin => "dellin",
            CarrierId::Vozovoz => "vozovoz",
            CarrierId::Pek => "pek",
            CarrierId::Kit => "kit",
            CarrierId::NordWheel => "nordwheel",
            CarrierId::RailContinent => "railcontinent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CarrierId::Cdek => "CDEK",
            CarrierId::Dellin => "Dellin",
            CarrierId::Vozovoz => "Vozovoz",
            CarrierId::Pek => "PEK",
            CarrierId::Kit => "Kit",
            CarrierId::NordWheel => "NordWheel",
            CarrierId::RailContinent => "RailContinent",
        }
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CarrierId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CarrierId::ALL
            .into_iter()
            .find(|id| id.slug() == wanted)
            .ok_or_else(|| format!("unknown carrier '{}'", s))
    }
}

/// 單一貨物規格，尺寸以公分、重量以公斤計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoPackage {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub quantity: u32,
}

impl CargoPackage {
    pub fn new(length_cm: f64, width_cm: f64, height_cm: f64, weight_kg: f64) -> Self {
        Self {
            length_cm,
            width_cm,
            height_cm,
            weight_kg,
            quantity: 1,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// 單件體積 (m³)
    pub fn volume_m3(&self) -> f64 {
        self.length_cm * self.width_cm * self.height_cm / 1_000_000.0
    }

    pub fn total_weight_kg(&self) -> f64 {
        self.weight_kg * f64::from(self.quantity)
    }

    pub fn total_volume_m3(&self) -> f64 {
        self.volume_m3() * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    pub pickup_from_door: bool,
    pub deliver_to_door: bool,
    /// 聲明價值 (RUB)，有值時要求保險
    pub declared_value: Option<f64>,
    pub rigid_packaging: bool,
}

impl ServiceOptions {
    pub fn insured(&self) -> bool {
        self.declared_value.map(|v| v > 0.0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub origin: String,
    pub destination: String,
    pub packages: Vec<CargoPackage>,
    #[serde(default)]
    pub services: ServiceOptions,
}

impl Shipment {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            packages: Vec::new(),
            services: ServiceOptions::default(),
        }
    }

    pub fn with_package(mut self, package: CargoPackage) -> Self {
        self.packages.push(package);
        self
    }

    pub fn with_services(mut self, services: ServiceOptions) -> Self {
        self.services = services;
        self
    }

    pub fn total_weight_kg(&self) -> f64 {
        self.packages.iter().map(CargoPackage::total_weight_kg).sum()
    }

    pub fn total_volume_m3(&self) -> f64 {
        self.packages.iter().map(CargoPackage::total_volume_m3).sum()
    }

    pub fn total_places(&self) -> u32 {
        self.packages.iter().map(|p| p.quantity).sum()
    }

    /// 所有貨物中最大的 (長, 寬, 高)
    pub fn max_dimensions_cm(&self) -> (f64, f64, f64) {
        self.packages.iter().fold((0.0, 0.0, 0.0), |(l, w, h), p| {
            (l.max(p.length_cm), w.max(p.width_cm), h.max(p.height_cm))
        })
    }

    /// 最重單件重量
    pub fn max_piece_weight_kg(&self) -> f64 {
        self.packages
            .iter()
            .map(|p| p.weight_kg)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitTime {
    pub min_days: u32,
    pub max_days: u32,
}

impl TransitTime {
    pub fn new(min_days: u32, max_days: u32) -> Self {
        Self {
            min_days: min_days.min(max_days),
            max_days: max_days.max(min_days),
        }
    }

    pub fn exact(days: u32) -> Self {
        Self::new(days, days)
    }
}

impl fmt::Display for TransitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min_days == self.max_days {
            write!(f, "{}", self.max_days)
        } else {
            write!(f, "{}-{}", self.min_days, self.max_days)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub name: String,
    pub price: f64,
}

impl ServiceLine {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// 正規化後的單一承運商報價
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub carrier: CarrierId,
    pub price: f64,
    pub currency: String,
    pub transit: Option<TransitTime>,
    pub tariff: Option<String>,
    pub services: Vec<ServiceLine>,
    #[serde(default)]
    pub breakdown_synthesized: bool,
}

impl Quote {
    pub fn new(carrier: CarrierId, price: f64) -> Self {
        Self {
            carrier,
            price,
            currency: "RUB".to_string(),
            transit: None,
            tariff: None,
            services: Vec::new(),
            breakdown_synthesized: false,
        }
    }

    pub fn with_transit(mut self, transit: Option<TransitTime>) -> Self {
        self.transit = transit;
        self
    }

    pub fn with_tariff(mut self, tariff: impl Into<String>) -> Self {
        self.tariff = Some(tariff.into());
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceLine>) -> Self {
        self.services = services;
        self
    }

    pub fn max_days(&self) -> Option<u32> {
        self.transit.map(|t| t.max_days)
    }
}

/// 比價結果與其表格輸出
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub shipment: Shipment,
    pub comparison: Comparison,
    pub csv_output: String,
    pub tsv_output: String,
    pub generated_at: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipment_aggregates() {
        let shipment = Shipment::new("Москва", "Казань")
            .with_package(CargoPackage::new(100.0, 50.0, 40.0, 20.0).with_quantity(2))
            .with_package(CargoPackage::new(30.0, 120.0, 10.0, 5.0));

        assert_eq!(shipment.total_places(), 3);
        assert!((shipment.total_weight_kg() - 45.0).abs() < 1e-9);
        assert!((shipment.total_volume_m3() - 0.436).abs() < 1e-9);
        assert_eq!(shipment.max_dimensions_cm(), (100.0, 120.0, 40.0));
        assert_eq!(shipment.max_piece_weight_kg(), 20.0);
    }

    #[test]
    fn test_carrier_slug_roundtrip() {
        for id in CarrierId::ALL {
            assert_eq!(id.slug().parse::<CarrierId>().unwrap(), id);
        }
        assert_eq!(" PEK ".parse::<CarrierId>().unwrap(), CarrierId::Pek);
        assert!("dhl".parse::<CarrierId>().is_err());
    }

    #[test]
    fn test_transit_time_normalizes_bounds() {
        let transit = TransitTime::new(5, 3);
        assert_eq!(transit.min_days, 3);
        assert_eq!(transit.max_days, 5);
        assert_eq!(transit.to_string(), "3-5");
        assert_eq!(TransitTime::exact(2).to_string(), "2");
    }

    #[test]
    fn test_insured_requires_positive_value() {
        let mut services = ServiceOptions::default();
        assert!(!services.insured());
        services.declared_value = Some(0.0);
        assert!(!services.insured());
        services.declared_value = Some(15000.0);
        assert!(services.insured());
    }
}
