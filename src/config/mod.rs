pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::aggregator::SortKey;
#[cfg(feature = "cli")]
use crate::domain::model::{CargoPackage, CarrierId, ServiceOptions, Shipment};
#[cfg(feature = "cli")]
use crate::utils::error::{FreightError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "freight-compare")]
#[command(about = "Compare freight quotes from Russian LTL carriers")]
pub struct CliConfig {
    #[arg(long, help = "TOML configuration file (built-in defaults when omitted)")]
    pub config: Option<String>,

    #[arg(long, help = "Origin city")]
    pub from: String,

    #[arg(long, help = "Destination city")]
    pub to: String,

    #[arg(long, default_value = "50", help = "Package length, cm")]
    pub length: f64,

    #[arg(long, default_value = "40", help = "Package width, cm")]
    pub width: f64,

    #[arg(long, default_value = "30", help = "Package height, cm")]
    pub height: f64,

    #[arg(long, help = "Package weight, kg")]
    pub weight: f64,

    #[arg(long, default_value = "1")]
    pub quantity: u32,

    #[arg(long)]
    pub door_pickup: bool,

    #[arg(long)]
    pub door_delivery: bool,

    #[arg(long, help = "Declared cargo value for insurance, RUB")]
    pub declared_value: Option<f64>,

    #[arg(long)]
    pub rigid_packaging: bool,

    #[arg(long, value_delimiter = ',', help = "Only query these carriers (slugs)")]
    pub carriers: Vec<String>,

    #[arg(long, default_value = "price", help = "price, days or carrier")]
    pub sort: SortKey,

    #[arg(long, help = "Save the comparison as a ZIP bundle")]
    pub save: bool,

    #[arg(long, help = "Output directory (overrides [output].path)")]
    pub output: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process memory and timing per phase")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn shipment(&self) -> Shipment {
        let package = CargoPackage::new(self.length, self.width, self.height, self.weight)
            .with_quantity(self.quantity);

        Shipment::new(self.from.trim(), self.to.trim())
            .with_package(package)
            .with_services(ServiceOptions {
                pickup_from_door: self.door_pickup,
                deliver_to_door: self.door_delivery,
                declared_value: self.declared_value,
                rigid_packaging: self.rigid_packaging,
            })
    }

    /// `--carriers` 解析成承運商清單；未指定時回傳 `None` 表示全部
    pub fn carrier_filter(&self) -> Result<Option<Vec<CarrierId>>> {
        if self.carriers.is_empty() {
            return Ok(None);
        }

        self.carriers
            .iter()
            .map(|slug| {
                slug.parse::<CarrierId>()
                    .map_err(|reason| FreightError::InvalidConfigValueError {
                        field: "carriers".to_string(),
                        value: slug.clone(),
                        reason,
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(config) = &self.config {
            validation::validate_path("config", config)?;
        }
        if let Some(output) = &self.output {
            validation::validate_path("output", output)?;
        }
        self.carrier_filter()?;
        self.shipment().validate()
    }
}
