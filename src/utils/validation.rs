use crate::domain::model::Shipment;
use crate::utils::error::{FreightError, Result};
use url::Url;

/// 承運商一般接受的單件上限
const MAX_PIECE_WEIGHT_KG: f64 = 20_000.0;
const MAX_SIDE_CM: f64 = 1_500.0;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(FreightError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FreightError::ValidationError {
            message: format!("{} cannot be empty or whitespace-only", field_name),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(FreightError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

fn validate_measure(field_name: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > max {
        return Err(FreightError::ValidationError {
            message: format!("{} must be within (0, {}], got {}", field_name, max, value),
        });
    }
    Ok(())
}

impl Validate for Shipment {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("origin", &self.origin)?;
        validate_non_empty_string("destination", &self.destination)?;

        if self.packages.is_empty() {
            return Err(FreightError::ValidationError {
                message: "shipment needs at least one package".to_string(),
            });
        }

        for (index, package) in self.packages.iter().enumerate() {
            validate_measure(&format!("packages[{}].length_cm", index), package.length_cm, MAX_SIDE_CM)?;
            validate_measure(&format!("packages[{}].width_cm", index), package.width_cm, MAX_SIDE_CM)?;
            validate_measure(&format!("packages[{}].height_cm", index), package.height_cm, MAX_SIDE_CM)?;
            validate_measure(
                &format!("packages[{}].weight_kg", index),
                package.weight_kg,
                MAX_PIECE_WEIGHT_KG,
            )?;
            if package.quantity == 0 {
                return Err(FreightError::ValidationError {
                    message: format!("packages[{}].quantity must be at least 1", index),
                });
            }
        }

        if let Some(value) = self.services.declared_value {
            if !value.is_finite() || value < 0.0 {
                return Err(FreightError::ValidationError {
                    message: format!("declared value must be non-negative, got {}", value),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CargoPackage;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("base_url", "https://api.cdek.ru").is_ok());
        assert!(validate_url("base_url", "http://127.0.0.1:8080").is_ok());
        assert!(validate_url("base_url", "").is_err());
        assert!(validate_url("base_url", "invalid-url").is_err());
        assert!(validate_url("base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("carrier_deadline_seconds", 5, 1).is_ok());
        assert!(validate_positive_number("carrier_deadline_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_shipment() {
        let shipment = Shipment::new("Москва", "Новосибирск")
            .with_package(CargoPackage::new(120.0, 80.0, 100.0, 150.0));
        assert!(shipment.validate().is_ok());

        let no_packages = Shipment::new("Москва", "Новосибирск");
        assert!(no_packages.validate().is_err());

        let blank_origin = Shipment::new("  ", "Новосибирск")
            .with_package(CargoPackage::new(10.0, 10.0, 10.0, 1.0));
        assert!(blank_origin.validate().is_err());

        let zero_weight = Shipment::new("Москва", "Омск")
            .with_package(CargoPackage::new(10.0, 10.0, 10.0, 0.0));
        assert!(zero_weight.validate().is_err());

        let zero_quantity = Shipment::new("Москва", "Омск")
            .with_package(CargoPackage::new(10.0, 10.0, 10.0, 1.0).with_quantity(0));
        assert!(zero_quantity.validate().is_err());
    }
}
