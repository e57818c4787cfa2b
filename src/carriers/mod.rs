//! 各承運商報價介面卡。
//!
//! 每個介面卡負責認證、地點代碼查詢、報價請求，並把回應轉成 [`Quote`](crate::domain::model::Quote)。

pub mod breakdown;
pub mod cdek;
pub mod dellin;
pub mod kit;
pub mod nordwheel;
pub mod pek;
pub mod railcontinent;
pub mod vozovoz;

pub use cdek::CdekAdapter;
pub use dellin::DellinAdapter;
pub use kit::KitAdapter;
pub use nordwheel::NordWheelAdapter;
pub use pek::PekAdapter;
pub use railcontinent::RailContinentAdapter;
pub use vozovoz::VozovozAdapter;

use crate::config::toml_config::{AuthConfig, FreightConfig};
use crate::core::http::HttpHelper;
use crate::domain::model::CarrierId;
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{FreightError, Result};
use std::sync::Arc;

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn require_resolved(carrier: CarrierId, auth: &AuthConfig) -> Result<()> {
    if auth.is_resolved() {
        Ok(())
    } else {
        Err(FreightError::CredentialsMissing {
            carrier,
            message: format!("{} auth has empty or unresolved values", auth.kind()),
        })
    }
}

/// 名稱完全相符 (不分大小寫) 的優先，否則取第一筆
pub(crate) fn best_match<'a, T>(
    items: &'a [T],
    name: &str,
    item_name: impl Fn(&T) -> Option<&str>,
) -> Option<&'a T> {
    let wanted = name.trim().to_lowercase();
    items
        .iter()
        .find(|item| {
            item_name(item)
                .map(|n| n.trim().to_lowercase() == wanted)
                .unwrap_or(false)
        })
        .or_else(|| items.first())
}

/// 依配置建立介面卡；憑證未設定的承運商只記錄警告並略過
pub fn build_adapters(
    config: &FreightConfig,
    http: &HttpHelper,
    only: Option<&[CarrierId]>,
) -> Vec<Arc<dyn CarrierAdapter>> {
    let mut adapters: Vec<Arc<dyn CarrierAdapter>> = Vec::new();

    for id in config.enabled_carriers() {
        if let Some(only) = only {
            if !only.contains(&id) {
                continue;
            }
        }

        match build_adapter(id, config, http.clone()) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => tracing::warn!("⚠️ Skipping {}: {}", id, e),
        }
    }

    tracing::info!("🚚 {} carrier adapter(s) ready", adapters.len());
    adapters
}

pub fn build_adapter(
    id: CarrierId,
    config: &FreightConfig,
    http: HttpHelper,
) -> Result<Arc<dyn CarrierAdapter>> {
    let carrier = config
        .carrier(id)
        .ok_or_else(|| FreightError::MissingConfigError {
            field: format!("carriers.{}", id.slug()),
        })?;

    let http = match carrier.timeout() {
        Some(timeout) => http.with_timeout(timeout),
        None => http,
    };

    let adapter: Arc<dyn CarrierAdapter> = match id {
        CarrierId::Cdek => Arc::new(CdekAdapter::from_config(carrier, http, config.token_ttl())?),
        CarrierId::Dellin => Arc::new(DellinAdapter::from_config(
            carrier,
            http,
            config.reference_ttl(),
        )?),
        CarrierId::Vozovoz => Arc::new(VozovozAdapter::from_config(carrier, http)?),
        CarrierId::Pek => Arc::new(PekAdapter::from_config(carrier, http)?),
        CarrierId::Kit => Arc::new(KitAdapter::from_config(carrier, http, config.reference_ttl())?),
        CarrierId::NordWheel => Arc::new(NordWheelAdapter::from_config(carrier, http)?),
        CarrierId::RailContinent => Arc::new(RailContinentAdapter::from_config(carrier, http)?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        assert_eq!(endpoint("https://a.ru/", "/v2/x"), "https://a.ru/v2/x");
        assert_eq!(endpoint("https://a.ru", "v2/x"), "https://a.ru/v2/x");
    }

    #[test]
    fn test_best_match_prefers_exact_name() {
        let items = vec!["Москва (Зеленоград)", "москва"];
        let found = best_match(&items, "Москва", |s| Some(*s)).unwrap();
        assert_eq!(*found, "москва");

        let fallback = best_match(&items, "Химки", |s| Some(*s)).unwrap();
        assert_eq!(*fallback, "Москва (Зеленоград)");

        let empty: Vec<&str> = Vec::new();
        assert!(best_match(&empty, "Москва", |s| Some(*s)).is_none());
    }

    #[test]
    fn test_unresolved_credentials_are_skipped() {
        let config = FreightConfig::from_toml_str(
            r#"
[carriers.kit]
auth = { type = "bearer", token = "${FREIGHT_TEST_NEVER_SET_KIT}" }

[carriers.pek]
auth = { type = "basic", username = "login", password = "key" }
"#,
        )
        .unwrap();

        let adapters = build_adapters(&config, &HttpHelper::default(), None);
        let ids: Vec<CarrierId> = adapters.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![CarrierId::Pek]);

        let filtered = build_adapters(&config, &HttpHelper::default(), Some(&[CarrierId::Cdek]));
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_wrong_auth_kind_is_rejected() {
        let config = FreightConfig::from_toml_str(
            r#"
[carriers.cdek]
auth = { type = "api_key", key = "abc" }
"#,
        )
        .unwrap();

        let result = build_adapter(CarrierId::Cdek, &config, HttpHelper::default());
        assert!(matches!(result, Err(FreightError::CredentialsMissing { .. })));
    }
}
