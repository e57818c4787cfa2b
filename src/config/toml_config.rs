use crate::core::http::HttpSettings;
use crate::domain::model::CarrierId;
use crate::utils::error::{FreightError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// 內建預設配置，憑證一律來自環境變數
pub const DEFAULT_CONFIG: &str = r#"
[http]
timeout_seconds = 15
retry_attempts = 2
retry_delay_ms = 500

[cache]
reference_ttl_seconds = 86400
token_ttl_seconds = 3000

[comparison]
carrier_deadline_seconds = 45

[output]
path = "./output"

[carriers.cdek]
auth = { type = "client_credentials", client_id = "${CDEK_CLIENT_ID}", client_secret = "${CDEK_CLIENT_SECRET}" }

[carriers.dellin]
auth = { type = "api_key", key = "${DELLIN_APPKEY}" }

[carriers.vozovoz]
auth = { type = "api_key", key = "${VOZOVOZ_TOKEN}" }

[carriers.pek]
auth = { type = "basic", username = "${PEK_LOGIN}", password = "${PEK_API_KEY}" }

[carriers.kit]
auth = { type = "bearer", token = "${KIT_TOKEN}" }

[carriers.nordwheel]
auth = { type = "api_key", key = "${NORDWHEEL_API_KEY}" }

[carriers.railcontinent]
auth = { type = "basic", username = "${RAILCONTINENT_LOGIN}", password = "${RAILCONTINENT_PASSWORD}" }
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreightConfig {
    pub http: Option<HttpConfig>,
    pub cache: Option<CacheConfig>,
    pub comparison: Option<ComparisonConfig>,
    pub output: Option<OutputConfig>,
    #[serde(default)]
    pub carriers: BTreeMap<String, CarrierConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub reference_ttl_seconds: Option<u64>,
    pub token_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub carrier_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    /// 覆寫 `[http].timeout_seconds`
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    ApiKey {
        key: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl AuthConfig {
    fn values(&self) -> Vec<&str> {
        match self {
            AuthConfig::None => Vec::new(),
            AuthConfig::ApiKey { key } => vec![key.as_str()],
            AuthConfig::Bearer { token } => vec![token.as_str()],
            AuthConfig::Basic { username, password } => vec![username.as_str(), password.as_str()],
            AuthConfig::ClientCredentials {
                client_id,
                client_secret,
            } => vec![client_id.as_str(), client_secret.as_str()],
        }
    }

    /// 所有欄位都有值，且沒有殘留未替換的 `${VAR}`
    pub fn is_resolved(&self) -> bool {
        self.values()
            .iter()
            .all(|v| !v.trim().is_empty() && !v.contains("${"))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::ApiKey { .. } => "api_key",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::ClientCredentials { .. } => "client_credentials",
        }
    }
}

impl CarrierConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

impl FreightConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(FreightError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| FreightError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 內建預設配置 (憑證取自環境變數)
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// 替換環境變數 (例如 ${CDEK_CLIENT_ID})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FreightError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn http_settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        let http = self.http.clone().unwrap_or_default();
        HttpSettings {
            timeout: http
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            retry_attempts: http.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay: http
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }

    pub fn reference_ttl(&self) -> Duration {
        Duration::from_secs(
            self.cache
                .as_ref()
                .and_then(|c| c.reference_ttl_seconds)
                .unwrap_or(24 * 60 * 60),
        )
    }

    /// 承運商未回傳 `expires_in` 時使用的 token 存活時間
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(
            self.cache
                .as_ref()
                .and_then(|c| c.token_ttl_seconds)
                .unwrap_or(50 * 60),
        )
    }

    pub fn carrier_deadline(&self) -> Option<Duration> {
        self.comparison
            .as_ref()
            .and_then(|c| c.carrier_deadline_seconds)
            .map(Duration::from_secs)
    }

    pub fn output_path(&self) -> &str {
        self.output
            .as_ref()
            .and_then(|o| o.path.as_deref())
            .unwrap_or("./output")
    }

    pub fn carrier(&self, id: CarrierId) -> Option<&CarrierConfig> {
        self.carriers.get(id.slug())
    }

    /// 設定檔中出現且啟用的承運商，依固定順序
    pub fn enabled_carriers(&self) -> Vec<CarrierId> {
        CarrierId::ALL
            .into_iter()
            .filter(|id| self.carrier(*id).map(|c| c.is_enabled()).unwrap_or(false))
            .collect()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("output.path", self.output_path())?;

        let http = self.http_settings();
        validation::validate_range("http.timeout_seconds", http.timeout.as_secs(), 1, 300)?;
        validation::validate_range("http.retry_attempts", http.retry_attempts, 0, 5)?;

        if let Some(deadline) = self.carrier_deadline() {
            validation::validate_positive_number(
                "comparison.carrier_deadline_seconds",
                deadline.as_secs() as usize,
                1,
            )?;
        }

        for (slug, carrier) in &self.carriers {
            if slug.parse::<CarrierId>().is_err() {
                return Err(FreightError::InvalidConfigValueError {
                    field: "carriers".to_string(),
                    value: slug.clone(),
                    reason: format!(
                        "Unknown carrier. Valid carriers: {}",
                        CarrierId::ALL.map(|c| c.slug()).join(", ")
                    ),
                });
            }
            if let Some(base_url) = &carrier.base_url {
                validation::validate_url(&format!("carriers.{}.base_url", slug), base_url)?;
            }
            if let Some(timeout) = carrier.timeout_seconds {
                validation::validate_range(
                    &format!("carriers.{}.timeout_seconds", slug),
                    timeout,
                    1,
                    300,
                )?;
            }
        }

        Ok(())
    }
}

impl Validate for FreightConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[http]
timeout_seconds = 5
retry_attempts = 1

[output]
path = "./quotes"

[carriers.cdek]
base_url = "https://api.edu.cdek.ru"
auth = { type = "client_credentials", client_id = "id", client_secret = "secret" }

[carriers.pek]
enabled = false
auth = { type = "basic", username = "user", password = "key" }
"#;

        let config = FreightConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.http_settings().timeout, Duration::from_secs(5));
        assert_eq!(config.http_settings().retry_attempts, 1);
        assert_eq!(config.output_path(), "./quotes");
        assert_eq!(config.enabled_carriers(), vec![CarrierId::Cdek]);
        assert!(config.carrier(CarrierId::Cdek).unwrap().auth.is_resolved());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FREIGHT_TEST_KIT_TOKEN", "kit-secret");

        let toml_content = r#"
[carriers.kit]
auth = { type = "bearer", token = "${FREIGHT_TEST_KIT_TOKEN}" }

[carriers.vozovoz]
auth = { type = "api_key", key = "${FREIGHT_TEST_UNSET_VARIABLE}" }
"#;

        let config = FreightConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.carrier(CarrierId::Kit).unwrap().auth,
            AuthConfig::Bearer {
                token: "kit-secret".to_string()
            }
        );
        assert!(!config.carrier(CarrierId::Vozovoz).unwrap().auth.is_resolved());

        std::env::remove_var("FREIGHT_TEST_KIT_TOKEN");
    }

    #[test]
    fn test_builtin_config_lists_every_carrier() {
        let config = FreightConfig::builtin().unwrap();
        assert_eq!(config.enabled_carriers(), CarrierId::ALL.to_vec());
        assert_eq!(config.carrier_deadline(), Some(Duration::from_secs(45)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let unknown_carrier = r#"
[carriers.dhl]
auth = { type = "none" }
"#;
        let config = FreightConfig::from_toml_str(unknown_carrier).unwrap();
        assert!(config.validate().is_err());

        let bad_url = r#"
[carriers.pek]
base_url = "ftp://pecom.ru"
"#;
        let config = FreightConfig::from_toml_str(bad_url).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[cache]
reference_ttl_seconds = 60

[carriers.dellin]
auth = { type = "api_key", key = "appkey" }
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = FreightConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.reference_ttl(), Duration::from_secs(60));
        assert_eq!(config.enabled_carriers(), vec![CarrierId::Dellin]);
    }

    #[test]
    fn test_carrier_timeout_override() {
        let content = r#"
[carriers.railcontinent]
timeout_seconds = 60
auth = { type = "basic", username = "rail", password = "secret" }

[carriers.kit]
timeout_seconds = 0
"#;
        let config = FreightConfig::from_toml_str(content).unwrap();
        assert_eq!(
            config.carrier(CarrierId::RailContinent).unwrap().timeout(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.carrier(CarrierId::Kit).unwrap().timeout(), Some(Duration::ZERO));
        assert!(config.validate().is_err());
    }
}
