use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 終端機用的單行格式
    #[default]
    Compact,
    /// 每筆事件一行 JSON，欄位攤平
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// 未設定 `RUST_LOG` 時使用的過濾規則
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "freight_compare=debug,info"
    } else {
        "freight_compare=info,warn"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// 安裝全域 subscriber；已安裝過時回傳 false
pub fn init_logger(format: LogFormat, verbose: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(verbose));

    let installed = match format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_target(false).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true))
            .try_init(),
    };

    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flag() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::default());
    }

    #[test]
    fn test_verbose_enables_crate_debug() {
        assert!(default_directives(true).contains("freight_compare=debug"));
        assert!(default_directives(false).starts_with("freight_compare=info"));
    }

    #[test]
    fn test_second_init_is_rejected_without_panic() {
        init_logger(LogFormat::Compact, false);
        assert!(!init_logger(LogFormat::Json, true));
    }
}
