use clap::Parser;
use freight_compare::carriers::build_adapters;
use freight_compare::core::http::HttpHelper;
use freight_compare::utils::error::{ErrorSeverity, FreightError};
use freight_compare::utils::{logger, validation::Validate};
use freight_compare::{
    app, CliConfig, ComparisonEngine, ComparisonPipeline, FreightConfig, LocalStorage,
    QuoteAggregator,
};

fn exit_with(e: &FreightError) -> ! {
    tracing::error!(
        "❌ Freight comparison failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_logger(logger::LogFormat::from_json_flag(cli.log_json), cli.verbose);

    tracing::info!("Starting freight-compare CLI");
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = cli.validate() {
        exit_with(&e);
    }

    // 載入並驗證配置
    let config = match &cli.config {
        Some(path) => FreightConfig::from_file(path),
        None => FreightConfig::builtin(),
    }
    .and_then(|config| config.validate().map(|_| config));
    let config = match config {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let only = match cli.carrier_filter() {
        Ok(only) => only,
        Err(e) => exit_with(&e),
    };

    let http = HttpHelper::new(config.http_settings());
    let adapters = build_adapters(&config, &http, only.as_deref());
    if adapters.is_empty() {
        exit_with(&FreightError::ConfigError {
            message: "No carrier has usable credentials".to_string(),
        });
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let aggregator = QuoteAggregator::new(adapters).with_deadline(config.carrier_deadline());
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| config.output_path().to_string());
    let storage = LocalStorage::new(output_path.clone());
    let pipeline = ComparisonPipeline::new(storage, aggregator, cli.shipment()).with_sort(cli.sort);

    let engine = ComparisonEngine::new_with_monitoring(pipeline, cli.monitor);

    match engine.run(cli.save).await {
        Ok(outcome) => {
            let comparison = &outcome.report.comparison;
            println!("{}", app::render_table(comparison));

            if let Some(best) = comparison.cheapest() {
                println!(
                    "💰 Cheapest: {} {:.2} {}",
                    best.carrier.display_name(),
                    best.price,
                    best.currency
                );
            }
            if let Some(fastest) = comparison.fastest() {
                if let Some(transit) = fastest.transit {
                    println!(
                        "⚡ Fastest: {} ({} days)",
                        fastest.carrier.display_name(),
                        transit
                    );
                }
            }
            if let Some(path) = outcome.saved_to {
                println!("📁 Output saved to: {}/{}", output_path, path);
            }
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}
