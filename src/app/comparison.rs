use crate::core::aggregator::{Comparison, QuoteAggregator, SortKey};
use crate::core::{Pipeline, Storage};
use crate::domain::model::{ComparisonReport, Quote, Shipment};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use chrono::Local;
use serde::Serialize;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

const HEADERS: [&str; 9] = [
    "rank",
    "carrier",
    "price",
    "currency",
    "days_min",
    "days_max",
    "tariff",
    "services",
    "breakdown_synthesized",
];

pub struct ComparisonPipeline<S: Storage> {
    storage: S,
    aggregator: QuoteAggregator,
    shipment: Shipment,
    sort: SortKey,
}

impl<S: Storage> ComparisonPipeline<S> {
    pub fn new(storage: S, aggregator: QuoteAggregator, shipment: Shipment) -> Self {
        Self {
            storage,
            aggregator,
            shipment,
            sort: SortKey::default(),
        }
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }
}

#[derive(Serialize)]
struct ComparisonDocument<'a> {
    generated_at: String,
    shipment: &'a Shipment,
    #[serde(flatten)]
    comparison: &'a Comparison,
}

fn quote_row(rank: usize, quote: &Quote) -> Vec<String> {
    let services = quote
        .services
        .iter()
        .map(|s| format!("{}={:.2}", s.name, s.price))
        .collect::<Vec<_>>()
        .join("; ");

    vec![
        rank.to_string(),
        quote.carrier.display_name().to_string(),
        format!("{:.2}", quote.price),
        quote.currency.clone(),
        quote.transit.map(|t| t.min_days.to_string()).unwrap_or_default(),
        quote.transit.map(|t| t.max_days.to_string()).unwrap_or_default(),
        quote.tariff.clone().unwrap_or_default(),
        services,
        quote.breakdown_synthesized.to_string(),
    ]
}

/// 以指定分隔符號輸出報價表 (CSV 用 `,`，TSV 用 `\t`)
pub fn render_delimited(quotes: &[Quote], delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(HEADERS)?;
    for (index, quote) in quotes.iter().enumerate() {
        writer.write_record(quote_row(index + 1, quote))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 終端機顯示用的對齊表格
pub fn render_table(comparison: &Comparison) -> String {
    let mut lines = vec![format!(
        "{:<4} {:<14} {:>12} {:>8}  {}",
        "#", "Carrier", "Price, RUB", "Days", "Tariff"
    )];

    for (index, quote) in comparison.quotes.iter().enumerate() {
        lines.push(format!(
            "{:<4} {:<14} {:>12.2} {:>8}  {}",
            index + 1,
            quote.carrier.display_name(),
            quote.price,
            quote
                .transit
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
            quote.tariff.as_deref().unwrap_or(""),
        ));
    }

    for failure in &comparison.failures {
        lines.push(format!(
            "{:<4} {:<14} {:>12} {:>8}  {}",
            "-",
            failure.carrier.display_name(),
            "error",
            failure.body.status,
            failure.body.error,
        ));
    }

    lines.join("\n")
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ComparisonPipeline<S> {
    async fn extract(&self) -> Result<Comparison> {
        self.shipment.validate()?;

        tracing::info!(
            "🚀 Requesting quotes {} → {} ({:.1} kg, {:.3} m³, {} place(s)) from {} carrier(s)",
            self.shipment.origin,
            self.shipment.destination,
            self.shipment.total_weight_kg(),
            self.shipment.total_volume_m3(),
            self.shipment.total_places(),
            self.aggregator.carriers().len()
        );

        let mut comparison = self.aggregator.compare(&self.shipment).await;
        comparison.sort_by(self.sort);

        if comparison.is_empty() {
            tracing::warn!("⚠️ No carrier returned a quote");
        }
        Ok(comparison)
    }

    async fn transform(&self, comparison: Comparison) -> Result<ComparisonReport> {
        let csv_output = render_delimited(&comparison.quotes, b',')?;
        let tsv_output = render_delimited(&comparison.quotes, b'\t')?;

        Ok(ComparisonReport {
            shipment: self.shipment.clone(),
            comparison,
            csv_output,
            tsv_output,
            generated_at: Local::now(),
        })
    }

    async fn load(&self, report: ComparisonReport) -> Result<String> {
        let filename = format!(
            "comparison_{}.zip",
            report.generated_at.format("%Y%m%d_%H%M%S")
        );

        let document = ComparisonDocument {
            generated_at: report.generated_at.to_rfc3339(),
            shipment: &report.shipment,
            comparison: &report.comparison,
        };

        // 打包 CSV / TSV / JSON
        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("comparison.csv", FileOptions::default())?;
            zip.write_all(report.csv_output.as_bytes())?;

            zip.start_file::<_, ()>("comparison.tsv", FileOptions::default())?;
            zip.write_all(report.tsv_output.as_bytes())?;

            zip.start_file::<_, ()>("comparison.json", FileOptions::default())?;
            zip.write_all(serde_json::to_string_pretty(&document)?.as_bytes())?;

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing {} ({} bytes) to storage", filename, zip_data.len());
        self.storage.write_file(&filename, &zip_data).await?;
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::CarrierFailure;
    use crate::domain::model::{CarrierId, ServiceLine, TransitTime};
    use crate::utils::error::FreightError;

    fn quotes() -> Vec<Quote> {
        vec![
            Quote::new(CarrierId::Kit, 3150.0)
                .with_transit(Some(TransitTime::new(2, 3)))
                .with_tariff("Стандарт")
                .with_services(vec![
                    ServiceLine::new("Перевозка", 2900.0),
                    ServiceLine::new("Страхование, 1%", 250.0),
                ]),
            Quote::new(CarrierId::Pek, 5120.5),
        ]
    }

    #[test]
    fn test_render_csv_quotes_commas() {
        let csv_output = render_delimited(&quotes(), b',').unwrap();
        let lines: Vec<&str> = csv_output.lines().collect();
        assert_eq!(lines[0], HEADERS.join(","));
        assert!(lines[1].starts_with("1,Kit,3150.00,RUB,2,3,Стандарт,"));
        assert!(lines[1].contains("\"Перевозка=2900.00; Страхование, 1%=250.00\""));
        assert_eq!(lines[2], "2,PEK,5120.50,RUB,,,,,false");
    }

    #[test]
    fn test_render_tsv() {
        let tsv_output = render_delimited(&quotes(), b'\t').unwrap();
        assert!(tsv_output.starts_with("rank\tcarrier\tprice"));
        assert_eq!(tsv_output.lines().count(), 3);
    }

    #[test]
    fn test_render_table_lists_failures() {
        let comparison = Comparison {
            quotes: quotes(),
            failures: vec![CarrierFailure {
                carrier: CarrierId::Cdek,
                body: FreightError::CarrierStatus {
                    carrier: CarrierId::Cdek,
                    status: 401,
                    body: "invalid_token".to_string(),
                }
                .to_error_body(),
            }],
        };

        let table = render_table(&comparison);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("CDEK"));
        assert!(table.contains("401"));
    }
}
