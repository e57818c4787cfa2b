use crate::core::Pipeline;
use crate::domain::model::ComparisonReport;
use crate::utils::error::Result;
use crate::utils::monitor::ProcessMonitor;

/// 一次執行的結果；`saved_to` 只有在要求保存時才有值
#[derive(Debug)]
pub struct RunOutcome {
    pub report: ComparisonReport,
    pub saved_to: Option<String>,
}

pub struct ComparisonEngine<P: Pipeline> {
    pipeline: P,
    monitor: ProcessMonitor,
}

impl<P: Pipeline> ComparisonEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: ProcessMonitor::new(monitor_enabled),
        }
    }

    pub fn monitor(&self) -> &ProcessMonitor {
        &self.monitor
    }

    pub async fn run(&self, save: bool) -> Result<RunOutcome> {
        tracing::info!("Starting freight comparison...");
        self.monitor.record_phase("Start");

        // Extract
        let comparison = self.pipeline.extract().await?;
        tracing::info!(
            "Collected {} quote(s), {} carrier failure(s)",
            comparison.quotes.len(),
            comparison.failures.len()
        );
        self.monitor.record_phase("Extract");

        // Transform
        let report = self.pipeline.transform(comparison).await?;
        self.monitor.record_phase("Transform");

        // Load
        let saved_to = if save {
            let path = self.pipeline.load(report.clone()).await?;
            tracing::info!("📁 Comparison saved to: {}", path);
            self.monitor.record_phase("Load");
            Some(path)
        } else {
            None
        };

        self.monitor.log_final_stats();
        Ok(RunOutcome { report, saved_to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::Comparison;
    use crate::domain::model::{CarrierId, Quote, Shipment};
    use async_trait::async_trait;
    use chrono::Local;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPipeline {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<Comparison> {
            Ok(Comparison {
                quotes: vec![Quote::new(CarrierId::Pek, 4100.0)],
                failures: Vec::new(),
            })
        }

        async fn transform(&self, comparison: Comparison) -> Result<ComparisonReport> {
            Ok(ComparisonReport {
                shipment: Shipment::new("Москва", "Казань"),
                comparison,
                csv_output: String::new(),
                tsv_output: String::new(),
                generated_at: Local::now(),
            })
        }

        async fn load(&self, _report: ComparisonReport) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok("comparison.zip".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_without_save_skips_load() {
        let engine = ComparisonEngine::new(CountingPipeline::default());
        let outcome = engine.run(false).await.unwrap();
        assert!(outcome.saved_to.is_none());
        assert_eq!(outcome.report.comparison.quotes.len(), 1);
        assert_eq!(engine.pipeline.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_with_save_and_monitoring() {
        let engine = ComparisonEngine::new_with_monitoring(CountingPipeline::default(), true);
        let outcome = engine.run(true).await.unwrap();
        assert_eq!(outcome.saved_to.as_deref(), Some("comparison.zip"));

        let phases: Vec<String> = engine.monitor().phases().into_iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec!["Start", "Extract", "Transform", "Load"]);
    }
}
