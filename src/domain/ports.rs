use crate::core::aggregator::Comparison;
use crate::domain::model::{CarrierId, ComparisonReport, Quote, Shipment};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 承運商報價介面，每個承運商一個實作
#[async_trait]
pub trait CarrierAdapter: Send + Sync {
    fn id(&self) -> CarrierId;

    async fn quote(&self, shipment: &Shipment) -> Result<Quote>;
}

/// 比價流程：extract = 向承運商詢價，transform = 產生表格，load = 打包輸出
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Comparison>;
    async fn transform(&self, comparison: Comparison) -> Result<ComparisonReport>;
    async fn load(&self, report: ComparisonReport) -> Result<String>;
}
