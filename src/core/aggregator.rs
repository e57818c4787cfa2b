use crate::domain::model::{CarrierId, Quote, Shipment};
use crate::domain::ports::CarrierAdapter;
use crate::utils::error::{ErrorBody, FreightError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Price,
    Days,
    Carrier,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" => Ok(SortKey::Price),
            "days" => Ok(SortKey::Days),
            "carrier" => Ok(SortKey::Carrier),
            other => Err(format!("unknown sort key '{}' (price, days, carrier)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierFailure {
    pub carrier: CarrierId,
    #[serde(flatten)]
    pub body: ErrorBody,
}

/// 一次比價的結果：成功的報價與失敗的承運商分開保存
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub quotes: Vec<Quote>,
    pub failures: Vec<CarrierFailure>,
}

impl Comparison {
    pub fn sort_by(&mut self, key: SortKey) {
        self.quotes.sort_by(|a, b| compare_quotes(a, b, key));
        self.failures.sort_by_key(|f| f.carrier);
    }

    pub fn cheapest(&self) -> Option<&Quote> {
        self.quotes
            .iter()
            .min_by(|a, b| compare_quotes(a, b, SortKey::Price))
    }

    /// 未知期限的報價不參與
    pub fn fastest(&self) -> Option<&Quote> {
        self.quotes
            .iter()
            .filter(|q| q.transit.is_some())
            .min_by(|a, b| compare_quotes(a, b, SortKey::Days))
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

fn compare_quotes(a: &Quote, b: &Quote, key: SortKey) -> Ordering {
    let by_price = a.price.total_cmp(&b.price);
    let by_days = match (a.max_days(), b.max_days()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match key {
        SortKey::Price => by_price.then(by_days).then(a.carrier.cmp(&b.carrier)),
        SortKey::Days => by_days.then(by_price).then(a.carrier.cmp(&b.carrier)),
        SortKey::Carrier => a.carrier.cmp(&b.carrier),
    }
}

/// 對所有承運商同時發出報價請求 (allSettled 語意)
pub struct QuoteAggregator {
    adapters: Vec<Arc<dyn CarrierAdapter>>,
    deadline: Option<Duration>,
}

impl QuoteAggregator {
    pub fn new(adapters: Vec<Arc<dyn CarrierAdapter>>) -> Self {
        Self {
            adapters,
            deadline: None,
        }
    }

    /// 單一承運商的最長等待時間
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn carriers(&self) -> Vec<CarrierId> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub async fn compare(&self, shipment: &Shipment) -> Comparison {
        let shipment = Arc::new(shipment.clone());
        let mut tasks = JoinSet::new();
        // 任務 id -> 承運商，任務 panic 時仍能歸屬失敗
        let mut owners = HashMap::new();

        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let shipment = Arc::clone(&shipment);
            let carrier = adapter.id();
            let deadline = self.deadline;
            let handle = tasks.spawn(async move {
                match deadline {
                    Some(limit) => match tokio::time::timeout(limit, adapter.quote(&shipment)).await {
                        Ok(result) => result,
                        Err(_) => Err(FreightError::DeadlineExceeded { carrier, limit }),
                    },
                    None => adapter.quote(&shipment).await,
                }
            });
            owners.insert(handle.id(), carrier);
        }

        let mut comparison = Comparison::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(join_error) => (join_error.id(), Err(join_error)),
            };

            let Some(carrier) = owners.get(&id).copied() else {
                tracing::error!("❌ Quote task {} finished without a known carrier", id);
                continue;
            };
            let outcome = outcome.unwrap_or_else(|join_error| Err(task_failure(carrier, join_error)));

            match outcome {
                Ok(quote) => {
                    tracing::info!("✅ {}: {:.2} {}", carrier, quote.price, quote.currency);
                    comparison.quotes.push(quote);
                }
                Err(e) => {
                    tracing::warn!(
                        "❌ {} failed: {} (Category: {:?})",
                        carrier,
                        e,
                        e.category()
                    );
                    comparison.failures.push(CarrierFailure {
                        carrier,
                        body: e.to_error_body(),
                    });
                }
            }
        }

        comparison.sort_by(SortKey::Price);
        comparison
    }
}

fn task_failure(carrier: CarrierId, join_error: JoinError) -> FreightError {
    let message = match join_error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(join_error) => join_error.to_string(),
    };
    FreightError::TaskPanicked { carrier, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CargoPackage, TransitTime};
    use crate::utils::error::Result;
    use async_trait::async_trait;

    struct FixedAdapter {
        id: CarrierId,
        price: Option<f64>,
        delay: Duration,
    }

    #[async_trait]
    impl CarrierAdapter for FixedAdapter {
        fn id(&self) -> CarrierId {
            self.id
        }

        async fn quote(&self, _shipment: &Shipment) -> Result<Quote> {
            tokio::time::sleep(self.delay).await;
            match self.price {
                Some(price) => Ok(Quote::new(self.id, price)),
                None => Err(FreightError::CarrierStatus {
                    carrier: self.id,
                    status: 503,
                    body: "maintenance".to_string(),
                }),
            }
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl CarrierAdapter for PanickingAdapter {
        fn id(&self) -> CarrierId {
            CarrierId::NordWheel
        }

        async fn quote(&self, _shipment: &Shipment) -> Result<Quote> {
            let lines: Vec<f64> = Vec::new();
            Ok(Quote::new(CarrierId::NordWheel, lines[3]))
        }
    }

    fn adapter(id: CarrierId, price: Option<f64>, delay_ms: u64) -> Arc<dyn CarrierAdapter> {
        Arc::new(FixedAdapter {
            id,
            price,
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn shipment() -> Shipment {
        Shipment::new("Москва", "Екатеринбург").with_package(CargoPackage::new(50.0, 40.0, 30.0, 10.0))
    }

    #[tokio::test]
    async fn test_failures_do_not_fail_comparison() {
        let aggregator = QuoteAggregator::new(vec![
            adapter(CarrierId::Pek, Some(5000.0), 30),
            adapter(CarrierId::Cdek, None, 0),
            adapter(CarrierId::Kit, Some(3200.0), 10),
        ]);

        let comparison = aggregator.compare(&shipment()).await;

        let carriers: Vec<CarrierId> = comparison.quotes.iter().map(|q| q.carrier).collect();
        assert_eq!(carriers, vec![CarrierId::Kit, CarrierId::Pek]);
        assert_eq!(comparison.failures.len(), 1);
        assert_eq!(comparison.failures[0].carrier, CarrierId::Cdek);
        assert_eq!(comparison.failures[0].body.status, 503);
        assert!(!comparison.failures[0].body.success);
    }

    #[tokio::test]
    async fn test_deadline_turns_slow_carrier_into_failure() {
        let aggregator = QuoteAggregator::new(vec![
            adapter(CarrierId::Dellin, Some(1000.0), 500),
            adapter(CarrierId::Vozovoz, Some(1200.0), 0),
        ])
        .with_deadline(Some(Duration::from_millis(100)));

        let comparison = aggregator.compare(&shipment()).await;
        assert_eq!(comparison.quotes.len(), 1);
        assert_eq!(comparison.failures[0].carrier, CarrierId::Dellin);
        assert_eq!(comparison.failures[0].body.status, 504);
        assert!(comparison.failures[0].body.details.contains("100ms"));
    }

    #[tokio::test]
    async fn test_panicking_adapter_becomes_failure() {
        let aggregator = QuoteAggregator::new(vec![
            Arc::new(PanickingAdapter) as Arc<dyn CarrierAdapter>,
            adapter(CarrierId::Kit, Some(2100.0), 0),
        ]);

        let comparison = aggregator.compare(&shipment()).await;

        assert_eq!(comparison.quotes.len() + comparison.failures.len(), 2);
        assert_eq!(comparison.quotes[0].carrier, CarrierId::Kit);
        let failure = &comparison.failures[0];
        assert_eq!(failure.carrier, CarrierId::NordWheel);
        assert_eq!(failure.body.status, 500);
        assert!(!failure.body.success);
        assert!(failure.body.details.contains("panicked"));
        assert!(failure.body.details.contains("index out of bounds"));
    }

    #[test]
    fn test_sort_by_days_puts_unknown_last() {
        let mut comparison = Comparison {
            quotes: vec![
                Quote::new(CarrierId::Pek, 100.0),
                Quote::new(CarrierId::Kit, 300.0).with_transit(Some(TransitTime::new(2, 3))),
                Quote::new(CarrierId::Cdek, 200.0).with_transit(Some(TransitTime::new(4, 6))),
            ],
            failures: Vec::new(),
        };

        comparison.sort_by(SortKey::Days);
        let carriers: Vec<CarrierId> = comparison.quotes.iter().map(|q| q.carrier).collect();
        assert_eq!(carriers, vec![CarrierId::Kit, CarrierId::Cdek, CarrierId::Pek]);

        assert_eq!(comparison.cheapest().unwrap().carrier, CarrierId::Pek);
        assert_eq!(comparison.fastest().unwrap().carrier, CarrierId::Kit);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("Price".parse::<SortKey>().unwrap(), SortKey::Price);
        assert_eq!("days".parse::<SortKey>().unwrap(), SortKey::Days);
        assert!("speed".parse::<SortKey>().is_err());
    }
}
