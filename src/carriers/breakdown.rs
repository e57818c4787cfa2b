//! 依固定比例合成服務明細。
//!
//! 有些承運商 API 只回傳總價，而官網會列出各項服務費用。
//! 這裡用固定權重把總價拆成明細，讓不同承運商的結果能並列比較。

use crate::domain::model::{Quote, ServiceLine, ServiceOptions};

pub const INTERCITY: &str = "Междугородняя перевозка";
pub const TERMINAL_HANDLING: &str = "Терминальная обработка";
pub const DOOR_PICKUP: &str = "Забор груза от адреса";
pub const DOOR_DELIVERY: &str = "Доставка груза до адреса";
pub const INSURANCE: &str = "Страхование груза";
pub const PACKAGING: &str = "Жесткая упаковка";

const INTERCITY_WEIGHT: u32 = 65;
const TERMINAL_WEIGHT: u32 = 10;
const PICKUP_WEIGHT: u32 = 12;
const DELIVERY_WEIGHT: u32 = 10;
const INSURANCE_WEIGHT: u32 = 3;
const PACKAGING_WEIGHT: u32 = 5;

/// 超過此金額 (盧布) 的總價視為異常，不合成明細
pub const MAX_SYNTHESIZED_TOTAL: f64 = 1e12;

/// 依服務選項回傳 (名稱, 權重)
pub fn weights_for(services: &ServiceOptions) -> Vec<(&'static str, u32)> {
    let mut weights = vec![(INTERCITY, INTERCITY_WEIGHT), (TERMINAL_HANDLING, TERMINAL_WEIGHT)];
    if services.pickup_from_door {
        weights.push((DOOR_PICKUP, PICKUP_WEIGHT));
    }
    if services.deliver_to_door {
        weights.push((DOOR_DELIVERY, DELIVERY_WEIGHT));
    }
    if services.insured() {
        weights.push((INSURANCE, INSURANCE_WEIGHT));
    }
    if services.rigid_packaging {
        weights.push((PACKAGING, PACKAGING_WEIGHT));
    }
    weights
}

/// 以戈比計算比例，捨入誤差加到最大的一項，確保明細總和等於總價
pub fn synthesize(total: f64, services: &ServiceOptions) -> Vec<ServiceLine> {
    if !total.is_finite() || total > MAX_SYNTHESIZED_TOTAL {
        return Vec::new();
    }
    let total_kopecks = (total * 100.0).round() as i128;
    if total_kopecks <= 0 {
        return Vec::new();
    }

    let weights = weights_for(services);
    let weight_sum: i128 = weights.iter().map(|(_, w)| i128::from(*w)).sum();

    let mut shares: Vec<i128> = weights
        .iter()
        .map(|(_, w)| total_kopecks * i128::from(*w) / weight_sum)
        .collect();

    let remainder = total_kopecks - shares.iter().sum::<i128>();
    if let Some(largest) = (0..shares.len()).max_by_key(|&i| (weights[i].1, std::cmp::Reverse(i))) {
        shares[largest] += remainder;
    }

    weights
        .iter()
        .zip(shares)
        .map(|((name, _), kopecks)| ServiceLine::new(*name, kopecks as f64 / 100.0))
        .collect()
}

/// 報價沒有明細時補上合成明細
pub fn fill_missing(quote: &mut Quote, services: &ServiceOptions) {
    if !quote.services.is_empty() {
        return;
    }
    quote.services = synthesize(quote.price, services);
    quote.breakdown_synthesized = !quote.services.is_empty();
}
