//! Inventory statistics over a snapshot of products.

use serde::Serialize;

/// Anything that exposes a balance and its thresholds.
pub trait StockLevels {
    fn stock(&self) -> i64;
    fn min_stock(&self) -> i64;
    fn max_stock(&self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockStats {
    pub total_items: u64,
    pub low_stock_items: u64,
    pub out_of_stock_items: u64,
    pub over_stock_items: u64,
}

/// Full scan. An item at zero with a positive minimum counts as both low and out.
pub fn compute_stats<'a, P, I>(products: I) -> StockStats
where
    P: StockLevels + 'a,
    I: IntoIterator<Item = &'a P>,
{
    products.into_iter().fold(StockStats::default(), |mut acc, p| {
        acc.total_items += 1;
        if p.stock() < p.min_stock() {
            acc.low_stock_items += 1;
        }
        if p.stock() == 0 {
            acc.out_of_stock_items += 1;
        }
        if p.stock() > p.max_stock() {
            acc.over_stock_items += 1;
        }
        acc
    })
}
