//! # Metrics Module
//!
//! Pure analytics math: folding transactions into daily metric rows,
//! summarising a date range, ranking top sellers and classifying
//! stockout risk.
//!
//! ## Daily Fold
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (product, local date) ──► DailyInventoryMetric                         │
//! │                                                                         │
//! │  Sale                      sales_count   += quantity                    │
//! │  Purchase/Restock/Return   restock_count += quantity                    │
//! │  Damaged/Adjustment        (counters untouched)                         │
//! │  resulting_stock == 0      days_out_of_stock = 1                        │
//! │  lowest sequence of day    opening_stock = resulting - delta            │
//! │                                                                         │
//! │  turnover_rate = sales_count / max(1, opening_stock)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Folding is order-independent: feeding the same set of transactions in
//! any order yields the same row (apart from `updated_at`).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DailyInventoryMetric, InventoryTransaction, Product, TransactionType};

// =============================================================================
// Daily Fold
// =============================================================================

/// Turnover for a day: units sold relative to opening stock.
///
/// An opening stock of zero counts as one so a restock-then-sell day still
/// yields a finite rate.
#[inline]
pub fn turnover_rate(sales_count: i64, opening_stock: i64) -> f64 {
    sales_count as f64 / opening_stock.max(1) as f64
}

/// Folds one committed transaction into the metric row for its date.
///
/// `existing` is the current row for `(tx.product_id, date)`, if any.
/// The caller is responsible for never folding the same transaction twice.
pub fn fold_transaction(
    existing: Option<DailyInventoryMetric>,
    tx: &InventoryTransaction,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> DailyInventoryMetric {
    let mut metric = existing.unwrap_or_else(|| {
        DailyInventoryMetric::empty(
            tx.product_id.clone(),
            date,
            tx.previous_stock(),
            tx.sequence,
            now,
        )
    });

    match tx.transaction_type {
        TransactionType::Sale => {
            metric.sales_count = metric.sales_count.saturating_add(tx.quantity)
        }
        t if t.is_restock() => {
            metric.restock_count = metric.restock_count.saturating_add(tx.quantity)
        }
        _ => {}
    }

    if tx.resulting_stock == 0 {
        metric.days_out_of_stock = 1;
    }

    if tx.sequence < metric.first_sequence {
        metric.first_sequence = tx.sequence;
        metric.opening_stock = tx.previous_stock();
    }

    metric.turnover_rate = turnover_rate(metric.sales_count, metric.opening_stock);
    metric.updated_at = now;
    metric
}

// =============================================================================
// Range Summary
// =============================================================================

/// Sales analytics for one product over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub product_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Mean turnover over the dates that have a metric row; 0.0 if none.
    pub average_turnover: f64,
    pub total_sales: i64,
    pub total_restocks: i64,
    pub days_out_of_stock: i64,
    /// One entry per date in range, zero-filled.
    pub sales_trend: Vec<(NaiveDate, i64)>,
}

/// Summarises metric rows for one product.
///
/// Rows outside `[start, end]` are ignored.
pub fn summarize(
    product_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    rows: &[DailyInventoryMetric],
) -> AnalyticsSummary {
    let by_date: BTreeMap<NaiveDate, &DailyInventoryMetric> = rows
        .iter()
        .filter(|m| m.product_id == product_id && m.date >= start && m.date <= end)
        .map(|m| (m.date, m))
        .collect();

    let total_sales = saturating_sum(by_date.values().map(|m| m.sales_count));
    let total_restocks = saturating_sum(by_date.values().map(|m| m.restock_count));
    let days_out_of_stock = saturating_sum(by_date.values().map(|m| m.days_out_of_stock));
    let average_turnover = mean(by_date.values().map(|m| m.turnover_rate));

    let sales_trend = start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| (d, by_date.get(&d).map_or(0, |m| m.sales_count)))
        .collect();

    AnalyticsSummary {
        product_id: product_id.to_string(),
        start,
        end,
        average_turnover,
        total_sales,
        total_restocks,
        days_out_of_stock,
        sales_trend,
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, i64::saturating_add)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

// =============================================================================
// Top Sellers
// =============================================================================

/// One row of the top-selling ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSalesSummary {
    pub product_id: String,
    pub product_name: String,
    pub total_sales: i64,
    pub average_turnover: f64,
}

/// Ranks products by summed sales over `rows`.
///
/// Products with no positive sales are dropped. Ties break on product id
/// so the order is total. Products missing from `products` keep an empty
/// name.
pub fn rank_top_sellers(
    rows: &[DailyInventoryMetric],
    products: &[Product],
    limit: usize,
) -> Vec<ProductSalesSummary> {
    let mut totals: BTreeMap<&str, (i64, Vec<f64>)> = BTreeMap::new();
    for m in rows {
        let entry = totals.entry(m.product_id.as_str()).or_default();
        entry.0 = entry.0.saturating_add(m.sales_count);
        entry.1.push(m.turnover_rate);
    }

    let mut ranked: Vec<ProductSalesSummary> = totals
        .into_iter()
        .filter(|(_, (total, _))| *total > 0)
        .map(|(id, (total_sales, turnovers))| ProductSalesSummary {
            product_id: id.to_string(),
            product_name: products
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            total_sales,
            average_turnover: mean(turnovers.into_iter()),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_sales
            .cmp(&a.total_sales)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(limit);
    ranked
}

// =============================================================================
// Stockout Risk
// =============================================================================

/// How close a product is to running out.
///
/// Variants are declared most severe first so the derived `Ord` sorts
/// CRITICAL ahead of LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    /// Classifies a stock level against its threshold.
    ///
    /// ## Bands (ratio = stock / threshold)
    /// - `stock == 0` or ratio <= 0.25: Critical
    /// - ratio <= 0.5: High
    /// - ratio <= 0.75: Medium
    /// - otherwise: Low
    ///
    /// A zero threshold has no ratio; such a product is Critical when empty
    /// and Low otherwise.
    pub fn classify(stock: i64, threshold: i64) -> RiskLevel {
        if stock <= 0 {
            return RiskLevel::Critical;
        }
        if threshold <= 0 {
            return RiskLevel::Low;
        }

        let ratio = stock as f64 / threshold as f64;
        if ratio <= 0.25 {
            RiskLevel::Critical
        } else if ratio <= 0.5 {
            RiskLevel::High
        } else if ratio <= 0.75 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Stockout risk for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub product_id: String,
    pub product_name: String,
    pub current_stock: i64,
    pub threshold: i64,
    pub risk_level: RiskLevel,
}

/// Classifies every active product, most severe first then by id.
pub fn assess_stockout_risk(products: &[Product]) -> Vec<RiskEntry> {
    let mut entries: Vec<RiskEntry> = products
        .iter()
        .filter(|p| p.active)
        .map(|p| RiskEntry {
            product_id: p.id.clone(),
            product_name: p.name.clone(),
            current_stock: p.stock_quantity,
            threshold: p.low_stock_threshold,
            risk_level: RiskLevel::classify(p.stock_quantity, p.low_stock_threshold),
        })
        .collect();

    entries.sort_by(|a, b| match a.risk_level.cmp(&b.risk_level) {
        Ordering::Equal => a.product_id.cmp(&b.product_id),
        other => other,
    });
    entries
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn tx(
        seq: i64,
        t: TransactionType,
        quantity: i64,
        delta: i64,
        resulting_stock: i64,
    ) -> InventoryTransaction {
        InventoryTransaction {
            id: format!("tx-{}", seq),
            product_id: "p1".into(),
            quantity,
            transaction_type: t,
            delta,
            reference: None,
            resulting_stock,
            sequence: seq,
            created_at: Utc::now(),
        }
    }

    fn metric(product: &str, d: u32, sales: i64, turnover: f64) -> DailyInventoryMetric {
        let mut m = DailyInventoryMetric::empty(product, day(d), 10, 1, Utc::now());
        m.sales_count = sales;
        m.turnover_rate = turnover;
        m
    }

    fn product(id: &str, stock: i64, threshold: i64) -> Product {
        let mut p = Product::new(format!("Product {}", id), stock, threshold, Utc::now());
        p.id = id.to_string();
        p
    }

    #[test]
    fn test_turnover_rate_floors_opening_at_one() {
        assert_eq!(turnover_rate(90, 100), 0.9);
        assert_eq!(turnover_rate(5, 0), 5.0);
        assert_eq!(turnover_rate(0, 0), 0.0);
    }

    #[test]
    fn test_fold_sale_scenario() {
        // stock 100, sell 90
        let now = Utc::now();
        let m = fold_transaction(None, &tx(1, TransactionType::Sale, 90, -90, 10), day(1), now);
        assert_eq!(m.sales_count, 90);
        assert_eq!(m.restock_count, 0);
        assert_eq!(m.opening_stock, 100);
        assert_eq!(m.first_sequence, 1);
        assert_eq!(m.days_out_of_stock, 0);
        assert!((m.turnover_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_fold_counts_by_type() {
        let now = Utc::now();
        let txs = [
            tx(1, TransactionType::Purchase, 10, 10, 10),
            tx(2, TransactionType::Restock, 5, 5, 15),
            tx(3, TransactionType::Return, 1, 1, 16),
            tx(4, TransactionType::Damaged, 6, -6, 10),
            tx(5, TransactionType::Adjustment, 0, -10, 0),
        ];
        let mut m = None;
        for t in &txs {
            m = Some(fold_transaction(m, t, day(1), now));
        }
        let m = m.unwrap();
        assert_eq!(m.restock_count, 16);
        assert_eq!(m.sales_count, 0);
        assert_eq!(m.days_out_of_stock, 1);
        assert_eq!(m.opening_stock, 0);
    }

    #[test]
    fn test_fold_saturates_large_counts() {
        let now = Utc::now();
        let big = i64::MAX / 2 + 1;
        let mut m = None;
        for seq in 1..=3 {
            m = Some(fold_transaction(
                m,
                &tx(seq, TransactionType::Purchase, big, big, big),
                day(1),
                now,
            ));
        }
        let m = m.unwrap();
        assert_eq!(m.restock_count, i64::MAX);

        let mut other = m.clone();
        other.date = day(2);
        let summary = summarize(&m.product_id, day(1), day(2), &[m.clone(), other]);
        assert_eq!(summary.total_restocks, i64::MAX);
    }

    #[test]
    fn test_fold_is_order_independent() {
        let now = Utc::now();
        let a = tx(1, TransactionType::Sale, 10, -10, 40);
        let b = tx(2, TransactionType::Sale, 40, -40, 0);
        let c = tx(3, TransactionType::Purchase, 25, 25, 25);

        let forward = [&a, &b, &c]
            .into_iter()
            .fold(None, |m, t| Some(fold_transaction(m, t, day(1), now)))
            .unwrap();
        let shuffled = [&c, &a, &b]
            .into_iter()
            .fold(None, |m, t| Some(fold_transaction(m, t, day(1), now)))
            .unwrap();

        assert_eq!(forward, shuffled);
        assert_eq!(forward.opening_stock, 50);
        assert_eq!(forward.first_sequence, 1);
        assert_eq!(forward.sales_count, 50);
        assert_eq!(forward.days_out_of_stock, 1);
        assert!((forward.turnover_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_fills_gaps() {
        let rows = vec![metric("p1", 2, 5, 0.5), metric("p1", 4, 3, 0.25)];
        let s = summarize("p1", day(1), day(5), &rows);
        assert_eq!(s.total_sales, 8);
        assert_eq!(s.sales_trend.len(), 5);
        assert_eq!(s.sales_trend[0], (day(1), 0));
        assert_eq!(s.sales_trend[1], (day(2), 5));
        assert_eq!(s.sales_trend[3], (day(4), 3));
        assert!((s.average_turnover - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty_range() {
        let s = summarize("p1", day(1), day(1), &[]);
        assert_eq!(s.total_sales, 0);
        assert_eq!(s.average_turnover, 0.0);
        assert_eq!(s.sales_trend, vec![(day(1), 0)]);
    }

    #[test]
    fn test_rank_top_sellers_ties_break_on_id() {
        let rows = vec![
            metric("b", 1, 10, 0.1),
            metric("a", 1, 10, 0.2),
            metric("c", 1, 4, 0.1),
            metric("c", 2, 30, 0.3),
            metric("z", 1, 0, 0.0),
        ];
        let products = vec![product("a", 1, 1), product("b", 1, 1), product("c", 1, 1)];

        let ranked = rank_top_sellers(&rows, &products, 10);
        let ids: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(ranked[0].total_sales, 34);
        assert_eq!(ranked[0].product_name, "Product c");
        assert!((ranked[0].average_turnover - 0.2).abs() < 1e-9);

        let top1 = rank_top_sellers(&rows, &products, 1);
        assert_eq!(top1.len(), 1);
    }

    #[test]
    fn test_risk_bands() {
        assert_eq!(RiskLevel::classify(0, 20), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(5, 20), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(10, 20), RiskLevel::High);
        assert_eq!(RiskLevel::classify(15, 20), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(16, 20), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(100, 20), RiskLevel::Low);
    }

    #[test]
    fn test_risk_zero_threshold() {
        assert_eq!(RiskLevel::classify(0, 0), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(3, 0), RiskLevel::Low);
    }

    #[test]
    fn test_assess_sorts_by_severity_then_id() {
        let mut inactive = product("x", 0, 10);
        inactive.active = false;
        let products = vec![
            product("d", 100, 20),
            product("c", 0, 20),
            product("b", 10, 20),
            product("a", 4, 20),
            inactive,
        ];
        let entries = assess_stockout_risk(&products);
        let got: Vec<(&str, RiskLevel)> = entries
            .iter()
            .map(|e| (e.product_id.as_str(), e.risk_level))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a", RiskLevel::Critical),
                ("c", RiskLevel::Critical),
                ("b", RiskLevel::High),
                ("d", RiskLevel::Low),
            ]
        );
    }
}
