//! Storage volume and cost metrics
//!
//! Object-storage `TimedStorage` usage is reported in GB-months (average gigabytes stored
//! over the month), so it converts straight to bytes at binary scale. File-system and
//! block-storage usage only count towards volume when enabled in [`StorageConfig`].

use crate::models::{round_cents, round_to, Category, StorageConfig, StorageMetrics, UsageRecord};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;
const BYTES_PER_TB: f64 = (1u64 << 40) as f64;

/// Usage type suffixes of the hot tiers (standard and intelligent-tiering frequent access)
const HOT_TIER_SUFFIXES: &[&str] = &["TimedStorage-ByteHrs", "TimedStorage-INT-FA-ByteHrs"];

fn is_volume(usage_type: &str, config: &StorageConfig) -> bool {
    usage_type.contains("TimedStorage")
        || (config.include_efs && usage_type.contains("EFS:"))
        || (config.include_ebs && usage_type.contains("EBS:"))
}

fn is_hot_tier(usage_type: &str) -> bool {
    HOT_TIER_SUFFIXES.iter().any(|suffix| usage_type.ends_with(suffix))
}

fn storage_cost(rows: &[UsageRecord]) -> f64 {
    rows.iter()
        .filter(|r| r.category == Category::Storage)
        .map(|r| r.cost_usd)
        .sum()
}

/// Compute storage metrics for one period, with the prior period's storage cost for deltas
pub fn compute_storage_metrics(
    rows: &[UsageRecord],
    prev_rows: &[UsageRecord],
    config: &StorageConfig,
) -> StorageMetrics {
    let total_cost = storage_cost(rows);
    let prev_total_cost = storage_cost(prev_rows);

    let mut volume_gb_months = 0.0;
    let mut hot_gb_months = 0.0;
    for row in rows.iter().filter(|r| is_volume(&r.usage_type, config)) {
        volume_gb_months += row.usage_quantity;
        if is_hot_tier(&row.usage_type) {
            hot_gb_months += row.usage_quantity;
        }
    }

    let total_bytes = volume_gb_months * BYTES_PER_GB;
    let cost_per_tb = if total_bytes > 0.0 {
        total_cost / (total_bytes / BYTES_PER_TB)
    } else {
        0.0
    };
    let hot_pct = if volume_gb_months > 0.0 {
        hot_gb_months / volume_gb_months * 100.0
    } else {
        0.0
    };

    StorageMetrics {
        total_cost_usd: round_cents(total_cost),
        prev_month_cost_usd: round_cents(prev_total_cost),
        total_volume_bytes: total_bytes.max(0.0).round() as u64,
        hot_tier_percentage: round_to(hot_pct, 1),
        cost_per_tb_usd: round_cents(cost_per_tb),
    }
}
