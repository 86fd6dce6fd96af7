#![allow(dead_code)]

use anyhow::Result;
use chrono::{TimeZone, Utc};
use cost_attribution::{
    Amount, CollectedData, MetricValue, PeriodKey, RawGroup, SplitChargeRule, TargetMonth,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn raw_group(workload: &str, usage_type: &str, cost: f64, quantity: f64) -> RawGroup {
    let mut metrics = HashMap::new();
    metrics.insert(
        "NetAmortizedCost".to_string(),
        MetricValue { amount: Amount::Text(format!("{}", cost)), unit: Some("USD".to_string()) },
    );
    metrics.insert(
        "UsageQuantity".to_string(),
        MetricValue {
            amount: Amount::Text(format!("{}", quantity)),
            unit: Some("N/A".to_string()),
        },
    );
    RawGroup {
        keys: vec![format!("App${}", workload), usage_type.to_string()],
        metrics,
    }
}

/// Builder for collected documents used across integration tests
pub struct CollectedBuilder {
    data: CollectedData,
}

impl CollectedBuilder {
    /// Daily run at the given UTC date
    pub fn daily(year: i32, month: u32, day: u32) -> Self {
        Self {
            data: CollectedData::new(Utc.with_ymd_and_hms(year, month, day, 6, 0, 0).unwrap()),
        }
    }

    /// Backfill of `year-month`, collected a few days after it ended
    pub fn backfill(year: i32, month: u32) -> Self {
        let mut builder = Self::daily(2026, 6, 15);
        builder.data.target = Some(TargetMonth { year, month });
        builder
    }

    pub fn usage(
        mut self,
        period: PeriodKey,
        workload: &str,
        usage_type: &str,
        cost: f64,
        quantity: f64,
    ) -> Self {
        self.data
            .raw_data
            .entry(period)
            .or_default()
            .push(raw_group(workload, usage_type, cost, quantity));
        self
    }

    pub fn cost(self, period: PeriodKey, workload: &str, cost: f64) -> Self {
        self.usage(period, workload, "BoxUsage:m5.xlarge", cost, 744.0)
    }

    pub fn map(mut self, period: PeriodKey, workload: &str, cost_center: &str) -> Self {
        self.data
            .cc_mappings
            .entry(period)
            .or_default()
            .insert(workload.to_string(), cost_center.to_string());
        self
    }

    pub fn allocated(mut self, period: PeriodKey, cost_center: &str, amount: f64) -> Self {
        self.data
            .allocated_costs
            .entry(period)
            .or_default()
            .insert(cost_center.to_string(), amount);
        self
    }

    pub fn split_source(mut self, cost_center: &str) -> Self {
        self.data.split_charge_sources.push(cost_center.to_string());
        self
    }

    pub fn rule(mut self, rule: SplitChargeRule) -> Self {
        self.data.split_charge_rules.push(rule);
        self
    }

    pub fn build(self) -> CollectedData {
        self.data
    }
}

pub fn write_collected(dir: &Path, filename: &str, data: &CollectedData) -> Result<PathBuf> {
    let path = dir.join(filename);
    fs::write(&path, serde_json::to_string_pretty(data)?)?;
    Ok(path)
}
