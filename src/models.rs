//! Core Data Models
//!
//! This module defines the data structures that flow through the attribution engine, from
//! the raw grouped records handed over by the collection layer to the summary and tabular
//! rows produced for persistence.
//!
//! ## Data Flow
//!
//! 1. **Input**: [`CollectedData`] - One period document with raw groups, mappings, rules
//!    and allocated totals, keyed by [`PeriodKey`]
//! 2. **Normalization**: [`UsageRecord`] - One typed row per valid raw group
//! 3. **Output**: [`CostSummary`] - Cost-center tree, storage metrics, tagging coverage
//! 4. **Export**: [`WorkloadCostRow`], [`UsageTypeCostRow`] - Flattened rows per comparison period
//!
//! Field names on the input side follow the cost-reporting API (`Keys`, `Metrics`,
//! `Amount`, `Source`, `Targets`, ...). Output field names match the published summary schema.

use crate::periods::PeriodKey;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// Cost center assigned to workloads missing from every mapping.
pub const DEFAULT_COST_CENTER: &str = "Uncategorized";

/// Workload name used when the workload tag is empty.
pub const UNTAGGED_WORKLOAD: &str = "Untagged";

/// Cost-center name → cost for a single period.
pub type CostMap = BTreeMap<String, f64>;

/// Workload name → cost for a single period.
pub type WorkloadCosts = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Storage,
    Compute,
    Other,
    Support,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Storage => "Storage",
            Category::Compute => "Compute",
            Category::Other => "Other",
            Category::Support => "Support",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized usage row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub workload: String,
    pub usage_type: String,
    pub category: Category,
    pub cost_usd: f64,
    pub usage_quantity: f64,
}

// ---------------------------------------------------------------------------
// Input document
// ---------------------------------------------------------------------------

/// Metric amounts arrive as decimal strings from the API, but hand-written fixtures
/// often use plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Number(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(rename = "Amount", default)]
    pub amount: Amount,
    #[serde(rename = "Unit", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One grouped record as returned by the cost-reporting API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGroup {
    #[serde(rename = "Keys", default)]
    pub keys: Vec<String>,
    #[serde(rename = "Metrics", default)]
    pub metrics: HashMap<String, MetricValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitMethod {
    #[default]
    Proportional,
    Even,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitChargeParameter {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Values", default)]
    pub values: Vec<String>,
}

/// Parameter type carrying FIXED allocation percentages.
pub const ALLOCATION_PERCENTAGES: &str = "ALLOCATION_PERCENTAGES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitChargeRule {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Targets", default)]
    pub targets: Vec<String>,
    #[serde(rename = "Method", default)]
    pub method: SplitMethod,
    #[serde(rename = "Parameters", default)]
    pub parameters: Vec<SplitChargeParameter>,
}

impl SplitChargeRule {
    pub fn new(source: &str, targets: &[&str], method: SplitMethod) -> Self {
        Self {
            source: source.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            method,
            parameters: Vec::new(),
        }
    }

    pub fn with_percentages(mut self, values: &[&str]) -> Self {
        self.parameters.push(SplitChargeParameter {
            kind: ALLOCATION_PERCENTAGES.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Raw FIXED percentage values, in the order they were supplied
    pub fn allocation_values(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ALLOCATION_PERCENTAGES)
            .flat_map(|p| p.values.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMonth {
    pub year: i32,
    pub month: u32,
}

/// Everything the collection layer gathered for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedData {
    pub collected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetMonth>,
    #[serde(default)]
    pub raw_data: BTreeMap<PeriodKey, Vec<RawGroup>>,
    #[serde(default)]
    pub cc_mappings: BTreeMap<PeriodKey, HashMap<String, String>>,
    #[serde(default)]
    pub split_charge_sources: Vec<String>,
    #[serde(default)]
    pub split_charge_rules: Vec<SplitChargeRule>,
    #[serde(default)]
    pub allocated_costs: BTreeMap<PeriodKey, HashMap<String, f64>>,
}

impl CollectedData {
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            target: None,
            raw_data: BTreeMap::new(),
            cc_mappings: BTreeMap::new(),
            split_charge_sources: Vec::new(),
            split_charge_rules: Vec::new(),
            allocated_costs: BTreeMap::new(),
        }
    }

    /// Load a collected document from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read collected data: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse collected data: {}", path.display()))
    }

    pub fn groups(&self, key: PeriodKey) -> &[RawGroup] {
        self.raw_data.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodLabels {
    pub current: String,
    pub prev_month: String,
    pub yoy: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub include_efs: bool,
    pub include_ebs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageMetrics {
    pub total_cost_usd: f64,
    pub prev_month_cost_usd: f64,
    pub total_volume_bytes: u64,
    pub hot_tier_percentage: f64,
    pub cost_per_tb_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub name: String,
    pub current_cost_usd: f64,
    pub prev_month_cost_usd: f64,
    pub yoy_cost_usd: f64,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCenterSummary {
    pub name: String,
    pub current_cost_usd: f64,
    pub prev_month_cost_usd: f64,
    pub yoy_cost_usd: f64,
    pub workloads: Vec<WorkloadSummary>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_split_charge: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingCoverage {
    pub tagged_cost_usd: f64,
    pub untagged_cost_usd: f64,
    pub tagged_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtdWorkload {
    pub name: String,
    pub prior_partial_cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtdCostCenter {
    pub name: String,
    pub prior_partial_cost_usd: f64,
    pub workloads: Vec<MtdWorkload>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_split_charge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtdComparison {
    pub prior_partial_start: NaiveDate,
    pub prior_partial_end_exclusive: NaiveDate,
    pub cost_centers: Vec<MtdCostCenter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub collected_at: DateTime<Utc>,
    pub period: String,
    pub periods: PeriodLabels,
    pub is_mtd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtd_comparison: Option<MtdComparison>,
    pub storage_config: StorageConfig,
    pub storage_metrics: StorageMetrics,
    pub cost_centers: Vec<CostCenterSummary>,
    pub tagging_coverage: TaggingCoverage,
}

impl CostSummary {
    pub fn cost_center(&self, name: &str) -> Option<&CostCenterSummary> {
        self.cost_centers.iter().find(|cc| cc.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadCostRow {
    pub cost_center: String,
    pub workload: String,
    pub period: String,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageTypeCostRow {
    pub workload: String,
    pub usage_type: String,
    pub category: Category,
    pub period: String,
    pub cost_usd: f64,
    pub usage_quantity: f64,
}

/// Summary plus the flattened rows for one reporting frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedReport {
    pub summary: CostSummary,
    pub workload_rows: Vec<WorkloadCostRow>,
    pub usage_type_rows: Vec<UsageTypeCostRow>,
}

/// Round a currency amount to cents
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
