//! Report Assembly Engine
//!
//! This module composes every engine component into the published outputs for one collected
//! document. It is the primary entry point of the library.
//!
//! ## Pipeline
//!
//! For each reporting frame of the document's [`PeriodSet`]:
//!
//! 1. **Normalization**: raw groups of the three slot periods become [`UsageRecord`]s
//! 2. **Aggregation**: workload totals per slot, tagging coverage for `current`
//! 3. **Attribution**: cost-center totals with allocated-total precedence and split charges
//! 4. **Storage**: volume and unit-cost metrics from the `current` and `prev_month` rows
//! 5. **MTD**: the prior-month partial comparison block, in-progress frames only
//! 6. **Export**: flattened workload and usage-type rows labelled by period
//!
//! ## Key Types
//!
//! - [`CostReportAnalyzer`] - Stateless engine, safe to share across concurrent invocations
//! - [`EngineOptions`] - Explicit engine settings; the engine never reads global config
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cost_attribution::{CollectedData, CostReportAnalyzer, EngineOptions};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let data = CollectedData::from_path(Path::new("collected.json"))?;
//! let analyzer = CostReportAnalyzer::new(EngineOptions::default());
//!
//! for report in analyzer.process(&data)? {
//!     println!("{}: {} cost centers", report.summary.period, report.summary.cost_centers.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::aggregate::{aggregate_workloads, tagging_coverage};
use crate::attribution::{attribute_cost_centers, CostCenterMapper, PeriodInput};
use crate::models::*;
use crate::mtd::build_mtd_comparison;
use crate::parser::{GroupParser, ParseOptions};
use crate::periods::{get_periods, DateRange, PeriodKey, PeriodSet, ReportFrame};
use crate::split_charge::{SplitChargeConfig, SplitTreatment};
use crate::storage::compute_storage_metrics;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};
use uuid::Uuid;

/// Settings the engine runs with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub parse: ParseOptions,
    pub storage: StorageConfig,
}

pub struct CostReportAnalyzer {
    parser: GroupParser,
    storage: StorageConfig,
}

impl Default for CostReportAnalyzer {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

/// Slot order used throughout: current, prev_month, yoy
const SLOT_TREATMENTS: [SplitTreatment; 3] = [
    SplitTreatment::Redistribute,
    SplitTreatment::Redistribute,
    SplitTreatment::Fold,
];

impl CostReportAnalyzer {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            parser: GroupParser::new(options.parse),
            storage: options.storage,
        }
    }

    /// Period set for a collected document
    pub fn periods(&self, data: &CollectedData) -> Result<PeriodSet> {
        get_periods(data.collected_at, data.target)
    }

    /// Process every frame of the document, primary frame first.
    ///
    /// Either all frames succeed or an error is returned; no partial list is produced.
    pub fn process(&self, data: &CollectedData) -> Result<Vec<ProcessedReport>> {
        let periods = self.periods(data)?;
        periods
            .frames()
            .into_iter()
            .map(|frame| self.process_frame(data, &periods, frame))
            .collect()
    }

    pub fn process_frame(
        &self,
        data: &CollectedData,
        periods: &PeriodSet,
        frame: ReportFrame,
    ) -> Result<ProcessedReport> {
        let slots = [frame.current, frame.prev_month, frame.yoy];
        let ranges = slots
            .iter()
            .map(|key| {
                periods
                    .get(*key)
                    .ok_or_else(|| anyhow!("Period '{}' is not part of this period set", key))
            })
            .collect::<Result<Vec<DateRange>>>()?;
        let labels: Vec<String> = ranges.iter().map(DateRange::label).collect();
        let period = labels[0].clone();

        let run_id = Uuid::new_v4();
        let span = info_span!("report", %run_id, period = %period);
        let _enter = span.enter();

        let rows: Vec<Vec<UsageRecord>> = slots
            .iter()
            .map(|key| self.parser.parse_groups(data.groups(*key)))
            .collect();
        let workload_costs: Vec<WorkloadCosts> =
            rows.iter().map(|r| aggregate_workloads(r)).collect();
        debug!(
            current_rows = rows[0].len(),
            prev_month_rows = rows[1].len(),
            yoy_rows = rows[2].len(),
            "Normalized raw groups"
        );

        let mapper = CostCenterMapper::new(
            slots
                .iter()
                .filter_map(|key| data.cc_mappings.get(key))
                .collect(),
        );
        let split = SplitChargeConfig::from_collected(data);

        let inputs: [PeriodInput<'_>; 3] = std::array::from_fn(|i| PeriodInput {
            workload_costs: &workload_costs[i],
            allocated: data.allocated_costs.get(&slots[i]),
            treatment: SLOT_TREATMENTS[i],
        });
        let cost_centers = attribute_cost_centers(&mapper, &split, inputs);

        let storage_metrics = compute_storage_metrics(&rows[0], &rows[1], &self.storage);
        let coverage = tagging_coverage(&workload_costs[0]);
        let mtd_comparison = self.mtd_block(data, periods, frame, &mapper, &split);

        let workload_rows = workload_rows(&cost_centers, &labels, &workload_costs);
        let usage_type_rows = usage_type_rows(&rows, &labels);

        info!(
            cost_centers = cost_centers.len(),
            is_mtd = frame.is_mtd(),
            "Assembled cost summary"
        );

        Ok(ProcessedReport {
            summary: CostSummary {
                collected_at: data.collected_at,
                period,
                periods: PeriodLabels {
                    current: labels[0].clone(),
                    prev_month: labels[1].clone(),
                    yoy: labels[2].clone(),
                },
                is_mtd: frame.is_mtd(),
                mtd_comparison,
                storage_config: self.storage,
                storage_metrics,
                cost_centers,
                tagging_coverage: coverage,
            },
            workload_rows,
            usage_type_rows,
        })
    }

    fn mtd_block(
        &self,
        data: &CollectedData,
        periods: &PeriodSet,
        frame: ReportFrame,
        mapper: &CostCenterMapper<'_>,
        split: &SplitChargeConfig,
    ) -> Option<MtdComparison> {
        let key: PeriodKey = frame.mtd_partial?;
        let window = periods.get(key)?;
        let Some(groups) = data.raw_data.get(&key) else {
            debug!("No prior partial window rows supplied, skipping month-to-date comparison");
            return None;
        };
        let rows = self.parser.parse_groups(groups);
        Some(build_mtd_comparison(
            window,
            &rows,
            mapper,
            data.allocated_costs.get(&key),
            split,
        ))
    }
}

fn workload_rows(
    cost_centers: &[CostCenterSummary],
    labels: &[String],
    workload_costs: &[WorkloadCosts],
) -> Vec<WorkloadCostRow> {
    let mut rows = Vec::new();
    for cc in cost_centers {
        for workload in &cc.workloads {
            for (label, costs) in labels.iter().zip(workload_costs) {
                rows.push(WorkloadCostRow {
                    cost_center: cc.name.clone(),
                    workload: workload.name.clone(),
                    period: label.clone(),
                    cost_usd: round_cents(costs.get(&workload.name).copied().unwrap_or(0.0)),
                });
            }
        }
    }
    rows
}

fn usage_type_rows(rows: &[Vec<UsageRecord>], labels: &[String]) -> Vec<UsageTypeCostRow> {
    rows.iter()
        .zip(labels)
        .flat_map(|(period_rows, label)| {
            period_rows.iter().map(move |row| UsageTypeCostRow {
                workload: row.workload.clone(),
                usage_type: row.usage_type.clone(),
                category: row.category,
                period: label.clone(),
                cost_usd: round_cents(row.cost_usd),
                usage_quantity: round_to(row.usage_quantity, 6),
            })
        })
        .collect()
}
