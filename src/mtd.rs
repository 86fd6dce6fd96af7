//! Month-to-date comparison
//!
//! Builds the prior-month partial block that sits next to an in-progress month. The partial
//! window is normalized, aggregated and redistributed on its own and never feeds the primary
//! period totals.

use crate::aggregate::aggregate_workloads;
use crate::attribution::{settle_period, CostCenterMapper, PeriodInput};
use crate::models::{round_cents, MtdComparison, MtdCostCenter, MtdWorkload, UsageRecord};
use crate::periods::DateRange;
use crate::split_charge::{SplitChargeConfig, SplitTreatment};
use std::collections::HashMap;
use tracing::debug;

/// Build the comparison block for the prior-month partial window
pub fn build_mtd_comparison(
    window: DateRange,
    rows: &[UsageRecord],
    mapper: &CostCenterMapper<'_>,
    allocated: Option<&HashMap<String, f64>>,
    split: &SplitChargeConfig,
) -> MtdComparison {
    let workload_costs = aggregate_workloads(rows);
    let groups = mapper.group(workload_costs.keys().map(String::as_str));
    let totals = settle_period(
        &groups,
        &PeriodInput {
            workload_costs: &workload_costs,
            allocated,
            treatment: SplitTreatment::Redistribute,
        },
        split,
    );

    let mut cost_centers: Vec<MtdCostCenter> = totals
        .iter()
        .filter(|(name, cost)| groups.contains_key(*name) || **cost != 0.0 || split.is_source(name))
        .map(|(name, cost)| {
            let mut workloads: Vec<MtdWorkload> = groups
                .get(name)
                .into_iter()
                .flatten()
                .map(|w| MtdWorkload {
                    name: w.clone(),
                    prior_partial_cost_usd: round_cents(
                        workload_costs.get(w).copied().unwrap_or(0.0),
                    ),
                })
                .collect();
            workloads.sort_by(|a, b| {
                b.prior_partial_cost_usd
                    .total_cmp(&a.prior_partial_cost_usd)
                    .then_with(|| a.name.cmp(&b.name))
            });

            MtdCostCenter {
                name: name.clone(),
                prior_partial_cost_usd: round_cents(*cost),
                workloads,
                is_split_charge: split.is_source(name),
            }
        })
        .collect();

    cost_centers.sort_by(|a, b| {
        b.prior_partial_cost_usd
            .total_cmp(&a.prior_partial_cost_usd)
            .then_with(|| a.name.cmp(&b.name))
    });

    debug!(
        window = %window,
        cost_centers = cost_centers.len(),
        rows = rows.len(),
        "Built month-to-date comparison"
    );

    MtdComparison {
        prior_partial_start: window.start,
        prior_partial_end_exclusive: window.end,
        cost_centers,
    }
}
