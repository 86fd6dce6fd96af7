//! Workload aggregation and tagging coverage

use crate::models::{
    round_cents, round_to, TaggingCoverage, UsageRecord, WorkloadCosts, UNTAGGED_WORKLOAD,
};

/// Sum cost per workload. Workloads with zero cost are kept.
pub fn aggregate_workloads(rows: &[UsageRecord]) -> WorkloadCosts {
    let mut totals = WorkloadCosts::new();
    for row in rows {
        *totals.entry(row.workload.clone()).or_insert(0.0) += row.cost_usd;
    }
    totals
}

/// Tagged vs untagged cost breakdown
pub fn tagging_coverage(workload_costs: &WorkloadCosts) -> TaggingCoverage {
    let (mut tagged, mut untagged) = (0.0, 0.0);
    for (workload, cost) in workload_costs {
        if workload == UNTAGGED_WORKLOAD || workload.is_empty() {
            untagged += cost;
        } else {
            tagged += cost;
        }
    }
    let total = tagged + untagged;
    let pct = if total != 0.0 { tagged / total * 100.0 } else { 0.0 };

    TaggingCoverage {
        tagged_cost_usd: round_cents(tagged),
        untagged_cost_usd: round_cents(untagged),
        tagged_percentage: round_to(pct, 1),
    }
}
