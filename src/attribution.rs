//! Cost-Center Attribution
//!
//! Groups workloads into cost centers and decides each cost center's total per period.
//!
//! ## Total precedence
//!
//! For every (cost center, period) pair, evaluated independently per period:
//!
//! 1. The period's allocated map has a key equal to the cost-center name → that amount.
//! 2. Otherwise → the sum of the cost center's workload costs in that period.
//!
//! Allocated maps for months before cost categories existed are keyed by placeholders
//! such as `"No cost category"`; those periods fall back to workload sums on their own,
//! whatever the other periods contain.
//!
//! Split-charge sources are settled afterwards through [`SplitChargeConfig::settle`], which
//! keeps each period's total unchanged apart from deliberate FIXED shortfalls.

use crate::models::{
    round_cents, CostCenterSummary, CostMap, WorkloadCosts, WorkloadSummary, DEFAULT_COST_CENTER,
};
use crate::split_charge::{SplitChargeConfig, SplitTreatment};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Cost center → member workloads
pub type CostCenterGroups = BTreeMap<String, Vec<String>>;

/// Resolves workloads to cost centers from one or more period mappings, first match wins
#[derive(Debug, Clone, Default)]
pub struct CostCenterMapper<'a> {
    layers: Vec<&'a HashMap<String, String>>,
}

impl<'a> CostCenterMapper<'a> {
    pub fn new(layers: Vec<&'a HashMap<String, String>>) -> Self {
        Self { layers }
    }

    pub fn cost_center_for(&self, workload: &str) -> &str {
        self.layers
            .iter()
            .find_map(|m| m.get(workload))
            .map(String::as_str)
            .filter(|cc| !cc.is_empty())
            .unwrap_or(DEFAULT_COST_CENTER)
    }

    pub fn group<'w, I>(&self, workloads: I) -> CostCenterGroups
    where
        I: IntoIterator<Item = &'w str>,
    {
        let mut groups = CostCenterGroups::new();
        for workload in workloads {
            groups
                .entry(self.cost_center_for(workload).to_string())
                .or_default()
                .push(workload.to_string());
        }
        groups
    }
}

/// Cost center totals for one period before split charges are settled
pub fn period_totals(
    groups: &CostCenterGroups,
    workload_costs: &WorkloadCosts,
    allocated: Option<&HashMap<String, f64>>,
    split: &SplitChargeConfig,
) -> CostMap {
    let mut names: BTreeSet<&str> = groups.keys().map(String::as_str).collect();
    if let Some(allocated) = allocated {
        names.extend(
            split
                .named_cost_centers()
                .into_iter()
                .filter(|name| allocated.contains_key(*name)),
        );
    }

    let mut totals = CostMap::new();
    for name in names {
        let total = match allocated.and_then(|a| a.get(name)) {
            Some(amount) => *amount,
            None => {
                if allocated.is_some() {
                    debug!(cost_center = name, "No allocated total, using workload sum");
                }
                groups
                    .get(name)
                    .map(|members| {
                        members
                            .iter()
                            .filter_map(|w| workload_costs.get(w))
                            .sum::<f64>()
                    })
                    .unwrap_or(0.0)
            }
        };
        totals.insert(name.to_string(), total);
    }
    totals
}

/// Inputs for one of the three comparison periods of a report
#[derive(Debug, Clone, Copy)]
pub struct PeriodInput<'a> {
    pub workload_costs: &'a WorkloadCosts,
    pub allocated: Option<&'a HashMap<String, f64>>,
    pub treatment: SplitTreatment,
}

/// Settled totals for one period
pub fn settle_period(
    groups: &CostCenterGroups,
    input: &PeriodInput<'_>,
    split: &SplitChargeConfig,
) -> CostMap {
    let totals = period_totals(groups, input.workload_costs, input.allocated, split);
    split.settle(&totals, input.treatment)
}

fn by_cost_desc(a_cost: f64, a_name: &str, b_cost: f64, b_name: &str) -> std::cmp::Ordering {
    b_cost.total_cmp(&a_cost).then_with(|| a_name.cmp(b_name))
}

/// Build the ordered cost-center tree for `[current, prev_month, yoy]`
pub fn attribute_cost_centers(
    mapper: &CostCenterMapper<'_>,
    split: &SplitChargeConfig,
    periods: [PeriodInput<'_>; 3],
) -> Vec<CostCenterSummary> {
    let workloads: BTreeSet<&str> = periods
        .iter()
        .flat_map(|p| p.workload_costs.keys().map(String::as_str))
        .collect();
    let groups = mapper.group(workloads);

    let settled: Vec<CostMap> = periods
        .iter()
        .map(|p| settle_period(&groups, p, split))
        .collect();

    let mut names: BTreeSet<&str> = groups.keys().map(String::as_str).collect();
    for map in &settled {
        names.extend(
            map.iter()
                .filter(|(name, cost)| **cost != 0.0 || split.is_source(name))
                .map(|(name, _)| name.as_str()),
        );
    }

    let total_of = |i: usize, name: &str| settled[i].get(name).copied().unwrap_or(0.0);
    let workload_cost =
        |i: usize, name: &str| periods[i].workload_costs.get(name).copied().unwrap_or(0.0);

    let mut cost_centers: Vec<CostCenterSummary> = names
        .into_iter()
        .map(|name| {
            let mut members: Vec<WorkloadSummary> = groups
                .get(name)
                .map(|ws| {
                    ws.iter()
                        .map(|w| WorkloadSummary {
                            name: w.clone(),
                            current_cost_usd: round_cents(workload_cost(0, w)),
                            prev_month_cost_usd: round_cents(workload_cost(1, w)),
                            yoy_cost_usd: round_cents(workload_cost(2, w)),
                        })
                        .collect()
                })
                .unwrap_or_default();
            members.sort_by(|a, b| {
                by_cost_desc(a.current_cost_usd, &a.name, b.current_cost_usd, &b.name)
            });

            CostCenterSummary {
                name: name.to_string(),
                current_cost_usd: round_cents(total_of(0, name)),
                prev_month_cost_usd: round_cents(total_of(1, name)),
                yoy_cost_usd: round_cents(total_of(2, name)),
                workloads: members,
                is_split_charge: split.is_source(name),
            }
        })
        .collect();

    cost_centers.sort_by(|a, b| {
        by_cost_desc(a.current_cost_usd, &a.name, b.current_cost_usd, &b.name)
    });
    cost_centers
}
