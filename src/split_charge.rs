//! Split-Charge Redistribution
//!
//! Moves a source cost center's cost onto its target cost centers according to the
//! configured rules. Every function here takes an immutable cost map and returns a new one,
//! so chained calls never observe each other's intermediate state.
//!
//! ## Snapshot semantics
//!
//! All rules in one call read source and target amounts from the map as it was passed in.
//! With `A → {X, Y}` followed by `B → {X}`, the second rule moves B's original amount and
//! weighs X by its original amount, never by what the first rule already added to it.
//! A source that is also another rule's target passes what it received on to its own
//! targets afterwards, so every routed source ends at zero.
//!
//! ## Methods
//!
//! - `PROPORTIONAL`: by each target's own amount; EVEN when all targets are zero
//! - `EVEN`: equal shares
//! - `FIXED`: explicit percentages (`"Eng=70"` or positional `"70"`); EVEN when none parse.
//!   Percentages are not normalized, so a sum below 100 leaves the remainder unassigned.
//!
//! ## Historical periods
//!
//! The current rule-set is only valid for the periods it was active in. For older comparison
//! periods [`SplitTreatment::Fold`] moves any remaining source balance pro-rata onto the
//! targets without re-applying rule methods, keeping the period total intact.

use crate::models::{CollectedData, CostMap, SplitChargeRule, SplitMethod};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// How split-charge sources are settled for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitTreatment {
    /// Apply the active rules
    Redistribute,
    /// Historical period: fold source balances pro-rata into targets
    Fold,
}

/// Split-charge sources and rules for one run
#[derive(Debug, Clone, Default)]
pub struct SplitChargeConfig {
    sources: BTreeSet<String>,
    rules: Vec<SplitChargeRule>,
}

impl SplitChargeConfig {
    pub fn new<I, S>(sources: I, rules: Vec<SplitChargeRule>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sources: BTreeSet<String> = sources.into_iter().map(Into::into).collect();
        sources.extend(rules.iter().map(|r| r.source.clone()));
        Self { sources, rules }
    }

    pub fn from_collected(data: &CollectedData) -> Self {
        Self::new(
            data.split_charge_sources.iter().cloned(),
            data.split_charge_rules.clone(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn is_source(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    pub fn rule_for(&self, source: &str) -> Option<&SplitChargeRule> {
        self.rules.iter().find(|r| r.source == source)
    }

    /// Every cost center a rule names, as source or target
    pub fn named_cost_centers(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.sources().collect();
        for rule in &self.rules {
            names.extend(rule.targets.iter().map(String::as_str));
        }
        names
    }

    /// Settle split-charge sources in one period's cost map
    pub fn settle(&self, costs: &CostMap, treatment: SplitTreatment) -> CostMap {
        if self.is_empty() {
            return costs.clone();
        }
        match treatment {
            SplitTreatment::Redistribute => {
                let redistributed = redistribute(costs, &self.rules);
                // Flagged sources without a rule still carry their balance
                let unruled: Vec<&str> = self
                    .sources()
                    .filter(|s| self.rule_for(s).is_none())
                    .collect();
                fold_into_targets(&redistributed, &unruled, self)
            }
            SplitTreatment::Fold => {
                let sources: Vec<&str> = self.sources().collect();
                fold_into_targets(costs, &sources, self)
            }
        }
    }
}

/// Apply split-charge rules to one period's cost map.
///
/// Returns a new map; `costs` is the snapshot every rule reads from.
pub fn redistribute(costs: &CostMap, rules: &[SplitChargeRule]) -> CostMap {
    let snapshot = costs;
    let mut result = costs.clone();
    let mut settled: HashSet<&str> = HashSet::new();
    let mut routes: Vec<Route<'_>> = Vec::new();

    for rule in rules {
        let targets: Vec<&str> = rule
            .targets
            .iter()
            .map(String::as_str)
            .filter(|t| *t != rule.source)
            .collect();
        if targets.is_empty() {
            warn!(source = %rule.source, "Split charge rule has no targets, skipping");
            continue;
        }
        if !settled.insert(rule.source.as_str()) {
            warn!(source = %rule.source, "Duplicate split charge rule for source, skipping");
            continue;
        }

        for target in &targets {
            result.entry(target.to_string()).or_insert(0.0);
        }

        let source_cost = snapshot.get(&rule.source).copied().unwrap_or(0.0);
        if source_cost == 0.0 {
            result.entry(rule.source.clone()).or_insert(0.0);
        } else {
            let shares = allocation_shares(rule, &targets, snapshot, source_cost);
            debug!(
                source = %rule.source,
                method = ?rule.method,
                amount = source_cost,
                targets = targets.len(),
                "Redistributing split charge"
            );

            *result.entry(rule.source.clone()).or_insert(0.0) -= source_cost;
            for (target, share) in shares {
                *result.entry(target.to_string()).or_insert(0.0) += share;
            }
        }
        routes.push((rule.source.as_str(), targets));
    }

    forward_inflow(&mut result, &routes, snapshot);
    result
}

/// A settled source and the cost centers its balance moves to
type Route<'a> = (&'a str, Vec<&'a str>);

/// Pass on whatever a source received from other sources during the snapshot pass.
///
/// With `A → B` and `B → C`, B ends the snapshot pass holding A's share. That balance moves
/// on to B's own targets, weighted by their snapshot amounts, until no routed source holds
/// anything. Cycles cannot settle and keep their remaining balance.
fn forward_inflow(result: &mut CostMap, routes: &[Route<'_>], snapshot: &CostMap) {
    for _ in 0..=routes.len() {
        let mut forwarded = false;
        for (source, targets) in routes {
            let balance = result.get(*source).copied().unwrap_or(0.0);
            if balance == 0.0 {
                continue;
            }
            forwarded = true;
            debug!(source, balance, "Forwarding split charge received from another source");
            result.insert(source.to_string(), 0.0);
            for (target, share) in proportional_shares(targets, snapshot, balance) {
                *result.entry(target.to_string()).or_insert(0.0) += share;
            }
        }
        if !forwarded {
            return;
        }
    }

    let stuck: Vec<&str> = routes
        .iter()
        .map(|(source, _)| *source)
        .filter(|source| result.get(*source).is_some_and(|balance| *balance != 0.0))
        .collect();
    if !stuck.is_empty() {
        warn!(?stuck, "Split charge rules form a cycle, sources keep their remaining balance");
    }
}

fn allocation_shares<'a>(
    rule: &SplitChargeRule,
    targets: &[&'a str],
    snapshot: &CostMap,
    amount: f64,
) -> Vec<(&'a str, f64)> {
    match rule.method {
        SplitMethod::Proportional => proportional_shares(targets, snapshot, amount),
        SplitMethod::Even => even_shares(targets, amount),
        SplitMethod::Fixed => {
            let mut percentages = parse_fixed_percentages(rule);
            percentages.retain(|name, pct| {
                let known = targets.contains(&name.as_str());
                if !known {
                    warn!(
                        source = %rule.source,
                        target = %name,
                        pct = *pct,
                        "FIXED percentage names a cost center that is not a target, ignoring"
                    );
                }
                known
            });
            if percentages.is_empty() {
                warn!(source = %rule.source, "No usable FIXED percentages, splitting evenly");
                return even_shares(targets, amount);
            }

            let total_pct: f64 = percentages.values().sum();
            if (total_pct - 100.0).abs() > 1e-6 {
                warn!(
                    source = %rule.source,
                    total_pct,
                    unassigned = amount * (100.0 - total_pct) / 100.0,
                    "FIXED split charge percentages do not sum to 100"
                );
            }

            targets
                .iter()
                .map(|t| {
                    let pct = percentages.get(*t).copied().unwrap_or(0.0);
                    (*t, amount * pct / 100.0)
                })
                .collect()
        }
    }
}

fn proportional_shares<'a>(
    targets: &[&'a str],
    snapshot: &CostMap,
    amount: f64,
) -> Vec<(&'a str, f64)> {
    let weights: Vec<f64> = targets
        .iter()
        .map(|t| snapshot.get(*t).copied().unwrap_or(0.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return even_shares(targets, amount);
    }
    targets
        .iter()
        .zip(weights)
        .map(|(t, w)| (*t, amount * w / total))
        .collect()
}

fn even_shares<'a>(targets: &[&'a str], amount: f64) -> Vec<(&'a str, f64)> {
    let share = amount / targets.len() as f64;
    targets.iter().map(|t| (*t, share)).collect()
}

/// Parse FIXED allocation values into target → percentage.
///
/// Accepts `name=percent` pairs (whitespace around `=` ignored) or bare values aligned
/// positionally with the rule's targets. Unparseable entries are skipped.
pub fn parse_fixed_percentages(rule: &SplitChargeRule) -> BTreeMap<String, f64> {
    let mut percentages = BTreeMap::new();

    for (index, raw) in rule.allocation_values().enumerate() {
        let (target, value) = match raw.split_once('=') {
            Some((name, value)) => (Some(name.trim().to_string()), value.trim()),
            None => (rule.targets.get(index).cloned(), raw.trim()),
        };

        let Some(target) = target else {
            warn!(
                source = %rule.source,
                value = raw,
                "FIXED percentage has no matching target, skipping"
            );
            continue;
        };

        match value.parse::<f64>() {
            Ok(pct) if pct.is_finite() => {
                percentages.insert(target, pct);
            }
            _ => {
                warn!(source = %rule.source, value = raw, "Malformed FIXED percentage, skipping");
            }
        }
    }

    percentages
}

/// Move the remaining balance of `sources` onto their targets, pro-rata to the targets'
/// amounts in `costs`. Sources without a rule spread over every non-source cost center.
pub fn fold_into_targets(
    costs: &CostMap,
    sources: &[&str],
    config: &SplitChargeConfig,
) -> CostMap {
    let snapshot = costs;
    let mut result = costs.clone();
    let mut routes: Vec<Route<'_>> = Vec::new();

    for &source in sources {
        let targets: Vec<&str> = match config.rule_for(source) {
            Some(rule) => rule
                .targets
                .iter()
                .map(String::as_str)
                .filter(|t| *t != source)
                .collect(),
            None => snapshot
                .keys()
                .map(String::as_str)
                .filter(|name| !config.is_source(name))
                .collect(),
        };
        let balance = snapshot.get(source).copied().unwrap_or(0.0);
        if targets.is_empty() {
            if balance != 0.0 {
                warn!(
                    source,
                    balance,
                    "No cost center to fold split charge balance into, keeping it"
                );
            }
            continue;
        }

        if balance != 0.0 {
            debug!(
                source,
                balance,
                targets = targets.len(),
                "Folding split charge balance pro-rata"
            );
            *result.entry(source.to_string()).or_insert(0.0) -= balance;
            for (target, share) in proportional_shares(&targets, snapshot, balance) {
                *result.entry(target.to_string()).or_insert(0.0) += share;
            }
        }
        routes.push((source, targets));
    }

    forward_inflow(&mut result, &routes, snapshot);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs(entries: &[(&str, f64)]) -> CostMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn total(map: &CostMap) -> f64 {
        map.values().sum()
    }

    #[test]
    fn test_proportional() {
        let input = costs(&[("Shared", 100.0), ("Eng", 300.0), ("Data", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Proportional)];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 375.0);
        assert_eq!(result["Data"], 125.0);
        // input untouched
        assert_eq!(input["Shared"], 100.0);
    }

    #[test]
    fn test_even() {
        let input = costs(&[("Shared", 100.0), ("Eng", 300.0), ("Data", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Even)];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 350.0);
        assert_eq!(result["Data"], 150.0);
    }

    #[test]
    fn test_fixed_named() {
        let input = costs(&[("Shared", 200.0), ("Eng", 300.0), ("Data", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["Eng=70", "Data=30"])];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 440.0);
        assert_eq!(result["Data"], 160.0);
    }

    #[test]
    fn test_fixed_shortfall_is_lost() {
        let input = costs(&[("Shared", 200.0), ("Eng", 300.0), ("Data", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["Eng=60", "Data=30"])];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 420.0);
        assert_eq!(result["Data"], 160.0);
        assert_eq!(total(&input) - total(&result), 20.0);
    }

    #[test]
    fn test_fixed_whitespace_around_equals() {
        let rule = SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["Eng = 70", " Data= 30 "]);
        let parsed = parse_fixed_percentages(&rule);
        assert_eq!(parsed.get("Eng"), Some(&70.0));
        assert_eq!(parsed.get("Data"), Some(&30.0));
    }

    #[test]
    fn test_fixed_malformed_falls_back_to_even() {
        let input = costs(&[("Shared", 100.0), ("Eng", 0.0), ("Data", 0.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["Eng=abc", "Data=Team=30"])];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Eng"], 50.0);
        assert_eq!(result["Data"], 50.0);
    }

    #[test]
    fn test_fixed_without_parameters_falls_back_to_even() {
        let input = costs(&[("Shared", 90.0)]);
        let rules = [SplitChargeRule::new("Shared", &["A", "B", "C"], SplitMethod::Fixed)];
        let result = redistribute(&input, &rules);
        assert_eq!(result["A"], 30.0);
        assert_eq!(result["C"], 30.0);
    }

    #[test]
    fn test_proportional_zero_targets_falls_back_to_even() {
        let input = costs(&[("Shared", 100.0), ("Eng", 0.0), ("Data", 0.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Proportional)];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Eng"], 50.0);
        assert_eq!(result["Data"], 50.0);
    }

    #[test]
    fn test_zero_source_changes_nothing() {
        let input = costs(&[("Shared", 0.0), ("Eng", 300.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng"], SplitMethod::Proportional)];
        assert_eq!(redistribute(&input, &rules), input);
    }

    #[test]
    fn test_missing_target_initialized() {
        let input = costs(&[("Shared", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["NewTeam"], SplitMethod::Even)];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["NewTeam"], 100.0);
    }

    #[test]
    fn test_no_rules_returns_equal_copy() {
        let input = costs(&[("Eng", 300.0), ("Data", 100.0)]);
        assert_eq!(redistribute(&input, &[]), input);
    }

    #[test]
    fn test_rule_without_targets_skipped() {
        let input = costs(&[("Shared", 100.0), ("Eng", 10.0)]);
        let rules = [
            SplitChargeRule::new("Shared", &[], SplitMethod::Even),
            SplitChargeRule::new("Other", &["Eng"], SplitMethod::Even),
        ];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 100.0);
        assert_eq!(result["Eng"], 10.0);
    }

    #[test]
    fn test_chained_rules_read_snapshot() {
        // A -> B, B -> C: B moves its original amount, then forwards what A sent it
        let input = costs(&[("A", 100.0), ("B", 50.0), ("C", 10.0)]);
        let rules = [
            SplitChargeRule::new("A", &["B"], SplitMethod::Even),
            SplitChargeRule::new("B", &["C"], SplitMethod::Even),
        ];
        let result = redistribute(&input, &rules);
        assert_eq!(result["A"], 0.0);
        assert_eq!(result["B"], 0.0);
        assert_eq!(result["C"], 160.0);
        assert_eq!(total(&result), total(&input));
    }

    #[test]
    fn test_chain_listed_in_reverse_order() {
        let input = costs(&[("A", 30.0), ("B", 20.0), ("C", 10.0), ("D", 40.0)]);
        let rules = [
            SplitChargeRule::new("C", &["D"], SplitMethod::Proportional),
            SplitChargeRule::new("B", &["C"], SplitMethod::Proportional),
            SplitChargeRule::new("A", &["B"], SplitMethod::Proportional),
        ];
        let result = redistribute(&input, &rules);
        assert_eq!(result["A"], 0.0);
        assert_eq!(result["B"], 0.0);
        assert_eq!(result["C"], 0.0);
        assert_eq!(result["D"], 100.0);
    }

    #[test]
    fn test_cyclic_rules_conserve_total() {
        let input = costs(&[("A", 100.0), ("B", 0.0), ("C", 5.0)]);
        let rules = [
            SplitChargeRule::new("A", &["B"], SplitMethod::Even),
            SplitChargeRule::new("B", &["A"], SplitMethod::Even),
        ];
        let result = redistribute(&input, &rules);
        assert_eq!(total(&result), total(&input));
        assert_eq!(result["C"], 5.0);
    }

    #[test]
    fn test_fixed_names_outside_targets_fall_back_to_even() {
        // percentage keys are case-sensitive cost-center names
        let input = costs(&[("Shared", 200.0), ("Eng", 300.0), ("Data", 100.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["eng=60", "data=40"])];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 400.0);
        assert_eq!(result["Data"], 200.0);
        assert_eq!(total(&result), total(&input));
        assert!(!result.contains_key("eng"));
    }

    #[test]
    fn test_fixed_ignores_non_target_entries() {
        let input = costs(&[("Shared", 100.0), ("Eng", 0.0), ("Data", 0.0)]);
        let rules = [SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Fixed)
            .with_percentages(&["Eng=70", "Data=30", "Ops=50"])];
        let result = redistribute(&input, &rules);
        assert_eq!(result["Eng"], 70.0);
        assert_eq!(result["Data"], 30.0);
        assert!(!result.contains_key("Ops"));
    }

    #[test]
    fn test_fold_moves_balance_pro_rata() {
        let config = SplitChargeConfig::new(
            ["Shared"],
            vec![SplitChargeRule::new("Shared", &["Eng", "Data"], SplitMethod::Even)],
        );
        let input = costs(&[("Shared", 40.0), ("Eng", 300.0), ("Data", 100.0)]);
        let result = config.settle(&input, SplitTreatment::Fold);
        // pro-rata (3:1), not the rule's EVEN method
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Eng"], 330.0);
        assert_eq!(result["Data"], 110.0);
    }

    #[test]
    fn test_fold_forwards_balance_received_by_a_source() {
        let config = SplitChargeConfig::new(
            ["Shared", "Platform"],
            vec![
                SplitChargeRule::new("Shared", &["Platform", "Eng"], SplitMethod::Even),
                SplitChargeRule::new("Platform", &["Data"], SplitMethod::Even),
            ],
        );
        let input = costs(&[("Shared", 40.0), ("Platform", 60.0), ("Eng", 60.0), ("Data", 100.0)]);
        let result = config.settle(&input, SplitTreatment::Fold);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(result["Platform"], 0.0);
        assert_eq!(result["Eng"], 80.0);
        assert_eq!(result["Data"], 180.0);
        assert_eq!(total(&result), total(&input));
    }

    #[test]
    fn test_flagged_source_without_rule_is_conserved() {
        let config = SplitChargeConfig::new(["Shared"], vec![]);
        let input = costs(&[("Shared", 50.0), ("Eng", 150.0), ("Data", 50.0)]);
        let result = config.settle(&input, SplitTreatment::Redistribute);
        assert_eq!(result["Shared"], 0.0);
        assert_eq!(total(&result), total(&input));
        assert_eq!(result["Eng"], 187.5);
    }

    #[test]
    fn test_rule_sources_are_flagged() {
        let config = SplitChargeConfig::new(
            Vec::<String>::new(),
            vec![SplitChargeRule::new("Platform", &["Eng"], SplitMethod::Even)],
        );
        assert!(config.is_source("Platform"));
        assert!(!config.is_source("Eng"));
        assert!(config.named_cost_centers().contains("Eng"));
    }
}
