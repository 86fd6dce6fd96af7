//! Raw group normalization
//!
//! Turns grouped API records keyed by `(workload tag, usage type)` into [`UsageRecord`]s.
//! Groups with any other key shape are skipped; they never abort a report.

use crate::categories::categorize;
use crate::models::{Amount, RawGroup, UsageRecord, UNTAGGED_WORKLOAD};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How raw groups are read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Tag the workload dimension is grouped by; keys arrive as `<tag_key>$<value>`
    pub tag_key: String,
    pub cost_metric: String,
    pub usage_metric: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            tag_key: "App".to_string(),
            cost_metric: "NetAmortizedCost".to_string(),
            usage_metric: "UsageQuantity".to_string(),
        }
    }
}

pub struct GroupParser {
    options: ParseOptions,
    tag_prefix: String,
}

impl Default for GroupParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl GroupParser {
    pub fn new(options: ParseOptions) -> Self {
        let tag_prefix = format!("{}$", options.tag_key);
        Self { options, tag_prefix }
    }

    /// Parse all groups of one period, dropping malformed ones
    pub fn parse_groups(&self, groups: &[RawGroup]) -> Vec<UsageRecord> {
        let rows: Vec<UsageRecord> = groups.iter().filter_map(|g| self.parse_group(g)).collect();
        let dropped = groups.len() - rows.len();
        if dropped > 0 {
            debug!(dropped, kept = rows.len(), "Skipped groups with unexpected key shape");
        }
        rows
    }

    pub fn parse_group(&self, group: &RawGroup) -> Option<UsageRecord> {
        let [tag, usage_type] = group.keys.as_slice() else {
            return None;
        };

        let tag_value = tag.strip_prefix(&self.tag_prefix).unwrap_or(tag);
        let workload = if tag_value.is_empty() {
            UNTAGGED_WORKLOAD.to_string()
        } else {
            tag_value.to_string()
        };

        Some(UsageRecord {
            workload,
            usage_type: usage_type.clone(),
            category: categorize(usage_type),
            cost_usd: self.metric(group, &self.options.cost_metric),
            usage_quantity: self.metric(group, &self.options.usage_metric),
        })
    }

    fn metric(&self, group: &RawGroup, name: &str) -> f64 {
        let Some(value) = group.metrics.get(name) else {
            return 0.0;
        };
        match &value.amount {
            Amount::Number(n) => *n,
            Amount::Text(text) => match text.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => n,
                _ => {
                    warn!(
                        metric = name,
                        amount = %text,
                        keys = ?group.keys,
                        "Unparseable metric amount, using 0"
                    );
                    0.0
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, MetricValue};
    use std::collections::HashMap;

    fn group(keys: &[&str], cost: &str, qty: &str) -> RawGroup {
        let mut metrics = HashMap::new();
        metrics.insert(
            "NetAmortizedCost".to_string(),
            MetricValue { amount: Amount::Text(cost.into()), unit: Some("USD".into()) },
        );
        metrics.insert(
            "UsageQuantity".to_string(),
            MetricValue { amount: Amount::Text(qty.into()), unit: None },
        );
        RawGroup { keys: keys.iter().map(|k| k.to_string()).collect(), metrics }
    }

    #[test]
    fn test_parse_basic_group() {
        let parser = GroupParser::default();
        let row = parser
            .parse_group(&group(&["App$web-app", "BoxUsage:m5.xlarge"], "1000", "744"))
            .unwrap();
        assert_eq!(row.workload, "web-app");
        assert_eq!(row.usage_type, "BoxUsage:m5.xlarge");
        assert_eq!(row.category, Category::Compute);
        assert_eq!(row.cost_usd, 1000.0);
        assert_eq!(row.usage_quantity, 744.0);
    }

    #[test]
    fn test_empty_tag_becomes_untagged() {
        let parser = GroupParser::default();
        let row = parser.parse_group(&group(&["App$", "BoxUsage"], "1", "1")).unwrap();
        assert_eq!(row.workload, UNTAGGED_WORKLOAD);
        let row = parser.parse_group(&group(&["", "BoxUsage"], "1", "1")).unwrap();
        assert_eq!(row.workload, UNTAGGED_WORKLOAD);
    }

    #[test]
    fn test_wrong_key_shape_dropped() {
        let parser = GroupParser::default();
        let groups = vec![
            group(&["App$web"], "1", "1"),
            group(&["App$web", "BoxUsage", "extra"], "1", "1"),
            group(&[], "1", "1"),
            group(&["App$web", "BoxUsage"], "5", "1"),
        ];
        let rows = parser.parse_groups(&groups);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cost_usd, 5.0);
    }

    #[test]
    fn test_missing_or_bad_metric_is_zero() {
        let parser = GroupParser::default();
        let mut g = group(&["App$web", "BoxUsage"], "not-a-number", "2");
        let row = parser.parse_group(&g).unwrap();
        assert_eq!(row.cost_usd, 0.0);
        assert_eq!(row.usage_quantity, 2.0);

        g.metrics.remove("UsageQuantity");
        assert_eq!(parser.parse_group(&g).unwrap().usage_quantity, 0.0);
    }

    #[test]
    fn test_custom_tag_key_and_metric() {
        let parser = GroupParser::new(ParseOptions {
            tag_key: "Team".into(),
            cost_metric: "UnblendedCost".into(),
            usage_metric: "UsageQuantity".into(),
        });
        let mut g = group(&["Team$payments", "BoxUsage"], "3", "1");
        g.metrics.insert(
            "UnblendedCost".into(),
            MetricValue { amount: Amount::Number(7.5), unit: None },
        );
        let row = parser.parse_group(&g).unwrap();
        assert_eq!(row.workload, "payments");
        assert_eq!(row.cost_usd, 7.5);
    }
}
