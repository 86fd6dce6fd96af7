//! Output Formatting and Display Management
//!
//! Renders cost summaries and period sets either as colored terminal output or as
//! structured JSON for programmatic consumption.
//!
//! ## Terminal layout
//!
//! - Header with the report period and its comparison periods
//! - Storage metrics and tagging coverage
//! - One line per cost center with month-over-month and year-over-year change,
//!   followed by its workloads
//! - The prior-month partial block for in-progress months

use crate::models::*;
use crate::periods::PeriodSet;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

pub struct DisplayManager {
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Relative change from `previous` to `current` in percent; `None` without a baseline
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous.abs() * 100.0)
    }
}

fn format_change(current: f64, previous: f64) -> String {
    match percent_change(current, previous) {
        None => "n/a".dimmed().to_string(),
        Some(pct) if pct > 0.0 => format!("+{:.1}%", pct).bright_red().to_string(),
        Some(pct) if pct < 0.0 => format!("{:.1}%", pct).bright_green().to_string(),
        Some(_) => "0.0%".bright_white().to_string(),
    }
}

/// Human-readable byte count at binary scale
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

impl DisplayManager {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.context("Failed to serialize output to JSON")
    }

    pub fn display_summaries(&self, summaries: &[&CostSummary], json_output: bool) -> Result<()> {
        if json_output {
            println!("{}", self.to_json(&summaries)?);
            return Ok(());
        }
        for summary in summaries {
            self.print_summary(summary);
        }
        Ok(())
    }

    fn print_summary(&self, summary: &CostSummary) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        let title = if summary.is_mtd {
            format!("Cost Report {} (month to date)", summary.period)
        } else {
            format!("Cost Report {}", summary.period)
        };
        println!("{}", title.bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());
        println!(
            "   compared with {} (previous) and {} (year earlier)",
            summary.periods.prev_month.bright_white(),
            summary.periods.yoy.bright_white()
        );

        let total: f64 = summary.cost_centers.iter().map(|c| c.current_cost_usd).sum();
        let prev_total: f64 = summary.cost_centers.iter().map(|c| c.prev_month_cost_usd).sum();
        println!(
            "\n{} {} cost centers • {} total ({} MoM)",
            "📊".bright_yellow(),
            summary.cost_centers.len().to_string().bright_white().bold(),
            format!("${:.2}", total).bright_green().bold(),
            format_change(total, prev_total)
        );

        let storage = &summary.storage_metrics;
        println!(
            "{} storage {} • {} • {} hot • {}/TB",
            "💾".bright_blue(),
            format!("${:.2}", storage.total_cost_usd).bright_green(),
            format_bytes(storage.total_volume_bytes).bright_white(),
            format!("{:.1}%", storage.hot_tier_percentage).bright_yellow(),
            format!("${:.2}", storage.cost_per_tb_usd).bright_green()
        );
        println!(
            "{} tagged {} of cost ({} untagged)\n",
            "🏷".bright_blue(),
            format!("{:.1}%", summary.tagging_coverage.tagged_percentage).bright_yellow(),
            format!("${:.2}", summary.tagging_coverage.untagged_cost_usd).bright_white()
        );

        for cc in &summary.cost_centers {
            let marker = if cc.is_split_charge { " (split charge)" } else { "" };
            println!(
                "{}{} — {}  MoM {}  YoY {}",
                cc.name.bright_white().bold(),
                marker.dimmed(),
                format!("${:.2}", cc.current_cost_usd).bright_green().bold(),
                format_change(cc.current_cost_usd, cc.prev_month_cost_usd),
                format_change(cc.current_cost_usd, cc.yoy_cost_usd)
            );
            for workload in &cc.workloads {
                println!(
                    "   {}: {} (prev {}, yoy {})",
                    workload.name.bright_cyan(),
                    format!("${:.2}", workload.current_cost_usd).bright_green(),
                    format!("${:.2}", workload.prev_month_cost_usd).bright_white(),
                    format!("${:.2}", workload.yoy_cost_usd).bright_white()
                );
            }
        }

        if let Some(mtd) = &summary.mtd_comparison {
            println!(
                "\n{} Prior month, same elapsed days ({} .. {}):",
                "📅".bright_blue(),
                mtd.prior_partial_start,
                mtd.prior_partial_end_exclusive
            );
            for cc in &mtd.cost_centers {
                let current = summary
                    .cost_center(&cc.name)
                    .map(|c| c.current_cost_usd)
                    .unwrap_or(0.0);
                println!(
                    "   {}: {} ({} vs now)",
                    cc.name.bright_white(),
                    format!("${:.2}", cc.prior_partial_cost_usd).bright_green(),
                    format_change(current, cc.prior_partial_cost_usd)
                );
            }
        }
        println!();
    }

    pub fn display_periods(&self, periods: &PeriodSet, json_output: bool) -> Result<()> {
        if json_output {
            let entries: serde_json::Map<String, serde_json::Value> = periods
                .entries()
                .into_iter()
                .map(|(key, range)| {
                    (
                        key.to_string(),
                        json!({"start": range.start, "end": range.end, "label": range.label()}),
                    )
                })
                .collect();
            let output = json!({"is_mtd": periods.is_mtd(), "periods": entries});
            println!("{}", self.to_json(&output)?);
            return Ok(());
        }

        for (key, range) in periods.entries() {
            println!(
                "{:<20} {}  ({} days)",
                key.to_string().bright_cyan(),
                range.to_string().bright_white(),
                range.days()
            );
        }
        Ok(())
    }
}
