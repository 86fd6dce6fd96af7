//! Usage type categorization (Storage / Compute / Other / Support).
//!
//! Usage types usually carry a region prefix (`USE1-TimedStorage-ByteHrs`,
//! `EUC1-EBS:VolumeUsage.gp3`), so no rule is anchored to the start of the string.
//! Rules are evaluated in order and the first match wins.

use crate::models::Category;

#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// Case-sensitive substring
    Contains(&'static str),
    /// Case-insensitive prefix of any `-` or `:` separated segment
    Segment(&'static str),
}

impl Matcher {
    fn matches(&self, usage_type: &str) -> bool {
        match self {
            Matcher::Contains(needle) => usage_type.contains(needle),
            Matcher::Segment(token) => usage_type.split(['-', ':']).any(|segment| {
                segment
                    .get(..token.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(token))
            }),
        }
    }
}

const RULES: &[(Matcher, Category)] = &[
    // Support
    (Matcher::Segment("Tax"), Category::Support),
    (Matcher::Segment("Fee"), Category::Support),
    (Matcher::Segment("Refund"), Category::Support),
    (Matcher::Segment("Credit"), Category::Support),
    (Matcher::Segment("Premium"), Category::Support),
    // Storage: object storage, block storage, file systems
    (Matcher::Contains("TimedStorage"), Category::Storage),
    (Matcher::Contains("EarlyDelete"), Category::Storage),
    (Matcher::Contains("EBS:"), Category::Storage),
    (Matcher::Contains("EFS:"), Category::Storage),
    // Compute
    (Matcher::Contains("BoxUsage"), Category::Compute),
    (Matcher::Contains("SpotUsage"), Category::Compute),
    (Matcher::Contains("Lambda"), Category::Compute),
    (Matcher::Contains("Fargate"), Category::Compute),
    (Matcher::Contains("ECS"), Category::Compute),
    // Request tiers, transfer, gateways, monitoring
    (Matcher::Contains("Requests-"), Category::Other),
    (Matcher::Contains("DataTransfer"), Category::Other),
    (Matcher::Contains("NatGateway"), Category::Other),
    (Matcher::Contains("CW:"), Category::Other),
];

/// Category for usage types no rule matches.
pub const DEFAULT_CATEGORY: Category = Category::Other;

/// Categorize a usage type string
pub fn categorize(usage_type: &str) -> Category {
    RULES
        .iter()
        .find(|(matcher, _)| matcher.matches(usage_type))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
