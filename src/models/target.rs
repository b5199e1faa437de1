//! Target definitions: the external sources the pipeline polls.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractionSchema;

/// Enumerated category of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    SupervisionRate,
    OverrepresentationFactor,
    IndigenousPercentage,
    DetentionPopulation,
    RemandPercentage,
    BudgetAllocation,
    DetentionDailyCost,
    CommunityDailyCost,
    AverageStayDays,
    ReoffendingRate,
    ReportingPeriod,
}

impl FactType {
    pub const ALL: [FactType; 11] = [
        Self::SupervisionRate,
        Self::OverrepresentationFactor,
        Self::IndigenousPercentage,
        Self::DetentionPopulation,
        Self::RemandPercentage,
        Self::BudgetAllocation,
        Self::DetentionDailyCost,
        Self::CommunityDailyCost,
        Self::AverageStayDays,
        Self::ReoffendingRate,
        Self::ReportingPeriod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupervisionRate => "supervision_rate",
            Self::OverrepresentationFactor => "overrepresentation_factor",
            Self::IndigenousPercentage => "indigenous_percentage",
            Self::DetentionPopulation => "detention_population",
            Self::RemandPercentage => "remand_percentage",
            Self::BudgetAllocation => "budget_allocation",
            Self::DetentionDailyCost => "detention_daily_cost",
            Self::CommunityDailyCost => "community_daily_cost",
            Self::AverageStayDays => "average_stay_days",
            Self::ReoffendingRate => "reoffending_rate",
            Self::ReportingPeriod => "reporting_period",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// How values of this fact are parsed when a rule doesn't say otherwise.
    pub fn default_kind(&self) -> ValueKind {
        match self {
            Self::SupervisionRate => ValueKind::Rate,
            Self::OverrepresentationFactor => ValueKind::Factor,
            Self::IndigenousPercentage | Self::RemandPercentage | Self::ReoffendingRate => {
                ValueKind::Percentage
            }
            Self::DetentionPopulation => ValueKind::Count,
            Self::BudgetAllocation | Self::DetentionDailyCost | Self::CommunityDailyCost => {
                ValueKind::Currency
            }
            Self::AverageStayDays => ValueKind::Days,
            Self::ReportingPeriod => ValueKind::Text,
        }
    }

    pub fn default_unit(&self) -> Unit {
        match self {
            Self::SupervisionRate => Unit::Per10000,
            Self::OverrepresentationFactor => Unit::Times,
            Self::IndigenousPercentage | Self::RemandPercentage | Self::ReoffendingRate => {
                Unit::Percent
            }
            Self::DetentionPopulation => Unit::Count,
            Self::BudgetAllocation => Unit::Aud,
            Self::DetentionDailyCost | Self::CommunityDailyCost => Unit::AudPerDay,
            Self::AverageStayDays => Unit::Days,
            Self::ReportingPeriod => Unit::Text,
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit attached to a fact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "per_10000")]
    Per10000,
    #[serde(rename = "x")]
    Times,
    #[serde(rename = "percent")]
    Percent,
    #[serde(rename = "aud")]
    Aud,
    #[serde(rename = "aud_per_day")]
    AudPerDay,
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "days")]
    Days,
    #[serde(rename = "text")]
    Text,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Per10000 => "per_10000",
            Self::Times => "x",
            Self::Percent => "percent",
            Self::Aud => "aud",
            Self::AudPerDay => "aud_per_day",
            Self::Count => "count",
            Self::Days => "days",
            Self::Text => "text",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "per_10000" => Some(Self::Per10000),
            "x" => Some(Self::Times),
            "percent" => Some(Self::Percent),
            "aud" => Some(Self::Aud),
            "aud_per_day" => Some(Self::AudPerDay),
            "count" => Some(Self::Count),
            "days" => Some(Self::Days),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Parsing function applied to matched value text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Whole number, thousands separators allowed ("1,570").
    Count,
    /// Any plain number.
    Decimal,
    /// Requires a `%` or "per cent" marker.
    Percentage,
    /// Requires a currency marker or a magnitude suffix ("$1.5 million", "450m").
    Currency,
    /// Rate per 10,000 of population.
    Rate,
    /// Multiplier ("20 times", "21.4x").
    Factor,
    /// Duration in days.
    Days,
    /// Free text, trimmed.
    Text,
}

/// Shape of a fetched document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Html,
    Pdf,
    Json,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// Politeness delay between requests to the same host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub min_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(3000),
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-target circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPolicy {
    /// Consecutive fetch failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial request.
    pub cooldown: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(900),
        }
    }
}

/// Options for fetching through the hosted rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub wait: Duration,
}

/// A configured external source. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub description: String,
    /// Logical destination table for the records this target produces.
    pub destination: String,
    pub content: ContentKind,
    /// Higher priority wins when targets disagree on a fact.
    pub priority: i32,
    /// Reporting period label folded into natural keys (e.g. "2024-25").
    pub period: Option<String>,
    pub cadence: Duration,
    pub timeout: Duration,
    pub render: Option<RenderOptions>,
    pub enabled: bool,
    pub rate_limit: RateLimitPolicy,
    pub retry: RetryPolicy,
    pub circuit: CircuitPolicy,
    pub schema: ExtractionSchema,
}

impl Target {
    /// Build a target with default policies and the built-in schema.
    pub fn new(id: &str, url: &str, destination: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            description: String::new(),
            destination: destination.to_string(),
            content: ContentKind::Html,
            priority: 0,
            period: None,
            cadence: Duration::from_secs(24 * 3600),
            timeout: Duration::from_secs(30),
            render: None,
            enabled: true,
            rate_limit: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
            circuit: CircuitPolicy::default(),
            schema: ExtractionSchema::builtin(),
        }
    }

    /// Host name used for rate limiting.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Whether the target should run, given when it last ran.
    pub fn is_due(&self, last_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_run_at {
            None => true,
            Some(last) => match chrono::Duration::from_std(self.cadence) {
                Ok(cadence) => last
                    .checked_add_signed(cadence)
                    .is_some_and(|due| due <= now),
                Err(_) => false,
            },
        }
    }
}
