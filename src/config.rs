//! Deployment configuration read from `.deskflow/config.toml`.
//!
//! Every section is optional. The raw serde structs below are converted into
//! engine types through the `sla_policy`, `workflow`, `issuer` and `schedule`
//! accessors, which is where values are validated.

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Priority, Status};
use crate::numbering::{TicketNumberIssuer, DEFAULT_MAX_ATTEMPTS, DEFAULT_PREFIX};
use crate::scheduler::Schedule;
use crate::sla::{SlaPolicy, SlaTargets, DEFAULT_NEAR_THRESHOLD};
use crate::workflow::Workflow;

/// Template written by `deskflow init`.
pub const TEMPLATE: &str = include_str!("../resources/config.toml");

/// Longest SLA window a tier may configure: one year.
pub const MAX_SLA_MINUTES: i64 = 366 * 24 * 60;
/// Longest gap between sweeps: one week.
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
/// Longest retention before auto-close: ten years.
pub const MAX_AUTO_CLOSE_DAYS: i64 = 3650;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub numbering: NumberingConfig,
    pub sla: SlaConfig,
    pub workflow: WorkflowConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberingConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        NumberingConfig {
            prefix: default_prefix(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlaConfig {
    #[serde(default = "default_near_threshold")]
    pub near_threshold: f64,
    /// Keyed by priority name. A missing tier tracks no SLA.
    #[serde(default)]
    pub priorities: BTreeMap<String, TierConfig>,
}

impl Default for SlaConfig {
    fn default() -> Self {
        SlaConfig {
            near_threshold: default_near_threshold(),
            priorities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub respond_minutes: Option<i64>,
    pub resolve_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    pub cancellable_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u64,
    #[serde(default = "default_auto_close_at")]
    pub auto_close_at: String,
    #[serde(default = "default_auto_close_days")]
    pub auto_close_after_days: i64,
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            sweep_interval_minutes: default_sweep_interval(),
            auto_close_at: default_auto_close_at(),
            auto_close_after_days: default_auto_close_days(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_near_threshold() -> f64 {
    DEFAULT_NEAR_THRESHOLD
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_auto_close_at() -> String {
    "00:00".to_string()
}

fn default_auto_close_days() -> i64 {
    7
}

fn default_poll_seconds() -> u64 {
    30
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Config::parse(&contents)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section without building anything long-lived.
    pub fn validate(&self) -> Result<()> {
        self.sla_policy()?;
        self.workflow()?;
        self.issuer()?;
        self.schedule()?;
        Ok(())
    }

    pub fn sla_policy(&self) -> Result<SlaPolicy> {
        let threshold = self.sla.near_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::Config(format!(
                "sla.near_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        let mut targets = HashMap::new();
        for (tier, tier_config) in &self.sla.priorities {
            let priority: Priority = tier
                .parse()
                .map_err(|_| Error::Config(format!("Unknown SLA priority tier '{}'", tier)))?;
            let window = |dimension: &str, minutes: Option<i64>| {
                minutes
                    .map(|m| sla_window(&format!("sla.priorities.{}.{}", tier, dimension), m))
                    .transpose()
            };
            targets.insert(
                priority,
                SlaTargets {
                    respond_within: window("respond_minutes", tier_config.respond_minutes)?,
                    resolve_within: window("resolve_minutes", tier_config.resolve_minutes)?,
                },
            );
        }

        Ok(SlaPolicy::new(targets, threshold))
    }

    pub fn workflow(&self) -> Result<Workflow> {
        let sources = self
            .workflow
            .cancellable_from
            .iter()
            .map(|s| {
                s.parse::<Status>()
                    .map_err(|_| Error::Config(format!("Unknown status '{}' in cancellable_from", s)))
            })
            .collect::<Result<Vec<_>>>()?;

        Workflow::standard().with_cancellable_from(sources)
    }

    pub fn issuer(&self) -> Result<TicketNumberIssuer> {
        TicketNumberIssuer::new(&self.numbering.prefix, self.numbering.max_attempts)
    }

    pub fn schedule(&self) -> Result<Schedule> {
        let s = &self.scheduler;
        if s.sweep_interval_minutes == 0 {
            return Err(Error::Config(
                "scheduler.sweep_interval_minutes must be at least 1".to_string(),
            ));
        }
        if s.poll_seconds == 0 {
            return Err(Error::Config(
                "scheduler.poll_seconds must be at least 1".to_string(),
            ));
        }
        if s.sweep_interval_minutes > MAX_SWEEP_INTERVAL_MINUTES {
            return Err(Error::Config(format!(
                "scheduler.sweep_interval_minutes must be at most {}",
                MAX_SWEEP_INTERVAL_MINUTES
            )));
        }
        if !(0..=MAX_AUTO_CLOSE_DAYS).contains(&s.auto_close_after_days) {
            return Err(Error::Config(format!(
                "scheduler.auto_close_after_days must be between 0 and {}",
                MAX_AUTO_CLOSE_DAYS
            )));
        }
        let auto_close_at = NaiveTime::parse_from_str(&s.auto_close_at, "%H:%M").map_err(|_| {
            Error::Config(format!(
                "scheduler.auto_close_at must be HH:MM, got '{}'",
                s.auto_close_at
            ))
        })?;
        let sweep_every = i64::try_from(s.sweep_interval_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                Error::Config("scheduler.sweep_interval_minutes is out of range".to_string())
            })?;

        Ok(Schedule {
            sweep_every,
            auto_close_at,
            auto_close_after_days: s.auto_close_after_days,
            poll_interval: std::time::Duration::from_secs(s.poll_seconds),
        })
    }
}

/// Convert a configured SLA window, rejecting values no deadline could hold.
fn sla_window(key: &str, minutes: i64) -> Result<Duration> {
    if minutes > MAX_SLA_MINUTES {
        return Err(Error::Config(format!(
            "{} must be at most {} minutes, got {}",
            key, MAX_SLA_MINUTES, minutes
        )));
    }
    Duration::try_minutes(minutes)
        .ok_or_else(|| Error::Config(format!("{} is out of range: {}", key, minutes)))
}
