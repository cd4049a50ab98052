//! Desk configuration.
//!
//! One explicit `DeskConfig` is built at startup and handed to every
//! component. Nothing reads the environment after that point.

use crate::{
    error::{DeskError, DeskResult},
    types::Priority,
};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 3;

/// India Standard Time, the roster's home timezone unless a row says otherwise.
pub const DEFAULT_SHIFT_OFFSET_MINUTES: i32 = 330;

// ── LLM reasoning service ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Azure-OpenAI-compatible endpoint.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    /// Deployment (model) name used in the request path.
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2024-02-15-preview".into(),
            model: "gpt-4-turbo-preview".into(),
            timeout_secs: 20,
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    /// Both endpoint and key are present and non-blank.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.endpoint) && present(&self.api_key)
    }

    /// Request timeout, clamped to 1..=120 seconds.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, 120))
    }
}

// ── Scoring tunables ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub skill_points: f64,
    pub partial_skill_points: f64,
    /// Accept a skill that merely contains the subcategory (e.g. "network"
    /// in "network_security").
    pub allow_partial_skill_match: bool,
    pub on_call_base: f64,
    pub on_call_priority_bonus: Vec<(Priority, f64)>, // ordered, not HashMap
    pub on_call_default_bonus: f64,
    pub shift_max: f64,
    /// Distance from a shift boundary below which the shift score decays.
    pub shift_margin_minutes: u32,
    pub availability_max: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skill_points: 50.0,
            partial_skill_points: 30.0,
            allow_partial_skill_match: false,
            on_call_base: 50.0,
            on_call_priority_bonus: vec![
                (Priority::P1, 40.0),
                (Priority::P2, 30.0),
                (Priority::P3, 20.0),
                (Priority::P4, 10.0),
            ],
            on_call_default_bonus: 10.0,
            shift_max: 30.0,
            shift_margin_minutes: 60,
            availability_max: 30.0,
        }
    }
}

impl ScoringConfig {
    /// Variable part of the on-call boost for an incident priority.
    pub fn on_call_bonus(&self, priority: Priority) -> f64 {
        self.on_call_priority_bonus
            .iter()
            .find(|(p, _)| *p == priority)
            .map(|(_, bonus)| *bonus)
            .unwrap_or(self.on_call_default_bonus)
    }

    /// Largest on-call component any incident can produce.
    pub fn on_call_max(&self) -> f64 {
        let top_bonus = self
            .on_call_priority_bonus
            .iter()
            .map(|(_, b)| *b)
            .fold(self.on_call_default_bonus, f64::max);
        self.on_call_base + top_bonus
    }

    fn validate(&self) -> DeskResult<()> {
        let weights = [
            ("skill_points", self.skill_points),
            ("partial_skill_points", self.partial_skill_points),
            ("on_call_base", self.on_call_base),
            ("on_call_default_bonus", self.on_call_default_bonus),
            ("shift_max", self.shift_max),
            ("availability_max", self.availability_max),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(DeskError::Config(format!(
                    "scoring.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if let Some((p, b)) = self
            .on_call_priority_bonus
            .iter()
            .find(|(_, b)| !b.is_finite() || *b < 0.0)
        {
            return Err(DeskError::Config(format!(
                "scoring.on_call_priority_bonus for {p} must be non-negative, got {b}"
            )));
        }
        Ok(())
    }
}

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub llm: LlmConfig,
    pub scoring: ScoringConfig,
    pub top_k: usize,
    /// Recover from LLM failures with the score-only ranking. When false an
    /// LLM failure is returned to the caller.
    pub fallback_enabled: bool,
    /// Offset applied to roster shift times that carry no `shift_tz`.
    pub default_shift_offset_minutes: i32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            scoring: ScoringConfig::default(),
            top_k: DEFAULT_TOP_K,
            fallback_enabled: true,
            default_shift_offset_minutes: DEFAULT_SHIFT_OFFSET_MINUTES,
        }
    }
}

impl DeskConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: DeskConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests: no LLM, UTC shifts.
    pub fn default_test() -> Self {
        Self {
            default_shift_offset_minutes: 0,
            ..Self::default()
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> DeskResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Recognised keys:
    /// `LLM_ENDPOINT`, `LLM_API_KEY`, `LLM_API_VERSION`, `LLM_MODEL`,
    /// `LLM_TIMEOUT_SECS`, `TOP_K_COUNT`, `LLM_FALLBACK_ENABLED`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> DeskResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_ENDPOINT") {
            self.llm.endpoint = Some(v);
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_API_VERSION") {
            self.llm.api_version = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = v.trim().parse().map_err(|_| {
                DeskError::Config(format!("LLM_TIMEOUT_SECS is not a number: {v}"))
            })?;
        }
        if let Some(v) = lookup("TOP_K_COUNT") {
            self.top_k = v
                .trim()
                .parse()
                .map_err(|_| DeskError::Config(format!("TOP_K_COUNT is not a number: {v}")))?;
        }
        if let Some(v) = lookup("LLM_FALLBACK_ENABLED") {
            self.fallback_enabled = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            );
        }
        self.validate()
    }

    pub fn validate(&self) -> DeskResult<()> {
        if self.top_k == 0 {
            return Err(DeskError::Config("top_k must be at least 1".into()));
        }
        if self.default_shift_offset().is_none() {
            return Err(DeskError::Config(format!(
                "default_shift_offset_minutes out of range: {}",
                self.default_shift_offset_minutes
            )));
        }
        self.scoring.validate()
    }

    pub fn default_shift_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.default_shift_offset_minutes.checked_mul(60)?)
    }
}
