//! Ledger configuration: rates, margin fallback and streak milestones.
//!
//! Loaded from JSON by the runner; tests and embedders use `Default`.
//! The config value is handed explicitly to each component; nothing reads
//! a global.

use crate::types::Points;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginDefaults {
    /// Used when a venue has no default margin of its own.
    pub fallback_margin: Decimal,
}

impl Default for MarginDefaults {
    fn default() -> Self {
        Self {
            fallback_margin: Decimal::new(50, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub days: u32,
    pub bonus: Points,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Fraction of spend returned as points at the venue's best margin.
    pub base_rate: Decimal,
    /// Share of the purchaser's points paid to each referral level.
    pub referral_percentage: Decimal,
    pub max_referral_levels: usize,
    pub margins: MarginDefaults,
    pub streak_milestones: Vec<StreakMilestone>,
    /// Allowed gap between cash + points and the stated total.
    pub amount_tolerance: Decimal,
    pub busy_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_rate: Decimal::new(10, 2),
            referral_percentage: Decimal::new(25, 2),
            max_referral_levels: crate::referral::MAX_REFERRAL_LEVELS,
            margins: MarginDefaults::default(),
            streak_milestones: vec![
                StreakMilestone { days: 7, bonus: Decimal::new(50, 0) },
                StreakMilestone { days: 14, bonus: Decimal::new(100, 0) },
                StreakMilestone { days: 30, bonus: Decimal::new(250, 0) },
            ],
            amount_tolerance: Decimal::new(1, 2),
            busy_timeout_ms: 5_000,
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        anyhow::ensure!(
            unit.contains(&self.base_rate),
            "base_rate must be within [0, 1], got {}",
            self.base_rate
        );
        anyhow::ensure!(
            unit.contains(&self.referral_percentage),
            "referral_percentage must be within [0, 1], got {}",
            self.referral_percentage
        );
        anyhow::ensure!(
            (1..=crate::referral::MAX_REFERRAL_LEVELS).contains(&self.max_referral_levels),
            "max_referral_levels must be within [1, {}], got {}",
            crate::referral::MAX_REFERRAL_LEVELS,
            self.max_referral_levels
        );
        anyhow::ensure!(
            (Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&self.margins.fallback_margin),
            "margins.fallback_margin must be within [0, 100], got {}",
            self.margins.fallback_margin
        );
        anyhow::ensure!(
            self.amount_tolerance >= Decimal::ZERO,
            "amount_tolerance must not be negative"
        );
        for m in &self.streak_milestones {
            anyhow::ensure!(m.days > 0, "streak milestone days must be positive");
            anyhow::ensure!(
                m.bonus > Decimal::ZERO,
                "streak milestone bonus must be positive, got {} for {} days",
                m.bonus,
                m.days
            );
        }
        Ok(())
    }
}
