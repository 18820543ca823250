//! Milestone thresholds and the streak percentile lookup.
//!
//! Both tables are reference data: built once from configuration,
//! validated to be strictly increasing, and only ever read afterwards.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How loudly a milestone should be celebrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CelebrationTier {
    Small,
    Medium,
    Large,
    Epic,
}

/// A streak-count threshold with celebration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub threshold: u32,
    pub title: String,
    pub description: String,
    pub tier: CelebrationTier,
}

impl Milestone {
    pub fn new(threshold: u32, title: &str, description: &str, tier: CelebrationTier) -> Self {
        Self {
            threshold,
            title: title.to_string(),
            description: description.to_string(),
            tier,
        }
    }
}

/// Ordered, non-empty set of milestones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneTable {
    milestones: Vec<Milestone>,
}

impl MilestoneTable {
    /// Build a table; thresholds must be strictly increasing and non-empty.
    pub fn new(milestones: Vec<Milestone>) -> Result<Self, ValidationError> {
        if milestones.is_empty() {
            return Err(ValidationError::EmptyCollection("milestones".into()));
        }
        if let Some(index) = milestones
            .windows(2)
            .position(|w| w[1].threshold <= w[0].threshold)
        {
            return Err(ValidationError::NotIncreasing {
                collection: "milestones".into(),
                index: index + 1,
            });
        }
        Ok(Self { milestones })
    }

    pub fn default_milestones() -> Vec<Milestone> {
        use CelebrationTier::*;
        vec![
            Milestone::new(3, "Getting Started", "Three days in a row", Small),
            Milestone::new(7, "Week Warrior", "A full week without a miss", Small),
            Milestone::new(14, "Fortnight Focus", "Two weeks of consistency", Medium),
            Milestone::new(21, "Habit Formed", "Three weeks, the habit is taking root", Medium),
            Milestone::new(30, "Monthly Master", "A whole month of showing up", Large),
            Milestone::new(60, "Unstoppable", "Two months strong", Large),
            Milestone::new(100, "Century Club", "One hundred days", Epic),
            Milestone::new(365, "Year Legend", "A full year, every single day", Epic),
        ]
    }

    pub fn all(&self) -> &[Milestone] {
        &self.milestones
    }

    /// Milestone whose threshold is exactly `streak`.
    pub fn exact(&self, streak: u32) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.threshold == streak)
    }

    /// Highest milestone at or below `streak`.
    pub fn reached(&self, streak: u32) -> Option<&Milestone> {
        self.milestones.iter().rev().find(|m| m.threshold <= streak)
    }

    /// Lowest milestone above `streak`; past the top of the table this is
    /// the last milestone.
    pub fn upcoming(&self, streak: u32) -> &Milestone {
        let last = &self.milestones[self.milestones.len() - 1];
        self.milestones
            .iter()
            .find(|m| m.threshold > streak)
            .unwrap_or(last)
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self {
            milestones: Self::default_milestones(),
        }
    }
}

/// Streaks at or above `min_streak` rank at `percentile`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBucket {
    pub min_streak: u32,
    pub percentile: f64,
}

/// Bucketed rank of a streak against a reference distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileTable {
    buckets: Vec<PercentileBucket>,
}

impl PercentileTable {
    pub fn new(buckets: Vec<PercentileBucket>) -> Result<Self, ValidationError> {
        let first = buckets
            .first()
            .ok_or_else(|| ValidationError::EmptyCollection("percentile_buckets".into()))?;
        if first.min_streak != 0 {
            return Err(ValidationError::InvalidValue {
                field: "percentile_buckets".into(),
                message: "first bucket must start at streak 0".into(),
            });
        }
        if let Some(index) = buckets
            .windows(2)
            .position(|w| w[1].min_streak <= w[0].min_streak)
        {
            return Err(ValidationError::NotIncreasing {
                collection: "percentile_buckets".into(),
                index: index + 1,
            });
        }
        if let Some(bad) = buckets.iter().find(|b| !(0.0..=1.0).contains(&b.percentile)) {
            return Err(ValidationError::InvalidValue {
                field: "percentile_buckets".into(),
                message: format!("percentile {} outside [0, 1]", bad.percentile),
            });
        }
        Ok(Self { buckets })
    }

    pub fn default_buckets() -> Vec<PercentileBucket> {
        [
            (0, 0.10),
            (3, 0.25),
            (7, 0.50),
            (14, 0.75),
            (30, 0.90),
            (60, 0.95),
            (100, 0.99),
        ]
        .into_iter()
        .map(|(min_streak, percentile)| PercentileBucket {
            min_streak,
            percentile,
        })
        .collect()
    }

    pub fn percentile(&self, streak: u32) -> f64 {
        self.buckets
            .iter()
            .rev()
            .find(|b| b.min_streak <= streak)
            .map(|b| b.percentile)
            .unwrap_or(0.0)
    }
}

impl Default for PercentileTable {
    fn default() -> Self {
        Self {
            buckets: Self::default_buckets(),
        }
    }
}
