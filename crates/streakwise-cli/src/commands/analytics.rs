use clap::Subcommand;
use streakwise_core::analytics::{ProductivityAnalyzer, ProductivityPeriod, ProductivityProvider};
use streakwise_core::{AnalyticsAggregator, AnalyticsSnapshot};

use super::{print_json, CommandResult, Session};

fn parse_period(s: &str) -> Result<ProductivityPeriod, String> {
    ProductivityPeriod::parse(s).ok_or_else(|| format!("unknown period '{s}' (week, month, quarter, year)"))
}

#[derive(Subcommand)]
pub enum AnalyticsAction {
    /// Full report: trends, categories and productivity
    Report {
        /// Override the trend window (days)
        #[arg(long)]
        window: Option<u32>,
    },
    /// Productivity metrics for one period
    Productivity {
        /// week, month, quarter or year
        #[arg(value_parser = parse_period, default_value = "week")]
        period: ProductivityPeriod,
    },
}

pub fn run(action: AnalyticsAction) -> CommandResult {
    let session = Session::open()?;
    let snapshot = AnalyticsSnapshot::load(session.store.as_ref(), session.clock.today());

    match action {
        AnalyticsAction::Report { window } => {
            let mut config = session.config.analytics.clone();
            if let Some(days) = window {
                config.trend_window_days = days;
            }
            config.validate()?;
            let report = AnalyticsAggregator::with_config(config).report(&snapshot, session.clock.now());
            print_json(&report)?;
        }
        AnalyticsAction::Productivity { period } => {
            let analyzer = ProductivityAnalyzer::new(session.config.analytics.trend_hysteresis);
            print_json(&analyzer.productivity(&snapshot, period))?;
        }
    }
    Ok(())
}
