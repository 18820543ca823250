use clap::{Parser, Subcommand};
use streakwise_core::{logging, Config};

mod commands;

#[derive(Parser)]
#[command(name = "streakwise", version, about = "Streakwise habit engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Streak analytics
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Trend, category and productivity analytics
    Analytics {
        #[command(subcommand)]
        action: commands::analytics::AnalyticsAction,
    },
    /// Adaptive notifications
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(&Config::load_or_default().logging);

    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Analytics { action } => commands::analytics::run(action),
        Commands::Notify { action } => commands::notify::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
