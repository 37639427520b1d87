//! Run command - execute the event-time timer scenario
//!
//! Bounded runs feed all elements on a single impulse and end when input is
//! exhausted. Unbounded runs use a periodic impulse spanning ten seconds of
//! event time, paced by the configured tick interval.

use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use engine::scenario::{self, ScenarioOutcome, ScenarioParams};
use engine::{EngineConfig, ExecutionMode};

#[derive(Subcommand, Debug, Clone)]
pub enum RunCommand {
    /// Run the keyed event-time timer scenario
    #[command(name = "scenario")]
    Scenario {
        /// Execution mode (bounded, unbounded); overrides the configuration
        #[arg(long, short)]
        mode: Option<ExecutionMode>,

        /// Number of distinct keys
        #[arg(long, default_value_t = 50)]
        keys: usize,

        /// Elements per key
        #[arg(long, default_value_t = 15)]
        duplicates: usize,

        /// Number of shard workers; overrides the configuration
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output format for the report
        #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
        format: ReportFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Table,
    Json,
}

impl RunCommand {
    /// Execute the run command; `Ok(false)` means the output did not match
    pub async fn execute(&self, mut config: EngineConfig) -> anyhow::Result<bool> {
        match self {
            RunCommand::Scenario {
                mode,
                keys,
                duplicates,
                parallelism,
                format,
            } => {
                if let Some(mode) = mode {
                    config.mode = *mode;
                }
                if let Some(parallelism) = parallelism {
                    config.parallelism = *parallelism;
                }
                let params = ScenarioParams {
                    num_keys: *keys,
                    duplicates: *duplicates,
                    ..Default::default()
                };

                tracing::info!(
                    mode = %config.mode,
                    keys = params.num_keys,
                    duplicates = params.duplicates,
                    parallelism = config.parallelism,
                    "Starting scenario"
                );

                let outcome = scenario::run_scenario(params, config).await?;
                match format {
                    ReportFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    }
                    ReportFormat::Table => print_table(&outcome),
                }
                Ok(outcome.passed())
            }
        }
    }
}

fn print_table(outcome: &ScenarioOutcome) {
    let report = &outcome.report;
    let stats = &report.stats;

    println!("{}", "Keyed Event-Time Timer Scenario".bold().cyan());
    println!("{}", "=".repeat(40));
    println!("  {:<22} {}", "run id", report.run_id);
    println!("  {:<22} {}", "mode", report.mode);
    println!("  {:<22} {}", "source", report.source);
    println!("  {:<22} {:?}", "completion", report.completion);
    println!("  {:<22} {} ms", "duration", report.duration_ms);
    println!();

    println!("{}", "Counters:".bold().cyan());
    println!("{}", "-".repeat(40));
    println!("  {:<22} {}", "elements processed", stats.elements_processed);
    println!("  {:<22} {}", "elements dropped", stats.elements_dropped);
    println!(
        "  {:<22} {:.1}/s",
        "throughput",
        stats.elements_per_second(report.duration_ms as f64 / 1000.0)
    );
    println!("  {:<22} {}", "timers set", stats.timers_set);
    println!("  {:<22} {}", "timers overwritten", stats.timers_overwritten);
    println!("  {:<22} {}", "timers fired", stats.timers_fired);
    println!("  {:<22} {}", "element outputs", stats.outputs_from_elements);
    println!("  {:<22} {}", "timer outputs", stats.outputs_from_timers);
    println!("  {:<22} {}", "watermark advances", stats.watermark_advances);
    println!("  {:<22} {}", "pending timers", report.pending_timers);
    println!("  {:<22} {}", "errors", stats.errors);
    println!();

    let comparison = &outcome.comparison;
    if outcome.passed() {
        println!(
            "{} {} records matched",
            "✓".green().bold(),
            comparison.actual_len
        );
    } else {
        println!("{} {}", "✗".red().bold(), comparison);
    }
}
