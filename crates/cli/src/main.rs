// Waybill CLI - batch reconciliation of tracking-number spreadsheets

mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use waybill_cli::pipeline::{Pipeline, PipelineError, PipelineReport};
use waybill_cli::steps::{compare_files, comparison_notes, StepError, StepOutcome};

use exit_codes::{
    step_exit_code, EXIT_ERROR, EXIT_FILE_ACCESS, EXIT_INVALID_CONFIG, EXIT_STEP_FAILED, EXIT_SUCCESS,
    EXIT_USAGE, EXIT_WARNINGS,
};

#[derive(Parser)]
#[command(name = "waybill")]
#[command(about = "Filter, reconcile, and align tracking-number spreadsheets")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipeline steps in the given order
    #[command(after_help = "\
Examples:
  waybill run pipeline.toml --steps S3 S5 S8 S9 S11 S12
  waybill run pipeline.toml -s S8 --json
  waybill run pipeline.toml --output report.json
  RUST_LOG=debug waybill run pipeline.toml -s S9")]
    Run {
        /// Path to the pipeline .toml file
        config: PathBuf,

        /// Step ids to run, in order (defaults to the file's `sequence`)
        #[arg(long, short = 's', num_args = 1..)]
        steps: Vec<String>,

        /// Output the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit 6 when any step warned or was skipped
        #[arg(long)]
        strict_exit: bool,
    },

    /// Validate a pipeline file without reading any input
    #[command(after_help = "\
Examples:
  waybill validate pipeline.toml")]
    Validate {
        /// Path to the pipeline .toml file
        config: PathBuf,
    },

    /// List the steps a pipeline file declares
    #[command(after_help = "\
Examples:
  waybill steps pipeline.toml")]
    Steps {
        /// Path to the pipeline .toml file
        config: PathBuf,
    },

    /// Compare the tracking-number sets of two files
    #[command(after_help = "\
Examples:
  waybill compare sys-aiyueyouyue.xlsx sys-yishuchenjie.xlsx
  waybill compare a.xlsx b.xlsx --key 运单号 --sheet Sheet1
  waybill compare a.csv b.xlsx --json")]
    Compare {
        left: PathBuf,
        right: PathBuf,

        /// Key column in both files
        #[arg(long, default_value = "快递单号")]
        key: String,

        /// Sheet to read in both files (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// Output JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        None => {
            // No subcommand = show help
            eprintln!("Usage: waybill <command> [options]");
            eprintln!("       waybill --help for more information");
            Ok(())
        }
        Some(Commands::Run {
            config,
            steps,
            json,
            output,
            strict_exit,
        }) => cmd_run(config, steps, json, output, strict_exit),
        Some(Commands::Validate { config }) => cmd_validate(config),
        Some(Commands::Steps { config }) => cmd_steps(config),
        Some(Commands::Compare {
            left,
            right,
            key,
            sheet,
            json,
        }) => cmd_compare(left, right, key, sheet, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn step(err: StepError) -> Self {
        let hint = err.hint();
        Self { code: step_exit_code(&err), message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Read { .. } => CliError::new(EXIT_FILE_ACCESS, err.to_string()),
            PipelineError::Config(_) => CliError::new(EXIT_INVALID_CONFIG, err.to_string()),
        }
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    config_path: PathBuf,
    steps: Vec<String>,
    json_output: bool,
    output_file: Option<PathBuf>,
    strict_exit: bool,
) -> Result<(), CliError> {
    let pipeline = Pipeline::load(&config_path)?;

    let sequence = if !steps.is_empty() {
        steps
    } else if let Some(sequence) = &pipeline.config().sequence {
        sequence.clone()
    } else {
        return Err(CliError::args("no steps to run")
            .with_hint("pass --steps S3 S5 ... or set `sequence` in the pipeline file"));
    };

    let report = pipeline.run(&sequence);

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_FILE_ACCESS, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    print_summary(&report);

    let failed = report.failed();
    if failed > 0 {
        return Err(CliError::new(EXIT_STEP_FAILED, format!("{failed} step(s) failed")));
    }
    let warnings = report.warnings();
    if warnings > 0 && strict_exit {
        return Err(CliError::new(EXIT_WARNINGS, format!("{warnings} step(s) with warnings (--strict-exit)")));
    }
    Ok(())
}

/// Human summary to stderr
fn print_summary(report: &PipelineReport) {
    for step in &report.steps {
        eprintln!(
            "  step '{}': {} ({}ms)",
            step.step,
            step.outcome.label(),
            step.duration_ms
        );
        match &step.outcome {
            StepOutcome::Completed { outputs, notes } => {
                for note in notes {
                    eprintln!("    {note}");
                }
                for path in outputs {
                    eprintln!("    wrote {}", path.display());
                }
            }
            StepOutcome::Warned { outputs, notes, warning } => {
                for note in notes {
                    eprintln!("    {note}");
                }
                for path in outputs {
                    eprintln!("    wrote {}", path.display());
                }
                eprintln!("    warning: {warning}");
            }
            StepOutcome::Failed { message } => eprintln!("    error: {message}"),
            StepOutcome::Skipped { reason } => eprintln!("    warning: {reason}"),
        }
    }

    eprintln!(
        "pipeline '{}': {} step(s), {} failed, {} with warnings",
        report.name,
        report.steps.len(),
        report.failed(),
        report.warnings(),
    );
}

// ============================================================================
// validate / steps
// ============================================================================

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let pipeline = Pipeline::load(&config_path)?;
    let config = pipeline.config();
    eprintln!(
        "valid: pipeline '{}' with {} step(s)",
        config.name,
        config.steps.len(),
    );
    Ok(())
}

fn cmd_steps(config_path: PathBuf) -> Result<(), CliError> {
    let pipeline = Pipeline::load(&config_path)?;
    let config = pipeline.config();
    for id in config.step_ids() {
        if let Some(step) = config.steps.get(id) {
            println!("{:<6} {:<10} {}", id, step.as_step().name(), step.description());
        }
    }
    if let Some(sequence) = &config.sequence {
        println!("\ndefault sequence: {}", sequence.join(" "));
    }
    Ok(())
}

// ============================================================================
// compare
// ============================================================================

fn cmd_compare(
    left: PathBuf,
    right: PathBuf,
    key: String,
    sheet: Option<String>,
    json_output: bool,
) -> Result<(), CliError> {
    let cmp = compare_files(&left, &right, &key, sheet).map_err(CliError::step)?;

    if json_output {
        let json_str = serde_json::to_string_pretty(&cmp)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
        return Ok(());
    }

    println!("left:  {}", left.display());
    println!("right: {}", right.display());
    for note in comparison_notes(&cmp) {
        println!("{note}");
    }
    Ok(())
}
