//! Pipeline file: named steps run in a caller-chosen order.
//!
//! ```toml
//! name = "library postage, monthly"
//! sequence = ["S3", "S5", "S8"]
//!
//! [steps.S3]
//! kind = "filter"
//! inputs = ["sys-yishupingtai.xlsx"]
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use waybill_recon::{ReconError, ReconWarning};

use crate::steps::{StepConfig, StepContext, StepOutcome};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub name: String,
    /// Order used when no steps are given on the command line.
    #[serde(default)]
    pub sequence: Option<Vec<String>>,
    #[serde(default)]
    pub steps: BTreeMap<String, StepConfig>,
}

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.steps.is_empty() {
            return Err(ReconError::ConfigValidation("pipeline declares no steps".into()));
        }

        for (id, step) in &self.steps {
            if id.trim().is_empty() {
                return Err(ReconError::ConfigValidation("step id must not be empty".into()));
            }
            step.as_step().validate().map_err(|e| match e {
                crate::steps::StepError::Recon(ReconError::InvalidOperator { column, operator }) => {
                    ReconError::InvalidOperator {
                        column: format!("{id}.{column}"),
                        operator,
                    }
                }
                crate::steps::StepError::Recon(ReconError::ConfigValidation(msg)) => {
                    ReconError::ConfigValidation(format!("step {id}: {msg}"))
                }
                other => ReconError::ConfigValidation(format!("step {id}: {other}")),
            })?;
        }

        // A default sequence may only name declared steps
        if let Some(sequence) = &self.sequence {
            for id in sequence {
                if !self.steps.contains_key(id) {
                    return Err(ReconError::ConfigValidation(format!(
                        "sequence names undeclared step '{id}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Declared step ids in natural order (`S2` before `S10`).
    pub fn step_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        ids.sort_by(|a, b| natural_cmp(a, b));
        ids
    }
}

fn split_digits(id: &str) -> (&str, Option<u64>) {
    let pos = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    (&id[..pos], id[pos..].parse().ok())
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (pa, na) = split_digits(a);
    let (pb, nb) = split_digits(b);
    pa.cmp(pb).then(na.cmp(&nb)).then(a.cmp(b))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PipelineError {
    /// The pipeline file itself could not be read.
    Read { path: PathBuf, message: String },
    Config(ReconError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ReconError> for PipelineError {
    fn from(err: ReconError) -> Self {
        Self::Config(err)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub name: String,
    pub engine_version: String,
    pub run_at: String,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_failed()).count()
    }

    pub fn warnings(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_warning()).count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    context: StepContext,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            context: StepContext::new(base_dir),
        }
    }

    /// Read and validate a pipeline file. Step paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let input = std::fs::read_to_string(path).map_err(|e| PipelineError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = PipelineConfig::from_toml(&input)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self::new(config, base_dir))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `sequence` in order. Unknown ids are skipped with a warning and a
    /// failed step does not stop the steps after it.
    pub fn run<S: AsRef<str>>(&self, sequence: &[S]) -> PipelineReport {
        let ids: Vec<&str> = sequence.iter().map(|s| s.as_ref()).collect();
        log::info!("pipeline '{}': {}", self.config.name, ids.join(" -> "));

        let mut steps = Vec::with_capacity(ids.len());
        for id in ids {
            let start = Instant::now();

            let Some(step) = self.config.steps.get(id) else {
                let warning = ReconWarning::UnknownStep(id.to_string());
                log::warn!("{warning}");
                steps.push(StepReport {
                    step: id.to_string(),
                    kind: None,
                    description: String::new(),
                    duration_ms: 0,
                    outcome: StepOutcome::Skipped {
                        reason: warning.to_string(),
                    },
                });
                continue;
            };

            let runner = step.as_step();
            log::info!("running {id} ({})", runner.name());
            let outcome = runner.run(&self.context).unwrap_or_else(|e| {
                log::error!("step {id} failed: {e}");
                if let Some(hint) = e.hint() {
                    log::error!("hint: {hint}");
                }
                StepOutcome::Failed {
                    message: e.to_string(),
                }
            });

            steps.push(StepReport {
                step: id.to_string(),
                kind: Some(runner.name().to_string()),
                description: step.description().to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                outcome,
            });
        }

        PipelineReport {
            name: self.config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            steps,
        }
    }
}
