//! Pipeline steps: the file-level wrappers around the reconciliation transforms.
//!
//! Every step kind implements [`PipelineStep`]. Paths in a step are resolved
//! against [`StepContext::base_dir`] (the pipeline file's directory).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use waybill_core::Table;
use waybill_io::{read_table, write_table, FillColor, ReadOptions, RowMarks, TableIoError};
use waybill_recon::config::{
    AlignConfig, FilterConfig, RawCondition, ReconcileOptions, DEFAULT_INVALID_KEY, DEFAULT_KEY_COLUMN,
};
use waybill_recon::{align, compare_keys, reconcile, Filter, KeyComparison, ReconError, ReconWarning};

/// Number of keys per side shown in compare notes.
pub const COMPARE_PREVIEW: usize = 10;

// ---------------------------------------------------------------------------
// Errors + outcomes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StepError {
    Io(TableIoError),
    Recon(ReconError),
    Failed(String),
}

impl StepError {
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Io(e) => e.hint(),
            _ => None,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Recon(e) => write!(f, "{e}"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StepError {}

impl From<TableIoError> for StepError {
    fn from(err: TableIoError) -> Self {
        Self::Io(err)
    }
}

impl From<ReconError> for StepError {
    fn from(err: ReconError) -> Self {
        Self::Recon(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed {
        outputs: Vec<PathBuf>,
        notes: Vec<String>,
    },
    Warned {
        outputs: Vec<PathBuf>,
        notes: Vec<String>,
        warning: String,
    },
    Failed {
        message: String,
    },
    Skipped {
        reason: String,
    },
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Warned { .. } => "warned",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Warned and skipped outcomes both count as warnings.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warned { .. } | Self::Skipped { .. })
    }

    fn warned(outputs: Vec<PathBuf>, notes: Vec<String>, warning: &ReconWarning) -> Self {
        Self::Warned {
            outputs,
            notes,
            warning: warning.to_string(),
        }
    }
}

/// Shared state handed to every step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub base_dir: PathBuf,
}

impl StepContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

pub trait PipelineStep {
    /// Step kind, as written in the pipeline file.
    fn name(&self) -> &'static str;

    /// Check the step's settings without touching any file.
    fn validate(&self) -> Result<(), StepError>;

    fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

// ---------------------------------------------------------------------------
// Step config (one `[steps.<ID>]` table)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    Filter(FilterStep),
    Reconcile(ReconcileStep),
    Align(AlignStep),
    Compare(CompareStep),
}

impl StepConfig {
    pub fn description(&self) -> &str {
        match self {
            Self::Filter(s) => &s.description,
            Self::Reconcile(s) => &s.description,
            Self::Align(s) => &s.description,
            Self::Compare(s) => &s.description,
        }
    }

    pub fn as_step(&self) -> &dyn PipelineStep {
        match self {
            Self::Filter(s) => s,
            Self::Reconcile(s) => s,
            Self::Align(s) => s,
            Self::Compare(s) => s,
        }
    }
}

fn default_filter_suffix() -> String {
    "_result".to_string()
}

fn default_matched_suffix() -> String {
    "-匹配结果".to_string()
}

fn default_unmatched_suffix() -> String {
    "-未匹配结果".to_string()
}

fn default_key_column() -> String {
    DEFAULT_KEY_COLUMN.to_string()
}

fn default_invalid_key() -> String {
    DEFAULT_INVALID_KEY.to_string()
}

/// `<dir>/<stem><suffix>.xlsx`
fn suffixed_xlsx(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.xlsx"))
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterStep {
    #[serde(default)]
    pub description: String,
    pub inputs: Vec<PathBuf>,
    /// Appended to each input's stem to name its output.
    #[serde(default = "default_filter_suffix")]
    pub output_suffix: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub conditions: BTreeMap<String, RawCondition>,
    #[serde(default)]
    pub keep_columns: Option<Vec<String>>,
    #[serde(default)]
    pub strict: bool,
}

impl FilterStep {
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            conditions: self.conditions.clone(),
            keep_columns: self.keep_columns.clone(),
            strict: self.strict,
        }
    }

    fn run_one(&self, filter: &Filter, input: &Path) -> Result<(PathBuf, usize, usize), StepError> {
        let options = ReadOptions::default().with_sheet(self.sheet.clone());
        let table = read_table(input, &options)?;
        let filtered = filter.apply(&table)?;
        let output = suffixed_xlsx(input, &self.output_suffix);
        write_table(&output, &filtered, None)?;
        Ok((output, table.len(), filtered.len()))
    }
}

impl PipelineStep for FilterStep {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn validate(&self) -> Result<(), StepError> {
        if self.inputs.is_empty() {
            return Err(StepError::Failed("filter step needs at least one input".into()));
        }
        Filter::from_config(&self.filter_config())?;
        Ok(())
    }

    fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let filter = Filter::from_config(&self.filter_config())?;

        let mut outputs = Vec::new();
        let mut notes = Vec::new();
        let mut failures = Vec::new();

        // One bad file does not stop the others
        for input in &self.inputs {
            let path = ctx.resolve(input);
            match self.run_one(&filter, &path) {
                Ok((output, read, kept)) => {
                    log::info!("filtered {} -> {} ({kept} of {read} row(s))", path.display(), output.display());
                    notes.push(format!("{}: kept {kept} of {read} row(s)", display_name(&path)));
                    outputs.push(output);
                }
                Err(e) => {
                    log::error!("{}: {e}", path.display());
                    failures.push(format!("{}: {e}", display_name(&path)));
                }
            }
        }

        if failures.is_empty() {
            Ok(StepOutcome::Completed { outputs, notes })
        } else if outputs.is_empty() {
            Err(StepError::Failed(failures.join("; ")))
        } else {
            let warning = format!("{} of {} input(s) failed: {}", failures.len(), self.inputs.len(), failures.join("; "));
            Ok(StepOutcome::Warned { outputs, notes, warning })
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileStep {
    #[serde(default)]
    pub description: String,
    pub system: PathBuf,
    pub carrier: PathBuf,
    pub system_marked: PathBuf,
    pub carrier_marked: PathBuf,
    pub projection_columns: Vec<String>,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_invalid_key")]
    pub invalid_key_sentinel: String,
    #[serde(default = "default_matched_suffix")]
    pub matched_suffix: String,
    #[serde(default = "default_unmatched_suffix")]
    pub unmatched_suffix: String,
}

impl ReconcileStep {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            key_column: self.key_column.clone(),
            projection_columns: self.projection_columns.clone(),
            invalid_key_sentinel: self.invalid_key_sentinel.clone(),
        }
    }

    /// Paths of the matched and unmatched result files.
    pub fn result_paths(&self, ctx: &StepContext) -> (PathBuf, PathBuf) {
        let marked = ctx.resolve(&self.system_marked);
        (
            suffixed_xlsx(&marked, &self.matched_suffix),
            suffixed_xlsx(&marked, &self.unmatched_suffix),
        )
    }
}

impl PipelineStep for ReconcileStep {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    fn validate(&self) -> Result<(), StepError> {
        self.options().validate()?;
        Ok(())
    }

    fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let options = self.options();
        let read = ReadOptions::default().with_text_column(&options.key_column);

        let system_path = ctx.resolve(&self.system);
        let carrier_path = ctx.resolve(&self.carrier);
        let system = read_table(&system_path, &read)?;
        let carrier = read_table(&carrier_path, &read)?;

        let result = reconcile(&system, &carrier, &options)?;
        let marking = &result.marking;

        // Marked copies are written before the result files, even when nothing matched
        let system_marked = ctx.resolve(&self.system_marked);
        let carrier_marked = ctx.resolve(&self.carrier_marked);
        write_table(
            &system_marked,
            &system,
            Some(&RowMarks::new(marking.system_rows.clone(), FillColor::Yellow)),
        )?;
        write_table(
            &carrier_marked,
            &carrier,
            Some(&RowMarks::new(marking.carrier_rows.clone(), FillColor::Red)),
        )?;
        let mut outputs = vec![system_marked, carrier_marked];

        let s = result.summary();
        let mut notes = vec![
            format!("source: {}", display_name(&system_path)),
            format!("matched records: {}", marking.system_rows.len()),
            format!("unmatched records: {}", marking.carrier_rows.len()),
            format!(
                "keys: {} system, {} carrier, {} common, {} system-only, {} carrier-only",
                s.system_keys, s.carrier_keys, s.common, s.system_only, s.carrier_only
            ),
        ];

        let matched = match &result.matched {
            Ok(Some(matched)) => matched,
            Ok(None) => {
                notes.truncate(1);
                return Ok(match result.warnings.first() {
                    Some(warning) => StepOutcome::warned(outputs, notes, warning),
                    None => StepOutcome::Completed { outputs, notes },
                });
            }
            Err(e) => return Err(e.clone().into()),
        };

        let (matched_path, unmatched_path) = self.result_paths(ctx);
        write_table(&matched_path, matched, None)?;
        write_table(&unmatched_path, result.unmatched(), None)?;
        outputs.push(matched_path);
        outputs.push(unmatched_path);

        Ok(StepOutcome::Completed { outputs, notes })
    }
}

// ---------------------------------------------------------------------------
// Align
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignStep {
    #[serde(default)]
    pub description: String,
    /// Matched-records file (side A)
    pub matched: PathBuf,
    /// Carrier file (side B)
    pub carrier: PathBuf,
    pub output: PathBuf,
    pub align: AlignConfig,
}

impl PipelineStep for AlignStep {
    fn name(&self) -> &'static str {
        "align"
    }

    fn validate(&self) -> Result<(), StepError> {
        self.align.validate()?;
        Ok(())
    }

    fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let report = align_files(
            &ctx.resolve(&self.matched),
            &ctx.resolve(&self.carrier),
            &self.align,
            &ctx.resolve(&self.output),
        );
        match report.status {
            AlignStatus::Success => Ok(StepOutcome::Completed {
                outputs: report.output_path.into_iter().collect(),
                notes: vec![report.message],
            }),
            AlignStatus::Error => Err(StepError::Failed(report.message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignReport {
    pub status: AlignStatus,
    pub message: String,
    pub output_path: Option<PathBuf>,
}

impl AlignReport {
    fn error(message: String) -> Self {
        Self {
            status: AlignStatus::Error,
            message,
            output_path: None,
        }
    }
}

fn align_error_message(err: &StepError) -> String {
    match err {
        StepError::Io(TableIoError::NotFound { path }) => format!("文件不存在：{}", path.display()),
        StepError::Recon(e @ ReconError::SchemaValidation { .. }) => e.to_string(),
        StepError::Recon(
            e @ (ReconError::ColumnNotFound { .. }
            | ReconError::MissingColumns { .. }
            | ReconError::ColumnOrderMismatch { .. }),
        ) => format!("列名错误：{e}"),
        other => format!("未知错误：{other}"),
    }
}

/// Align a matched-records file with a carrier file and write the result.
///
/// Never fails: problems are reported in the returned [`AlignReport`], and no
/// output is written when the report is an error.
pub fn align_files(matched_path: &Path, carrier_path: &Path, config: &AlignConfig, output_path: &Path) -> AlignReport {
    let result = (|| -> Result<(), StepError> {
        let options = ReadOptions::default().with_text_column(&config.key_column);
        let matched = read_table(matched_path, &options)?;
        let carrier = read_table(carrier_path, &options)?;
        let aligned: Table = align(&matched, &carrier, config)?;
        write_table(output_path, &aligned, None)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            let message = format!("文件处理完成，已保存到：{}", output_path.display());
            log::info!("{message}");
            AlignReport {
                status: AlignStatus::Success,
                message,
                output_path: Some(output_path.to_path_buf()),
            }
        }
        Err(e) => {
            let report = AlignReport::error(align_error_message(&e));
            log::error!("{}", report.message);
            report
        }
    }
}

// ---------------------------------------------------------------------------
// Compare
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareStep {
    #[serde(default)]
    pub description: String,
    pub left: PathBuf,
    pub right: PathBuf,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Load two files and compare their key sets.
pub fn compare_files(
    left: &Path,
    right: &Path,
    key_column: &str,
    sheet: Option<String>,
) -> Result<KeyComparison, StepError> {
    let options = ReadOptions::default()
        .with_text_column(key_column)
        .with_sheet(sheet);
    let a = read_table(left, &options)?;
    let b = read_table(right, &options)?;
    Ok(compare_keys(&a, &b, key_column)?)
}

/// Human-readable lines for a comparison, previewing up to [`COMPARE_PREVIEW`] keys per side.
pub fn comparison_notes(cmp: &KeyComparison) -> Vec<String> {
    let preview = |keys: &[String]| {
        let shown: Vec<&str> = keys.iter().take(COMPARE_PREVIEW).map(String::as_str).collect();
        let more = keys.len().saturating_sub(COMPARE_PREVIEW);
        if more > 0 {
            format!("{} (+{more} more)", shown.join(", "))
        } else {
            shown.join(", ")
        }
    };

    let mut notes = vec![format!(
        "keys: {} left, {} right, {} common, {} left-only, {} right-only",
        cmp.left_total,
        cmp.right_total,
        cmp.common.len(),
        cmp.left_only.len(),
        cmp.right_only.len()
    )];
    if cmp.is_identical() {
        notes.push("key sets are identical".into());
    }
    if !cmp.left_only.is_empty() {
        notes.push(format!("left-only: {}", preview(&cmp.left_only)));
    }
    if !cmp.right_only.is_empty() {
        notes.push(format!("right-only: {}", preview(&cmp.right_only)));
    }
    notes
}

impl PipelineStep for CompareStep {
    fn name(&self) -> &'static str {
        "compare"
    }

    fn validate(&self) -> Result<(), StepError> {
        if self.key_column.trim().is_empty() {
            return Err(StepError::Failed("compare step: key_column must not be empty".into()));
        }
        Ok(())
    }

    fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let cmp = compare_files(
            &ctx.resolve(&self.left),
            &ctx.resolve(&self.right),
            &self.key_column,
            self.sheet.clone(),
        )?;
        Ok(StepOutcome::Completed {
            outputs: Vec::new(),
            notes: comparison_notes(&cmp),
        })
    }
}
