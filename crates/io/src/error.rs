use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum TableIoError {
    /// Input path does not exist.
    NotFound { path: PathBuf },
    /// Path exists but cannot be read or written (permissions, locked by another program).
    Access { path: PathBuf, message: String },
    /// File could be opened but its content is not a usable table.
    Format { path: PathBuf, message: String },
    /// Requested sheet is not in the workbook.
    SheetNotFound { path: PathBuf, sheet: String, available: Vec<String> },
}

impl TableIoError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotFound { path }
            | Self::Access { path, .. }
            | Self::Format { path, .. }
            | Self::SheetNotFound { path, .. } => path,
        }
    }

    /// Operator-facing suggestion for fixing the problem.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => Some("check the file name and working directory".into()),
            Self::Access { .. } => {
                Some("close the file if it is open in a spreadsheet application".into())
            }
            Self::SheetNotFound { available, .. } => {
                Some(format!("available sheets: {}", available.join(", ")))
            }
            Self::Format { .. } => None,
        }
    }

    pub(crate) fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path: path.to_path_buf() }
        } else {
            Self::Access {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }
}

impl fmt::Display for TableIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "file not found: {}", path.display()),
            Self::Access { path, message } => {
                write!(f, "cannot access {}: {message}", path.display())
            }
            Self::Format { path, message } => write!(f, "{}: {message}", path.display()),
            Self::SheetNotFound { path, sheet, .. } => {
                write!(f, "{}: no sheet named '{sheet}'", path.display())
            }
        }
    }
}

impl std::error::Error for TableIoError {}
