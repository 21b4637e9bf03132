//! `waybill-recon` — tracking-number reconciliation.
//!
//! Pure transform crate: receives loaded tables, returns tables and marks.
//! No CLI or IO dependencies.

pub mod align;
pub mod compare;
pub mod config;
pub mod error;
pub mod filter;
pub mod reconcile;

pub use align::align;
pub use compare::{compare_keys, KeyComparison};
pub use config::{AlignConfig, FilterConfig, ReconcileOptions};
pub use error::{ReconError, ReconWarning, Side};
pub use filter::{filter, filter_mask, Condition, Filter, Operator};
pub use reconcile::{mark, normalize_key, normalize_system_key, reconcile, KeySummary, Marking, Reconciliation};
