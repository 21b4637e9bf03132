use std::collections::BTreeMap;

use serde::Deserialize;
use waybill_core::Value;

use crate::error::ReconError;

/// Default key column shared by system exports and carrier exports.
pub const DEFAULT_KEY_COLUMN: &str = "快递单号";

/// Replacement for `"0"` and blank system-side keys.
pub const DEFAULT_INVALID_KEY: &str = "无效单号";

/// Sequence column prepended to matched records.
pub const SEQUENCE_COLUMN: &str = "序号";

/// Columns every carrier export must carry before alignment.
pub const CARRIER_SCHEMA: [&str; 9] = [
    "序号",
    "产品",
    "快递单号",
    "寄件人",
    "寄达市名称",
    "大宗客户名称",
    "收寄时间",
    "计费重量(克)",
    "总邮资",
];

fn default_key_column() -> String {
    DEFAULT_KEY_COLUMN.to_string()
}

fn default_invalid_key() -> String {
    DEFAULT_INVALID_KEY.to_string()
}

// ---------------------------------------------------------------------------
// Filter conditions (as written in TOML)
// ---------------------------------------------------------------------------

/// A literal in a condition. Integers deserialize as numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Number(f64),
    Text(String),
}

impl From<&RawScalar> for Value {
    fn from(raw: &RawScalar) -> Self {
        match raw {
            RawScalar::Number(n) => Value::Number(*n),
            RawScalar::Text(s) => Value::Text(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawOperand {
    List(Vec<RawScalar>),
    Scalar(RawScalar),
}

/// One column condition.
///
/// ```toml
/// "是否需要邮费" = ["付邮"]                  # membership
/// "所属图书馆名称" = "佛山市图书馆"          # equality
/// "订单状态" = { op = "!=", value = "已关闭" } # operator form
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCondition {
    Operator { op: String, value: RawOperand },
    List(Vec<RawScalar>),
    Scalar(RawScalar),
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default)]
    pub conditions: BTreeMap<String, RawCondition>,
    /// Output projection, in order.
    #[serde(default)]
    pub keep_columns: Option<Vec<String>>,
    /// Reject unknown operators instead of using the legacy tuple comparison.
    #[serde(default)]
    pub strict: bool,
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileOptions {
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Columns of the matched records, after the sequence column.
    pub projection_columns: Vec<String>,
    #[serde(default = "default_invalid_key")]
    pub invalid_key_sentinel: String,
}

impl ReconcileOptions {
    pub fn new(projection_columns: Vec<String>) -> Self {
        Self {
            key_column: default_key_column(),
            projection_columns,
            invalid_key_sentinel: default_invalid_key(),
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.key_column.trim().is_empty() {
            return Err(ReconError::ConfigValidation("key_column must not be empty".into()));
        }
        if self.projection_columns.is_empty() {
            return Err(ReconError::ConfigValidation(
                "projection_columns must list at least one column".into(),
            ));
        }
        if self.projection_columns.iter().any(|c| c == SEQUENCE_COLUMN) {
            return Err(ReconError::ConfigValidation(format!(
                "projection_columns must not contain '{SEQUENCE_COLUMN}', it is added automatically"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Align
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignConfig {
    /// Columns the matched-records table must have.
    pub required_columns: Vec<String>,
    /// Matched-side columns joined onto carrier rows (must include the key).
    pub merge_columns: Vec<String>,
    /// Carrier column renames, old name to new name.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub drop: Vec<String>,
    /// Placeholder columns appended empty before reordering.
    #[serde(default)]
    pub new_columns: Vec<String>,
    /// Final carrier column order; must name every remaining column exactly once.
    pub column_order: Vec<String>,
    /// Carrier column to overwrite, mapped to the matched column supplying it.
    #[serde(default)]
    pub field_map: BTreeMap<String, String>,
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

impl AlignConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: AlignConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if !self.merge_columns.contains(&self.key_column) {
            return Err(ReconError::ConfigValidation(format!(
                "merge_columns must include the key column '{}'",
                self.key_column
            )));
        }

        // Field map sources must be joined, targets must survive to the output
        for (target, source) in &self.field_map {
            if !self.merge_columns.contains(source) {
                return Err(ReconError::ConfigValidation(format!(
                    "field_map '{target}' <- '{source}': '{source}' is not in merge_columns"
                )));
            }
            if !self.column_order.contains(target) {
                return Err(ReconError::ConfigValidation(format!(
                    "field_map target '{target}' is not in column_order"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for col in &self.column_order {
            if !seen.insert(col.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "column_order lists '{col}' twice"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Paid-postage alignment, as used for the monthly statement.
    const PAID_ALIGN: &str = r#"
required_columns = ["快递单号", "所属图书馆名称", "支付订单号", "承接应用方订单id", "创建时间"]
merge_columns = ["快递单号", "所属图书馆名称", "支付订单号", "承接应用方订单id", "创建时间"]
drop = ["产品"]
new_columns = ["支付订单号", "创建时间", "订单号"]
column_order = ["序号", "订单号", "图书馆", "创建时间", "支付订单号", "快递单号",
                "寄达市名称", "大宗客户名称", "收寄时间", "计费重量(克)", "总邮资"]

[rename]
"寄件人" = "图书馆"

[field_map]
"图书馆" = "所属图书馆名称"
"支付订单号" = "支付订单号"
"订单号" = "承接应用方订单id"
"创建时间" = "创建时间"
"#;

    #[test]
    fn parse_align_config() {
        let config = AlignConfig::from_toml(PAID_ALIGN).unwrap();
        assert_eq!(config.key_column, DEFAULT_KEY_COLUMN);
        assert_eq!(config.rename.get("寄件人").map(String::as_str), Some("图书馆"));
        assert_eq!(config.field_map.len(), 4);
        assert_eq!(config.column_order.len(), 11);
    }

    #[test]
    fn align_rejects_unjoined_field_source() {
        let input = PAID_ALIGN.replace("\"订单号\" = \"承接应用方订单id\"", "\"订单号\" = \"订单编号\"");
        let err = AlignConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(ref m) if m.contains("订单编号")));
    }

    #[test]
    fn align_requires_key_in_merge_columns() {
        let input = PAID_ALIGN.replace(
            "merge_columns = [\"快递单号\", ",
            "merge_columns = [",
        );
        assert!(matches!(
            AlignConfig::from_toml(&input),
            Err(ReconError::ConfigValidation(_))
        ));
    }

    #[test]
    fn align_unknown_field_is_parse_error() {
        let input = format!("bogus = 1\n{PAID_ALIGN}");
        assert!(matches!(AlignConfig::from_toml(&input), Err(ReconError::ConfigParse(_))));
    }

    #[test]
    fn parse_filter_condition_forms() {
        let input = r#"
strict = true
keep_columns = ["快递单号"]

[conditions]
"是否需要邮费" = ["付邮"]
"所属图书馆名称" = "佛山市图书馆"
"订单状态" = { op = "!=", value = ["已关闭", "已取消"] }
"快递单号" = { op = "!=", value = 0 }
"#;
        let config: FilterConfig = toml::from_str(input).unwrap();
        assert!(config.strict);
        assert_eq!(
            config.conditions["是否需要邮费"],
            RawCondition::List(vec![RawScalar::Text("付邮".into())])
        );
        assert_eq!(
            config.conditions["所属图书馆名称"],
            RawCondition::Scalar(RawScalar::Text("佛山市图书馆".into()))
        );
        assert_eq!(
            config.conditions["快递单号"],
            RawCondition::Operator {
                op: "!=".into(),
                value: RawOperand::Scalar(RawScalar::Number(0.0)),
            }
        );
        assert!(matches!(
            config.conditions["订单状态"],
            RawCondition::Operator { value: RawOperand::List(_), .. }
        ));
    }

    #[test]
    fn filter_strict_defaults_off() {
        let config: FilterConfig = toml::from_str("[conditions]\na = 1\n").unwrap();
        assert!(!config.strict);
        assert!(config.keep_columns.is_none());
    }

    #[test]
    fn reconcile_options_defaults() {
        let options: ReconcileOptions =
            toml::from_str(r#"projection_columns = ["快递单号", "创建时间"]"#).unwrap();
        assert_eq!(options.key_column, "快递单号");
        assert_eq!(options.invalid_key_sentinel, "无效单号");
        options.validate().unwrap();
    }

    #[test]
    fn reconcile_options_reject_sequence_column() {
        let options = ReconcileOptions::new(vec!["序号".into()]);
        assert!(matches!(options.validate(), Err(ReconError::ConfigValidation(_))));
    }
}
