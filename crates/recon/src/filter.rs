//! Column-predicate row filter.
//!
//! Conditions are compiled once from [`FilterConfig`], then evaluated per
//! row. All conditions must hold (AND). Cell comparisons use
//! [`Value::loose_cmp`], so `"10"` equals `10` and an empty cell equals nothing.

use waybill_core::{Table, Value};

use crate::config::{FilterConfig, RawCondition, RawOperand};
use crate::error::ReconError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    In,
    NotIn,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "!=" => Some(Self::Ne),
            "in" => Some(Self::In),
            "not in" | "not-in" | "not_in" => Some(Self::NotIn),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Ne => "!=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Ge | Self::Le)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
}

impl Operand {
    fn from_raw(raw: &RawOperand) -> Self {
        match raw {
            RawOperand::Scalar(s) => Self::Scalar(s.into()),
            RawOperand::List(items) => Self::List(items.iter().map(Value::from).collect()),
        }
    }

    fn into_list(self) -> Vec<Value> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::List(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    IsIn(Vec<Value>),
    NotIn(Vec<Value>),
    /// `>`, `<`, `>=`, `<=` or scalar `!=`
    Compare(Operator, Value),
    /// Unknown operator outside strict mode: the cell is compared against the
    /// whole `(op, value)` pair, which no scalar cell can equal.
    LegacyTupleEq { operator: String, value: Operand },
}

impl Condition {
    pub fn parse(column: &str, raw: &RawCondition, strict: bool) -> Result<Self, ReconError> {
        let (op, value) = match raw {
            RawCondition::Scalar(s) => return Ok(Self::Equals(s.into())),
            RawCondition::List(items) => {
                return Ok(Self::IsIn(items.iter().map(Value::from).collect()))
            }
            RawCondition::Operator { op, value } => (op, Operand::from_raw(value)),
        };

        let Some(operator) = Operator::parse(op) else {
            if strict {
                return Err(ReconError::InvalidOperator {
                    column: column.to_string(),
                    operator: op.clone(),
                });
            }
            return Ok(Self::LegacyTupleEq {
                operator: op.clone(),
                value,
            });
        };

        match (operator, value) {
            (Operator::In, value) => Ok(Self::IsIn(value.into_list())),
            (Operator::NotIn, value) => Ok(Self::NotIn(value.into_list())),
            (Operator::Ne, Operand::List(items)) => Ok(Self::NotIn(items)),
            (op, Operand::Scalar(v)) => Ok(Self::Compare(op, v)),
            (op, Operand::List(_)) => {
                debug_assert!(op.is_ordering());
                Err(ReconError::ConfigValidation(format!(
                    "column '{column}': operator '{}' takes a single value, not a list",
                    op.symbol()
                )))
            }
        }
    }

    pub fn matches(&self, cell: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Equals(v) => cell.loose_eq(v),
            Self::IsIn(items) => items.iter().any(|v| cell.loose_eq(v)),
            Self::NotIn(items) => !items.iter().any(|v| cell.loose_eq(v)),
            Self::Compare(Operator::Ne, v) => !cell.loose_eq(v),
            Self::Compare(op, v) => match (op, cell.loose_cmp(v)) {
                (Operator::Gt, Some(Greater)) => true,
                (Operator::Lt, Some(Less)) => true,
                (Operator::Ge, Some(Greater | Equal)) => true,
                (Operator::Le, Some(Less | Equal)) => true,
                _ => false,
            },
            Self::LegacyTupleEq { .. } => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Compiled filter: conditions plus an optional output projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
    keep_columns: Option<Vec<String>>,
}

impl Filter {
    /// Compile a config. In strict mode an unknown operator fails here,
    /// before any row is looked at.
    pub fn from_config(config: &FilterConfig) -> Result<Self, ReconError> {
        let conditions = config
            .conditions
            .iter()
            .map(|(column, raw)| Ok((column.clone(), Condition::parse(column, raw, config.strict)?)))
            .collect::<Result<Vec<_>, ReconError>>()?;
        Ok(Self {
            conditions,
            keep_columns: config.keep_columns.clone(),
        })
    }

    pub fn apply(&self, table: &Table) -> Result<Table, ReconError> {
        let mask = filter_mask(table, &self.conditions)?;
        let filtered = table.filter_rows(&mask);
        match &self.keep_columns {
            Some(keep) => Ok(filtered.select(keep)?),
            None => Ok(filtered),
        }
    }
}

/// Compile `config` and apply it to `table`.
pub fn filter(table: &Table, config: &FilterConfig) -> Result<Table, ReconError> {
    Filter::from_config(config)?.apply(table)
}

/// Per-row AND of all conditions. Every condition column must exist.
pub fn filter_mask(table: &Table, conditions: &[(String, Condition)]) -> Result<Vec<bool>, ReconError> {
    let mut compiled = Vec::with_capacity(conditions.len());
    for (column, condition) in conditions {
        let Some(col) = table.column_index(column) else {
            return Err(ReconError::ColumnNotFound {
                table: "input".into(),
                column: column.clone(),
            });
        };
        if let Condition::LegacyTupleEq { operator, .. } = condition {
            log::warn!(
                "column '{column}': unknown operator '{operator}' compares cells to the whole condition; no rows will match"
            );
        }
        compiled.push((col, condition));
    }

    let mask = table
        .rows()
        .iter()
        .map(|row| compiled.iter().all(|(col, condition)| condition.matches(&row[*col])))
        .collect();
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawScalar;

    fn text(s: &str) -> RawScalar {
        RawScalar::Text(s.into())
    }

    fn orders() -> Table {
        Table::from_rows(
            vec!["订单状态".into(), "金额".into(), "快递单号".into()],
            vec![
                vec![Value::text("已关闭"), Value::Number(10.0), Value::text("111")],
                vec![Value::text("处理中"), Value::Number(25.0), Value::text("0")],
                vec![Value::text("已取消"), Value::text("30"), Value::Empty],
                vec![Value::text("已完成"), Value::Empty, Value::text("222")],
            ],
        )
        .unwrap()
    }

    fn config(conditions: Vec<(&str, RawCondition)>, strict: bool) -> FilterConfig {
        FilterConfig {
            conditions: conditions
                .into_iter()
                .map(|(c, r)| (c.to_string(), r))
                .collect(),
            keep_columns: None,
            strict,
        }
    }

    fn statuses(table: &Table) -> Vec<String> {
        table
            .column_values("订单状态")
            .unwrap()
            .into_iter()
            .map(Value::display)
            .collect()
    }

    #[test]
    fn operator_spellings() {
        assert_eq!(Operator::parse("not in"), Some(Operator::NotIn));
        assert_eq!(Operator::parse("not-in"), Some(Operator::NotIn));
        assert_eq!(Operator::parse("not_in"), Some(Operator::NotIn));
        assert_eq!(Operator::parse(" >= "), Some(Operator::Ge));
        assert_eq!(Operator::parse("=="), None);
    }

    #[test]
    fn ne_with_list_excludes_members() {
        let cfg = config(
            vec![(
                "订单状态",
                RawCondition::Operator {
                    op: "!=".into(),
                    value: RawOperand::List(vec![text("已关闭"), text("已取消")]),
                },
            )],
            true,
        );
        let out = filter(&orders(), &cfg).unwrap();
        assert_eq!(statuses(&out), vec!["处理中", "已完成"]);
    }

    #[test]
    fn membership_and_equality() {
        let cfg = config(vec![("订单状态", RawCondition::List(vec![text("已完成"), text("处理中")]))], false);
        assert_eq!(statuses(&filter(&orders(), &cfg).unwrap()), vec!["处理中", "已完成"]);

        let cfg = config(vec![("订单状态", RawCondition::Scalar(text("已取消")))], false);
        assert_eq!(statuses(&filter(&orders(), &cfg).unwrap()), vec!["已取消"]);
    }

    #[test]
    fn numeric_comparison_reads_numeric_text() {
        let cfg = config(
            vec![(
                "金额",
                RawCondition::Operator {
                    op: ">".into(),
                    value: RawOperand::Scalar(RawScalar::Number(20.0)),
                },
            )],
            true,
        );
        // 25 and "30" pass; the empty cell is not comparable
        assert_eq!(statuses(&filter(&orders(), &cfg).unwrap()), vec!["处理中", "已取消"]);
    }

    #[test]
    fn ne_zero_drops_test_orders_and_keeps_empty() {
        let cfg = config(
            vec![(
                "快递单号",
                RawCondition::Operator {
                    op: "!=".into(),
                    value: RawOperand::Scalar(RawScalar::Number(0.0)),
                },
            )],
            true,
        );
        assert_eq!(statuses(&filter(&orders(), &cfg).unwrap()), vec!["已关闭", "已取消", "已完成"]);
    }

    #[test]
    fn in_with_scalar_is_single_member_list() {
        let raw = RawCondition::Operator {
            op: "in".into(),
            value: RawOperand::Scalar(text("已完成")),
        };
        assert_eq!(
            Condition::parse("c", &raw, true).unwrap(),
            Condition::IsIn(vec![Value::text("已完成")])
        );
    }

    #[test]
    fn strict_rejects_unknown_operator_before_evaluation() {
        let cfg = config(
            vec![(
                "不存在的列",
                RawCondition::Operator {
                    op: "like".into(),
                    value: RawOperand::Scalar(text("x")),
                },
            )],
            true,
        );
        // Operator error wins over the missing column: compile happens first
        assert_eq!(
            filter(&orders(), &cfg).unwrap_err(),
            ReconError::InvalidOperator {
                column: "不存在的列".into(),
                operator: "like".into(),
            }
        );
    }

    #[test]
    fn legacy_operator_selects_nothing() {
        let cfg = config(
            vec![(
                "订单状态",
                RawCondition::Operator {
                    op: "==".into(),
                    value: RawOperand::Scalar(text("已完成")),
                },
            )],
            false,
        );
        let compiled = Filter::from_config(&cfg).unwrap();
        assert!(matches!(compiled.conditions[0].1, Condition::LegacyTupleEq { .. }));
        assert!(compiled.apply(&orders()).unwrap().is_empty());
    }

    #[test]
    fn ordering_operator_rejects_list() {
        let raw = RawCondition::Operator {
            op: "<".into(),
            value: RawOperand::List(vec![RawScalar::Number(1.0)]),
        };
        assert!(matches!(
            Condition::parse("金额", &raw, false),
            Err(ReconError::ConfigValidation(_))
        ));
    }

    #[test]
    fn missing_condition_column() {
        let cfg = config(vec![("支付类型", RawCondition::Scalar(text("微信")))], false);
        assert_eq!(
            filter(&orders(), &cfg).unwrap_err(),
            ReconError::ColumnNotFound {
                table: "input".into(),
                column: "支付类型".into(),
            }
        );
    }

    #[test]
    fn keep_columns_projects_in_order_and_reports_all_missing() {
        let mut cfg = config(vec![], false);
        cfg.keep_columns = Some(vec!["快递单号".into(), "订单状态".into()]);
        let out = filter(&orders(), &cfg).unwrap();
        assert_eq!(out.columns(), &["快递单号".to_string(), "订单状态".to_string()]);
        assert_eq!(out.len(), 4);

        cfg.keep_columns = Some(vec!["a".into(), "订单状态".into(), "b".into()]);
        match filter(&orders(), &cfg).unwrap_err() {
            ReconError::MissingColumns { missing, available } => {
                assert_eq!(missing, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(available.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn input_is_not_mutated() {
        let input = orders();
        let before = input.clone();
        let cfg = config(vec![("订单状态", RawCondition::Scalar(text("已完成")))], false);
        let _ = filter(&input, &cfg).unwrap();
        assert_eq!(input, before);
    }
}
