use std::cmp::Ordering;
use std::fmt;

/// A single cell value as read from a spreadsheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Display form used for text conversion and output.
    ///
    /// Integral numbers below 1e15 render without a fractional part so that
    /// long identifiers read back from a numeric cell keep their digits.
    pub fn display(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
        }
    }

    /// Numeric reading of the value: numbers as-is, text when it parses.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Empty => None,
        }
    }

    /// Convert to a text value. `Empty` stays empty.
    pub fn to_text(&self) -> Value {
        match self {
            Value::Empty => Value::Empty,
            Value::Text(_) => self.clone(),
            Value::Number(n) => Value::Text(format_number(*n)),
        }
    }

    /// Spreadsheet-style equality.
    ///
    /// Empty never equals anything (not even another empty cell). A number
    /// compared with a text compares numerically when the text parses.
    pub fn loose_eq(&self, other: &Value) -> bool {
        matches!(self.loose_cmp(other), Some(Ordering::Equal))
    }

    /// Spreadsheet-style ordering; `None` when the two sides are not comparable.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Empty, _) | (_, Value::Empty) => None,
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Number(a), Value::Text(_)) => other.as_number().and_then(|b| a.partial_cmp(&b)),
            (Value::Text(_), Value::Number(b)) => self.as_number().and_then(|a| a.partial_cmp(b)),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Value::Empty
        } else {
            Value::Text(s.to_string())
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Value::Empty
        } else {
            Value::Text(s)
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(12.0).display(), "12");
        assert_eq!(Value::Number(1105123456789.0).display(), "1105123456789");
        assert_eq!(Value::Number(2.5).display(), "2.5");
        assert_eq!(Value::Empty.display(), "");
    }

    #[test]
    fn empty_never_equal() {
        assert!(!Value::Empty.loose_eq(&Value::Empty));
        assert!(!Value::Empty.loose_eq(&Value::text("")));
        assert!(!Value::text("a").loose_eq(&Value::Empty));
    }

    #[test]
    fn number_against_numeric_text() {
        assert!(Value::Number(10.0).loose_eq(&Value::text("10")));
        assert!(Value::text(" 10 ").loose_eq(&Value::Number(10.0)));
        assert!(!Value::Number(10.0).loose_eq(&Value::text("ten")));
    }

    #[test]
    fn text_compares_exactly() {
        assert!(Value::text("已完成").loose_eq(&Value::text("已完成")));
        assert!(!Value::text("10").loose_eq(&Value::text("10.0")));
        assert_eq!(Value::text("a").loose_cmp(&Value::text("b")), Some(Ordering::Less));
    }

    #[test]
    fn to_text_keeps_digits() {
        assert_eq!(Value::Number(9876543210123.0).to_text(), Value::text("9876543210123"));
        assert_eq!(Value::Empty.to_text(), Value::Empty);
    }

    #[test]
    fn from_empty_str_is_empty() {
        assert_eq!(Value::from(""), Value::Empty);
        assert_eq!(Value::from(" "), Value::text(" "));
    }
}
