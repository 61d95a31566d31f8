use lazy_static::lazy_static;
use regex::Regex;

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

lazy_static! {
    // leading decimal number, optional exponent; the rest of the input is ignored
    static ref LEADING_NUMBER: Regex =
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap();
}

/// Twelve months of income and expenses, Jan..Dec.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPayload {
    pub income: [f64; 12],
    pub expenses: [f64; 12],
}

impl ChartPayload {
    /// Builds the dataset from raw field values. Missing months are 0, extra
    /// values are ignored, and anything that is not a finite non-negative
    /// number becomes 0.
    pub fn from_inputs<S: AsRef<str>>(income: &[S], expenses: &[S]) -> Self {
        Self {
            income: month_values(income),
            expenses: month_values(expenses),
        }
    }

    // comma separated, one value per month
    pub fn from_csv(income: &str, expenses: &str) -> Self {
        let income: Vec<&str> = income.split(',').collect();
        let expenses: Vec<&str> = expenses.split(',').collect();
        Self::from_inputs(&income, &expenses)
    }

    pub fn max_value(&self) -> f64 {
        self.income
            .iter()
            .chain(self.expenses.iter())
            .copied()
            .fold(0.0, f64::max)
    }
}

fn month_values<S: AsRef<str>>(inputs: &[S]) -> [f64; 12] {
    let mut values = [0.0; 12];
    for (slot, raw) in values.iter_mut().zip(inputs) {
        *slot = coerce_amount(raw.as_ref());
    }
    values
}

pub fn coerce_amount(raw: &str) -> f64 {
    let value = LEADING_NUMBER
        .find(raw.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_malformed_input_to_zero() {
        assert_eq!(coerce_amount(""), 0.0);
        assert_eq!(coerce_amount("abc"), 0.0);
        assert_eq!(coerce_amount("NaN"), 0.0);
        assert_eq!(coerce_amount("Infinity"), 0.0);
        assert_eq!(coerce_amount("1e999"), 0.0);
        assert_eq!(coerce_amount("-50"), 0.0);
    }

    #[test]
    fn parses_leading_number() {
        assert_eq!(coerce_amount("1200"), 1200.0);
        assert_eq!(coerce_amount("  12.5"), 12.5);
        assert_eq!(coerce_amount("12.5abc"), 12.5);
        assert_eq!(coerce_amount(".5"), 0.5);
        assert_eq!(coerce_amount("3e2"), 300.0);
        assert_eq!(coerce_amount("7e"), 7.0);
    }

    #[test]
    fn fills_missing_months_and_drops_extras() {
        let payload = ChartPayload::from_csv("100,200", "1,2,3,4,5,6,7,8,9,10,11,12,13");
        assert_eq!(payload.income[0], 100.0);
        assert_eq!(payload.income[1], 200.0);
        assert!(payload.income[2..].iter().all(|v| *v == 0.0));
        assert_eq!(payload.expenses[11], 12.0);
    }

    #[test]
    fn blank_fields_are_zero() {
        let payload = ChartPayload::from_inputs(&["", "x", "5"], &[] as &[&str]);
        assert_eq!(&payload.income[..3], &[0.0, 0.0, 5.0]);
        assert_eq!(payload.expenses, [0.0; 12]);
    }

    #[test]
    fn max_value_spans_both_series() {
        let payload = ChartPayload::from_csv("1,2,3", "10");
        assert_eq!(payload.max_value(), 10.0);
        assert_eq!(ChartPayload::from_csv("", "").max_value(), 0.0);
    }
}
