use crate::types::Point;
use serde_json::Value;

/// Mean of a field over a set of points, plus the per-point parsed values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSummary {
    /// `None` when no point carried a valid number.
    pub average: Option<f64>,
    /// One entry per input point, in input order.
    pub values: Vec<Option<f64>>,
}

/// Parses `field` on every point and averages the finite values.
///
/// Invalid values are recorded as `None` and left out of the mean; they never
/// count as zero. The mean is kept as a running value so large inputs cannot
/// overflow an intermediate sum.
pub fn summarize<'a, I>(points: I, field: &str) -> FieldSummary
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut mean = 0.0;
    let mut count = 0usize;

    let values: Vec<Option<f64>> = points
        .into_iter()
        .map(|point| {
            let value = point.field(field).and_then(parse_number);
            if let Some(v) = value {
                count += 1;
                let n = count as f64;
                mean += v / n - mean / n;
            }
            value
        })
        .collect();

    let average = (count > 0).then_some(mean);
    FieldSummary { average, values }
}

/// Reads a JSON value as a finite float.
///
/// Numbers are taken as-is. Text uses its leading numeric prefix, so
/// `"12.5 mg"` reads as `12.5`. Anything else is `None`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    }
}

fn parse_float_prefix(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_end = digits_from(end);
    let mut has_digits = int_end > end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }

    if !has_digits {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
