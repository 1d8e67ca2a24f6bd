//! Resolution of label specifications into concrete value sequences.

use super::space::CardinalityError;
use crate::config::LabelSpec;

/// Resolves a label spec into its finite, ordered value sequence.
///
/// Explicit `values` win over `range`. Range values are formatted with the
/// spec's `fmt` rule, which supports printf-style `%d`/`%0Nd` and
/// brace-style `{}` placeholders.
pub fn resolve_values(spec: &LabelSpec) -> Result<Vec<String>, CardinalityError> {
    if let Some(values) = &spec.values {
        if values.is_empty() {
            return Err(CardinalityError::EmptyLabel(spec.name.clone()));
        }
        return Ok(values.clone());
    }

    if let Some([start, end]) = spec.range {
        if start > end {
            return Err(CardinalityError::InvalidRange {
                label: spec.name.clone(),
                start,
                end,
            });
        }
        let fmt = spec.fmt.as_deref().unwrap_or("{}");
        return (start..=end)
            .map(|i| format_value(&spec.name, fmt, i))
            .collect();
    }

    Err(CardinalityError::EmptyLabel(spec.name.clone()))
}

/// Formats one range value according to the format rule.
fn format_value(label: &str, fmt: &str, value: i64) -> Result<String, CardinalityError> {
    if let Some(pos) = fmt.find('%') {
        let rest = &fmt[pos + 1..];
        // %d or %0Nd
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let after = &rest[digits.len()..];
        if after.starts_with('d') {
            let rendered = if let Some(width) = digits.strip_prefix('0') {
                let width: usize = width.parse().unwrap_or(0);
                format!("{value:0width$}")
            } else if digits.is_empty() {
                value.to_string()
            } else {
                let width: usize = digits.parse().unwrap_or(0);
                format!("{value:width$}")
            };
            let mut out = String::with_capacity(fmt.len() + rendered.len());
            out.push_str(&fmt[..pos]);
            out.push_str(&rendered);
            out.push_str(&after[1..]);
            return Ok(out);
        }
        return Err(CardinalityError::InvalidFormat {
            label: label.to_string(),
            fmt: fmt.to_string(),
        });
    }

    if fmt.contains("{}") {
        return Ok(fmt.replacen("{}", &value.to_string(), 1));
    }

    Err(CardinalityError::InvalidFormat {
        label: label.to_string(),
        fmt: fmt.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, range: [i64; 2], fmt: Option<&str>) -> LabelSpec {
        LabelSpec {
            name: name.to_string(),
            values: None,
            range: Some(range),
            fmt: fmt.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_values() {
        let s = LabelSpec {
            name: "region".to_string(),
            values: Some(vec!["us".to_string(), "eu".to_string()]),
            range: None,
            fmt: None,
        };
        assert_eq!(resolve_values(&s).unwrap(), vec!["us", "eu"]);
    }

    #[test]
    fn test_range_with_printf_padding() {
        let s = spec("instance", [1, 3], Some("i-%02d"));
        assert_eq!(resolve_values(&s).unwrap(), vec!["i-01", "i-02", "i-03"]);
    }

    #[test]
    fn test_range_with_braces() {
        let s = spec("shard", [0, 2], Some("shard-{}"));
        assert_eq!(
            resolve_values(&s).unwrap(),
            vec!["shard-0", "shard-1", "shard-2"]
        );
    }

    #[test]
    fn test_range_without_fmt() {
        let s = spec("n", [5, 6], None);
        assert_eq!(resolve_values(&s).unwrap(), vec!["5", "6"]);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let s = spec("n", [3, 1], None);
        assert!(matches!(
            resolve_values(&s),
            Err(CardinalityError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_empty_values_rejected() {
        let s = LabelSpec {
            name: "empty".to_string(),
            values: Some(vec![]),
            range: None,
            fmt: None,
        };
        assert!(matches!(
            resolve_values(&s),
            Err(CardinalityError::EmptyLabel(_))
        ));
    }

    #[test]
    fn test_unsupported_fmt_rejected() {
        let s = spec("n", [1, 2], Some("node-%s"));
        assert!(matches!(
            resolve_values(&s),
            Err(CardinalityError::InvalidFormat { .. })
        ));
    }
}
