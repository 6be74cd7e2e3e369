//! Number and string formatting shared by `%`, `format()`, and value display

use crate::interpreter::types::Value;

/// Script rendering of a decimal: whole numbers keep one decimal place
pub fn float_to_string(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// `x % n`: `n` decimals, or scientific notation with `-n - 1` decimals when negative
pub fn format_decimals(x: f64, digits: i32) -> String {
    if !x.is_finite() {
        return float_to_string(x);
    }
    if digits >= 0 {
        format!("{:.*}", digits as usize, x)
    } else {
        let precision = (-digits - 1).max(0) as usize;
        format!("{:.*e}", precision, x)
    }
}

/// `s % n`: right-justify in `n` columns, left-justify when negative
pub fn pad(s: &str, width: i32) -> String {
    let w = width.unsigned_abs() as usize;
    if width >= 0 {
        format!("{:>w$}", s, w = w)
    } else {
        format!("{:<w$}", s, w = w)
    }
}

/// `format(template, args...)` with `%s %d %f %.Nf %Nd %e %%` directives
pub fn format_template(template: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut spec = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() || d == '.' || d == '-' {
                spec.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let (width, precision) = parse_spec(&spec);
        let Some(conv) = chars.next() else {
            out.push('%');
            out.push_str(&spec);
            break;
        };
        let arg = args.next().cloned().unwrap_or_else(Value::empty_string);
        let text = match conv {
            'd' | 'i' => arg.as_int().to_string(),
            'f' => format_decimals(arg.as_float(), precision.unwrap_or(6)),
            'e' => format_decimals(arg.as_float(), -(precision.unwrap_or(6)) - 1),
            's' => match precision {
                Some(p) => arg.to_string().chars().take(p.max(0) as usize).collect(),
                None => arg.to_string(),
            },
            other => {
                out.push('%');
                out.push_str(&spec);
                out.push(other);
                continue;
            }
        };
        match width {
            Some(w) => out.push_str(&pad(&text, w)),
            None => out.push_str(&text),
        }
    }
    out
}

fn parse_spec(spec: &str) -> (Option<i32>, Option<i32>) {
    let (w, p) = match spec.split_once('.') {
        Some((w, p)) => (w, Some(p)),
        None => (spec, None),
    };
    let width = w.parse::<i32>().ok();
    let precision = p.and_then(|p| p.parse::<i32>().ok());
    (width, precision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_string() {
        assert_eq!(float_to_string(14.0), "14.0");
        assert_eq!(float_to_string(0.25), "0.25");
        assert_eq!(float_to_string(f64::NAN), "NaN");
        assert_eq!(float_to_string(-1.0 / 0.0), "-Infinity");
    }

    #[test]
    fn test_format_decimals_and_pad() {
        assert_eq!(format_decimals(3.14159, 2), "3.14");
        assert_eq!(format_decimals(2.0, 0), "2");
        assert_eq!(format_decimals(1234.5, -3), "1.23e3");
        assert_eq!(pad("ab", 4), "  ab");
        assert_eq!(pad("ab", -4), "ab  ");
    }

    #[test]
    fn test_format_template() {
        let args = vec![Value::from("C"), Value::Float(1.23456), Value::Int(7)];
        assert_eq!(
            format_template("%s at %.2f (%3d) 100%%", &args),
            "C at 1.23 (  7) 100%"
        );
        assert_eq!(format_template("%s/%s", &[Value::Int(1)]), "1/");
    }
}
