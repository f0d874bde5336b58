use crate::error::RenderError;
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

/// Applies the named filter. Unknown filters pass the input through
/// unless `strict` is set.
pub fn apply(
    name: &str,
    input: Value,
    args: &[Value],
    strict: bool,
) -> Result<Value, RenderError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Nil);
    let out = match name {
        "upcase" => Value::Str(input.to_string().to_uppercase()),
        "downcase" => Value::Str(input.to_string().to_lowercase()),
        "capitalize" => {
            let s = input.to_string();
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => Value::Str(first.to_uppercase().chain(chars).collect()),
                None => Value::Str(s),
            }
        }
        "strip" => Value::Str(input.to_string().trim().to_string()),
        "size" => match &input {
            Value::List(items) => Value::Int(items.len() as i64),
            Value::Map(m) => Value::Int(m.len() as i64),
            Value::Nil => Value::Int(0),
            other => Value::Int(other.to_string().chars().count() as i64),
        },
        "default" => {
            let empty = match &input {
                Value::Str(s) => s.is_empty(),
                Value::List(items) => items.is_empty(),
                other => !other.is_truthy(),
            };
            if empty { arg(0) } else { input }
        }
        "escape" => Value::Str(escape_html(&input.to_string())),
        "append" => Value::Str(format!("{}{}", input, arg(0))),
        "prepend" => Value::Str(format!("{}{}", arg(0), input)),
        "join" => {
            let sep = match args.first() {
                Some(v) => v.to_string(),
                None => " ".to_string(),
            };
            match input {
                Value::List(items) => Value::Str(
                    items
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(&sep),
                ),
                other => other,
            }
        }
        "first" => match input {
            Value::List(items) => items.into_iter().next().unwrap_or(Value::Nil),
            Value::Str(s) => s.chars().next().map_or(Value::Nil, |c| Value::Str(c.to_string())),
            _ => Value::Nil,
        },
        "last" => match input {
            Value::List(mut items) => items.pop().unwrap_or(Value::Nil),
            Value::Str(s) => s.chars().last().map_or(Value::Nil, |c| Value::Str(c.to_string())),
            _ => Value::Nil,
        },
        "plus" => arithmetic(name, &input, &arg(0), |a, b| a.checked_add(b), |a, b| a + b)?,
        "minus" => arithmetic(name, &input, &arg(0), |a, b| a.checked_sub(b), |a, b| a - b)?,
        "times" => arithmetic(name, &input, &arg(0), |a, b| a.checked_mul(b), |a, b| a * b)?,
        "date" => date(&input, &arg(0))?,
        _ if strict => return Err(RenderError::UndefinedFilter(name.to_string())),
        _ => input,
    };
    Ok(out)
}

fn number(filter: &str, v: &Value) -> Result<Value, RenderError> {
    match v {
        Value::Int(_) | Value::Float(_) => Ok(v.clone()),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Int)
                .or_else(|_| s.parse::<f64>().map(Value::Float))
                .map_err(|_| {
                    RenderError::Type(format!("{}: '{}' is not a number", filter, s))
                })
        }
        other => Err(RenderError::Type(format!(
            "{}: expected a number, got {}",
            filter,
            other.type_name()
        ))),
    }
}

fn arithmetic(
    filter: &str,
    left: &Value,
    right: &Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RenderError> {
    let (left, right) = (number(filter, left)?, number(filter, right)?);
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        return int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| RenderError::Type(format!("{}: integer overflow", filter)));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
        _ => Err(RenderError::Type(format!("{}: expected numbers", filter))),
    }
}

fn date(input: &Value, format: &Value) -> Result<Value, RenderError> {
    let Value::Str(format) = format else {
        return Err(RenderError::Type("date: format must be a string".to_string()));
    };
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(RenderError::Type(format!("date: invalid format '{}'", format)));
    }
    let parsed: Option<DateTime<Local>> = match input {
        Value::Str(s) if s == "now" || s == "today" => Some(Local::now()),
        Value::Str(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Local))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
                    .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            }),
        Value::Int(ts) => Local.timestamp_opt(*ts, 0).single(),
        _ => None,
    };
    Ok(match parsed {
        Some(dt) => Value::Str(dt.format(format).to_string()),
        // Liquid leaves unparseable input untouched
        None => input.clone(),
    })
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, input: Value, args: &[Value]) -> Value {
        apply(name, input, args, false).unwrap()
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(run("upcase", "abc".into(), &[]), Value::from("ABC"));
        assert_eq!(run("capitalize", "hello world".into(), &[]), Value::from("Hello world"));
        assert_eq!(run("strip", "  x ".into(), &[]), Value::from("x"));
        assert_eq!(run("append", "a".into(), &["b".into()]), Value::from("ab"));
        assert_eq!(run("prepend", "a".into(), &["b".into()]), Value::from("ba"));
        assert_eq!(
            run("escape", "<a href=\"x\">".into(), &[]),
            Value::from("&lt;a href=&quot;x&quot;&gt;")
        );
    }

    #[test]
    fn test_collection_filters() {
        let list = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(run("size", list.clone(), &[]), Value::Int(2));
        assert_eq!(run("join", list.clone(), &[", ".into()]), Value::from("a, b"));
        assert_eq!(run("first", list.clone(), &[]), Value::from("a"));
        assert_eq!(run("last", list, &[]), Value::from("b"));
    }

    #[test]
    fn test_default() {
        assert_eq!(run("default", Value::Nil, &["x".into()]), Value::from("x"));
        assert_eq!(run("default", "".into(), &["x".into()]), Value::from("x"));
        assert_eq!(run("default", "y".into(), &["x".into()]), Value::from("y"));
        assert_eq!(run("default", Value::Int(0), &["x".into()]), Value::Int(0));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("plus", Value::Int(1), &[Value::Int(2)]), Value::Int(3));
        assert_eq!(run("minus", "5".into(), &[Value::Int(2)]), Value::Int(3));
        assert_eq!(run("times", Value::Float(1.5), &[Value::Int(2)]), Value::Float(3.0));
        assert!(matches!(
            apply("plus", "abc".into(), &[Value::Int(1)], false),
            Err(RenderError::Type(_))
        ));
        assert!(matches!(
            apply("plus", Value::Int(i64::MAX), &[Value::Int(1)], false),
            Err(RenderError::Type(_))
        ));
    }

    #[test]
    fn test_date() {
        assert_eq!(
            run("date", "2024-03-05".into(), &["%d/%m/%Y".into()]),
            Value::from("05/03/2024")
        );
        assert_eq!(run("date", "garbage".into(), &["%Y".into()]), Value::from("garbage"));
        assert!(apply("date", "2024-03-05".into(), &["%Q".into()], false).is_err());
    }

    #[test]
    fn test_unknown_filter() {
        assert_eq!(run("nope", Value::Int(1), &[]), Value::Int(1));
        assert!(matches!(
            apply("nope", Value::Int(1), &[], true),
            Err(RenderError::UndefinedFilter(name)) if name == "nope"
        ));
    }
}
