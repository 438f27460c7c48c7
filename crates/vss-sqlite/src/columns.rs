//! Column declarations from `CREATE VIRTUAL TABLE ... USING vss0(...)`
//!
//! ```text
//! name(dimensions) [factory="<build spec>" | with "<build spec>"] [metric_type=<metric>]
//! ```

use vss_core::{Result, VssConfig, VssError};
use vss_index::IndexSpec;
use vss_vector::MetricType;

/// One vector column of a vss table. Immutable once the table exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dimension: usize,
    pub spec: IndexSpec,
    pub metric: MetricType,
}

/// Parse every column argument. `args` excludes the module, schema and table
/// name SQLite passes first.
pub fn parse_columns(args: &[&str], config: &VssConfig) -> Result<Vec<ColumnDescriptor>> {
    let columns = args
        .iter()
        .map(|arg| parse_column(arg, config))
        .collect::<Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Err(constructor_error("at least one vector column is required"));
    }
    for (i, column) in columns.iter().enumerate() {
        if columns[..i]
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&column.name))
        {
            return Err(constructor_error(&format!(
                "duplicate column name {}",
                column.name
            )));
        }
    }
    Ok(columns)
}

fn constructor_error(detail: &str) -> VssError {
    VssError::Config(format!(
        "Error parsing VSS index factory constructor: {detail}"
    ))
}

pub fn parse_column(arg: &str, config: &VssConfig) -> Result<ColumnDescriptor> {
    let arg = arg.trim();
    let (open, close) = match (arg.find('('), arg.find(')')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Err(constructor_error(&format!("expected name(dimensions), got '{arg}'"))),
    };

    let name = unquote(arg[..open].trim());
    if name.is_empty() {
        return Err(constructor_error(&format!("missing column name in '{arg}'")));
    }

    let dimension = arg[open + 1..close]
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| {
            constructor_error(&format!(
                "dimensions of column {name} must be a positive integer"
            ))
        })?;

    let mut factory = None;
    let mut metric = None;
    let mut rest = arg[close + 1..].trim_start();
    while !rest.is_empty() {
        if let Some(after) = strip_keyword(rest, "factory") {
            let after = after
                .trim_start()
                .strip_prefix('=')
                .ok_or_else(|| constructor_error("expected '=' after factory"))?;
            let (value, tail) = take_quoted(after.trim_start())?;
            factory = Some(value);
            rest = tail;
        } else if let Some(after) = strip_keyword(rest, "with") {
            let (value, tail) = take_quoted(after.trim_start())?;
            factory = Some(value);
            rest = tail;
        } else if let Some(after) = strip_keyword(rest, "metric_type") {
            let after = after
                .trim_start()
                .strip_prefix('=')
                .ok_or_else(|| constructor_error("expected '=' after metric_type"))?
                .trim_start();
            let (value, tail) = if after.starts_with(['"', '\'']) {
                take_quoted(after)?
            } else {
                let end = after.find(char::is_whitespace).unwrap_or(after.len());
                (after[..end].to_string(), &after[end..])
            };
            metric = Some(value.parse::<MetricType>()?);
            rest = tail;
        } else {
            return Err(constructor_error(&format!(
                "unexpected option '{rest}' for column {name}"
            )));
        }
        rest = rest.trim_start();
    }

    let spec = factory
        .as_deref()
        .unwrap_or(&config.default_factory)
        .parse::<IndexSpec>()?;
    let metric = match metric {
        Some(metric) => metric,
        None => config.default_metric.parse()?,
    };

    Ok(ColumnDescriptor {
        name,
        dimension,
        spec,
        metric,
    })
}

/// `keyword` at the start of `input`, case-insensitive and followed by a
/// non-identifier character.
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let tail = &input[keyword.len()..];
    match tail.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => None,
        _ => Some(tail),
    }
}

fn take_quoted(input: &str) -> Result<(String, &str)> {
    let quote = input
        .chars()
        .next()
        .filter(|c| *c == '"' || *c == '\'')
        .ok_or_else(|| constructor_error(&format!("expected a quoted string, got '{input}'")))?;
    let body = &input[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| constructor_error("unterminated quoted string"))?;
    Ok((body[..end].to_string(), &body[end + 1..]))
}

fn unquote(name: &str) -> String {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"')
            || (first == b'`' && last == b'`')
            || (first == b'[' && last == b']')
        {
            return name[1..name.len() - 1].to_string();
        }
    }
    name.to_string()
}

/// The schema handed to `sqlite3_declare_vtab`. Vector columns follow the two
/// hidden columns, so vector column `i` is table column `i + 2`.
pub fn declare_sql(columns: &[ColumnDescriptor]) -> String {
    let mut sql = String::from("create table x(distance hidden, operation hidden");
    for column in columns {
        sql.push_str(", \"");
        sql.push_str(&column.name.replace('"', "\"\""));
        sql.push('"');
    }
    sql.push(')');
    sql
}

pub const DISTANCE_COLUMN: i32 = 0;
pub const OPERATION_COLUMN: i32 = 1;
pub const FIRST_VECTOR_COLUMN: i32 = 2;
