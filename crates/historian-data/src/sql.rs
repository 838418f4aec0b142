//! SQL handling before anything reaches the historian database.
//!
//! - `extract_sql`: pull the query out of a model reply (fenced block or bare statement)
//! - `validate_read_only`: single SELECT/WITH statement, no write or DDL keywords
//! - `bind_named`: rewrite `:name` placeholders into positional `$n` parameters
//!
//! Comments, string literals and quoted identifiers are masked before keyword
//! scanning, so `WHERE "tagname" = 'DROP'` is fine while `; DROP TABLE` is not.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlGuardError {
    #[error("SQL query cannot be empty")]
    Empty,

    #[error("Only a single SQL statement is allowed")]
    MultipleStatements,

    #[error("Only read-only queries are allowed: statement must start with SELECT or WITH (found '{0}')")]
    NotReadOnly(String),

    #[error("Query contains forbidden keyword '{0}'")]
    ForbiddenKeyword(String),

    #[error("Missing value for query parameter ':{0}'")]
    MissingParameter(String),
}

/// Keywords that write data, change schema or run procedural code.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "COPY", "VACUUM", "CALL", "DO",
];

fn forbidden_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = FORBIDDEN_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b({alternation})\b")).expect("forbidden keyword regex is valid")
    })
}

// ─── Lexing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanKind {
    Code,
    Quoted,
    Comment,
}

/// Split SQL into code, quoted (string literal / quoted identifier / `$$` body)
/// and comment spans. Unterminated quotes and comments run to the end.
fn spans(sql: &str) -> Vec<(SpanKind, Range<usize>)> {
    let b = sql.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < b.len() {
        let (kind, end) = match b[i] {
            b'-' if b.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(b.len(), |p| i + p);
                (SpanKind::Comment, end)
            }
            b'/' if b.get(i + 1) == Some(&b'*') => {
                let end = sql[i + 2..].find("*/").map_or(b.len(), |p| i + 2 + p + 2);
                (SpanKind::Comment, end)
            }
            b'$' if b.get(i + 1) == Some(&b'$') => {
                let end = sql[i + 2..].find("$$").map_or(b.len(), |p| i + 2 + p + 2);
                (SpanKind::Quoted, end)
            }
            q @ (b'\'' | b'"') => {
                let backslash_escapes = q == b'\'' && is_escape_string_prefix(b, i);
                (SpanKind::Quoted, quoted_end(b, i, q, backslash_escapes))
            }
            _ => {
                i += 1;
                continue;
            }
        };
        if start < i {
            out.push((SpanKind::Code, start..i));
        }
        out.push((kind, i..end));
        i = end;
        start = end;
    }
    if start < b.len() {
        out.push((SpanKind::Code, start..b.len()));
    }
    out
}

/// `E'...'` (Postgres escape string): the quote follows a lone `E`/`e`.
fn is_escape_string_prefix(b: &[u8], quote: usize) -> bool {
    let is_ident = |c: u8| c.is_ascii_alphanumeric() || c == b'_' || c == b'$';
    quote >= 1
        && matches!(b[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_ident(b[quote - 2]))
}

fn quoted_end(b: &[u8], open: usize, q: u8, backslash_escapes: bool) -> usize {
    let mut j = open + 1;
    while j < b.len() {
        if backslash_escapes && b[j] == b'\\' {
            j += 2;
            continue;
        }
        if b[j] == q {
            // Doubled quote is an escaped quote.
            if b.get(j + 1) == Some(&q) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    b.len()
}

/// Code with quoted spans replaced by `''` and comments by a space.
fn mask(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for (kind, range) in spans(sql) {
        match kind {
            SpanKind::Code => out.push_str(&sql[range]),
            SpanKind::Quoted => out.push_str("''"),
            SpanKind::Comment => out.push(' '),
        }
    }
    out
}

fn strip_trailing_semicolons(s: &str) -> &str {
    let mut s = s.trim_end();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    s
}

/// Drop trailing comments, whitespace and semicolons, so the statement can be
/// embedded in a larger query.
pub(crate) fn trim_statement_end(sql: &str) -> &str {
    let mut end = sql.len();
    for (kind, range) in spans(sql).into_iter().rev() {
        match kind {
            SpanKind::Comment => end = range.start,
            SpanKind::Code => {
                let kept = strip_trailing_semicolons(&sql[range.start..end]);
                end = range.start + kept.len();
                if !kept.is_empty() {
                    break;
                }
            }
            SpanKind::Quoted => break,
        }
    }
    &sql[..end]
}

// ─── Extraction ─────────────────────────────────────────────────────────────

/// Pull SQL out of a model reply.
///
/// Order: first ```` ```sql ```` block, any fenced block, the first
/// `WITH … ;` run, the first `SELECT … ;` run, else the trimmed text.
pub fn extract_sql(llm_text: &str) -> String {
    static SQL_FENCE: OnceLock<Regex> = OnceLock::new();
    static ANY_FENCE: OnceLock<Regex> = OnceLock::new();
    static WITH_RUN: OnceLock<Regex> = OnceLock::new();
    static SELECT_RUN: OnceLock<Regex> = OnceLock::new();

    let patterns = [
        SQL_FENCE.get_or_init(|| Regex::new(r"(?is)```sql\s*(.*?)```").expect("sql fence regex is valid")),
        ANY_FENCE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("fence regex is valid")),
        WITH_RUN.get_or_init(|| Regex::new(r"(?is)\b(WITH\s.*?;)").expect("with regex is valid")),
        SELECT_RUN.get_or_init(|| Regex::new(r"(?is)\b(SELECT\s.*?;)").expect("select regex is valid")),
    ];
    for re in patterns {
        if let Some(m) = re.captures(llm_text).and_then(|c| c.get(1)) {
            let sql = m.as_str().trim();
            if !sql.is_empty() {
                return sql.to_string();
            }
        }
    }
    llm_text.trim().to_string()
}

// ─── Validation ─────────────────────────────────────────────────────────────

/// Accept a single read-only statement. Returns it trimmed, without trailing
/// comments or `;`.
pub fn validate_read_only(sql: &str) -> Result<String, SqlGuardError> {
    let statement = trim_statement_end(sql.trim());
    let masked = mask(statement);
    let scan = strip_trailing_semicolons(masked.trim());
    if scan.is_empty() {
        return Err(SqlGuardError::Empty);
    }
    if scan.contains(';') {
        return Err(SqlGuardError::MultipleStatements);
    }

    let first_word: String = scan
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let first_upper = first_word.to_ascii_uppercase();
    if first_upper != "SELECT" && first_upper != "WITH" {
        let found = scan.split_whitespace().next().unwrap_or_default();
        return Err(SqlGuardError::NotReadOnly(found.to_string()));
    }

    if let Some(m) = forbidden_re().find(scan) {
        return Err(SqlGuardError::ForbiddenKeyword(m.as_str().to_ascii_uppercase()));
    }
    Ok(statement.to_string())
}

// ─── Named parameters ───────────────────────────────────────────────────────

/// Rewrite `:name` placeholders into `$1, $2, …` and collect the values in order.
/// A name used twice binds once. `::type` casts and quoted text are left alone.
pub fn bind_named(sql: &str, params: &Map<String, Value>) -> Result<(String, Vec<Value>), SqlGuardError> {
    let mut names: Vec<String> = Vec::new();
    let mut out = String::with_capacity(sql.len());

    for (kind, range) in spans(sql) {
        let text = &sql[range];
        if kind != SpanKind::Code {
            out.push_str(text);
            continue;
        }
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let prev_colon = i > 0 && chars[i - 1] == ':';
            let starts_ident = chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');
            if c == ':' && !prev_colon && starts_ident {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let name: String = chars[i + 1..j].iter().collect();
                if !params.contains_key(&name) {
                    return Err(SqlGuardError::MissingParameter(name));
                }
                let position = match names.iter().position(|n| *n == name) {
                    Some(p) => p,
                    None => {
                        names.push(name);
                        names.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(position + 1).to_string());
                i = j;
            } else {
                out.push(c);
                i += 1;
            }
        }
    }

    let values = names
        .iter()
        .map(|n| params.get(n).cloned().unwrap_or(Value::Null))
        .collect();
    Ok((out, values))
}
