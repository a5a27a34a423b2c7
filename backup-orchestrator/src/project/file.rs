//! Key/value project files.
//!
//! ```text
//! PROJECT_NAME="acme"
//! export DB_TYPE=postgres
//! DBS_TO_BACKUP=(orders "billing archive")   # arrays may span lines
//! BACKUP_FREQUENCY_HOURLY=off
//! ```
//!
//! Each file is parsed into its own map. Nothing is shared between projects,
//! so one project's values can never leak into another's evaluation.

use crate::utils::errors::{BackupError, Result};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ProjectFile {
    values: BTreeMap<String, Value>,
}

impl ProjectFile {
    /// Read and parse a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let err = |line: usize, msg: &str| {
            BackupError::Config(format!("{}:{line}: {msg}", path.display()))
        };

        let mut values = BTreeMap::new();
        let mut lines = content.lines().enumerate();

        while let Some((idx, raw)) = lines.next() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

            let Some((key, rest)) = line.split_once('=') else {
                return Err(err(line_no, "expected KEY=value"));
            };
            let key = key.trim();
            if !is_valid_key(key) {
                return Err(err(line_no, &format!("invalid key '{key}'")));
            }

            let rest = rest.trim();
            let value = if let Some(body) = rest.strip_prefix('(') {
                let mut body = strip_comment(body).to_string();
                while !closes_array(&body) {
                    let Some((_, next)) = lines.next() else {
                        return Err(err(line_no, "unterminated array"));
                    };
                    body.push(' ');
                    body.push_str(strip_comment(next.trim()));
                }
                let inner = strip_array_close(&body);
                let items = split_words(inner).map_err(|m| err(line_no, &m))?;
                Value::List(items)
            } else {
                Value::Scalar(parse_scalar(rest).map_err(|m| err(line_no, &m))?)
            };

            values.insert(key.to_string(), value);
        }

        Ok(Self { values })
    }

    /// Scalar value, trimmed; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            Value::Scalar(s) => {
                let s = s.trim();
                (!s.is_empty()).then_some(s)
            }
            Value::List(_) => None,
        }
    }

    /// List value. A scalar is split on whitespace and commas.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(Value::List(items)) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::Scalar(s)) => s
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Value after `=`: quoted, or bare up to an inline ` #` comment.
fn parse_scalar(rest: &str) -> std::result::Result<String, String> {
    if rest.starts_with('"') || rest.starts_with('\'') {
        let mut words = split_words(rest)?;
        if words.len() != 1 {
            return Err("unexpected text after quoted value".into());
        }
        return Ok(words.remove(0));
    }
    let bare = match rest.find(" #").or_else(|| rest.find("\t#")) {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    Ok(bare.trim().to_string())
}

/// True once an array body has its closing `)` outside quotes.
fn closes_array(body: &str) -> bool {
    let mut quote: Option<char> = None;
    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, ')') => return true,
            _ => {}
        }
    }
    false
}

/// Drop a `#` comment that starts a word outside quotes.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_blank = true;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '#') if prev_blank => return &line[..i],
            _ => {}
        }
        prev_blank = c.is_whitespace();
    }
    line
}

fn strip_array_close(body: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, ')') => return &body[..i],
            _ => {}
        }
    }
    body
}

/// Split on whitespace, honouring single and double quotes. A `#` outside
/// quotes at the start of a word ends the input.
fn split_words(input: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    in_word = true;
                }
                '#' if !in_word => break,
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".into());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ProjectFile {
        ProjectFile::parse(Path::new("/test/project.conf"), content).unwrap()
    }

    #[test]
    fn test_scalars_and_quotes() {
        let file = parse(
            "# header\nPROJECT_NAME=\"acme corp\"\nexport DB_TYPE=postgres # engine\nDB_USER='backup'\nEMPTY=\n",
        );
        assert_eq!(file.get("PROJECT_NAME"), Some("acme corp"));
        assert_eq!(file.get("DB_TYPE"), Some("postgres"));
        assert_eq!(file.get("DB_USER"), Some("backup"));
        assert_eq!(file.get("EMPTY"), None);
        assert_eq!(file.get("MISSING"), None);
    }

    #[test]
    fn test_quoted_value_keeps_hash() {
        let file = parse("DB_PASSWORD=\"p#ss word\"\n");
        assert_eq!(file.get("DB_PASSWORD"), Some("p#ss word"));
    }

    #[test]
    fn test_arrays() {
        let file = parse("DBS_TO_BACKUP=(orders \"billing archive\" users)\n");
        assert_eq!(
            file.get_list("DBS_TO_BACKUP"),
            vec!["orders", "billing archive", "users"]
        );
    }

    #[test]
    fn test_multiline_array() {
        let file = parse("DBS_TO_BACKUP=(\n  orders\n  users # main\n)\nDB_TYPE=mysql\n");
        assert_eq!(file.get_list("DBS_TO_BACKUP"), vec!["orders", "users"]);
        assert_eq!(file.get("DB_TYPE"), Some("mysql"));
    }

    #[test]
    fn test_scalar_list_split() {
        let file = parse("DBS_TO_BACKUP=\"orders, users  billing\"\n");
        assert_eq!(file.get_list("DBS_TO_BACKUP"), vec!["orders", "users", "billing"]);
    }

    #[test]
    fn test_malformed_lines() {
        let path = Path::new("/test/bad.conf");
        assert!(ProjectFile::parse(path, "just words\n").is_err());
        assert!(ProjectFile::parse(path, "1KEY=x\n").is_err());
        assert!(ProjectFile::parse(path, "KEY=\"open\n").is_err());
        assert!(ProjectFile::parse(path, "LIST=(a b\n").is_err());
    }

    #[test]
    fn test_later_assignment_wins() {
        let file = parse("DB_TYPE=mysql\nDB_TYPE=postgres\n");
        assert_eq!(file.get("DB_TYPE"), Some("postgres"));
    }
}
