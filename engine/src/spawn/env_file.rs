//! KEY=value environment file parsing.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::domain::{DomainError, Result};

/// Parse an environment file into a map. Keys and values are trimmed,
/// blank lines and `#` comments are skipped, and malformed lines are
/// logged and ignored rather than failing the start.
pub fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DomainError::SpawnError(format!(
            "failed to read environment file {}: {e}",
            path.display()
        ))
    })?;
    Ok(parse_env_contents(&contents, path))
}

/// Resolve an `environment_file` field. A leading '-' marks the file
/// optional: a missing optional file yields an empty map.
pub fn load_environment_file(spec: &str) -> Result<HashMap<String, String>> {
    let (optional, raw) = match spec.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };
    let path = Path::new(raw);
    if optional && !path.exists() {
        return Ok(HashMap::new());
    }
    parse_env_file(path)
}

fn parse_env_contents(contents: &str, path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    warn!(
                        file = %path.display(),
                        line = lineno + 1,
                        "skipping environment entry with empty key"
                    );
                    continue;
                }
                vars.insert(key.to_string(), value.trim().to_string());
            }
            None => {
                warn!(
                    file = %path.display(),
                    line = lineno + 1,
                    "skipping malformed environment line"
                );
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> HashMap<String, String> {
        parse_env_contents(contents, Path::new("test.env"))
    }

    #[test]
    fn test_whitespace_trimmed_around_key_and_value() {
        let vars = parse(" KEY = value ");
        assert_eq!(vars.get("KEY"), Some(&"value".to_string()));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let vars = parse("# header\n\nA=1\n  # indented comment\nB=2\n");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("A"), Some(&"1".to_string()));
        assert_eq!(vars.get("B"), Some(&"2".to_string()));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let vars = parse("GOOD=yes\nno equals sign here\n=empty_key\n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("GOOD"), Some(&"yes".to_string()));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let vars = parse("URL=postgres://host:5432/db?sslmode=require");
        assert_eq!(
            vars.get("URL"),
            Some(&"postgres://host:5432/db?sslmode=require".to_string())
        );
    }

    #[test]
    fn test_optional_missing_file_is_empty() {
        let vars = load_environment_file("-/nonexistent/path.env").unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_required_missing_file_fails() {
        assert!(load_environment_file("/nonexistent/path.env").is_err());
    }
}
