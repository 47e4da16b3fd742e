//! Environment variable substitution for config values.
//!
//! Supports `${VAR_NAME}` syntax in string values, resolved at load time.
//! Only uppercase `[A-Z_][A-Z0-9_]*` variable names are matched.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references in a config value tree.
///
/// Walks the tree recursively; only string leaves are processed.
/// Returns an error if any referenced env var is unset.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Substitute env vars using a provided map (useful for testing).
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in ENV_VAR_PATTERN.captures_iter(s) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];
        out.push_str(&s[last..whole.start()]);
        match env.get(name) {
            Some(v) if !v.is_empty() => out.push_str(v),
            _ => {
                return Err(MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                }
                .into())
            }
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_string_leaves() {
        let env = HashMap::from([("VISION_KEY".to_string(), "sekret".to_string())]);
        let value = json!({ "vision": { "api_key": "${VISION_KEY}" } });
        let resolved = resolve_env_vars_with(&value, &env).unwrap();
        assert_eq!(resolved["vision"]["api_key"], "sekret");
    }

    #[test]
    fn missing_var_reports_config_path() {
        let value = json!({ "vision": { "api_key": "${NOPE_NOT_SET}" } });
        let err = resolve_env_vars_with(&value, &HashMap::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NOPE_NOT_SET"), "{msg}");
        assert!(msg.contains("vision.api_key"), "{msg}");
    }

    #[test]
    fn plain_strings_pass_through() {
        let value = json!({ "store": { "db_path": "slipguard.db" } });
        let resolved = resolve_env_vars_with(&value, &HashMap::new()).unwrap();
        assert_eq!(resolved, value);
    }
}
