//! `${VAR}` interpolation over raw configuration text

use super::error::ConfigError;
use regex::Regex;
use std::env;
use std::sync::LazyLock;

static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex"));

/// Substitute every `${VAR}` reference with the variable's value.
///
/// The first unset variable aborts the load. Credentials are not meant to
/// travel through here: providers name a credential reference that is
/// resolved per call instead.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = ENV_REFERENCE.replace_all(content, |caps: &regex::Captures<'_>| {
        match env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Names of all variables referenced by `content`, in order of appearance
pub fn referenced_vars(content: &str) -> Vec<String> {
    ENV_REFERENCE
        .captures_iter(content)
        .map(|cap| cap[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_set_variable() {
        env::set_var("SWB_TEST_BASE", "https://llm.internal/v1");

        let result = interpolate_env_vars("base_url: ${SWB_TEST_BASE}").unwrap();
        assert_eq!(result, "base_url: https://llm.internal/v1");

        env::remove_var("SWB_TEST_BASE");
    }

    #[test]
    fn test_reports_first_missing_variable() {
        let result = interpolate_env_vars("a: ${SWB_MISSING_ONE} b: ${SWB_MISSING_TWO}");

        match result {
            Err(ConfigError::EnvVarNotFound { var }) => assert_eq!(var, "SWB_MISSING_ONE"),
            other => panic!("expected EnvVarNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_lowercase_references_are_left_alone() {
        let result = interpolate_env_vars("pattern: ${not_a_var}").unwrap();
        assert_eq!(result, "pattern: ${not_a_var}");
    }

    #[test]
    fn test_referenced_vars() {
        let vars = referenced_vars("x: ${ONE}, y: ${TWO}");
        assert_eq!(vars, vec!["ONE".to_string(), "TWO".to_string()]);
    }
}
