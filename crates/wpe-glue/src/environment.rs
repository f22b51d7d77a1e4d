//! Process environment setup from `KEY=VALUE` strings.

use tracing::{debug, warn};

/// Why an environment entry was skipped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvEntryError {
    #[error("missing '=' in {0:?}")]
    MissingSeparator(String),

    #[error("empty variable name in {0:?}")]
    EmptyKey(String),

    #[error("NUL byte in {0:?}")]
    Nul(String),
}

/// Split an entry on its first `=`.
///
/// The value may be empty and may itself contain `=`.
pub fn parse_entry(entry: &str) -> Result<(&str, &str), EnvEntryError> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| EnvEntryError::MissingSeparator(entry.to_string()))?;

    if key.is_empty() {
        return Err(EnvEntryError::EmptyKey(entry.to_string()));
    }
    if entry.contains('\0') {
        return Err(EnvEntryError::Nul(entry.to_string()));
    }

    Ok((key, value))
}

/// Set every well-formed entry in the process environment.
///
/// Malformed entries are logged and skipped. Returns how many were applied.
pub fn configure<I, S>(entries: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut applied = 0;
    for entry in entries {
        match parse_entry(entry.as_ref()) {
            Ok((key, value)) => {
                debug!("setenv {}={}", key, value);
                // SAFETY: runs from setupEnvironment on the UI thread during
                // startup, before the engine starts reading the environment.
                unsafe { std::env::set_var(key, value) };
                applied += 1;
            }
            Err(e) => warn!("Skipping environment entry: {}", e),
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_splits_on_first_equals() {
        assert_eq!(parse_entry("A=b=c"), Ok(("A", "b=c")));
        assert_eq!(parse_entry("EMPTY="), Ok(("EMPTY", "")));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_entry("NOVALUE"), Err(EnvEntryError::MissingSeparator(_))));
        assert!(matches!(parse_entry("=value"), Err(EnvEntryError::EmptyKey(_))));
        assert!(matches!(parse_entry("K=v\0x"), Err(EnvEntryError::Nul(_))));
    }

    #[test]
    #[serial]
    fn test_configure_applies_valid_entries() {
        let applied = configure([
            "WPE_GLUE_TEST_A=1",
            "broken",
            "WPE_GLUE_TEST_B=x=y",
            "=nokey",
        ]);

        assert_eq!(applied, 2);
        assert_eq!(std::env::var("WPE_GLUE_TEST_A").unwrap(), "1");
        assert_eq!(std::env::var("WPE_GLUE_TEST_B").unwrap(), "x=y");
    }

    #[test]
    #[serial]
    fn test_configure_owned_strings() {
        let entries = vec![String::from("WPE_GLUE_TEST_OWNED=yes")];
        assert_eq!(configure(&entries), 1);
        assert_eq!(std::env::var("WPE_GLUE_TEST_OWNED").unwrap(), "yes");
    }
}
