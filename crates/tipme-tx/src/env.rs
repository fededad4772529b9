//! Environment lookup with in-process overrides.

use std::collections::HashMap;

/// Environment reader that prefers explicit overrides over the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Values that shadow the process environment.
    values: HashMap<String, String>,
    /// When true, the process environment is never consulted.
    isolated: bool,
}

impl EnvOverrides {
    /// Creates overrides that fall back to the process environment.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            isolated: false,
        }
    }

    /// Creates overrides that never read the process environment.
    #[must_use]
    pub fn isolated(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            isolated: true,
        }
    }

    /// Sets one override.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.values.insert(name.into(), value.into());
        self
    }

    /// Returns a variable, preferring overrides. Blank values read as unset.
    #[must_use]
    pub fn read(&self, name: &str) -> Option<String> {
        let value = match self.values.get(name) {
            Some(value) => Some(value.clone()),
            None if self.isolated => None,
            None => std::env::var(name).ok(),
        };
        value.filter(|value| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_shadow_and_blank_reads_as_unset() {
        let env = EnvOverrides::isolated([("A".to_owned(), "1".to_owned())]).with("B", "  ");
        assert_eq!(env.read("A").as_deref(), Some("1"));
        assert_eq!(env.read("B"), None);
        assert_eq!(env.read("PATH"), None);
    }

    #[test]
    fn non_isolated_reads_fall_back_to_process_env() {
        let env = EnvOverrides::new([("TIPME_ENV_TEST_SHADOW".to_owned(), "x".to_owned())]);
        assert_eq!(env.read("TIPME_ENV_TEST_SHADOW").as_deref(), Some("x"));
        assert_eq!(
            env.read("PATH"),
            std::env::var("PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
        );
    }
}
