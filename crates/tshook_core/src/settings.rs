//! Hook settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that turns on verbose compile diagnostics.
pub const DEBUG_ENV: &str = "TSHOOK_DEBUG";

/// Environment variable naming the compiler program to run.
pub const COMPILER_ENV: &str = "TSHOOK_TSC";

/// Hook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSettings {
    /// Project configuration file looked up next to and above each source.
    pub config_file_name: String,
    /// Source extensions (without the dot) the hook registers for.
    pub extensions: Vec<String>,
    /// Compiler program; `None` searches `node_modules/.bin` then `PATH`.
    pub compiler: Option<PathBuf>,
    /// Name of the debug toggle variable.
    pub debug_var: String,
}

impl HookSettings {
    /// Defaults with the compiler override taken from the environment.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(program) = std::env::var_os(COMPILER_ENV).filter(|v| !v.is_empty()) {
            settings.compiler = Some(PathBuf::from(program));
        }
        settings
    }

    /// Reads the debug toggle. Any non-empty value turns it on.
    ///
    /// Not cached: each compile attempt asks again.
    pub fn debug_enabled(&self) -> bool {
        std::env::var_os(&self.debug_var).is_some_and(|v| !v.is_empty())
    }
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            config_file_name: "tsconfig.json".to_string(),
            extensions: vec!["ts".to_string()],
            compiler: None,
            debug_var: DEBUG_ENV.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = HookSettings::default();
        assert_eq!(settings.config_file_name, "tsconfig.json");
        assert_eq!(settings.extensions, vec!["ts".to_string()]);
        assert!(settings.compiler.is_none());
    }

    #[test]
    fn test_debug_toggle_follows_environment() {
        // Private variable name so parallel tests never observe it.
        let settings = HookSettings {
            debug_var: "TSHOOK_DEBUG_SETTINGS_TEST".to_string(),
            ..HookSettings::default()
        };

        std::env::remove_var(&settings.debug_var);
        assert!(!settings.debug_enabled());

        std::env::set_var(&settings.debug_var, "");
        assert!(!settings.debug_enabled());

        std::env::set_var(&settings.debug_var, "1");
        assert!(settings.debug_enabled());

        std::env::remove_var(&settings.debug_var);
    }

    #[test]
    fn test_settings_round_trip_through_json() {
        let json = r#"{
            "config_file_name": "jsconfig.json",
            "extensions": ["ts", "mts"],
            "compiler": "/opt/tsc",
            "debug_var": "X_DEBUG"
        }"#;
        let settings: HookSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.config_file_name, "jsconfig.json");
        assert_eq!(settings.extensions.len(), 2);
        assert_eq!(settings.compiler, Some(PathBuf::from("/opt/tsc")));
    }
}
