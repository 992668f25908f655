use crate::error::ConfigError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Layers process environment variables under an optional `.env` file,
/// later file entries overriding earlier ones and process env taking
/// precedence over neither — callers read through [`EnvManager::get`],
/// which only consults this merged map, never `std::env` directly, so the
/// whole configuration surface is reproducible from one snapshot.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }
        Self { vars }
    }

    /// An [`EnvManager`] seeded from nothing but a file, with no process
    /// environment layered underneath — used by callers (tests, `validate-config`)
    /// that want a reproducible snapshot independent of the ambient shell.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self { vars: HashMap::new() };
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
            path: path.display().to_string(),
            source,
        })?;
        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                return Err(ConfigError::MalformedEnvLine { line: line_num + 1 });
            };

            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim();
            if key.is_empty() {
                return Err(ConfigError::MalformedEnvLine { line: line_num + 1 });
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }
        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            return value[1..value.len() - 1].to_string();
        }
        if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EnvManager {
        EnvManager { vars: HashMap::new() }
    }

    #[test]
    fn parses_basic_key_value_pairs() {
        let mut env = manager();
        env.parse_env_content("# comment\nKEY1=value1\nKEY2=value2\n").unwrap();
        assert_eq!(env.get("KEY1"), Some("value1"));
        assert_eq!(env.get("KEY2"), Some("value2"));
    }

    #[test]
    fn strips_matching_quotes() {
        let mut env = manager();
        env.parse_env_content("QUOTED=\"value with spaces\"\nSINGLE='single quoted'\nBARE=no_spaces\n")
            .unwrap();
        assert_eq!(env.get("QUOTED"), Some("value with spaces"));
        assert_eq!(env.get("SINGLE"), Some("single quoted"));
        assert_eq!(env.get("BARE"), Some("no_spaces"));
    }

    #[test]
    fn rejects_lines_without_equals() {
        let mut env = manager();
        assert!(env.parse_env_content("NOT_KEY_VALUE").is_err());
    }

    #[test]
    fn rejects_empty_keys() {
        let mut env = manager();
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn loads_from_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "FOO=bar\n").unwrap();

        let mut env = manager();
        env.load_from_file(&path).unwrap();
        assert_eq!(env.get("FOO"), Some("bar"));
    }
}
