use crate::utils::error::{DispatchError, Result};
use crate::utils::logger::{DiagnosticsLevel, LogFormat};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub diagnostics: DiagnosticsConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    pub request: RequestConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub level: DiagnosticsLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_hours: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            ttl_hours: 24 * 14,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub bcrypt_cost: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub max_body_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
        }
    }
}

impl ServiceConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(&path).map_err(|e| DispatchError::ConfigError {
                message: format!("cannot read {}: {}", path.as_ref().display(), e),
            })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DispatchError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DATA_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| DispatchError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;
        validation::validate_cookie_name("session.cookie_name", &self.session.cookie_name)?;
        validation::validate_positive_number(
            "session.ttl_hours",
            self.session.ttl_hours as usize,
            1,
        )?;
        validation::validate_range(
            "password.bcrypt_cost",
            self.password.bcrypt_cost,
            MIN_BCRYPT_COST,
            MAX_BCRYPT_COST,
        )?;
        validation::validate_positive_number(
            "request.max_body_bytes",
            self.request.max_body_bytes,
            1,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();

        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.diagnostics.level, DiagnosticsLevel::All);
        assert_eq!(config.session.cookie_name, "sid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[diagnostics]
level = "warn"
format = "json"

[storage]
data_dir = "/var/lib/actions"

[session]
cookie_name = "showdown_sid"
ttl_hours = 2

[password]
bcrypt_cost = 4

[request]
max_body_bytes = 1024
"#;

        let config = ServiceConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.diagnostics.level, DiagnosticsLevel::Warn);
        assert_eq!(config.diagnostics.format, LogFormat::Json);
        assert_eq!(config.storage.data_dir, "/var/lib/actions");
        assert_eq!(config.session.ttl(), chrono::Duration::hours(2));
        assert_eq!(config.password.bcrypt_cost, 4);
        assert_eq!(config.request.max_body_bytes, 1024);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ACTION_DISPATCH_TEST_DATA_DIR", "/tmp/actions");

        let toml_content = r#"
[storage]
data_dir = "${ACTION_DISPATCH_TEST_DATA_DIR}"
"#;

        let config = ServiceConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.storage.data_dir, "/tmp/actions");

        std::env::remove_var("ACTION_DISPATCH_TEST_DATA_DIR");
    }

    #[test]
    fn test_config_validation() {
        let config = ServiceConfig::from_toml_str("[password]\nbcrypt_cost = 2\n").unwrap();
        assert!(config.validate().is_err());

        let config = ServiceConfig::from_toml_str("[session]\nttl_hours = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        assert!(ServiceConfig::from_toml_str("[diagnostics]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[storage]\ndata_dir = \"./from-file\"\n")
            .unwrap();

        let config = ServiceConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.storage.data_dir, "./from-file");
    }
}
