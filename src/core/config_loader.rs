//! Configuration file loader for artifact-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::PublishError;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".artifact-publisher.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublishConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options reading the real process environment
    pub fn from_env(project_path: impl Into<PathBuf>, cli_args: Option<PublishConfig>) -> Self {
        Self {
            project_path: project_path.into(),
            cli_args,
            env: env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "repository.url")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (./.artifact-publisher.yaml)
    /// 4. Global config (~/.artifact-publisher.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig, PublishError> {
        let mut configs: Vec<PublishConfig> = vec![PublishConfig::default()];

        if let Some(home) = options.env.get("HOME") {
            let global_config_path = PathBuf::from(home).join(CONFIG_FILENAME);
            if let Some(global_config) = Self::load_config_file(&global_config_path).await? {
                configs.push(global_config);
            }
        }

        if let Some(project_config) = Self::load_project_config(&options.project_path).await? {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged_config = Self::merge_configs(configs);

        Self::expand_env_vars(merged_config, &options.env)
    }

    /// Load project configuration from ./.artifact-publisher.yaml
    async fn load_project_config(
        project_path: &Path,
    ) -> Result<Option<PublishConfig>, PublishError> {
        Self::load_config_file(&project_path.join(CONFIG_FILENAME)).await
    }

    /// Load configuration from YAML file
    fn load_config_file(
        file_path: &Path,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = Result<Option<PublishConfig>, PublishError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            if !file_path.exists() {
                return Ok(None);
            }

            let content = fs::read_to_string(file_path)
                .await
                .map_err(|e| PublishError::io(file_path, e))?;

            let config: PublishConfig = serde_yaml::from_str(&content).map_err(|e| {
                PublishError::Config(format!(
                    "Failed to parse {}: {}",
                    file_path.display(),
                    e
                ))
            })?;

            if let Some(extends_path) = &config.extends {
                let base_path = file_path
                    .parent()
                    .ok_or_else(|| PublishError::Config("Invalid config file path".to_string()))?
                    .join(extends_path);

                if let Some(base_config) = Self::load_config_file(&base_path).await? {
                    return Ok(Some(Self::merge_configs(vec![base_config, config])));
                }
            }

            Ok(Some(config))
        })
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<PublishConfig> {
        let mut repository = RepositoryConfig::default();
        let mut build = BuildConfig::default();
        let mut has_repository = false;
        let mut has_build = false;

        for (key, slot) in [
            ("RT_URL", &mut repository.url),
            ("RT_USER", &mut repository.user),
            ("RT_PASSWORD", &mut repository.password),
            ("RT_ACCESS_TOKEN", &mut repository.access_token),
        ] {
            if let Some(value) = env.get(key).filter(|v| !v.is_empty()) {
                *slot = Some(value.clone());
                has_repository = true;
            }
        }

        for (key, slot) in [
            ("BUILD_NAME", &mut build.name),
            ("BUILD_NUMBER", &mut build.number),
        ] {
            if let Some(value) = env.get(key).filter(|v| !v.is_empty()) {
                *slot = Some(value.clone());
                has_build = true;
            }
        }

        if !has_repository && !has_build {
            return None;
        }

        Some(PublishConfig {
            repository: has_repository.then_some(repository),
            build: has_build.then_some(build),
            publish: None,
            security: None,
            ..Default::default()
        })
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<PublishConfig>) -> PublishConfig {
        let mut result = PublishConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target, field by field
    fn merge_into(target: &mut PublishConfig, source: PublishConfig) {
        if !source.version.is_empty() {
            target.version = source.version;
        }

        if source.extends.is_some() {
            target.extends = source.extends;
        }

        if let Some(source_repo) = source.repository {
            let target_repo = target.repository.get_or_insert_with(Default::default);
            merge_option(&mut target_repo.url, source_repo.url);
            merge_option(&mut target_repo.user, source_repo.user);
            merge_option(&mut target_repo.password, source_repo.password);
            merge_option(&mut target_repo.access_token, source_repo.access_token);
            merge_option(&mut target_repo.timeout_secs, source_repo.timeout_secs);
        }

        if let Some(source_build) = source.build {
            let target_build = target.build.get_or_insert_with(Default::default);
            merge_option(&mut target_build.name, source_build.name);
            merge_option(&mut target_build.number, source_build.number);
            merge_option(&mut target_build.store_dir, source_build.store_dir);
        }

        if let Some(source_publish) = source.publish {
            let target_publish = target.publish.get_or_insert_with(Default::default);
            merge_option(&mut target_publish.threads, source_publish.threads);
            merge_option(
                &mut target_publish.dependency_failure_policy,
                source_publish.dependency_failure_policy,
            );
            merge_option(
                &mut target_publish.tool_timeout_secs,
                source_publish.tool_timeout_secs,
            );
        }

        if source.resolution.is_some() {
            target.resolution = source.resolution;
        }

        if source.security.is_some() {
            target.security = source.security;
        }
    }

    /// Expand environment variables in configuration
    ///
    /// Only `${VAR_NAME}` references are expanded, honouring the configured
    /// allowed prefixes and forbidden patterns.
    fn expand_env_vars(
        mut config: PublishConfig,
        env: &HashMap<String, String>,
    ) -> Result<PublishConfig, PublishError> {
        let expansion = config
            .security
            .as_ref()
            .and_then(|s| s.env_var_expansion.clone());

        if !expansion.as_ref().and_then(|e| e.enabled).unwrap_or(true) {
            return Ok(config);
        }

        let allowed_prefixes = expansion.as_ref().and_then(|e| e.allowed_prefixes.clone());

        let forbidden_patterns: Vec<Regex> = expansion
            .and_then(|e| e.forbidden_patterns)
            .unwrap_or_default()
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        let expand = |value: &mut Option<String>| -> Result<(), PublishError> {
            if let Some(v) = value {
                *v = Self::expand_string(v, env, &allowed_prefixes, &forbidden_patterns)?;
            }
            Ok(())
        };

        if let Some(repository) = &mut config.repository {
            expand(&mut repository.url)?;
            expand(&mut repository.user)?;
            expand(&mut repository.password)?;
            expand(&mut repository.access_token)?;
        }

        if let Some(build) = &mut config.build {
            expand(&mut build.name)?;
            expand(&mut build.number)?;
            expand(&mut build.store_dir)?;
        }

        Ok(config)
    }

    /// Expand environment variables in a single string
    fn expand_string(
        input: &str,
        env: &HashMap<String, String>,
        allowed_prefixes: &Option<Vec<String>>,
        forbidden_patterns: &[Regex],
    ) -> Result<String, PublishError> {
        let env_var_regex = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| PublishError::Config(format!("Invalid expansion pattern: {}", e)))?;

        let mut result = input.to_string();
        for cap in env_var_regex.captures_iter(input) {
            let var_name = &cap[1];

            if forbidden_patterns.iter().any(|p| p.is_match(var_name)) {
                tracing::warn!(variable = var_name, "environment variable matches forbidden pattern, skipping");
                continue;
            }

            if let Some(prefixes) = allowed_prefixes
                && !prefixes.iter().any(|prefix| var_name.starts_with(prefix))
            {
                tracing::warn!(variable = var_name, "environment variable not allowed by prefix whitelist, skipping");
                continue;
            }

            if let Some(value) = env.get(var_name) {
                result = result.replace(&format!("${{{}}}", var_name), value);
            } else {
                tracing::warn!(variable = var_name, "environment variable not found");
            }
        }

        Ok(result)
    }

    /// Validate configuration
    pub fn validate(config: &PublishConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some("Currently supported version is \"1.0\" only".to_string()),
            });
        }

        match config.repository.as_ref().and_then(|r| r.url.as_deref()) {
            None | Some("") => errors.push(ConfigValidationError {
                field: "repository.url".to_string(),
                message: "Repository URL is required (or set RT_URL)".to_string(),
            }),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                errors.push(ConfigValidationError {
                    field: "repository.url".to_string(),
                    message: format!("Repository URL must be http(s): {}", url),
                })
            }
            Some(_) => {}
        }

        if let Some(repository) = &config.repository
            && repository.access_token.is_none()
            && repository.user.is_some() != repository.password.is_some()
        {
            warnings.push(ConfigValidationWarning {
                field: "repository".to_string(),
                message: "Only one of user/password is set".to_string(),
                suggestion: Some("Set both, or use accessToken".to_string()),
            });
        }

        let (name, number) = config.build_identifiers();
        if name.is_empty() != number.is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "build".to_string(),
                message: "Build-info is recorded only when both name and number are set"
                    .to_string(),
                suggestion: None,
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}

fn merge_option<T>(target: &mut Option<T>, source: Option<T>) {
    if source.is_some() {
        *target = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_env_config() {
        let env = env_of(&[
            ("RT_URL", "https://rt.example.com/artifactory/"),
            ("RT_USER", "ci"),
            ("BUILD_NAME", "nightly"),
            ("BUILD_NUMBER", "7"),
        ]);

        let config = ConfigLoader::load_env_config(&env).unwrap();

        let repository = config.repository.unwrap();
        assert_eq!(
            repository.url.as_deref(),
            Some("https://rt.example.com/artifactory/")
        );
        assert_eq!(repository.user.as_deref(), Some("ci"));
        assert!(repository.password.is_none());
        assert_eq!(config.build.unwrap().number.as_deref(), Some("7"));
    }

    #[test]
    fn test_load_env_config_empty() {
        assert!(ConfigLoader::load_env_config(&env_of(&[("PATH", "/bin")])).is_none());
    }

    #[test]
    fn test_expand_string() {
        let env = env_of(&[("RT_PASSWORD", "secret123")]);

        let result = ConfigLoader::expand_string("${RT_PASSWORD}", &env, &None, &[]).unwrap();

        assert_eq!(result, "secret123");
    }

    #[test]
    fn test_expand_string_with_allowed_prefixes() {
        let env = env_of(&[("RT_TOKEN", "secret123"), ("SECRET_KEY", "forbidden")]);

        let allowed_prefixes = Some(vec!["RT_".to_string()]);

        let result =
            ConfigLoader::expand_string("${RT_TOKEN}-${SECRET_KEY}", &env, &allowed_prefixes, &[])
                .unwrap();

        assert_eq!(result, "secret123-${SECRET_KEY}");
    }

    #[test]
    fn test_expand_string_with_forbidden_pattern() {
        let env = env_of(&[("AWS_SECRET", "nope"), ("RT_USER", "ci")]);
        let forbidden = vec![Regex::new("^AWS_").unwrap()];

        let result =
            ConfigLoader::expand_string("${RT_USER}:${AWS_SECRET}", &env, &None, &forbidden)
                .unwrap();

        assert_eq!(result, "ci:${AWS_SECRET}");
    }

    #[test]
    fn test_merge_configs_field_by_field() {
        let base = PublishConfig {
            repository: Some(RepositoryConfig {
                url: Some("https://base/".to_string()),
                user: Some("base-user".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = PublishConfig {
            repository: Some(RepositoryConfig {
                user: Some("ci".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = ConfigLoader::merge_configs(vec![base, overlay]);
        let repository = merged.repository.unwrap();

        assert_eq!(repository.url.as_deref(), Some("https://base/"));
        assert_eq!(repository.user.as_deref(), Some("ci"));
    }

    #[tokio::test]
    async fn test_load_project_config_with_extends_and_env() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("base.yaml"),
            "version: \"1.0\"\nrepository:\n  url: https://base.example.com/artifactory/\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILENAME),
            "version: \"1.0\"\nextends: base.yaml\nrepository:\n  user: ci\n  password: ${RT_PASSWORD}\n",
        )
        .await
        .unwrap();

        let options = ConfigLoadOptions {
            project_path: dir.path().to_path_buf(),
            cli_args: None,
            env: env_of(&[("RT_PASSWORD", "hunter2"), ("BUILD_NUMBER", "9")]),
        };

        let config = ConfigLoader::load(options).await.unwrap();
        let repository = config.repository.as_ref().unwrap();

        assert_eq!(
            repository.url.as_deref(),
            Some("https://base.example.com/artifactory/")
        );
        assert_eq!(repository.password.as_deref(), Some("hunter2"));
        assert_eq!(config.build_identifiers().1, "9");
    }

    #[tokio::test]
    async fn test_cli_overrides_env() {
        let dir = TempDir::new().unwrap();
        let cli = PublishConfig {
            build: Some(BuildConfig {
                name: Some("from-cli".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = ConfigLoadOptions {
            project_path: dir.path().to_path_buf(),
            cli_args: Some(cli),
            env: env_of(&[("BUILD_NAME", "from-env"), ("BUILD_NUMBER", "3")]),
        };

        let config = ConfigLoader::load(options).await.unwrap();

        assert_eq!(
            config.build_identifiers(),
            ("from-cli".to_string(), "3".to_string())
        );
    }

    #[test]
    fn test_validate_requires_repository_url() {
        let result = ConfigLoader::validate(&PublishConfig::default());

        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "repository.url");
    }

    #[test]
    fn test_validate_warns_on_partial_build_identifiers() {
        let config = PublishConfig {
            repository: Some(RepositoryConfig {
                url: Some("https://rt/".to_string()),
                ..Default::default()
            }),
            build: Some(BuildConfig {
                name: Some("only-name".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);

        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "build");
    }

    #[test]
    fn test_format_validation_result() {
        let result = ConfigValidationResult {
            valid: false,
            errors: vec![ConfigValidationError {
                field: "repository.url".to_string(),
                message: "Repository URL is required".to_string(),
            }],
            warnings: vec![ConfigValidationWarning {
                field: "build".to_string(),
                message: "partial".to_string(),
                suggestion: Some("set both".to_string()),
            }],
        };

        let formatted = ConfigLoader::format_validation_result(&result);

        assert!(formatted.contains("❌ Configuration has errors"));
        assert!(formatted.contains("[repository.url]"));
        assert!(formatted.contains("🟡 Warnings:"));
        assert!(formatted.contains("Suggestion: set both"));
    }
}
