//! Top-level configuration and oracle factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use cogbench_core::error::OracleError;
use cogbench_core::oracle::{OracleLoader, SemanticOracle, SharedOracle};
use cogbench_core::settings::{EvaluatorSettings, Settings};

use crate::fixed::{DisabledOracle, FixedOracle};
use crate::http::{self, HttpNliOracle};

/// Which semantic oracle backend to use.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OracleConfig {
    Http {
        #[serde(default = "default_nli_url")]
        base_url: String,
        #[serde(default = "default_nli_model")]
        model: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_batch")]
        max_batch: usize,
    },
    Fixed {
        #[serde(default = "default_fixed_entailment")]
        entailment: f64,
        #[serde(default = "default_fixed_neutral")]
        neutral: f64,
        #[serde(default)]
        contradiction: f64,
    },
    Disabled,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleConfig::Http {
                base_url,
                model,
                api_key,
                timeout_secs,
                max_batch,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("model", model)
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("timeout_secs", timeout_secs)
                .field("max_batch", max_batch)
                .finish(),
            OracleConfig::Fixed {
                entailment,
                neutral,
                contradiction,
            } => f
                .debug_struct("Fixed")
                .field("entailment", entailment)
                .field("neutral", neutral)
                .field("contradiction", contradiction)
                .finish(),
            OracleConfig::Disabled => f.write_str("Disabled"),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig::Http {
            base_url: default_nli_url(),
            model: default_nli_model(),
            api_key: None,
            timeout_secs: default_http_timeout_secs(),
            max_batch: default_max_batch(),
        }
    }
}

fn default_nli_url() -> String {
    http::DEFAULT_BASE_URL.to_string()
}
fn default_nli_model() -> String {
    http::DEFAULT_MODEL.to_string()
}
fn default_http_timeout_secs() -> u64 {
    http::DEFAULT_TIMEOUT_SECS
}
fn default_max_batch() -> usize {
    http::DEFAULT_MAX_BATCH
}
fn default_fixed_entailment() -> f64 {
    0.5
}
fn default_fixed_neutral() -> f64 {
    0.5
}

/// Top-level cogbench configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CogbenchConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Thresholds, marker lists, registry table and run settings.
    #[serde(default)]
    pub settings: Settings,
    /// Where evaluation batches are written when no `--output` is given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./cogbench-results")
}

impl Default for CogbenchConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            settings: Settings::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_oracle_config(config: &OracleConfig) -> OracleConfig {
    match config {
        OracleConfig::Http {
            base_url,
            model,
            api_key,
            timeout_secs,
            max_batch,
        } => OracleConfig::Http {
            base_url: resolve_env_vars(base_url),
            model: resolve_env_vars(model),
            api_key: api_key.as_deref().map(resolve_env_vars),
            timeout_secs: *timeout_secs,
            max_batch: *max_batch,
        },
        other => other.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `cogbench.toml` in the current directory
/// 2. `~/.config/cogbench/config.toml`
///
/// Environment variable overrides: `COGBENCH_NLI_URL`, `COGBENCH_NLI_API_KEY`.
pub fn load_config() -> Result<CogbenchConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CogbenchConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("cogbench.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            info!(path = %path.display(), "loaded configuration");
            config
        }
        None => CogbenchConfig::default(),
    };

    apply_env_overrides(
        &mut config,
        std::env::var("COGBENCH_NLI_URL").ok(),
        std::env::var("COGBENCH_NLI_API_KEY").ok(),
    );
    config.oracle = resolve_oracle_config(&config.oracle);
    config
        .settings
        .lexicon
        .validate()
        .context("invalid lexicon in configuration")?;

    Ok(config)
}

/// Parse a TOML document into a config.
pub fn parse_config(content: &str) -> Result<CogbenchConfig> {
    Ok(toml::from_str(content)?)
}

/// A URL override switches any backend to HTTP; a key override only
/// applies to an HTTP backend.
fn apply_env_overrides(config: &mut CogbenchConfig, url: Option<String>, key: Option<String>) {
    if let Some(url) = url {
        match &mut config.oracle {
            OracleConfig::Http { base_url, .. } => *base_url = url,
            other => {
                *other = OracleConfig::Http {
                    base_url: url,
                    model: default_nli_model(),
                    api_key: None,
                    timeout_secs: default_http_timeout_secs(),
                    max_batch: default_max_batch(),
                }
            }
        }
    }
    if let Some(key) = key {
        if let OracleConfig::Http { api_key, .. } = &mut config.oracle {
            *api_key = Some(key);
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("cogbench"))
}

/// Build the process-wide oracle for a configuration.
///
/// The HTTP backend is constructed lazily on the first cache miss, so runs
/// that never reach a semantic constraint never touch the network.
pub fn create_oracle(config: &OracleConfig, settings: &EvaluatorSettings) -> SharedOracle {
    match config {
        OracleConfig::Http {
            base_url,
            model,
            api_key,
            timeout_secs,
            max_batch,
        } => {
            let (base_url, model, api_key) = (base_url.clone(), model.clone(), api_key.clone());
            let (timeout_secs, max_batch) = (*timeout_secs, *max_batch);
            let version = model.clone();
            let loader: OracleLoader = Box::new(move || {
                let built = HttpNliOracle::new(&base_url, &model, api_key.clone(), timeout_secs, max_batch)
                    .map(|o| Arc::new(o) as Arc<dyn SemanticOracle>)
                    .map_err(|e| OracleError::Unavailable(format!("{e:#}")));
                Box::pin(async move { built })
            });
            SharedOracle::lazy(version, loader, settings)
        }
        OracleConfig::Fixed {
            entailment,
            neutral,
            contradiction,
        } => SharedOracle::new(
            Arc::new(FixedOracle::new(*entailment, *neutral, *contradiction)),
            settings,
        ),
        OracleConfig::Disabled => SharedOracle::new(Arc::new(DisabledOracle), settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogbench_core::oracle::OracleQuery;
    use cogbench_core::settings::ConceptScope;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_COGBENCH_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_COGBENCH_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_COGBENCH_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("unterminated ${"), "unterminated ${");
        std::env::remove_var("_COGBENCH_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = CogbenchConfig::default();
        assert!(matches!(config.oracle, OracleConfig::Http { ref model, .. } if model == "roberta-large-mnli"));
        assert_eq!(config.settings.evaluator.parallelism, 4);
        assert_eq!(config.settings.evaluator.oracle_timeout_ms, 30_000);
    }

    #[test]
    fn parse_oracle_and_settings() {
        let config = parse_config(
            r#"
output_dir = "out"

[oracle]
type = "http"
base_url = "http://nli:8080"
api_key = "sk-test"

[settings.thresholds]
relevance_scope = "question_and_answer"

[settings.evaluator]
parallelism = 2
"#,
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.settings.evaluator.parallelism, 2);
        assert_eq!(config.settings.thresholds.relevance_scope, ConceptScope::QuestionAndAnswer);
        match &config.oracle {
            OracleConfig::Http {
                base_url,
                model,
                timeout_secs,
                ..
            } => {
                assert_eq!(base_url, "http://nli:8080");
                assert_eq!(model, "roberta-large-mnli");
                assert_eq!(*timeout_secs, 60);
            }
            other => panic!("unexpected oracle config: {other:?}"),
        }
    }

    #[test]
    fn debug_masks_api_key() {
        let config = OracleConfig::Http {
            base_url: "http://nli".into(),
            model: "m".into(),
            api_key: Some("sk-secret".into()),
            timeout_secs: 1,
            max_batch: 1,
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn env_overrides() {
        let mut config = parse_config("[oracle]\ntype = \"disabled\"\n").unwrap();
        apply_env_overrides(&mut config, None, Some("ignored".into()));
        assert_eq!(config.oracle, OracleConfig::Disabled);

        apply_env_overrides(&mut config, Some("http://override:9000".into()), Some("k".into()));
        match &config.oracle {
            OracleConfig::Http {
                base_url, api_key, ..
            } => {
                assert_eq!(base_url, "http://override:9000");
                assert_eq!(api_key.as_deref(), Some("k"));
            }
            other => panic!("unexpected oracle config: {other:?}"),
        }
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/cogbench.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cogbench.toml");
        std::fs::write(
            &path,
            "[oracle]\ntype = \"fixed\"\nentailment = 0.9\nneutral = 0.1\n",
        )
        .unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert!(matches!(
            config.oracle,
            OracleConfig::Fixed { entailment, .. } if (entailment - 0.9).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn disabled_oracle_fails_every_query() {
        let shared = create_oracle(&OracleConfig::Disabled, &EvaluatorSettings::default());
        assert_eq!(shared.model_version(), "disabled");
        assert!(shared.score(&OracleQuery::new("p", "h")).await.is_err());
    }

    #[tokio::test]
    async fn http_oracle_is_stamped_before_loading() {
        let shared = create_oracle(&OracleConfig::default(), &EvaluatorSettings::default());
        assert_eq!(shared.model_version(), "roberta-large-mnli");
        assert_eq!(shared.stats().misses, 0);
    }
}
