use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("IRAG_"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Retrieval knobs under the `retrieval.*` key, falling back to defaults
    /// when the section is absent.
    pub fn retrieval(&self) -> anyhow::Result<RetrievalConfig> {
        let cfg: RetrievalConfig = self
            .figment
            .extract_inner("retrieval")
            .unwrap_or_default();
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Tunable knobs of the fusion and ranking core.
///
/// - `weight_text` / `weight_table`: per-channel reciprocal-rank weights
/// - `gamma`: cross-encoder share of the final blended relevance, in `[0, 1]`
/// - `candidate_multiplier`: how many candidates (x `top_k`) to pull per
///   channel and to keep for re-ranking; the only lever bounding rerank cost
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub weight_text: f32,
    pub weight_table: f32,
    pub gamma: f32,
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { weight_text: 1.0, weight_table: 1.0, gamma: 0.7, candidate_multiplier: 3 }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(Error::InvalidConfig(format!("gamma must be in [0,1], got {}", self.gamma)));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("candidate_multiplier must be >= 1".to_string()));
        }
        if self.weight_text < 0.0 || self.weight_table < 0.0 {
            return Err(Error::InvalidConfig("channel weights must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
