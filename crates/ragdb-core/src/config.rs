//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__HYBRID_SEARCH_ENABLED`).
//! Typed sections are defaulted when missing so a bare checkout runs.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::language::LanguagePolicy;

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
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.retrieval()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// `[retrieval]` section, defaulted when absent and always validated.
    pub fn retrieval(&self) -> anyhow::Result<RetrievalSettings> {
        let settings: RetrievalSettings = self.section("retrieval")?;
        settings.validate()?;
        Ok(settings)
    }

    /// `[embedding]` section, defaulted when absent.
    pub fn embedding(&self) -> anyhow::Result<EmbeddingSettings> {
        self.section("embedding")
    }

    /// `[data]` section, defaulted when absent.
    pub fn data(&self) -> anyhow::Result<DataSettings> {
        self.section("data")
    }

    fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.figment.extract_inner::<T>(key) {
            Ok(v) => Ok(v),
            Err(e) if e.missing() => Ok(T::default()),
            Err(e) => Err(anyhow::anyhow!("Failed to get '{}': {}", key, e)),
        }
    }
}

/// Process-wide retrieval switches and sizing, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub hybrid_search_enabled: bool,
    pub two_tier_enabled: bool,
    pub rrf_k: u32,
    pub node_group_size: usize,
    pub node_text_max_chars: usize,
    pub coarse_top_k: usize,
    pub fine_top_k: usize,
    pub lexical_languages: Vec<String>,
    pub default_language: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            hybrid_search_enabled: false,
            two_tier_enabled: false,
            rrf_k: 60,
            node_group_size: 5,
            node_text_max_chars: 2000,
            coarse_top_k: 5,
            fine_top_k: 10,
            lexical_languages: vec!["english".into(), "german".into(), "french".into()],
            default_language: "english".into(),
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        let positive = [
            ("node_group_size", self.node_group_size),
            ("node_text_max_chars", self.node_text_max_chars),
            ("coarse_top_k", self.coarse_top_k),
            ("fine_top_k", self.fine_top_k),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        LanguagePolicy::from_settings(self)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub dimension: usize,
    pub max_tokens: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, dimension: 1024, max_tokens: 256, use_fake: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub lancedb_dir: String,
    pub tantivy_dir: String,
    pub chunks_table: String,
    pub nodes_table: String,
    pub workspaces_table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            lancedb_dir: "../dev_data/indexes/lancedb".into(),
            tantivy_dir: "../dev_data/indexes/tantivy".into(),
            chunks_table: "chunks".into(),
            nodes_table: "nodes".into(),
            workspaces_table: "workspaces".into(),
        }
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

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
