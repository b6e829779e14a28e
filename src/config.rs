use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::nav::NavRules;
use crate::parser::sections::DEFAULT_MAX_DEPTH;

pub const DEFAULT_CONFIG: &str = "playbooks.toml";

/// One documentation corpus: a directory of markdown pages and its display title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Playbook {
    pub path: PathBuf,
    pub title: String,
}

impl Playbook {
    fn new(path: &str, title: &str) -> Self {
        Playbook {
            path: PathBuf::from(path),
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        EmbeddingSettings {
            base_url: "https://api.openai.com/v1".into(),
            model: "text-embedding-ada-002".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            concurrency: 8,
            max_retries: 3,
            base_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub max_section_depth: usize,
    /// Inline HTML elements converted to markdown before sanitizing.
    pub html_tags: Vec<String>,
    pub playbooks: Vec<Playbook>,
    pub nav: NavRules,
    pub embedding: EmbeddingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("results/sections.sqlite"),
            max_section_depth: DEFAULT_MAX_DEPTH,
            html_tags: ["html", "table", "ul", "ol", "p"].iter().map(|s| s.to_string()).collect(),
            playbooks: vec![
                Playbook::new("./content/advice-process-playbook", "Advice Process"),
                Playbook::new("./content/chaos-day-playbook", "Chaos Day"),
                Playbook::new("./content/digital-platform-playbook", "Digital Platform"),
                Playbook::new("./content/inception-playbook", "Inception"),
                Playbook::new("./content/remote-working-playbook", "Remote Working"),
                Playbook::new("./content/secure-delivery-playbook", "Secure Delivery"),
                Playbook::new(
                    "./content/you-build-it-you-run-it-playbook",
                    "You Build It, You Run It (YBIYRI)",
                ),
            ],
            nav: NavRules::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

/// Defaults, then the TOML file, then `PLAYBOOK_*` environment variables
/// (`__` separates nested keys, e.g. `PLAYBOOK_EMBEDDING__MODEL`).
///
/// An explicit `path` must exist; the default `playbooks.toml` is optional.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG).required(false),
    };
    let settings = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PLAYBOOK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize::<Settings>()
        .context("Invalid configuration")?;
    Ok(settings)
}
