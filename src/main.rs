mod config;
mod corpus;
mod db;
mod embed;
mod parser;
mod tokenizer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Settings;
use crate::parser::nav::NavInfo;
use crate::parser::Pipeline;
use crate::tokenizer::{Gpt2Tokenizer, Tokenizer};

#[derive(Parser)]
#[command(name = "playbook_sections", about = "Split markdown playbooks into titled, navigable sections")]
struct Cli {
    /// Config file (default: ./playbooks.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk every configured playbook and rebuild the sections table
    Extract,
    /// Embed sections that have no embedding yet
    Embed {
        /// Max sections to embed (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print the sections of a single markdown file as JSON
    Inspect {
        file: PathBuf,
        /// Heading level the page starts at
        #[arg(short, long, default_value = "1")]
        level: usize,
        /// Only print the sanitized markdown
        #[arg(long)]
        sanitize_only: bool,
    },
    /// Show section table statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Extract => {
            let tokenizer = Gpt2Tokenizer::new()?;
            let pipeline = Pipeline {
                html_tags: &settings.html_tags,
                max_depth: settings.max_section_depth,
                tokenizer: &tokenizer,
            };

            let mut records = Vec::new();
            for playbook in &settings.playbooks {
                let rows = corpus::process_playbook(playbook, &pipeline, &settings.nav)
                    .with_context(|| format!("Failed to extract {} playbook", playbook.title))?;
                println!("{:<40} {:>6} sections", playbook.title, rows.len());
                records.extend(rows);
            }

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let saved = db::replace_sections(&conn, &records)?;
            println!("Saved {} sections to {:?}", saved, settings.db_path);
            Ok(())
        }
        Commands::Embed { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pending = db::fetch_unembedded(&conn, limit)?;
            if pending.is_empty() {
                println!("No sections without embeddings. Run 'extract' first or all are embedded.");
                return Ok(());
            }

            let tokenizer: Arc<dyn Tokenizer> = Arc::new(Gpt2Tokenizer::new()?);
            let provider = Arc::new(embed::OpenAiEmbedder::from_settings(&settings.embedding, tokenizer)?);
            println!(
                "Embedding {} sections with {} (streaming to DB)...",
                pending.len(),
                settings.embedding.model
            );
            let opts = embed::EmbedOptions::from(&settings.embedding);
            let stats = embed::embed_sections(&conn, provider, pending, &opts).await?;
            println!(
                "Done: {} embedded ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Inspect {
            file,
            level,
            sanitize_only,
        } => inspect(&settings, &file, level, sanitize_only),
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Sections: {}", s.sections);
            println!("Embedded: {}", s.embedded);
            println!("Files:    {}", s.files);
            if !s.playbooks.is_empty() {
                println!();
                println!("{:<40} | {:>8} | {:>9}", "Playbook", "Sections", "Tokens");
                println!("{}", "-".repeat(63));
                for p in &s.playbooks {
                    println!("{:<40} | {:>8} | {:>9}", truncate(&p.title, 40), p.sections, p.tokens);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectedSection {
    full_title: String,
    level: usize,
    nav_info: NavInfo,
    content_length: usize,
    token_count: usize,
    content: String,
}

fn inspect(settings: &Settings, file: &Path, level: usize, sanitize_only: bool) -> anyhow::Result<()> {
    let markdown = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let source = file.to_string_lossy().to_string();
    let tokenizer = Gpt2Tokenizer::new()?;
    let pipeline = Pipeline {
        html_tags: &settings.html_tags,
        max_depth: settings.max_section_depth,
        tokenizer: &tokenizer,
    };

    if sanitize_only {
        println!("{}", pipeline.clean(&markdown, &source));
        return Ok(());
    }

    let playbook_title = settings
        .playbooks
        .iter()
        .find(|p| file.starts_with(&p.path))
        .map(|p| p.title.clone())
        .unwrap_or_else(|| {
            file.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

    let sections: Vec<InspectedSection> = pipeline
        .sections_at(&markdown, &source, &[], level.max(1))
        .into_iter()
        .map(|s| {
            let nav_info = settings.nav.resolve(&source, &s.section_path);
            InspectedSection {
                full_title: corpus::full_title(&playbook_title, &nav_info),
                level: s.level,
                nav_info,
                content_length: s.content_length,
                token_count: s.token_count,
                content: s.content,
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&sections)?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
