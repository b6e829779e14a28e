use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::EmbeddingSettings;
use crate::db::{self, EmbeddingRow, PendingEmbedding};
use crate::tokenizer::Tokenizer;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("{0} environment variable must be set")]
    MissingApiKey(String),
}

impl EmbedError {
    /// Rate limits, 5xx and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::RateLimited(_) | EmbedError::Server { .. } | EmbedError::Transport(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Turns a section into a vector. Retries are the caller's business.
pub trait EmbeddingProvider: Send + Sync + 'static {
    fn model(&self) -> &str;

    fn embed(&self, title: &str, content: &str) -> impl Future<Output = Result<Embedding, EmbedError>> + Send;
}

/// Text actually sent to the model: title line, then the section body.
pub fn embedding_input(title: &str, content: &str) -> String {
    format!("{}\n{}", title, content)
}

// ── OpenAI-compatible provider ──

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    tokenizer: Arc<dyn Tokenizer>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: usize,
}

impl OpenAiEmbedder {
    /// `tokenizer` fills in the token count when the server reports no usage.
    pub fn from_settings(settings: &EmbeddingSettings, tokenizer: Arc<dyn Tokenizer>) -> Result<Self, EmbedError> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| EmbedError::MissingApiKey(settings.api_key_env.clone()))?;
        Ok(OpenAiEmbedder {
            client: reqwest::Client::new(),
            url: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            tokenizer,
        })
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, title: &str, content: &str) -> Result<Embedding, EmbedError> {
        let input = embedding_input(title, content);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": input }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(match status.as_u16() {
                429 => EmbedError::RateLimited(body),
                code if status.is_server_error() => EmbedError::Server { status: code, body },
                code => EmbedError::Rejected { status: code, body },
            });
        }

        let (vector, usage) = parse_response(&body)?;
        let token_count = usage.unwrap_or_else(|| self.tokenizer.count_tokens(&input));
        Ok(Embedding { vector, token_count })
    }
}

fn parse_response(body: &str) -> Result<(Vec<f32>, Option<usize>), EmbedError> {
    let parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| EmbedError::Malformed(e.to_string()))?;
    let vector = parsed
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbedError::Malformed("no embedding in response".into()))?;
    Ok((vector, parsed.usage.map(|u| u.prompt_tokens)))
}

// ── Embedding stage ──

#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl From<&EmbeddingSettings> for EmbedOptions {
    fn from(s: &EmbeddingSettings) -> Self {
        EmbedOptions {
            concurrency: s.concurrency.max(1),
            max_retries: s.max_retries,
            base_backoff: Duration::from_millis(s.base_backoff_ms),
        }
    }
}

/// Embed stats returned after completion.
pub struct EmbedStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Embed pending sections concurrently, saving each result to DB as it arrives.
pub async fn embed_sections<P: EmbeddingProvider>(
    conn: &Connection,
    provider: Arc<P>,
    rows: Vec<PendingEmbedding>,
    opts: &EmbedOptions,
) -> Result<EmbedStats> {
    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let total = rows.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, this task owns the connection and saves them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(i64, Result<Embedding, EmbedError>)>(opts.concurrency.max(1) * 2);

    for row in rows {
        let provider = Arc::clone(&provider);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let opts = opts.clone();

        tokio::spawn(async move {
            let result = match sem.acquire().await {
                Ok(_permit) => embed_with_retry(provider.as_ref(), &row, &opts).await,
                Err(_) => return,
            };
            let _ = tx.send((row.id, result)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    let mut stmt = conn.prepare(db::UPDATE_EMBEDDING_SQL)?;

    while let Some((id, result)) = rx.recv().await {
        match result {
            Ok(embedding) => {
                db::save_embedding(
                    &mut stmt,
                    &EmbeddingRow {
                        id,
                        vector: embedding.vector,
                        token_count: embedding.token_count,
                        model: provider.model().to_string(),
                    },
                )?;
                ok += 1;
            }
            Err(e) => {
                warn!(section = id, error = %e, "Embedding failed");
                errors += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Embedded {} sections ({} ok, {} errors)", total, ok, errors);

    Ok(EmbedStats { total, ok, errors })
}

async fn embed_with_retry<P: EmbeddingProvider>(
    provider: &P,
    row: &PendingEmbedding,
    opts: &EmbedOptions,
) -> Result<Embedding, EmbedError> {
    let mut attempt = 0;
    loop {
        match provider.embed(&row.full_title, &row.content).await {
            Err(e) if e.is_retryable() && attempt < opts.max_retries => {
                let backoff = backoff_delay(opts.base_backoff, attempt);
                warn!(
                    "Embedding section {} failed (attempt {}/{}): {}, backing off {:.1}s",
                    row.id,
                    attempt + 1,
                    opts.max_retries,
                    e,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing on large retry counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

// ── Tests ──
