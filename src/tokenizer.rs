use anyhow::{anyhow, Result};
use tiktoken_rs::CoreBPE;

/// Counts language-model tokens. Injected wherever a token count is recorded.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// GPT-2 byte-pair encoding (`r50k_base`).
pub struct Gpt2Tokenizer {
    bpe: CoreBPE,
}

impl Gpt2Tokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::r50k_base().map_err(|e| anyhow!("Failed to load r50k_base: {}", e))?;
        Ok(Gpt2Tokenizer { bpe })
    }
}

impl Tokenizer for Gpt2Tokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[cfg(test)]
pub mod testing {
    use super::Tokenizer;

    /// Whitespace word count, good enough to check that counts are wired through.
    pub struct WordCount;

    impl Tokenizer for WordCount {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }
}
