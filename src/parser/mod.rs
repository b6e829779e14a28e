pub mod html;
pub mod nav;
pub mod sanitize;
pub mod sections;

use crate::tokenizer::Tokenizer;
use sections::{Section, SectionExtractor};

/// Per-page text passes shared by every file of a corpus.
pub struct Pipeline<'a> {
    pub html_tags: &'a [String],
    pub max_depth: usize,
    pub tokenizer: &'a dyn Tokenizer,
}

impl Pipeline<'_> {
    /// Inline HTML → markdown, then sanitize.
    pub fn clean(&self, markdown: &str, source: &str) -> String {
        let converted = html::convert_html_tags(markdown, self.html_tags);
        sanitize::sanitize(&converted, Some(source))
    }

    /// Three-pass pipeline: html → sanitized markdown → flat sections.
    pub fn sections(&self, markdown: &str, source: &str, seed: &[String]) -> Vec<Section> {
        self.sections_at(markdown, source, seed, 1)
    }

    pub fn sections_at(&self, markdown: &str, source: &str, seed: &[String], level: usize) -> Vec<Section> {
        let clean = self.clean(markdown, source);
        SectionExtractor::new(self.max_depth, self.tokenizer).extract(&clean, level, seed)
    }
}
