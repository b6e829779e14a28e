use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::tokenizer::Tokenizer;

pub const DEFAULT_MAX_DEPTH: usize = 4;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#+) (.*)$").unwrap());

/// One titled (or placeholder-titled) span of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: usize,
    /// One entry per heading level; `""` where the source skipped a level.
    pub section_path: Vec<String>,
    pub content: String,
    pub content_length: usize,
    pub token_count: usize,
}

#[derive(Debug)]
struct Heading<'a> {
    depth: usize,
    title: Option<String>,
    line: &'a str,
}

/// A heading line plus every line up to the next splitting heading.
/// The first block of a document may have no heading.
#[derive(Debug)]
struct Block<'a> {
    heading: Option<Heading<'a>>,
    lines: Vec<&'a str>,
}

impl Block<'_> {
    fn depth(&self) -> Option<usize> {
        self.heading.as_ref().map(|h| h.depth)
    }

    fn body(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// Recursive splitter that flattens a markdown page into [`Section`]s.
pub struct SectionExtractor<'t> {
    max_depth: usize,
    tokenizer: &'t dyn Tokenizer,
}

impl<'t> SectionExtractor<'t> {
    pub fn new(max_depth: usize, tokenizer: &'t dyn Tokenizer) -> Self {
        SectionExtractor {
            max_depth: max_depth.max(1),
            tokenizer,
        }
    }

    /// Split `content` at heading depth `level` and below, prefixing every path with `path`.
    ///
    /// Output is in document order, each section followed by its subsections.
    /// Sections with an empty body are skipped but their subsections are not.
    /// Headings deeper than the maximum depth stay inside the body text, as do
    /// headings inside fenced code blocks.
    pub fn extract(&self, content: &str, level: usize, path: &[String]) -> Vec<Section> {
        let level = level.max(1);
        let blocks = demote_shallow(split_blocks(content, self.max_depth), level);
        let mut out = Vec::new();
        self.descend(&blocks, level, path, &mut out);
        out
    }

    fn descend(&self, blocks: &[Block], level: usize, path: &[String], out: &mut Vec<Section>) {
        let mut i = 0;
        while i < blocks.len() {
            let block = &blocks[i];
            match block.depth() {
                // Text with no heading of its own: an unnamed section at this level.
                None => {
                    self.push(level, placeholder_path(path), block.body(), out);
                    i += 1;
                }
                Some(depth) if depth == level => {
                    let end = span_end(blocks, i + 1, level);
                    let mut current = path.to_vec();
                    match block.heading.as_ref().and_then(|h| h.title.as_deref()) {
                        Some(title) => current.push(title.to_string()),
                        None => warn!(depth = level, path = ?path, "Heading has no title, section path not extended"),
                    }
                    self.push(level, current.clone(), block.body(), out);
                    self.descend(&blocks[i + 1..end], level + 1, &current, out);
                    i = end;
                }
                // Deeper headings before any heading at this level: a level was skipped.
                Some(_) => {
                    let end = span_end(blocks, i + 1, level);
                    self.descend(&blocks[i..end], level + 1, &placeholder_path(path), out);
                    i = end;
                }
            }
        }
    }

    fn push(&self, level: usize, section_path: Vec<String>, content: String, out: &mut Vec<Section>) {
        if content.is_empty() {
            return;
        }
        out.push(Section {
            level,
            section_path,
            content_length: content.chars().count(),
            token_count: self.tokenizer.count_tokens(&content),
            content,
        });
    }
}

fn placeholder_path(path: &[String]) -> Vec<String> {
    let mut p = path.to_vec();
    p.push(String::new());
    p
}

/// Index of the first block at or after `from` that closes a span opened at `level`:
/// a sibling, an ancestor, or headingless text.
fn span_end(blocks: &[Block], from: usize, level: usize) -> usize {
    blocks[from..]
        .iter()
        .position(|b| b.depth().map_or(true, |d| d <= level))
        .map_or(blocks.len(), |p| from + p)
}

fn split_blocks(content: &str, max_depth: usize) -> Vec<Block<'_>> {
    let mut blocks = vec![Block {
        heading: None,
        lines: Vec::new(),
    }];
    let mut fence: Option<&'static str> = None;

    for line in content.lines() {
        if let Some(marker) = fence_marker(line) {
            match fence {
                Some(open) if open == marker => fence = None,
                None => fence = Some(marker),
                Some(_) => {}
            }
        } else if fence.is_none() {
            if let Some(heading) = parse_heading(line, max_depth) {
                blocks.push(Block {
                    heading: Some(heading),
                    lines: Vec::new(),
                });
                continue;
            }
        }
        if let Some(block) = blocks.last_mut() {
            block.lines.push(line);
        }
    }

    blocks
}

/// Headings above the starting level only close spans; their text becomes plain content.
fn demote_shallow(blocks: Vec<Block<'_>>, level: usize) -> Vec<Block<'_>> {
    blocks
        .into_iter()
        .map(|block| match block.heading {
            Some(h) if h.depth < level => {
                let mut lines = Vec::with_capacity(block.lines.len() + 1);
                lines.push(h.line);
                lines.extend(block.lines);
                Block { heading: None, lines }
            }
            _ => block,
        })
        .collect()
}

fn parse_heading(line: &str, max_depth: usize) -> Option<Heading<'_>> {
    let caps = HEADING_RE.captures(line)?;
    let depth = caps[1].len();
    if depth > max_depth {
        return None;
    }
    let title = caps[2].trim();
    Some(Heading {
        depth,
        title: (!title.is_empty()).then(|| title.to_string()),
        line,
    })
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let l = line.trim_start();
    if l.starts_with("```") {
        Some("```")
    } else if l.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// First level-`level` heading title in `content`, if any. Fenced code is skipped.
pub fn first_title(content: &str, level: usize) -> Option<String> {
    split_blocks(content, level)
        .into_iter()
        .filter_map(|b| b.heading)
        .find(|h| h.depth == level)
        .and_then(|h| h.title)
}

// ── Tests ──
