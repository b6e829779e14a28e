use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

// Image on a line of its own: drop the whole line so no blank gap is left behind.
static IMAGE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*!\[[^\]]*\]\([^")\n]*(?:"[^\n]*")?\)[ \t]*\n"#).unwrap()
});
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"!\[[^\]]*\]\([^")\n]*(?:"[^\n]*")?\)"#).unwrap());
static COVER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^coverY?:[^\n]*\n?").unwrap());
// En/em dashes count too, otherwise "———" would turn into "---" after normalization.
static HYPHEN_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-\u{2013}\u{2014}]{3,}").unwrap());
static HINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{% ?hint[^\n]*\}\n?").unwrap());
static ENDHINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{% ?endhint ?%\}\n?").unwrap());
static TABS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{% ?tabs[^\n]*\}\n?").unwrap());
static ENDTAB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{% ?endtabs?[^\n]*%\}\n?").unwrap());
static TAB_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{% *tab *title *= *(?:["\u{201C}\u{201D}]([^"\u{201C}\u{201D}\n]*)["\u{201C}\u{201D}]|['\u{2018}\u{2019}]([^'\u{2018}\u{2019}\n]*)['\u{2018}\u{2019}]) *%\}"#).unwrap()
});
static EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{% *embed *url *= *(?:["\u{201C}\u{201D}]([^"\u{201C}\u{201D}\n]*)["\u{201C}\u{201D}]|['\u{2018}\u{2019}]([^'\u{2018}\u{2019}\n]*)['\u{2018}\u{2019}]) *%\}"#).unwrap()
});
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static INLINE_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\r\n]{2,}").unwrap());

const PUNCTUATION: &[(char, &str)] = &[
    ('\u{2013}', "-"),  // en dash
    ('\u{2014}', "-"),  // em dash
    ('\u{201D}', "\""), // right double quote
    ('\u{201C}', "\""), // left double quote
    ('\u{2019}', "'"),  // right single quote
    ('\u{2018}', "'"),  // left single quote
];

/// Strip markup noise from a playbook page before it is split into sections.
///
/// Passes run in a fixed order; each one assumes the previous ones already ran.
/// Directives that do not match their pattern exactly are left untouched.
/// Non-ASCII characters that survive are reported through `tracing`, not removed,
/// tagged with `source` when given.
pub fn sanitize(text: &str, source: Option<&str>) -> String {
    let text = IMAGE_LINE_RE.replace_all(text, "");
    let text = IMAGE_RE.replace_all(&text, "");
    let text = COVER_RE.replace_all(&text, "");
    let text = HYPHEN_RUN_RE.replace_all(&text, "");

    let text = HINT_RE.replace_all(&text, "");
    let text = ENDHINT_RE.replace_all(&text, "");
    let text = TABS_RE.replace_all(&text, "");
    let text = ENDTAB_RE.replace_all(&text, "");
    let text = TAB_TITLE_RE.replace_all(&text, |caps: &Captures| format!("## {}\n", quoted(caps)));
    let text = EMBED_RE.replace_all(&text, |caps: &Captures| format!("* {}", quoted(caps)));

    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = INLINE_SPACE_RE.replace_all(&text, " ");

    let text = normalize_punctuation(&text);
    report_non_ascii(&text, source);
    text
}

/// Whichever quote style matched: group 1 is double-quoted, group 2 single-quoted.
/// Curly quotes count, since punctuation normalization would straighten them later.
fn quoted<'a>(caps: &'a Captures) -> &'a str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or("")
}

fn normalize_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match PUNCTUATION.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

/// Count every distinct non-ASCII character left in `text`.
pub fn non_ascii_chars(text: &str) -> BTreeMap<char, usize> {
    let mut seen = BTreeMap::new();
    for c in text.chars().filter(|c| !c.is_ascii()) {
        *seen.entry(c).or_insert(0) += 1;
    }
    seen
}

fn report_non_ascii(text: &str, source: Option<&str>) {
    for (c, count) in non_ascii_chars(text) {
        warn!(
            source = source.unwrap_or("-"),
            character = %c,
            escaped = %c.escape_unicode(),
            count,
            "Non-ASCII character in input text"
        );
    }
}

// ── Tests ──
