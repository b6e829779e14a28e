use regex::Regex;
use tracing::warn;

/// Replace every `<tag ...>...</tag>` fragment with its markdown rendering.
///
/// Fragments are matched lazily, so nested tags of the same name close at the
/// first end tag. A fragment the converter rejects is left as it was.
pub fn convert_html_tags(content: &str, tags: &[String]) -> String {
    let mut out = content.to_string();
    for tag in tags {
        let Ok(re) = Regex::new(&format!(r"(?s)<{0}(?:\s[^>]*)?>.*?</{0}>", regex::escape(tag))) else {
            warn!(tag = %tag, "Skipping unusable HTML tag name");
            continue;
        };
        out = re
            .replace_all(&out, |caps: &regex::Captures| {
                let fragment = &caps[0];
                match htmd::convert(fragment) {
                    Ok(md) => md,
                    Err(e) => {
                        warn!(tag = %tag, error = %e, "HTML conversion failed, keeping fragment");
                        fragment.to_string()
                    }
                }
            })
            .into_owned();
    }
    out
}
