use serde::{Deserialize, Serialize};

const MAX_SLUG_LEN: usize = 100;

/// Navigation metadata for one section, derived from its file and heading path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavInfo {
    pub playbook_url: String,
    pub path_depth: usize,
    pub page_title: String,
    pub sub_titles: Vec<String>,
    pub anchor_slug: String,
    pub section_path: Vec<String>,
}

/// A first-occurrence substring substitution applied to the source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRewrite {
    pub from: String,
    pub to: String,
}

/// How local file paths map to the published site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavRules {
    /// Applied in order, each replacing its first match only.
    pub url_rewrites: Vec<UrlRewrite>,
    /// The first suffix the URL ends with is removed.
    pub strip_suffixes: Vec<String>,
    /// Separators in the path of a file sitting directly in a corpus root.
    pub corpus_root_offset: usize,
}

impl Default for NavRules {
    fn default() -> Self {
        NavRules {
            url_rewrites: vec![
                UrlRewrite {
                    from: "./content/".into(),
                    to: "https://".into(),
                },
                UrlRewrite {
                    from: "-playbook/".into(),
                    to: ".playbook.ee/".into(),
                },
            ],
            strip_suffixes: vec!["README.md".into(), "SUMMARY.md".into(), ".md".into()],
            corpus_root_offset: 3,
        }
    }
}

impl NavRules {
    pub fn resolve(&self, source_path: &str, section_path: &[String]) -> NavInfo {
        let path_depth = source_path.matches('/').count().saturating_sub(self.corpus_root_offset);

        let page_title = section_path.first().cloned().unwrap_or_default();
        let sub_titles: Vec<String> = section_path
            .iter()
            .skip(1)
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();

        let anchor_slug = match section_path {
            [_, .., last] => format!("#{}", truncate_chars(&slugify(last), MAX_SLUG_LEN)),
            _ => String::new(),
        };

        NavInfo {
            playbook_url: self.playbook_url(source_path),
            path_depth,
            page_title,
            sub_titles,
            anchor_slug,
            section_path: section_path.to_vec(),
        }
    }

    fn playbook_url(&self, source_path: &str) -> String {
        let mut url = source_path.to_string();
        for rw in &self.url_rewrites {
            url = url.replacen(&rw.from, &rw.to, 1);
        }
        if let Some(suffix) = self.strip_suffixes.iter().find(|s| url.ends_with(s.as_str())) {
            url.truncate(url.len() - suffix.len());
        }
        url
    }
}

/// URL-fragment slug: `&` becomes `and`, letters are transliterated to ASCII,
/// then lowercase alphanumerics are joined by single hyphens.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(&text.replace('&', "and"));
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_sep = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn readme_page() {
        let nav = NavRules::default().resolve("./content/foo-playbook/bar/README.md", &path(&["Bar"]));
        assert_eq!(nav.anchor_slug, "");
        assert_eq!(nav.playbook_url, "https://foo.playbook.ee/bar/");
        assert_eq!(nav.path_depth, 1);
        assert_eq!(nav.page_title, "Bar");
        assert!(nav.sub_titles.is_empty());
        assert_eq!(nav.section_path, vec!["Bar"]);
    }

    #[test]
    fn nested_page_with_anchor() {
        let nav = NavRules::default().resolve(
            "./content/chaos-day-playbook/planning/run-the-day.md",
            &path(&["Planning", "", "Roles & Responsibilities"]),
        );
        assert_eq!(nav.playbook_url, "https://chaos-day.playbook.ee/planning/run-the-day");
        assert_eq!(nav.page_title, "Planning");
        assert_eq!(nav.sub_titles, vec!["Roles & Responsibilities"]);
        assert_eq!(nav.anchor_slug, "#roles-and-responsibilities");
        assert_eq!(nav.path_depth, 1);
    }

    #[test]
    fn summary_page_links_to_folder() {
        let nav = NavRules::default().resolve("./content/inception-playbook/SUMMARY.md", &path(&["Table of contents"]));
        assert_eq!(nav.playbook_url, "https://inception.playbook.ee/");
        assert_eq!(nav.path_depth, 0);
    }

    #[test]
    fn only_trailing_suffix_stripped() {
        let nav = NavRules::default().resolve("./content/x-playbook/README.md.notes/page.md", &path(&["P"]));
        assert_eq!(nav.playbook_url, "https://x.playbook.ee/README.md.notes/page");
    }

    #[test]
    fn custom_rules() {
        let rules = NavRules {
            url_rewrites: vec![UrlRewrite {
                from: "docs/".into(),
                to: "https://docs.example.com/".into(),
            }],
            strip_suffixes: vec!["index.md".into(), ".md".into()],
            corpus_root_offset: 1,
        };
        let nav = rules.resolve("docs/guide/index.md", &path(&["Guide", "Intro"]));
        assert_eq!(nav.playbook_url, "https://docs.example.com/guide/");
        assert_eq!(nav.path_depth, 1);
        assert_eq!(nav.anchor_slug, "#intro");
    }

    #[test]
    fn depth_never_negative() {
        let nav = NavRules::default().resolve("page.md", &path(&["P"]));
        assert_eq!(nav.path_depth, 0);
    }

    #[test]
    fn empty_section_path() {
        let nav = NavRules::default().resolve("./content/a-playbook/x.md", &[]);
        assert_eq!(nav.page_title, "");
        assert_eq!(nav.anchor_slug, "");
    }

    #[test]
    fn anchor_truncated() {
        let long = "word ".repeat(40);
        let nav = NavRules::default().resolve("./content/a-playbook/x.md", &path(&["P", &long]));
        assert_eq!(nav.anchor_slug.len(), 101);
        assert!(nav.anchor_slug.starts_with("#word-word"));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Q&A  "), "qanda");
        assert_eq!(slugify("Don't panic"), "don-t-panic");
        assert_eq!(slugify("Caf\u{e9} culture"), "cafe-culture");
        assert_eq!(slugify("Stra\u{df}e \u{2014} \u{dc}bersicht"), "strasse-ubersicht");
        assert_eq!(slugify("What is YBIYRI?"), "what-is-ybiyri");
        assert_eq!(slugify("---"), "");
    }
}
