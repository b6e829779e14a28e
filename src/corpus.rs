use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Playbook;
use crate::db::SectionRecord;
use crate::parser::nav::{NavInfo, NavRules};
use crate::parser::sections;
use crate::parser::Pipeline;

const README: &str = "README.md";

/// A markdown file queued for extraction, with the path prefix its sections inherit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub seed: Vec<String>,
}

/// Walk one playbook directory and flatten every page into section records.
///
/// Any I/O error aborts the whole playbook: a partial corpus is never returned.
pub fn process_playbook(playbook: &Playbook, pipeline: &Pipeline, nav: &NavRules) -> Result<Vec<SectionRecord>> {
    let files = discover(&playbook.path)?;
    info!(playbook = %playbook.title, files = files.len(), "Extracting sections");

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(playbook.title.clone());

    let per_file = files
        .par_iter()
        .map(|file| {
            let records = process_file(file, playbook, pipeline, nav);
            pb.inc(1);
            records
        })
        .collect::<Result<Vec<_>>>()?;

    pb.finish_and_clear();
    let records: Vec<SectionRecord> = per_file.into_iter().flatten().collect();
    info!(playbook = %playbook.title, sections = records.len(), "Playbook done");
    Ok(records)
}

/// List every `*.md` file under `root` in file-name order, with its section path seed.
///
/// Pages below the root that are not a `README.md` start their section path with
/// the enclosing folder's title, taken from the folder's own `README.md`.
pub fn discover(root: &Path) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        bail!("Playbook directory not found: {:?}", root);
    }

    let mut folder_titles: HashMap<PathBuf, String> = HashMap::new();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            let title = folder_title(path)?;
            debug!(dir = ?path, title = %title, "Folder title");
            folder_titles.insert(path.to_path_buf(), title);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        let is_readme = entry.file_name() == README;
        let nested = entry.depth() > 1;
        let seed = if nested && !is_readme {
            let title = path
                .parent()
                .and_then(|dir| folder_titles.get(dir))
                .cloned()
                .unwrap_or_default();
            vec![title]
        } else {
            Vec::new()
        };

        files.push(SourceFile {
            path: path.to_path_buf(),
            seed,
        });
    }

    Ok(files)
}

fn folder_title(dir: &Path) -> Result<String> {
    let readme = dir.join(README);
    if !readme.is_file() {
        return Ok(String::new());
    }
    let content = std::fs::read_to_string(&readme).with_context(|| format!("Failed to read {:?}", readme))?;
    Ok(sections::first_title(&content, 1).unwrap_or_default())
}

fn process_file(file: &SourceFile, playbook: &Playbook, pipeline: &Pipeline, nav: &NavRules) -> Result<Vec<SectionRecord>> {
    let markdown = std::fs::read_to_string(&file.path).with_context(|| format!("Failed to read {:?}", file.path))?;
    let source_path = file.path.to_string_lossy().to_string();

    let records = pipeline
        .sections(&markdown, &source_path, &file.seed)
        .into_iter()
        .map(|s| {
            let nav_info = nav.resolve(&source_path, &s.section_path);
            SectionRecord {
                playbook_title: playbook.title.clone(),
                full_title: full_title(&playbook.title, &nav_info),
                source_path: source_path.clone(),
                level: s.level,
                nav_info,
                content_length: s.content_length,
                token_count: s.token_count,
                content: s.content,
            }
        })
        .collect();
    Ok(records)
}

/// "<Playbook> Playbook: <sub> - <sub>"; the page title itself is left out.
pub fn full_title(playbook_title: &str, nav: &NavInfo) -> String {
    if nav.sub_titles.is_empty() {
        format!("{} Playbook", playbook_title)
    } else {
        format!("{} Playbook: {}", playbook_title, nav.sub_titles.join(" - "))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sections::DEFAULT_MAX_DEPTH;
    use crate::tokenizer::testing::WordCount;

    const DEMO: &str = "tests/fixtures/corpus/demo-playbook";

    fn demo() -> Playbook {
        Playbook {
            path: PathBuf::from(DEMO),
            title: "Demo".into(),
        }
    }

    fn run(playbook: &Playbook) -> Result<Vec<SectionRecord>> {
        let tags = vec!["p".to_string()];
        let pipeline = Pipeline {
            html_tags: &tags,
            max_depth: DEFAULT_MAX_DEPTH,
            tokenizer: &WordCount,
        };
        process_playbook(playbook, &pipeline, &NavRules::default())
    }

    fn file_name(f: &SourceFile) -> String {
        f.path.strip_prefix(DEMO).unwrap().to_string_lossy().replace('\\', "/")
    }

    #[test]
    fn discovery_order_and_seeds() {
        let files = discover(Path::new(DEMO)).unwrap();
        let names: Vec<_> = files.iter().map(file_name).collect();
        assert_eq!(
            names,
            vec![
                "README.md",
                "SUMMARY.md",
                "empty-folder/notes.md",
                "getting-started.md",
                "guide/README.md",
                "guide/practices.md",
            ]
        );
        assert!(files[0].seed.is_empty());
        assert_eq!(files[2].seed, vec![""]);
        assert!(files[3].seed.is_empty());
        // a folder's own README is not prefixed with the folder title
        assert!(files[4].seed.is_empty());
        assert_eq!(files[5].seed, vec!["Guide"]);
    }

    #[test]
    fn records_are_stamped() {
        let records = run(&demo()).unwrap();
        assert!(!records.is_empty());
        for r in &records {
            assert_eq!(r.playbook_title, "Demo");
            assert!(r.source_path.starts_with(DEMO));
            assert!(!r.content.is_empty());
            assert_eq!(r.content_length, r.content.chars().count());
            // nested non-README pages carry a one-entry folder seed
            let seeded = r.source_path.ends_with("notes.md") || r.source_path.ends_with("practices.md");
            assert_eq!(r.nav_info.section_path.len(), r.level + usize::from(seeded));
        }
    }

    #[test]
    fn nested_page_inherits_folder_title() {
        let records = run(&demo()).unwrap();
        let planning = records
            .iter()
            .find(|r| r.nav_info.section_path.last().map(String::as_str) == Some("Planning"))
            .unwrap();
        assert_eq!(planning.level, 2);
        assert_eq!(planning.nav_info.section_path, vec!["Guide", "Practices", "Planning"]);
        assert_eq!(planning.nav_info.page_title, "Guide");
        assert_eq!(planning.full_title, "Demo Playbook: Practices - Planning");
        assert_eq!(planning.nav_info.anchor_slug, "#planning");
    }

    #[test]
    fn root_readme_is_the_page_title() {
        let records = run(&demo()).unwrap();
        assert_eq!(records[0].nav_info.section_path, vec!["Demo Playbook"]);
        assert_eq!(records[0].full_title, "Demo Playbook");
        assert_eq!(records[0].nav_info.anchor_slug, "");
        assert_eq!(records[1].full_title, "Demo Playbook: Who is it for");
    }

    #[test]
    fn parents_precede_children_in_file_order() {
        let records = run(&demo()).unwrap();
        let practices: Vec<_> = records
            .iter()
            .filter(|r| r.source_path.ends_with("practices.md"))
            .map(|r| r.nav_info.section_path.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(
            practices,
            vec!["", "Practices", "Planning", "Backlog", "Refinement", "Release trains", "Review"]
        );
    }

    #[test]
    fn missing_root_is_fatal() {
        let playbook = Playbook {
            path: PathBuf::from("tests/fixtures/corpus/nope-playbook"),
            title: "Nope".into(),
        };
        let err = run(&playbook).unwrap_err();
        assert!(err.to_string().contains("nope-playbook"));
    }

    #[test]
    fn temp_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tmp-playbook");
        std::fs::create_dir_all(root.join("team")).unwrap();
        std::fs::write(root.join("team/README.md"), "# Team\n").unwrap();
        std::fs::write(root.join("team/roles.md"), "Roles differ.\n\n## Lead\nLeads lead.\n").unwrap();
        std::fs::write(root.join("notes.txt"), "# Ignored\nnot markdown\n").unwrap();

        let playbook = Playbook {
            path: root,
            title: "Tmp".into(),
        };
        let records = run(&playbook).unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.nav_info.section_path.clone()).collect();
        assert_eq!(paths, vec![vec!["Team", ""], vec!["Team", "", "Lead"]]);
        assert_eq!(records[1].full_title, "Tmp Playbook: Lead");
    }
}
