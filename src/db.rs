use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::nav::NavInfo;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sections (
            id               INTEGER PRIMARY KEY,
            playbook_title   TEXT NOT NULL,
            full_title       TEXT NOT NULL,
            source_path      TEXT NOT NULL,
            level            INTEGER NOT NULL,
            nav_info         TEXT NOT NULL,
            section_path     TEXT NOT NULL,
            content_length   INTEGER NOT NULL,
            token_count      INTEGER NOT NULL,
            content          TEXT NOT NULL,
            embedding        TEXT,
            embedding_tokens INTEGER,
            embedding_model  TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sections_playbook ON sections(playbook_title);
        CREATE INDEX IF NOT EXISTS idx_sections_source ON sections(source_path);
        ",
    )?;
    Ok(())
}

// ── Sections ──

/// One row of the output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    pub playbook_title: String,
    pub full_title: String,
    pub source_path: String,
    pub level: usize,
    pub nav_info: NavInfo,
    pub content_length: usize,
    pub token_count: usize,
    pub content: String,
}

/// Full rebuild: every existing row (and embedding) is dropped.
pub fn replace_sections(conn: &Connection, rows: &[SectionRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM sections", [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO sections
             (playbook_title, full_title, source_path, level, nav_info, section_path,
              content_length, token_count, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.playbook_title,
                r.full_title,
                r.source_path,
                r.level,
                serde_json::to_string(&r.nav_info)?,
                serde_json::to_string(&r.nav_info.section_path)?,
                r.content_length,
                r.token_count,
                r.content,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Embeddings ──

pub struct PendingEmbedding {
    pub id: i64,
    pub full_title: String,
    pub content: String,
}

pub fn fetch_unembedded(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingEmbedding>> {
    let sql = format!(
        "SELECT id, full_title, content FROM sections WHERE embedding IS NULL ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingEmbedding {
                id: row.get(0)?,
                full_title: row.get(1)?,
                content: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct EmbeddingRow {
    pub id: i64,
    pub vector: Vec<f32>,
    pub token_count: usize,
    pub model: String,
}

pub const UPDATE_EMBEDDING_SQL: &str =
    "UPDATE sections SET embedding = ?2, embedding_tokens = ?3, embedding_model = ?4 WHERE id = ?1";

/// Save a single embedding using a statement prepared from [`UPDATE_EMBEDDING_SQL`].
pub fn save_embedding(stmt: &mut rusqlite::Statement, row: &EmbeddingRow) -> Result<()> {
    stmt.execute(rusqlite::params![
        row.id,
        serde_json::to_string(&row.vector)?,
        row.token_count,
        row.model,
    ])?;
    Ok(())
}

// ── Stats ──

pub struct PlaybookStats {
    pub title: String,
    pub sections: usize,
    pub tokens: usize,
}

pub struct Stats {
    pub sections: usize,
    pub embedded: usize,
    pub files: usize,
    pub playbooks: Vec<PlaybookStats>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let sections: usize = conn.query_row("SELECT COUNT(*) FROM sections", [], |r| r.get(0))?;
    let embedded: usize = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let files: usize =
        conn.query_row("SELECT COUNT(DISTINCT source_path) FROM sections", [], |r| r.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT playbook_title, COUNT(*), COALESCE(SUM(token_count), 0)
         FROM sections GROUP BY playbook_title ORDER BY playbook_title",
    )?;
    let playbooks = stmt
        .query_map([], |row| {
            Ok(PlaybookStats {
                title: row.get(0)?,
                sections: row.get(1)?,
                tokens: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        sections,
        embedded,
        files,
        playbooks,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::nav::NavRules;

    fn record(title: &str, path: &[&str], content: &str) -> SectionRecord {
        let section_path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        SectionRecord {
            playbook_title: title.to_string(),
            full_title: format!("{} Playbook", title),
            source_path: "./content/demo-playbook/page.md".to_string(),
            level: section_path.len(),
            nav_info: NavRules::default().resolve("./content/demo-playbook/page.md", &section_path),
            content_length: content.len(),
            token_count: 2,
            content: content.to_string(),
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn replace_is_a_full_rebuild() {
        let conn = memory_db();
        replace_sections(&conn, &[record("A", &["P"], "one"), record("A", &["P", "S"], "two")]).unwrap();
        let n = replace_sections(&conn, &[record("B", &["Q"], "three")]).unwrap();
        assert_eq!(n, 1);

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.sections, 1);
        assert_eq!(s.playbooks.len(), 1);
        assert_eq!(s.playbooks[0].title, "B");
    }

    #[test]
    fn nav_info_stored_as_json() {
        let conn = memory_db();
        replace_sections(&conn, &[record("A", &["P", "", "Deep"], "body")]).unwrap();
        let (nav, path): (String, String) = conn
            .query_row("SELECT nav_info, section_path FROM sections", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        let nav: NavInfo = serde_json::from_str(&nav).unwrap();
        assert_eq!(nav.anchor_slug, "#deep");
        assert_eq!(path, r#"["P","","Deep"]"#);
    }

    #[test]
    fn embeddings_round_trip_through_pending() {
        let conn = memory_db();
        replace_sections(&conn, &[record("A", &["P"], "one"), record("A", &["P", "S"], "two")]).unwrap();

        let pending = fetch_unembedded(&conn, None).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(fetch_unembedded(&conn, Some(1)).unwrap().len(), 1);

        let mut stmt = conn.prepare(UPDATE_EMBEDDING_SQL).unwrap();
        save_embedding(
            &mut stmt,
            &EmbeddingRow {
                id: pending[0].id,
                vector: vec![0.5, -1.0],
                token_count: 7,
                model: "m".into(),
            },
        )
        .unwrap();

        let left = fetch_unembedded(&conn, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "two");
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.embedded, 1);
        assert_eq!(s.files, 1);
        assert_eq!(s.playbooks[0].tokens, 4);
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.sqlite");
        let conn = connect(&path).unwrap();
        init_schema(&conn).unwrap();
        assert!(path.exists());
    }
}
