// balans-docs-server/src/store.rs

//! SQLite wrapper for the document text store.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

const CREATE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    content TEXT NOT NULL
);
";

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub line_number: usize,
    pub text: String,
}

pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    /// Open (or create) the store at the given path, creating the schema if
    /// it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch(CREATE_SCHEMA)
            .context("Failed to create schema")?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert(&self, name: &str, content: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO documents (name, content) VALUES (?1, ?2)",
            params![name, content],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list(&self) -> Result<Vec<DocumentSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM documents ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(DocumentSummary {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    pub fn text(&self, id: i64) -> Result<Option<String>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Case-insensitive substring search over the document's lines. Line
    /// numbers are 1-based.
    pub fn search(&self, id: i64, query: &str) -> Result<Option<Vec<LineMatch>>> {
        let Some(content) = self.text(id)? else {
            return Ok(None);
        };
        let needle = query.to_lowercase();
        let matches = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.to_lowercase().contains(&needle))
            .map(|(i, line)| LineMatch {
                line_number: i + 1,
                text: line.to_string(),
            })
            .collect();
        Ok(Some(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_is_ordered_by_id() {
        let store = DocumentStore::open_memory().unwrap();
        store.insert("invoice-7", "text").unwrap();
        store.insert("act-12", "text").unwrap();
        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, 1);
        assert_eq!(docs[0].name, "invoice-7");
        assert_eq!(docs[1].id, 2);
    }

    #[test]
    fn test_missing_document_is_none() {
        let store = DocumentStore::open_memory().unwrap();
        assert!(store.text(42).unwrap().is_none());
        assert!(store.search(42, "x").unwrap().is_none());
    }

    #[test]
    fn test_search_is_case_insensitive_and_one_based() {
        let store = DocumentStore::open_memory().unwrap();
        let id = store
            .insert("invoice-7", "First line\nTotal: 1500 RUB\ntotal due soon")
            .unwrap();
        let matches = store.search(id, "TOTAL").unwrap().unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(matches[0].text, "Total: 1500 RUB");
        assert_eq!(matches[1].line_number, 3);
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.sqlite");
        {
            let store = DocumentStore::open(&path).unwrap();
            store.insert("invoice-7", "hello").unwrap();
        }
        let store = DocumentStore::open(&path).unwrap();
        assert_eq!(store.text(1).unwrap().unwrap(), "hello");
    }
}
