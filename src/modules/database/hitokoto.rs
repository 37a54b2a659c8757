use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, BlogResult};
use crate::schema::{now, open_connection};

pub const MAX_CONTENT_CHARS: usize = 500;

/// 一言
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hitokoto {
    pub id: i64,
    pub content: String,
    pub author: String,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitokotoInput {
    pub content: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
}

fn row_to_hitokoto(row: &Row) -> Result<Hitokoto> {
    Ok(Hitokoto {
        id: row.get(0)?,
        content: row.get(1)?,
        author: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn check_content(content: &str) -> BlogResult<()> {
    if content.is_empty() {
        return Err(BlogError::bad_request("内容不能为空"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(BlogError::bad_request(format!(
            "内容不能超过 {} 个字符",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

pub struct HitokotoDB {
    conn: Connection,
}

impl HitokotoDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    pub fn list(&self) -> Result<Vec<Hitokoto>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, author, source, created_at FROM hitokoto ORDER BY created_at DESC, id DESC",
        )?;
        let items = stmt
            .query_map([], row_to_hitokoto)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get(&self, id: i64) -> Result<Option<Hitokoto>> {
        self.conn
            .query_row(
                "SELECT id, content, author, source, created_at FROM hitokoto WHERE id = ?",
                params![id],
                row_to_hitokoto,
            )
            .optional()
    }

    /// `None` when the table is empty
    pub fn random(&self) -> Result<Option<Hitokoto>> {
        self.conn
            .query_row(
                "SELECT id, content, author, source, created_at FROM hitokoto ORDER BY RANDOM() LIMIT 1",
                [],
                row_to_hitokoto,
            )
            .optional()
    }

    pub fn create(&self, input: &HitokotoInput) -> BlogResult<Hitokoto> {
        let content = input.content.as_deref().unwrap_or("").trim();
        check_content(content)?;

        self.conn.execute(
            "INSERT INTO hitokoto (content, author, source, created_at) VALUES (?, ?, ?, ?)",
            params![
                content,
                input.author.as_deref().unwrap_or("").trim(),
                input.source.as_deref().unwrap_or("").trim(),
                now()
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get(id)?.ok_or_else(|| BlogError::not_found("一言"))
    }

    pub fn update(&self, id: i64, input: &HitokotoInput) -> BlogResult<Option<Hitokoto>> {
        let Some(existing) = self.get(id)? else {
            return Ok(None);
        };
        let content = match input.content.as_deref() {
            Some(content) => content.trim().to_string(),
            None => existing.content,
        };
        check_content(&content)?;
        let author = input
            .author
            .as_deref()
            .map(|a| a.trim().to_string())
            .unwrap_or(existing.author);
        let source = input
            .source
            .as_deref()
            .map(|s| s.trim().to_string())
            .unwrap_or(existing.source);

        self.conn.execute(
            "UPDATE hitokoto SET content = ?, author = ?, source = ? WHERE id = ?",
            params![content, author, source, id],
        )?;
        Ok(self.get(id)?)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM hitokoto WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM hitokoto", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> (tempfile::TempDir, HitokotoDB) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hitokoto.db");
        let db = HitokotoDB::new(&path.to_string_lossy()).unwrap();
        (dir, db)
    }

    fn quote(content: &str) -> HitokotoInput {
        HitokotoInput {
            content: Some(content.to_string()),
            author: Some("鲁迅".to_string()),
            source: None,
        }
    }

    #[test]
    fn test_random_on_empty_table() {
        let (_dir, db) = db();
        assert!(db.random().unwrap().is_none());
        let q = db.create(&quote("世上本没有路")).unwrap();
        assert_eq!(db.random().unwrap(), Some(q));
    }

    #[test]
    fn test_content_limits() {
        let (_dir, db) = db();
        assert!(db.create(&quote("  ")).is_err());
        assert!(db.create(&quote(&"字".repeat(MAX_CONTENT_CHARS))).is_ok());
        assert!(db.create(&quote(&"字".repeat(MAX_CONTENT_CHARS + 1))).is_err());
    }

    #[test]
    fn test_partial_update_and_delete() {
        let (_dir, db) = db();
        let q = db.create(&quote("one")).unwrap();
        let updated = db
            .update(
                q.id,
                &HitokotoInput {
                    source: Some("呐喊".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "one");
        assert_eq!(updated.author, "鲁迅");
        assert_eq!(updated.source, "呐喊");

        assert!(db.update(q.id, &quote("")).is_err());
        assert!(db.delete(q.id).unwrap());
        assert!(db.update(q.id, &quote("x")).unwrap().is_none());
        assert_eq!(db.count().unwrap(), 0);
    }
}
