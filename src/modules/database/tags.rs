use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

use crate::schema::{now, open_connection};

/// 标签
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Published posts carrying this tag
    pub count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// 创建或更新标签请求；更新时缺省字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagInput {
    pub name: Option<String>,
    pub slug: Option<String>,
}

const TAG_SELECT: &str = "SELECT t.id, t.name, t.slug,
        (SELECT COUNT(*) FROM post_tags pt JOIN posts p ON p.id = pt.post_id
         WHERE pt.tag_id = t.id AND p.status = 'published') AS count,
        t.created_at, t.updated_at
     FROM tags t";

fn row_to_tag(row: &Row) -> Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        count: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// URL slug for a name; falls back to `tag` for names that transliterate to nothing
pub fn tag_slug(name: &str) -> String {
    let slug = slug::slugify(name.trim());
    if slug.is_empty() {
        "tag".to_string()
    } else {
        slug
    }
}

/// 标签数据库
pub struct TagDB {
    conn: Connection,
}

impl TagDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    pub fn list(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY t.name COLLATE NOCASE", TAG_SELECT))?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    pub fn get(&self, id: i64) -> Result<Option<Tag>> {
        get_tag(&self.conn, id)
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        get_tag_by_slug(&self.conn, slug)
    }

    /// Lookup by numeric id, then slug, then name
    pub fn find(&self, key: &str) -> Result<Option<Tag>> {
        if let Ok(id) = key.parse::<i64>() {
            if let Some(tag) = self.get(id)? {
                return Ok(Some(tag));
            }
        }
        if let Some(tag) = self.get_by_slug(key)? {
            return Ok(Some(tag));
        }
        self.conn
            .query_row(&format!("{} WHERE t.name = ?", TAG_SELECT), params![key], row_to_tag)
            .optional()
    }

    /// Returns `Ok(None)` when the name is blank
    pub fn create(&self, input: &TagInput) -> Result<Option<Tag>> {
        create_tag(&self.conn, input)
    }

    /// Existing tag with this name, or a new one with a free slug
    pub fn get_or_create(&self, name: &str) -> Result<Option<Tag>> {
        get_or_create_tag(&self.conn, name)
    }

    pub fn update(&self, id: i64, input: &TagInput) -> Result<Option<Tag>> {
        if self.get(id)?.is_none() {
            return Ok(None);
        }
        if let Some(name) = input.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            self.conn
                .execute("UPDATE tags SET name = ? WHERE id = ?", params![name, id])?;
        }
        if let Some(slug) = input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.conn
                .execute("UPDATE tags SET slug = ? WHERE id = ?", params![tag_slug(slug), id])?;
        }
        self.conn
            .execute("UPDATE tags SET updated_at = ? WHERE id = ?", params![now(), id])?;
        self.get(id)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM tags WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
    }

    /// Tags attached to one post
    pub fn tags_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        tags_for_post(&self.conn, post_id)
    }
}

// Connection-level helpers, shared with the post store so tag changes can
// run inside its transactions.

pub(crate) fn get_tag(conn: &Connection, id: i64) -> Result<Option<Tag>> {
    conn.query_row(&format!("{} WHERE t.id = ?", TAG_SELECT), params![id], row_to_tag)
        .optional()
}

pub(crate) fn get_tag_by_slug(conn: &Connection, slug: &str) -> Result<Option<Tag>> {
    conn.query_row(&format!("{} WHERE t.slug = ?", TAG_SELECT), params![slug], row_to_tag)
        .optional()
}

pub(crate) fn create_tag(conn: &Connection, input: &TagInput) -> Result<Option<Tag>> {
    let Some(name) = input.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let slug = input
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(tag_slug)
        .unwrap_or_else(|| tag_slug(name));
    let now = now();

    conn.execute(
        "INSERT INTO tags (name, slug, created_at, updated_at) VALUES (?, ?, ?, ?)",
        params![name, slug, now, now],
    )?;
    get_tag(conn, conn.last_insert_rowid())
}

pub(crate) fn get_or_create_tag(conn: &Connection, name: &str) -> Result<Option<Tag>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if let Some(tag) = conn
        .query_row(&format!("{} WHERE t.name = ?", TAG_SELECT), params![name], row_to_tag)
        .optional()?
    {
        return Ok(Some(tag));
    }

    let base = tag_slug(name);
    let mut slug = base.clone();
    let mut n = 2;
    while get_tag_by_slug(conn, &slug)?.is_some() {
        slug = format!("{}-{}", base, n);
        n += 1;
    }
    create_tag(
        conn,
        &TagInput {
            name: Some(name.to_string()),
            slug: Some(slug),
        },
    )
}

pub(crate) fn tags_for_post(conn: &Connection, post_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(&format!(
        "{} JOIN post_tags link ON link.tag_id = t.id WHERE link.post_id = ? ORDER BY t.name COLLATE NOCASE",
        TAG_SELECT
    ))?;
    let tags = stmt
        .query_map(params![post_id], row_to_tag)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> (tempfile::TempDir, TagDB) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.db");
        let db = TagDB::new(&path.to_string_lossy()).unwrap();
        (dir, db)
    }

    fn input(name: &str) -> TagInput {
        TagInput {
            name: Some(name.to_string()),
            slug: None,
        }
    }

    #[test]
    fn test_create_derives_slug() {
        let (_dir, db) = db();
        let tag = db.create(&input("Rust Web")).unwrap().unwrap();
        assert_eq!(tag.slug, "rust-web");
        assert_eq!(tag.count, 0);
        assert!(db.create(&input("   ")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_is_a_constraint_violation() {
        let (_dir, db) = db();
        db.create(&input("rust")).unwrap();
        let err = db.create(&input("rust")).unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[test]
    fn test_get_or_create_picks_free_slug() {
        let (_dir, db) = db();
        let first = db.get_or_create("C++").unwrap().unwrap();
        let again = db.get_or_create("C++").unwrap().unwrap();
        assert_eq!(first.id, again.id);

        let other = db.get_or_create("C").unwrap().unwrap();
        assert_ne!(other.slug, first.slug);
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn test_find_by_id_slug_or_name() {
        let (_dir, db) = db();
        let tag = db.create(&input("Life Notes")).unwrap().unwrap();
        assert_eq!(db.find(&tag.id.to_string()).unwrap().unwrap().id, tag.id);
        assert_eq!(db.find("life-notes").unwrap().unwrap().id, tag.id);
        assert_eq!(db.find("Life Notes").unwrap().unwrap().id, tag.id);
        assert!(db.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let (_dir, db) = db();
        let tag = db.create(&input("old")).unwrap().unwrap();
        let updated = db
            .update(
                tag.id,
                &TagInput {
                    name: Some("new".to_string()),
                    slug: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(updated.slug, "old");

        assert!(db.delete(tag.id).unwrap());
        assert!(db.update(tag.id, &input("x")).unwrap().is_none());
    }
}
