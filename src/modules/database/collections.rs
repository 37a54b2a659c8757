use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, BlogResult};
use crate::pagination::PageQuery;
use crate::schema::{now, open_connection, placeholders};

pub const COLLECTION_SORTABLE: &[&str] = &["created_at", "updated_at", "title", "rating", "id"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Book,
    Movie,
    Music,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [CollectionKind::Book, CollectionKind::Movie, CollectionKind::Music];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Book => "book",
            CollectionKind::Movie => "movie",
            CollectionKind::Music => "music",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "book" => Some(CollectionKind::Book),
            "movie" => Some(CollectionKind::Movie),
            "music" => Some(CollectionKind::Music),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CollectionKind::Book => "书籍",
            CollectionKind::Movie => "影视",
            CollectionKind::Music => "音乐",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShelfStatus {
    Want,
    Reading,
    Finished,
}

impl ShelfStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShelfStatus::Want => "want",
            ShelfStatus::Reading => "reading",
            ShelfStatus::Finished => "finished",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "want" => Some(ShelfStatus::Want),
            "reading" => Some(ShelfStatus::Reading),
            "finished" => Some(ShelfStatus::Finished),
            _ => None,
        }
    }
}

/// 书影音条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover: String,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub isbn: Option<String>,
    pub pages: Option<i64>,
    pub status: ShelfStatus,
    pub rating: Option<i64>,
    pub link: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 创建/更新请求；更新时缺省字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionInput {
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<CollectionKind>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub isbn: Option<String>,
    pub pages: Option<i64>,
    pub status: Option<ShelfStatus>,
    pub rating: Option<i64>,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub page: PageQuery,
    pub kind: Option<CollectionKind>,
    pub status: Option<ShelfStatus>,
}

const COLLECTION_SELECT: &str = "SELECT id, kind, title, author, description, cover, publisher,
        publish_date, isbn, pages, status, rating, link, created_at, updated_at
     FROM collections";

fn row_to_item(row: &Row) -> Result<CollectionItem> {
    let kind: String = row.get(1)?;
    let status: String = row.get(10)?;
    Ok(CollectionItem {
        id: row.get(0)?,
        kind: CollectionKind::parse(&kind).unwrap_or(CollectionKind::Book),
        title: row.get(2)?,
        author: row.get(3)?,
        description: row.get(4)?,
        cover: row.get(5)?,
        publisher: row.get(6)?,
        publish_date: row.get(7)?,
        isbn: row.get(8)?,
        pages: row.get(9)?,
        status: ShelfStatus::parse(&status).unwrap_or(ShelfStatus::Want),
        rating: row.get(11)?,
        link: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn check_rating(rating: Option<i64>) -> BlogResult<()> {
    match rating {
        Some(r) if !(0..=5).contains(&r) => Err(BlogError::bad_request("评分必须在 0 到 5 之间")),
        _ => Ok(()),
    }
}

/// Blank optional text becomes NULL
fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct CollectionDB {
    conn: Connection,
}

impl CollectionDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    pub fn list(&self, query: &CollectionQuery) -> Result<(Vec<CollectionItem>, i64)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(kind) = query.kind {
            conditions.push("kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(pattern) = query.page.like_pattern() {
            conditions.push("(title LIKE ? ESCAPE '\\' OR author LIKE ? ESCAPE '\\')");
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM collections{}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let mut stmt = self.conn.prepare(&format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            COLLECTION_SELECT,
            where_clause,
            query.page.order_clause(),
            query.page.page_size,
            query.page.offset()
        ))?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    pub fn get(&self, id: i64) -> Result<Option<CollectionItem>> {
        self.conn
            .query_row(&format!("{} WHERE id = ?", COLLECTION_SELECT), params![id], row_to_item)
            .optional()
    }

    pub fn create(&self, input: &CollectionInput) -> BlogResult<CollectionItem> {
        let title = input.title.as_deref().unwrap_or("").trim();
        if title.is_empty() {
            return Err(BlogError::bad_request("标题不能为空"));
        }
        check_rating(input.rating)?;
        let now = now();

        self.conn.execute(
            "INSERT INTO collections (kind, title, author, description, cover, publisher, publish_date,
                                      isbn, pages, status, rating, link, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                input.kind.unwrap_or(CollectionKind::Book).as_str(),
                title,
                input.author.as_deref().unwrap_or("").trim(),
                input.description.as_deref().unwrap_or("").trim(),
                input.cover.as_deref().unwrap_or("").trim(),
                optional_text(input.publisher.as_deref()),
                optional_text(input.publish_date.as_deref()),
                optional_text(input.isbn.as_deref()),
                input.pages,
                input.status.unwrap_or(ShelfStatus::Want).as_str(),
                input.rating,
                optional_text(input.link.as_deref()),
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get(id)?.ok_or_else(|| BlogError::not_found("条目"))
    }

    pub fn update(&self, id: i64, input: &CollectionInput) -> BlogResult<Option<CollectionItem>> {
        let Some(mut item) = self.get(id)? else {
            return Ok(None);
        };
        if let Some(title) = &input.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(BlogError::bad_request("标题不能为空"));
            }
            item.title = title.to_string();
        }
        check_rating(input.rating)?;

        if let Some(kind) = input.kind {
            item.kind = kind;
        }
        if let Some(status) = input.status {
            item.status = status;
        }
        if let Some(author) = &input.author {
            item.author = author.trim().to_string();
        }
        if let Some(description) = &input.description {
            item.description = description.trim().to_string();
        }
        if let Some(cover) = &input.cover {
            item.cover = cover.trim().to_string();
        }
        if input.publisher.is_some() {
            item.publisher = optional_text(input.publisher.as_deref());
        }
        if input.publish_date.is_some() {
            item.publish_date = optional_text(input.publish_date.as_deref());
        }
        if input.isbn.is_some() {
            item.isbn = optional_text(input.isbn.as_deref());
        }
        if input.link.is_some() {
            item.link = optional_text(input.link.as_deref());
        }
        if input.pages.is_some() {
            item.pages = input.pages;
        }
        if input.rating.is_some() {
            item.rating = input.rating;
        }

        self.conn.execute(
            "UPDATE collections SET kind = ?, title = ?, author = ?, description = ?, cover = ?,
                    publisher = ?, publish_date = ?, isbn = ?, pages = ?, status = ?, rating = ?,
                    link = ?, updated_at = ?
             WHERE id = ?",
            params![
                item.kind.as_str(),
                item.title,
                item.author,
                item.description,
                item.cover,
                item.publisher,
                item.publish_date,
                item.isbn,
                item.pages,
                item.status.as_str(),
                item.rating,
                item.link,
                now(),
                id
            ],
        )?;
        Ok(self.get(id)?)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn batch_delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            &format!("DELETE FROM collections WHERE id IN ({})", placeholders(ids.len())),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;
    use crate::pagination::PageParams;

    fn db() -> (tempfile::TempDir, CollectionDB) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collections.db");
        let db = CollectionDB::new(&path.to_string_lossy()).unwrap();
        (dir, db)
    }

    fn item(kind: CollectionKind, title: &str, author: &str) -> CollectionInput {
        CollectionInput {
            kind: Some(kind),
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            ..Default::default()
        }
    }

    fn query(kind: Option<CollectionKind>, status: Option<ShelfStatus>, search: Option<&str>) -> CollectionQuery {
        let params = PageParams {
            search: search.map(str::to_string),
            ..Default::default()
        };
        CollectionQuery {
            page: PageQuery::from_params(&params, &PaginationConfig::default(), COLLECTION_SORTABLE),
            kind,
            status,
        }
    }

    #[test]
    fn test_rating_and_title_validation() {
        let (_dir, db) = db();
        let mut input = item(CollectionKind::Book, "Dune", "Herbert");
        input.rating = Some(6);
        assert!(db.create(&input).is_err());
        input.rating = Some(-1);
        assert!(db.create(&input).is_err());
        input.rating = Some(5);
        let saved = db.create(&input).unwrap();
        assert_eq!(saved.rating, Some(5));
        assert_eq!(saved.status, ShelfStatus::Want);

        assert!(db.create(&item(CollectionKind::Book, " ", "x")).is_err());
    }

    #[test]
    fn test_list_filters() {
        let (_dir, db) = db();
        db.create(&item(CollectionKind::Book, "三体", "刘慈欣")).unwrap();
        db.create(&item(CollectionKind::Movie, "Arrival", "Villeneuve")).unwrap();
        let mut reading = item(CollectionKind::Book, "SICP", "Abelson");
        reading.status = Some(ShelfStatus::Reading);
        db.create(&reading).unwrap();

        let (_, total) = db.list(&query(Some(CollectionKind::Book), None, None)).unwrap();
        assert_eq!(total, 2);
        let (items, _) = db
            .list(&query(None, Some(ShelfStatus::Reading), None))
            .unwrap();
        assert_eq!(items[0].title, "SICP");
        let (items, total) = db.list(&query(None, None, Some("刘"))).unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "三体");
    }

    #[test]
    fn test_payload_uses_type_field() {
        let input: CollectionInput =
            serde_json::from_str(r#"{"type": "music", "title": "OK Computer", "rating": 4}"#).unwrap();
        assert_eq!(input.kind, Some(CollectionKind::Music));

        let (_dir, db) = db();
        let saved = db.create(&input).unwrap();
        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["type"], "music");
    }

    #[test]
    fn test_update_and_batch_delete() {
        let (_dir, db) = db();
        let a = db.create(&item(CollectionKind::Book, "a", "x")).unwrap();
        let b = db.create(&item(CollectionKind::Book, "b", "y")).unwrap();

        let updated = db
            .update(
                a.id,
                &CollectionInput {
                    status: Some(ShelfStatus::Finished),
                    rating: Some(4),
                    isbn: Some("  ".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "a");
        assert_eq!(updated.status, ShelfStatus::Finished);
        assert_eq!(updated.isbn, None);
        assert!(db
            .update(a.id, &CollectionInput { rating: Some(9), ..Default::default() })
            .is_err());

        assert_eq!(db.batch_delete(&[a.id, b.id]).unwrap(), 2);
        assert_eq!(db.count().unwrap(), 0);
    }
}
