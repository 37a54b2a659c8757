use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, BlogResult};
use crate::markdown::plain_excerpt;
use crate::pagination::PageQuery;
use crate::schema::{now, open_connection, placeholders};
use crate::tags::{get_or_create_tag, get_tag, tags_for_post, Tag};

/// Columns accepted by `sort_by` on post lists
pub const POST_SORTABLE: &[&str] = &[
    "created_at",
    "updated_at",
    "title",
    "view_count",
    "like_count",
    "id",
];

const EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "published" => PostStatus::Published,
            _ => PostStatus::Draft,
        }
    }
}

/// Which statuses a list query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Published,
    Draft,
    All,
}

impl StatusFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("draft") => StatusFilter::Draft,
            Some("all") | Some("") => StatusFilter::All,
            _ => StatusFilter::Published,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostAuthor {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: String,
}

/// 文章
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub cover: String,
    pub status: PostStatus,
    pub author: Option<PostAuthor>,
    pub tags: Vec<Tag>,
    pub view_count: i64,
    pub like_count: i64,
    /// Approved comments only
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// A tag reference inside a post payload: id, name, or a tag object
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagRef {
    Id(i64),
    Name(String),
    Object {
        id: Option<i64>,
        name: Option<String>,
        #[allow(dead_code)]
        slug: Option<String>,
    },
}

/// 创建/更新文章请求；更新时 `None` 表示保持原值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub cover: Option<String>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<TagRef>>,
    /// Only honoured on create (used by the importer)
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostListQuery {
    pub page: PageQuery,
    /// Tag slug or name
    pub tag: Option<String>,
    pub status: StatusFilter,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchivePost {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveYear {
    pub year: i32,
    pub count: usize,
    pub posts: Vec<ArchivePost>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostStats {
    pub total: i64,
    pub published: i64,
    pub drafts: i64,
    pub views: i64,
    pub likes: i64,
}

const POST_SELECT: &str = "SELECT p.id, p.title, p.slug, p.content, p.excerpt, p.cover, p.status,
        p.author_id, u.username, u.nickname, u.avatar,
        p.view_count, p.like_count,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id AND c.status = 'approved') AS comment_count,
        p.created_at, p.updated_at
     FROM posts p LEFT JOIN users u ON u.id = p.author_id";

fn row_to_post(row: &Row) -> Result<Post> {
    let status: String = row.get(6)?;
    let author_id: Option<i64> = row.get(7)?;
    let author = match author_id {
        Some(id) => Some(PostAuthor {
            id,
            username: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            nickname: row.get(9)?,
            avatar: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        }),
        None => None,
    };
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        cover: row.get(5)?,
        status: PostStatus::from_db(&status),
        author,
        tags: Vec::new(),
        view_count: row.get(11)?,
        like_count: row.get(12)?,
        comment_count: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// URL slug for a title; falls back to `post` for titles that transliterate to nothing
pub fn post_slug(title: &str) -> String {
    let slug = slug::slugify(title.trim());
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// 文章数据库
pub struct PostDB {
    conn: Connection,
}

impl PostDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    fn with_tags(&self, mut post: Post) -> Result<Post> {
        post.tags = tags_for_post(&self.conn, post.id)?;
        Ok(post)
    }

    /// One page of posts plus the total matching count
    pub fn list(&self, query: &PostListQuery) -> Result<(Vec<Post>, i64)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        match query.status {
            StatusFilter::Published => conditions.push("p.status = 'published'"),
            StatusFilter::Draft => conditions.push("p.status = 'draft'"),
            StatusFilter::All => {}
        }
        if let Some(tag) = non_blank(query.tag.as_deref()) {
            conditions.push(
                "p.id IN (SELECT pt.post_id FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                          WHERE t.slug = ? OR t.name = ?)",
            );
            values.push(Value::Text(tag.to_string()));
            values.push(Value::Text(tag.to_string()));
        }
        if let Some(pattern) = query.page.like_pattern() {
            conditions.push(
                "(p.title LIKE ? ESCAPE '\\' OR p.excerpt LIKE ? ESCAPE '\\' OR p.content LIKE ? ESCAPE '\\')",
            );
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM posts p{}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            POST_SELECT,
            where_clause,
            query.page.order_clause_for("p"),
            query.page.page_size,
            query.page.offset()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;

        let posts = rows
            .into_iter()
            .map(|post| self.with_tags(post))
            .collect::<Result<Vec<_>>>()?;
        Ok((posts, total))
    }

    pub fn get(&self, id: i64) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(&format!("{} WHERE p.id = ?", POST_SELECT), params![id], row_to_post)
            .optional()?;
        post.map(|p| self.with_tags(p)).transpose()
    }

    pub fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(&format!("{} WHERE p.slug = ?", POST_SELECT), params![slug], row_to_post)
            .optional()?;
        post.map(|p| self.with_tags(p)).transpose()
    }

    /// Numeric id first, then slug
    pub fn find(&self, key: &str) -> Result<Option<Post>> {
        if let Ok(id) = key.parse::<i64>() {
            if let Some(post) = self.get(id)? {
                return Ok(Some(post));
            }
        }
        self.get_by_slug(key)
    }

    fn unique_slug(conn: &Connection, base: &str, exclude_id: Option<i64>) -> Result<String> {
        let mut slug = base.to_string();
        let mut n = 2;
        loop {
            let taken: Option<i64> = conn
                .query_row(
                    "SELECT id FROM posts WHERE slug = ? AND id != ?",
                    params![slug, exclude_id.unwrap_or(-1)],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_none() {
                return Ok(slug);
            }
            slug = format!("{}-{}", base, n);
            n += 1;
        }
    }

    fn resolve_tags(conn: &Connection, refs: &[TagRef]) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::new();
        for tag_ref in refs {
            let tag = match tag_ref {
                TagRef::Id(id) => get_tag(conn, *id)?,
                TagRef::Name(name) => get_or_create_tag(conn, name)?,
                TagRef::Object { id, name, .. } => {
                    let by_id = match id {
                        Some(id) => get_tag(conn, *id)?,
                        None => None,
                    };
                    match (by_id, name) {
                        (Some(tag), _) => Some(tag),
                        (None, Some(name)) => get_or_create_tag(conn, name)?,
                        (None, None) => None,
                    }
                }
            };
            match tag {
                Some(tag) if !ids.contains(&tag.id) => ids.push(tag.id),
                Some(_) => {}
                None => log::warn!("忽略未知标签: {:?}", tag_ref),
            }
        }
        Ok(ids)
    }

    fn replace_tags(conn: &Connection, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        conn.execute("DELETE FROM post_tags WHERE post_id = ?", params![post_id])?;
        for tag_id in tag_ids {
            conn.execute(
                "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)",
                params![post_id, tag_id],
            )?;
        }
        Ok(())
    }

    pub fn create(&self, input: &PostInput, author_id: Option<i64>) -> BlogResult<Post> {
        let title = non_blank(input.title.as_deref())
            .ok_or_else(|| BlogError::bad_request("文章标题不能为空"))?;
        let content = input.content.clone().unwrap_or_default();
        let excerpt = non_blank(input.excerpt.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| plain_excerpt(&content, EXCERPT_CHARS));
        let status = input.status.unwrap_or(PostStatus::Draft);
        let now = now();
        // 统一存为 UTC, 按字符串排序才与时间顺序一致
        let created_at = non_blank(input.created_at.as_deref())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|parsed| parsed.with_timezone(&chrono::Utc).to_rfc3339())
            .unwrap_or_else(|| now.clone());

        let tx = self.conn.unchecked_transaction()?;
        let base = non_blank(input.slug.as_deref())
            .map(post_slug)
            .unwrap_or_else(|| post_slug(title));
        let slug = Self::unique_slug(&tx, &base, None)?;

        tx.execute(
            "INSERT INTO posts (title, slug, content, excerpt, cover, status, author_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                title,
                slug,
                content,
                excerpt,
                input.cover.as_deref().map(str::trim).unwrap_or(""),
                status.as_str(),
                author_id,
                created_at,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(refs) = &input.tags {
            let tag_ids = Self::resolve_tags(&tx, refs)?;
            Self::replace_tags(&tx, id, &tag_ids)?;
        }
        tx.commit()?;

        log::info!("创建文章: {} ({})", title, slug);
        self.get(id)?.ok_or_else(|| BlogError::not_found("文章"))
    }

    /// Partial update; `Ok(None)` when the post does not exist
    pub fn update(&self, id: i64, input: &PostInput) -> BlogResult<Option<Post>> {
        let Some(existing) = self.get(id)? else {
            return Ok(None);
        };
        if matches!(input.title.as_deref().map(str::trim), Some("")) {
            return Err(BlogError::bad_request("文章标题不能为空"));
        }

        let tx = self.conn.unchecked_transaction()?;
        if let Some(title) = non_blank(input.title.as_deref()) {
            tx.execute("UPDATE posts SET title = ? WHERE id = ?", params![title, id])?;
        }
        if let Some(slug) = non_blank(input.slug.as_deref()) {
            let slug = Self::unique_slug(&tx, &post_slug(slug), Some(id))?;
            tx.execute("UPDATE posts SET slug = ? WHERE id = ?", params![slug, id])?;
        }
        if let Some(content) = &input.content {
            tx.execute("UPDATE posts SET content = ? WHERE id = ?", params![content, id])?;
        }
        if let Some(excerpt) = &input.excerpt {
            let excerpt = match excerpt.trim() {
                "" => plain_excerpt(
                    input.content.as_deref().unwrap_or(&existing.content),
                    EXCERPT_CHARS,
                ),
                text => text.to_string(),
            };
            tx.execute("UPDATE posts SET excerpt = ? WHERE id = ?", params![excerpt, id])?;
        }
        if let Some(cover) = &input.cover {
            tx.execute("UPDATE posts SET cover = ? WHERE id = ?", params![cover.trim(), id])?;
        }
        if let Some(status) = input.status {
            tx.execute(
                "UPDATE posts SET status = ? WHERE id = ?",
                params![status.as_str(), id],
            )?;
        }
        if let Some(refs) = &input.tags {
            let tag_ids = Self::resolve_tags(&tx, refs)?;
            Self::replace_tags(&tx, id, &tag_ids)?;
        }
        tx.execute("UPDATE posts SET updated_at = ? WHERE id = ?", params![now(), id])?;
        tx.commit()?;

        Ok(self.get(id)?)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Delete several posts in one transaction, returning how many existed
    pub fn batch_delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            &format!("DELETE FROM posts WHERE id IN ({})", placeholders(ids.len())),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;
        Ok(rows)
    }

    pub fn increment_views(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?",
            params![id],
        )?;
        Ok(())
    }

    /// New like count, or `None` when the post does not exist
    pub fn like(&self, id: i64) -> Result<Option<i64>> {
        self.conn.execute(
            "UPDATE posts SET like_count = like_count + 1 WHERE id = ?",
            params![id],
        )?;
        self.conn
            .query_row("SELECT like_count FROM posts WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Published posts grouped by year, newest first
    pub fn archive(&self) -> Result<Vec<ArchiveYear>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, slug, created_at FROM posts
             WHERE status = 'published' ORDER BY created_at DESC, id DESC",
        )?;
        let posts = stmt
            .query_map([], |row| {
                Ok(ArchivePost {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut years: Vec<ArchiveYear> = Vec::new();
        for post in posts {
            let year = post
                .created_at
                .get(..4)
                .and_then(|y| y.parse::<i32>().ok())
                .unwrap_or(0);
            match years.last_mut() {
                Some(group) if group.year == year => {
                    group.count += 1;
                    group.posts.push(post);
                }
                _ => years.push(ArchiveYear {
                    year,
                    count: 1,
                    posts: vec![post],
                }),
            }
        }
        Ok(years)
    }

    pub fn stats(&self) -> Result<PostStats> {
        self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'published'), 0),
                    COALESCE(SUM(status = 'draft'), 0),
                    COALESCE(SUM(view_count), 0),
                    COALESCE(SUM(like_count), 0)
             FROM posts",
            [],
            |row| {
                Ok(PostStats {
                    total: row.get(0)?,
                    published: row.get(1)?,
                    drafts: row.get(2)?,
                    views: row.get(3)?,
                    likes: row.get(4)?,
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;
    use crate::pagination::PageParams;

    fn db() -> (tempfile::TempDir, PostDB) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.db");
        let db = PostDB::new(&path.to_string_lossy()).unwrap();
        (dir, db)
    }

    fn draft(title: &str, content: &str) -> PostInput {
        PostInput {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    fn published(title: &str, content: &str) -> PostInput {
        PostInput {
            status: Some(PostStatus::Published),
            ..draft(title, content)
        }
    }

    fn list_query(params: PageParams, tag: Option<&str>, status: StatusFilter) -> PostListQuery {
        PostListQuery {
            page: PageQuery::from_params(&params, &PaginationConfig::default(), POST_SORTABLE),
            tag: tag.map(str::to_string),
            status,
        }
    }

    #[test]
    fn test_create_derives_slug_and_excerpt() {
        let (_dir, db) = db();
        let post = db
            .create(&draft("Hello World", "# Intro\n\nSome **text** here."), None)
            .unwrap();
        assert_eq!(post.slug, "hello-world");
        assert_eq!(post.excerpt, "Intro Some text here.");
        assert_eq!(post.status, PostStatus::Draft);

        let second = db.create(&draft("Hello World", ""), None).unwrap();
        assert_eq!(second.slug, "hello-world-2");
        let third = db.create(&draft("Hello, World!", ""), None).unwrap();
        assert_eq!(third.slug, "hello-world-3");
    }

    #[test]
    fn test_blank_title_is_rejected() {
        let (_dir, db) = db();
        let err = db.create(&draft("  ", "body"), None).unwrap_err();
        assert!(matches!(err, BlogError::BadRequest(_)));
    }

    #[test]
    fn test_tags_by_id_name_and_object() {
        let (_dir, db) = db();
        let first = db
            .create(
                &PostInput {
                    tags: Some(vec![TagRef::Name("Rust".into()), TagRef::Name("Web".into())]),
                    ..published("one", "")
                },
                None,
            )
            .unwrap();
        assert_eq!(first.tags.len(), 2);
        let rust_id = first.tags.iter().find(|t| t.name == "Rust").unwrap().id;

        let payload: Vec<TagRef> =
            serde_json::from_str(&format!(r#"[{}, "life", {{"id": null, "name": "Rust"}}]"#, rust_id))
                .unwrap();
        let second = db
            .create(
                &PostInput {
                    tags: Some(payload),
                    ..published("two", "")
                },
                None,
            )
            .unwrap();
        let names: Vec<_> = second.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["life", "Rust"]);
        assert_eq!(second.tags.iter().find(|t| t.name == "Rust").unwrap().count, 2);
    }

    #[test]
    fn test_list_filters_status_tag_and_search() {
        let (_dir, db) = db();
        db.create(
            &PostInput {
                tags: Some(vec![TagRef::Name("rust".into())]),
                ..published("Rust ownership", "borrowing rules")
            },
            None,
        )
        .unwrap();
        db.create(&published("Cooking", "100% butter"), None).unwrap();
        db.create(&draft("Secret draft", "rust"), None).unwrap();

        let (posts, total) = db
            .list(&list_query(PageParams::default(), None, StatusFilter::Published))
            .unwrap();
        assert_eq!(total, 2);
        assert!(posts.iter().all(|p| p.is_published()));

        let (_, total) = db
            .list(&list_query(PageParams::default(), None, StatusFilter::All))
            .unwrap();
        assert_eq!(total, 3);

        let (posts, total) = db
            .list(&list_query(PageParams::default(), Some("rust"), StatusFilter::Published))
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts[0].title, "Rust ownership");

        let search = |term: &str| PageParams {
            search: Some(term.to_string()),
            ..Default::default()
        };
        let (_, total) = db
            .list(&list_query(search("BORROWING"), None, StatusFilter::Published))
            .unwrap();
        assert_eq!(total, 1);
        let (_, total) = db
            .list(&list_query(search("100%"), None, StatusFilter::Published))
            .unwrap();
        assert_eq!(total, 1);
        let (_, total) = db
            .list(&list_query(search("%"), None, StatusFilter::All))
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_list_paging_and_sorting() {
        let (_dir, db) = db();
        for title in ["b", "a", "c"] {
            db.create(&published(title, ""), None).unwrap();
        }
        let params = PageParams {
            page: Some(2),
            page_size: Some(2),
            sort_by: Some("title".into()),
            sort_order: Some("asc".into()),
            ..Default::default()
        };
        let (posts, total) = db
            .list(&list_query(params, None, StatusFilter::Published))
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "c");
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let (_dir, db) = db();
        let post = db
            .create(
                &PostInput {
                    cover: Some("/uploads/a.png".into()),
                    tags: Some(vec![TagRef::Name("keep".into())]),
                    ..draft("Title", "body")
                },
                None,
            )
            .unwrap();

        let updated = db
            .update(
                post.id,
                &PostInput {
                    status: Some(PostStatus::Published),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(updated.is_published());
        assert_eq!(updated.title, "Title");
        assert_eq!(updated.cover, "/uploads/a.png");
        assert_eq!(updated.tags.len(), 1);

        let retagged = db
            .update(
                post.id,
                &PostInput {
                    tags: Some(Vec::new()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(retagged.tags.is_empty());

        assert!(db.update(9999, &PostInput::default()).unwrap().is_none());
        assert!(db
            .update(
                post.id,
                &PostInput {
                    title: Some(" ".into()),
                    ..Default::default()
                }
            )
            .is_err());
    }

    #[test]
    fn test_batch_delete_views_and_likes() {
        let (_dir, db) = db();
        let a = db.create(&published("a", ""), None).unwrap();
        let b = db.create(&published("b", ""), None).unwrap();
        let c = db.create(&published("c", ""), None).unwrap();

        db.increment_views(a.id).unwrap();
        db.increment_views(a.id).unwrap();
        assert_eq!(db.like(a.id).unwrap(), Some(1));
        assert_eq!(db.like(a.id).unwrap(), Some(2));
        assert_eq!(db.like(9999).unwrap(), None);
        assert_eq!(db.get(a.id).unwrap().unwrap().view_count, 2);

        assert_eq!(db.batch_delete(&[b.id, c.id, 9999]).unwrap(), 2);
        assert_eq!(db.batch_delete(&[]).unwrap(), 0);
        assert!(db.get(b.id).unwrap().is_none());

        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.views, 2);
        assert_eq!(stats.likes, 2);
    }

    #[test]
    fn test_archive_groups_by_year() {
        let (_dir, db) = db();
        let dated = |title: &str, date: &str| PostInput {
            created_at: Some(date.to_string()),
            ..published(title, "")
        };
        db.create(&dated("old", "2022-05-01T00:00:00+00:00"), None).unwrap();
        db.create(&dated("new", "2024-03-01T00:00:00+00:00"), None).unwrap();
        db.create(&dated("newer", "2024-09-01T00:00:00+00:00"), None).unwrap();
        db.create(&draft("hidden", ""), None).unwrap();

        let archive = db.archive().unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive[0].year, 2024);
        assert_eq!(archive[0].count, 2);
        assert_eq!(archive[0].posts[0].title, "newer");
        assert_eq!(archive[1].year, 2022);
    }

    #[test]
    fn test_created_at_is_stored_as_utc() {
        let (_dir, db) = db();
        let dated = |title: &str, date: &str| PostInput {
            created_at: Some(date.to_string()),
            ..published(title, "")
        };
        let east = db.create(&dated("east", "2023-05-01T08:00:00+08:00"), None).unwrap();
        assert_eq!(east.created_at, "2023-05-01T00:00:00+00:00");

        // 本地日期更早, 换算成 UTC 反而更晚
        let west = db.create(&dated("west", "2023-04-30T20:30:00-04:00"), None).unwrap();
        assert_eq!(west.created_at, "2023-05-01T00:30:00+00:00");
        assert!(west.created_at > east.created_at);

        let bogus = db.create(&dated("bogus", "yesterday"), None).unwrap();
        assert!(bogus.created_at > west.created_at);
    }
}
