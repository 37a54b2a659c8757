use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::config::CommentConfig;
use crate::error::{BlogError, BlogResult};
use crate::pagination::PageQuery;
use crate::schema::{now, open_connection, placeholders};
use crate::users::User;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+\.[a-zA-Z]{2,}$").expect("valid email regex"));

/// Deepest reply level; replies below it join the thread at this level
pub const MAX_REPLY_DEPTH: usize = 6;

/// Parent to attach a reply to, given its would-be ancestors
/// (`chain[0]` is the requested parent, the last entry the thread root).
fn reply_anchor(chain: &[i64]) -> Option<i64> {
    chain.get(chain.len().saturating_sub(MAX_REPLY_DEPTH)).copied()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
        }
    }

    /// Unknown or empty values mean "no filter"
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(CommentStatus::Pending),
            "approved" => Some(CommentStatus::Approved),
            "rejected" => Some(CommentStatus::Rejected),
            _ => None,
        }
    }
}

/// 评论（后台视图，包含邮箱）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub post_title: String,
    pub parent_id: Option<i64>,
    pub user_id: Option<i64>,
    pub author: String,
    pub email: String,
    pub website: Option<String>,
    pub avatar: Option<String>,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// 评论（公开视图，不含邮箱）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicComment {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub website: Option<String>,
    pub avatar: String,
    pub content: String,
    pub created_at: String,
}

impl Comment {
    pub fn to_public(&self) -> PublicComment {
        let avatar = self
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| gravatar_url(&self.email));
        PublicComment {
            id: self.id,
            post_id: self.post_id,
            parent_id: self.parent_id,
            author: self.author.clone(),
            website: self.website.clone(),
            avatar,
            content: self.content.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Avatar URL derived from the SHA-256 of the normalised address
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hash)
}

/// 发表评论请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComment {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub email: String,
    pub website: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(alias = "parentId")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    pub comment: PublicComment,
    pub children: Vec<CommentNode>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommentStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// Arrange a flat list into reply threads.
///
/// A comment whose parent is not in the list becomes a root. Roots are
/// newest first, replies oldest first.
pub fn build_comment_tree(mut flat: Vec<PublicComment>) -> Vec<CommentNode> {
    flat.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    let placed = place_replies(&flat);

    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<PublicComment>> = HashMap::new();
    for comment in flat {
        match placed.get(&comment.id).and_then(|(parent, _)| *parent) {
            Some(parent) => children.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }

    fn attach(comment: PublicComment, children: &mut HashMap<i64, Vec<PublicComment>>) -> CommentNode {
        let replies = children.remove(&comment.id).unwrap_or_default();
        CommentNode {
            children: replies.into_iter().map(|c| attach(c, children)).collect(),
            comment,
        }
    }

    roots
        .into_iter()
        .rev()
        .map(|c| attach(c, &mut children))
        .collect()
}

/// Effective `(parent, depth)` of every comment. Missing parents and cycles
/// make roots; replies past `MAX_REPLY_DEPTH` move up to the deepest level.
fn place_replies(flat: &[PublicComment]) -> HashMap<i64, (Option<i64>, usize)> {
    let parent_of: HashMap<i64, Option<i64>> = flat.iter().map(|c| (c.id, c.parent_id)).collect();
    let mut placed: HashMap<i64, (Option<i64>, usize)> = HashMap::with_capacity(flat.len());

    for comment in flat {
        if placed.contains_key(&comment.id) {
            continue;
        }
        // Climb to the first placed ancestor (or a root), then place downwards
        let mut path = vec![comment.id];
        let mut on_path: HashSet<i64> = HashSet::from([comment.id]);
        let mut cursor = comment.id;
        while let Some(parent) = parent_of.get(&cursor).copied().flatten() {
            if !parent_of.contains_key(&parent) || placed.contains_key(&parent) || !on_path.insert(parent) {
                break;
            }
            path.push(parent);
            cursor = parent;
        }

        for id in path.into_iter().rev() {
            let parent = parent_of.get(&id).copied().flatten();
            let placement = match parent.and_then(|p| placed.get(&p).map(|place| (p, *place))) {
                Some((p, (_, depth))) if depth < MAX_REPLY_DEPTH => (Some(p), depth + 1),
                Some((_, (grandparent, depth))) => (grandparent, depth),
                None => (None, 0),
            };
            placed.insert(id, placement);
        }
    }
    placed
}

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, COALESCE(p.title, ''), c.parent_id, c.user_id,
        c.author, c.email, c.website, c.avatar, c.content, c.status, c.created_at, c.updated_at
     FROM comments c LEFT JOIN posts p ON p.id = c.post_id";

fn row_to_comment(row: &Row) -> Result<Comment> {
    let status: String = row.get(10)?;
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        post_title: row.get(2)?,
        parent_id: row.get(3)?,
        user_id: row.get(4)?,
        author: row.get(5)?,
        email: row.get(6)?,
        website: row.get(7)?,
        avatar: row.get(8)?,
        content: row.get(9)?,
        status: CommentStatus::parse(&status).unwrap_or(CommentStatus::Pending),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// 评论数据库管理器
pub struct CommentDB {
    conn: Connection,
}

impl CommentDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    fn query(&self, sql: &str, values: &[Value]) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let comments = stmt
            .query_map(params_from_iter(values.iter()), row_to_comment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// 添加新评论
    ///
    /// Signed-in users may leave author and email blank; their account fills
    /// them in. Admin comments skip moderation.
    pub fn create(
        &self,
        post_id: i64,
        input: &NewComment,
        user: Option<&User>,
        settings: &CommentConfig,
    ) -> BlogResult<Comment> {
        let status: Option<String> = self
            .conn
            .query_row("SELECT status FROM posts WHERE id = ?", params![post_id], |row| {
                row.get(0)
            })
            .optional()?;
        if status.as_deref() != Some("published") {
            return Err(BlogError::not_found("文章"));
        }

        let author = match (input.author.trim(), user) {
            ("", Some(user)) => user.display_name().to_string(),
            (author, _) => author.to_string(),
        };
        let email = match (input.email.trim(), user) {
            ("", Some(user)) => user.email.clone(),
            (email, _) => email.to_string(),
        };
        let content = input.content.trim();
        let website = input
            .website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty());
        let avatar = input
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| user.map(|u| u.avatar.clone()).filter(|a| !a.is_empty()));

        if author.is_empty() {
            return Err(BlogError::bad_request("昵称不能为空"));
        }
        if email.is_empty() {
            return Err(BlogError::bad_request("邮箱不能为空"));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(BlogError::bad_request("邮箱格式不正确"));
        }
        if content.is_empty() {
            return Err(BlogError::bad_request("评论内容不能为空"));
        }
        if content.chars().count() > settings.max_length {
            return Err(BlogError::bad_request(format!(
                "评论内容不能超过 {} 个字符",
                settings.max_length
            )));
        }
        if let Some(website) = website {
            if !(website.starts_with("http://") || website.starts_with("https://")) {
                return Err(BlogError::bad_request("网站地址必须以 http:// 或 https:// 开头"));
            }
        }
        let parent_id = match input.parent_id {
            Some(parent_id) => {
                let chain = self.ancestry(parent_id, post_id)?;
                if chain.is_empty() {
                    return Err(BlogError::bad_request("回复的评论不存在"));
                }
                reply_anchor(&chain)
            }
            None => None,
        };

        let is_admin = user.map(User::is_admin).unwrap_or(false);
        let status = if settings.require_approval && !is_admin {
            CommentStatus::Pending
        } else {
            CommentStatus::Approved
        };
        let now = now();

        self.conn.execute(
            "INSERT INTO comments (post_id, parent_id, user_id, author, email, website, avatar, content, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                post_id,
                parent_id,
                user.map(|u| u.id),
                author,
                email,
                website,
                avatar,
                content,
                status.as_str(),
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        log::info!("新评论 #{} (文章 {}, {})", id, post_id, status.as_str());

        self.get(id)?.ok_or_else(|| BlogError::not_found("评论"))
    }

    /// `id` and its ancestors within `post_id`, nearest first; empty when
    /// `id` is not a comment of that post
    fn ancestry(&self, id: i64, post_id: i64) -> Result<Vec<i64>> {
        let mut chain = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if chain.contains(&current) {
                break;
            }
            let row: Option<(i64, Option<i64>)> = self
                .conn
                .query_row(
                    "SELECT post_id, parent_id FROM comments WHERE id = ?",
                    params![current],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((owner, parent)) if owner == post_id => {
                    chain.push(current);
                    next = parent;
                }
                _ => break,
            }
        }
        Ok(chain)
    }

    pub fn get(&self, id: i64) -> Result<Option<Comment>> {
        self.conn
            .query_row(
                &format!("{} WHERE c.id = ?", COMMENT_SELECT),
                params![id],
                row_to_comment,
            )
            .optional()
    }

    /// Comments of one post, oldest first
    pub fn list_for_post(&self, post_id: i64, include_unapproved: bool) -> Result<Vec<Comment>> {
        let filter = if include_unapproved {
            ""
        } else {
            " AND c.status = 'approved'"
        };
        self.query(
            &format!(
                "{} WHERE c.post_id = ?{} ORDER BY c.created_at ASC, c.id ASC",
                COMMENT_SELECT, filter
            ),
            &[Value::Integer(post_id)],
        )
    }

    /// All comments, newest first, optionally by status
    pub fn list_all(
        &self,
        status: Option<CommentStatus>,
        page: &PageQuery,
    ) -> Result<(Vec<Comment>, i64)> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = status {
            conditions.push("c.status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(pattern) = page.like_pattern() {
            conditions.push("(c.content LIKE ? ESCAPE '\\' OR c.author LIKE ? ESCAPE '\\')");
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM comments c{}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let comments = self.query(
            &format!(
                "{}{} ORDER BY c.created_at DESC, c.id DESC LIMIT {} OFFSET {}",
                COMMENT_SELECT,
                where_clause,
                page.page_size,
                page.offset()
            ),
            &values,
        )?;
        Ok((comments, total))
    }

    pub fn pending(&self) -> Result<Vec<Comment>> {
        self.query(
            &format!(
                "{} WHERE c.status = 'pending' ORDER BY c.created_at DESC, c.id DESC",
                COMMENT_SELECT
            ),
            &[],
        )
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<Comment>> {
        self.query(
            &format!(
                "{} ORDER BY c.created_at DESC, c.id DESC LIMIT {}",
                COMMENT_SELECT, limit
            ),
            &[],
        )
    }

    /// `Ok(None)` when the comment does not exist
    pub fn set_status(&self, id: i64, status: CommentStatus) -> Result<Option<Comment>> {
        let rows = self.conn.execute(
            "UPDATE comments SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now(), id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// 删除评论（回复随之删除）
    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM comments WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn batch_delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            &format!("DELETE FROM comments WHERE id IN ({})", placeholders(ids.len())),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<CommentStats> {
        self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(status = 'approved'), 0),
                    COALESCE(SUM(status = 'rejected'), 0)
             FROM comments",
            [],
            |row| {
                Ok(CommentStats {
                    total: row.get(0)?,
                    pending: row.get(1)?,
                    approved: row.get(2)?,
                    rejected: row.get(3)?,
                })
            },
        )
    }
}
