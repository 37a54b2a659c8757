use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

use crate::error::{BlogError, BlogResult};
use crate::schema::{now, open_connection};

/// 友情链接
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Friend {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub avatar: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FriendInput {
    pub name: Option<String>,
    pub url: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
}

const FRIEND_SELECT: &str =
    "SELECT id, name, url, avatar, description, created_at, updated_at FROM friends";

fn row_to_friend(row: &Row) -> Result<Friend> {
    Ok(Friend {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        avatar: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("http://") && url.len() > "http://".len())
        || (url.starts_with("https://") && url.len() > "https://".len())
}

fn check(name: &str, url: &str) -> BlogResult<()> {
    if name.is_empty() {
        return Err(BlogError::bad_request("名称不能为空"));
    }
    if !is_http_url(url) {
        return Err(BlogError::bad_request("链接必须以 http:// 或 https:// 开头"));
    }
    Ok(())
}

pub struct FriendDB {
    conn: Connection,
}

impl FriendDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    /// Oldest first, so long-standing links stay on top
    pub fn list(&self) -> Result<Vec<Friend>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY created_at ASC, id ASC", FRIEND_SELECT))?;
        let friends = stmt
            .query_map([], row_to_friend)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(friends)
    }

    pub fn get(&self, id: i64) -> Result<Option<Friend>> {
        self.conn
            .query_row(&format!("{} WHERE id = ?", FRIEND_SELECT), params![id], row_to_friend)
            .optional()
    }

    pub fn create(&self, input: &FriendInput) -> BlogResult<Friend> {
        let name = input.name.as_deref().unwrap_or("").trim();
        let url = input.url.as_deref().unwrap_or("").trim();
        check(name, url)?;
        let now = now();

        self.conn.execute(
            "INSERT INTO friends (name, url, avatar, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                name,
                url,
                input.avatar.as_deref().unwrap_or("").trim(),
                input.description.as_deref().unwrap_or("").trim(),
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get(id)?.ok_or_else(|| BlogError::not_found("友链"))
    }

    pub fn update(&self, id: i64, input: &FriendInput) -> BlogResult<Option<Friend>> {
        let Some(existing) = self.get(id)? else {
            return Ok(None);
        };
        let pick = |value: &Option<String>, current: String| {
            value
                .as_deref()
                .map(|v| v.trim().to_string())
                .unwrap_or(current)
        };
        let name = pick(&input.name, existing.name);
        let url = pick(&input.url, existing.url);
        let avatar = pick(&input.avatar, existing.avatar);
        let description = pick(&input.description, existing.description);
        check(&name, &url)?;

        self.conn.execute(
            "UPDATE friends SET name = ?, url = ?, avatar = ?, description = ?, updated_at = ? WHERE id = ?",
            params![name, url, avatar, description, now(), id],
        )?;
        Ok(self.get(id)?)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM friends WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM friends", [], |row| row.get(0))
    }
}
