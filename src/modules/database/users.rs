use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::schema::{now, open_connection};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// 用户（不包含密码字段）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub bio: Option<String>,
    pub nickname: Option<String>,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// 新建用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// 资料更新请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// GitHub 账号资料
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Why a profile update was refused
#[derive(Debug, PartialEq, Eq)]
pub enum ProfileError {
    WrongPassword,
    PasswordTooShort,
    EmptyUsername,
}

pub const MIN_PASSWORD_LEN: usize = 8;

const USER_COLUMNS: &str =
    "id, username, email, avatar, bio, nickname, role, created_at, updated_at";

fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        bio: row.get(4)?,
        nickname: row.get(5)?,
        role: Role::from_db(&role),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    if expected_hash.is_empty() {
        return false;
    }
    let actual = hash_password(password, salt);
    actual.as_bytes().ct_eq(expected_hash.as_bytes()).into()
}

fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// 用户与会话数据库
pub struct UserDB {
    conn: Connection,
}

impl UserDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    // ==================== 用户操作 ====================

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let salt = Uuid::new_v4().simple().to_string();
        let hash = hash_password(&user.password, &salt);
        let now = now();

        self.conn.execute(
            "INSERT INTO users (username, email, password_hash, password_salt, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.username.trim(),
                user.email.trim().to_lowercase(),
                hash,
                salt,
                user.role.as_str(),
                now,
                now
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
                params![email.trim().to_lowercase()],
                row_to_user,
            )
            .optional()
    }

    pub fn has_admin(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the account or, if the email exists, reset its password and role
    pub fn upsert_user(&self, user: &NewUser) -> Result<User> {
        match self.get_user_by_email(&user.email)? {
            Some(existing) => {
                let salt = Uuid::new_v4().simple().to_string();
                self.conn.execute(
                    "UPDATE users SET username = ?, password_hash = ?, password_salt = ?, role = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        user.username.trim(),
                        hash_password(&user.password, &salt),
                        salt,
                        user.role.as_str(),
                        now(),
                        existing.id
                    ],
                )?;
                self.get_user(existing.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
            }
            None => self.create_user(user),
        }
    }

    /// Check credentials; `None` for unknown email or wrong password alike
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let record: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash, password_salt FROM users WHERE email = ?",
                params![email.trim().to_lowercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match record {
            Some((id, hash, salt)) if verify_password(password, &salt, &hash) => self.get_user(id),
            _ => Ok(None),
        }
    }

    /// Checks every field first, then writes them in one transaction
    pub fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<std::result::Result<User, ProfileError>> {
        let username = update.username.as_deref().map(str::trim);
        if username == Some("") {
            return Ok(Err(ProfileError::EmptyUsername));
        }

        let new_password = update.new_password.as_deref().filter(|p| !p.is_empty());
        if let Some(new_password) = new_password {
            if new_password.chars().count() < MIN_PASSWORD_LEN {
                return Ok(Err(ProfileError::PasswordTooShort));
            }
            let (hash, salt): (String, String) = self.conn.query_row(
                "SELECT password_hash, password_salt FROM users WHERE id = ?",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let current = update.current_password.as_deref().unwrap_or("");
            if !verify_password(current, &salt, &hash) {
                return Ok(Err(ProfileError::WrongPassword));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        if let Some(new_password) = new_password {
            let salt = Uuid::new_v4().simple().to_string();
            tx.execute(
                "UPDATE users SET password_hash = ?, password_salt = ? WHERE id = ?",
                params![hash_password(new_password, &salt), salt, user_id],
            )?;
        }
        if let Some(username) = username {
            tx.execute(
                "UPDATE users SET username = ? WHERE id = ?",
                params![username, user_id],
            )?;
        }
        if let Some(nickname) = update.nickname.as_deref() {
            tx.execute(
                "UPDATE users SET nickname = ? WHERE id = ?",
                params![nickname.trim(), user_id],
            )?;
        }
        if let Some(avatar) = update.avatar.as_deref() {
            tx.execute(
                "UPDATE users SET avatar = ? WHERE id = ?",
                params![avatar.trim(), user_id],
            )?;
        }
        if let Some(bio) = update.bio.as_deref() {
            tx.execute("UPDATE users SET bio = ? WHERE id = ?", params![bio, user_id])?;
        }
        tx.execute(
            "UPDATE users SET updated_at = ? WHERE id = ?",
            params![now(), user_id],
        )?;
        tx.commit()?;

        let user = self.get_user(user_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(Ok(user))
    }

    pub fn set_avatar(&self, user_id: i64, avatar: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET avatar = ?, updated_at = ? WHERE id = ?",
            params![avatar.trim(), now(), user_id],
        )?;
        Ok(())
    }

    /// Find the account linked to a GitHub id, creating or linking it on first login
    pub fn upsert_github_user(&self, profile: &GithubProfile) -> Result<User> {
        let linked: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE github_id = ?",
                params![profile.id],
                |row| row.get(0),
            )
            .optional()?;

        let avatar = profile.avatar_url.clone().unwrap_or_default();
        let nickname = profile.name.clone().unwrap_or_else(|| profile.login.clone());

        if let Some(id) = linked {
            self.conn.execute(
                "UPDATE users SET avatar = ?, nickname = ?, updated_at = ? WHERE id = ?",
                params![avatar, nickname, now(), id],
            )?;
            return self.get_user(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows);
        }

        // GitHub emails are unverified, so they never link to an existing account.
        // A taken address falls back to a per-id noreply one.
        let noreply = format!("{}+{}@users.noreply.github.com", profile.login, profile.id).to_lowercase();
        let email = profile
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| noreply.clone());
        let email = if self.get_user_by_email(&email)?.is_some() {
            noreply
        } else {
            email
        };

        let now = now();
        self.conn.execute(
            "INSERT INTO users (username, email, avatar, bio, nickname, role, github_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'user', ?, ?, ?)",
            params![profile.login, email, avatar, profile.bio, nickname, profile.id, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
    }

    // ==================== 会话操作 ====================

    pub fn create_session(&self, user_id: i64, ttl_hours: i64) -> Result<String> {
        let token = generate_token();
        let created = chrono::Utc::now();
        let expires = created + chrono::Duration::hours(ttl_hours.max(1));

        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            params![token, user_id, created.to_rfc3339(), expires.to_rfc3339()],
        )?;
        Ok(token)
    }

    /// Resolve a session token; expired sessions are removed
    pub fn user_for_token(&self, token: &str) -> Result<Option<User>> {
        let record: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((user_id, expires_at)) = record else {
            return Ok(None);
        };

        let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t < chrono::Utc::now())
            .unwrap_or(true);
        if expired {
            self.delete_session(token)?;
            return Ok(None);
        }

        self.get_user(user_id)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?", params![token])?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?",
            params![chrono::Utc::now().to_rfc3339()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> (tempfile::TempDir, UserDB) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        let db = UserDB::new(&path.to_string_lossy()).unwrap();
        (dir, db)
    }

    fn admin() -> NewUser {
        NewUser {
            username: "admin".to_string(),
            email: "Admin@Example.com".to_string(),
            password: "correct horse".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_authenticate() {
        let (_dir, db) = db();
        let created = db.create_user(&admin()).unwrap();
        assert_eq!(created.email, "admin@example.com");
        assert!(db.has_admin().unwrap());

        let user = db.authenticate("admin@example.com", "correct horse").unwrap();
        assert_eq!(user.map(|u| u.id), Some(created.id));
        assert!(db.authenticate("admin@example.com", "wrong").unwrap().is_none());
        assert!(db.authenticate("nobody@example.com", "correct horse").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_dir, db) = db();
        db.create_user(&admin()).unwrap();
        let err = db.create_user(&admin()).unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[test]
    fn test_sessions() {
        let (_dir, db) = db();
        let user = db.create_user(&admin()).unwrap();
        let token = db.create_session(user.id, 24).unwrap();

        assert_eq!(db.user_for_token(&token).unwrap().map(|u| u.id), Some(user.id));
        assert!(db.user_for_token("bogus").unwrap().is_none());

        assert!(db.delete_session(&token).unwrap());
        assert!(db.user_for_token(&token).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_removed() {
        let (_dir, db) = db();
        let user = db.create_user(&admin()).unwrap();
        let token = db.create_session(user.id, 24).unwrap();
        db.conn
            .execute(
                "UPDATE sessions SET expires_at = ? WHERE token = ?",
                params!["2000-01-01T00:00:00+00:00", token],
            )
            .unwrap();

        assert!(db.user_for_token(&token).unwrap().is_none());
        assert!(!db.delete_session(&token).unwrap());
    }

    #[test]
    fn test_password_change_requires_current_password() {
        let (_dir, db) = db();
        let user = db.create_user(&admin()).unwrap();

        let wrong = ProfileUpdate {
            current_password: Some("nope".to_string()),
            new_password: Some("a much longer one".to_string()),
            ..Default::default()
        };
        assert_eq!(
            db.update_profile(user.id, &wrong).unwrap().unwrap_err(),
            ProfileError::WrongPassword
        );

        let short = ProfileUpdate {
            current_password: Some("correct horse".to_string()),
            new_password: Some("short".to_string()),
            ..Default::default()
        };
        assert_eq!(
            db.update_profile(user.id, &short).unwrap().unwrap_err(),
            ProfileError::PasswordTooShort
        );

        let ok = ProfileUpdate {
            nickname: Some("站长".to_string()),
            current_password: Some("correct horse".to_string()),
            new_password: Some("battery staple".to_string()),
            ..Default::default()
        };
        let updated = db.update_profile(user.id, &ok).unwrap().unwrap();
        assert_eq!(updated.display_name(), "站长");
        assert!(db.authenticate("admin@example.com", "battery staple").unwrap().is_some());
    }

    #[test]
    fn test_github_login_links_by_id() {
        let (_dir, db) = db();
        let profile = GithubProfile {
            id: 42,
            login: "octocat".to_string(),
            name: Some("The Octocat".to_string()),
            email: None,
            avatar_url: Some("https://avatars.githubusercontent.com/u/42".to_string()),
            bio: None,
        };

        let first = db.upsert_github_user(&profile).unwrap();
        assert_eq!(first.role, Role::User);
        assert_eq!(first.email, "octocat+42@users.noreply.github.com");

        let second = db.upsert_github_user(&profile).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.count_users().unwrap(), 1);
        // OAuth-only accounts have no usable password
        assert!(db.authenticate(&first.email, "").unwrap().is_none());
    }

    #[test]
    fn test_rejected_profile_update_changes_nothing() {
        let (_dir, db) = db();
        let user = db.create_user(&admin()).unwrap();

        let blank_name = ProfileUpdate {
            username: Some("   ".to_string()),
            nickname: Some("changed".to_string()),
            current_password: Some("correct horse".to_string()),
            new_password: Some("brand new secret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            db.update_profile(user.id, &blank_name).unwrap().unwrap_err(),
            ProfileError::EmptyUsername
        );
        assert!(db.authenticate("admin@example.com", "correct horse").unwrap().is_some());
        assert!(db.authenticate("admin@example.com", "brand new secret").unwrap().is_none());
        let unchanged = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(unchanged.nickname, user.nickname);
    }

    #[test]
    fn test_github_email_never_claims_existing_account() {
        let (_dir, db) = db();
        let owner = db.create_user(&admin()).unwrap();
        let profile = GithubProfile {
            id: 7,
            login: "Mallory".to_string(),
            name: None,
            email: Some("ADMIN@example.com".to_string()),
            avatar_url: None,
            bio: None,
        };

        let user = db.upsert_github_user(&profile).unwrap();
        assert_ne!(user.id, owner.id);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.email, "mallory+7@users.noreply.github.com");
        assert!(db.get_user(owner.id).unwrap().unwrap().is_admin());

        // Later logins find the same account by id
        assert_eq!(db.upsert_github_user(&profile).unwrap().id, user.id);
    }
}
