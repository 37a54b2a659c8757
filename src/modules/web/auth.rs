use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::HttpRequest;

use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::users::{NewUser, Role, User, UserDB};

pub const ADMIN_COOKIE: &str = "admin_token";
pub const USER_COOKIE: &str = "user_token";

pub fn user_db(config: &Config) -> BlogResult<UserDB> {
    Ok(UserDB::new(&config.database_path())?)
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token for this request: `Authorization: Bearer` first, then the cookie
/// matching the area (`admin_token` under `/admin`), then the other cookie.
pub fn request_token(req: &HttpRequest) -> Option<String> {
    if let Some(token) = bearer_token(req) {
        return Some(token);
    }
    let order = if req.path().starts_with("/admin") {
        [ADMIN_COOKIE, USER_COOKIE]
    } else {
        [USER_COOKIE, ADMIN_COOKIE]
    };
    order
        .iter()
        .filter_map(|name| req.cookie(name))
        .map(|c| c.value().to_string())
        .find(|v| !v.is_empty())
}

pub fn current_user(req: &HttpRequest, config: &Config) -> BlogResult<Option<User>> {
    let Some(token) = request_token(req) else {
        return Ok(None);
    };
    Ok(user_db(config)?.user_for_token(&token)?)
}

pub fn require_user(req: &HttpRequest, config: &Config) -> BlogResult<User> {
    current_user(req, config)?.ok_or(BlogError::Unauthorized)
}

pub fn require_admin(req: &HttpRequest, config: &Config) -> BlogResult<User> {
    let user = require_user(req, config)?;
    if !user.is_admin() {
        return Err(BlogError::Forbidden);
    }
    Ok(user)
}

/// Admin user for HTML pages; `None` means "send them to the login page"
pub fn admin_session(req: &HttpRequest, config: &Config) -> BlogResult<Option<User>> {
    Ok(current_user(req, config)?.filter(User::is_admin))
}

pub fn session_cookie(name: &'static str, token: String, config: &Config) -> Cookie<'static> {
    Cookie::build(name, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.server.cookie_secure)
        .max_age(Duration::hours(config.auth.session_ttl_hours.max(1)))
        .finish()
}

pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name, "")
        .path("/")
        .max_age(Duration::seconds(0))
        .finish()
}

/// Cookies for a fresh session; admins get both
pub fn login_cookies(user: &User, token: &str, config: &Config) -> Vec<Cookie<'static>> {
    let mut cookies = vec![session_cookie(USER_COOKIE, token.to_string(), config)];
    if user.is_admin() {
        cookies.push(session_cookie(ADMIN_COOKIE, token.to_string(), config));
    }
    cookies
}

/// End the request's session, if any
pub fn logout(req: &HttpRequest, config: &Config) -> BlogResult<()> {
    if let Some(token) = request_token(req) {
        user_db(config)?.delete_session(&token)?;
    }
    Ok(())
}

const SESSION_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Drop expired sessions once an hour for the life of the server
pub async fn sweep_sessions(config: Config) {
    let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        match user_db(&config).and_then(|db| Ok(db.purge_expired_sessions()?)) {
            Ok(0) => {}
            Ok(n) => log::info!("清理过期会话 {} 个", n),
            Err(e) => log::warn!("清理过期会话失败: {}", e),
        }
    }
}

/// Create the configured admin account when none exists yet
pub fn bootstrap_admin(config: &Config) -> BlogResult<Option<User>> {
    let db = user_db(config)?;
    if db.has_admin()? {
        return Ok(None);
    }
    let email = config.auth.admin_email.trim();
    let password = config.auth.admin_password.as_str();
    if email.is_empty() || password.is_empty() {
        log::warn!("尚未创建管理员账号，请在配置文件 [auth] 中设置 admin_email 与 admin_password");
        return Ok(None);
    }

    let user = db.upsert_user(&NewUser {
        username: config.auth.admin_username.clone(),
        email: email.to_string(),
        password: password.to_string(),
        role: Role::Admin,
    })?;
    log::info!("已创建管理员账号: {}", user.email);
    Ok(Some(user))
}

/// Only same-site relative paths are followed after login
pub fn safe_return_url(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => {
            url.to_string()
        }
        _ => "/".to_string(),
    }
}
