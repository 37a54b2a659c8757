use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{
    login_cookies, logout as end_session, removal_cookie, require_user, safe_return_url,
    session_cookie, user_db, ADMIN_COOKIE, USER_COOKIE,
};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::images::ImageDB;
use crate::response::{ok, ok_message};
use crate::upload::read_file_field;
use crate::users::{GithubProfile, ProfileError, ProfileUpdate, User};

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Check credentials and open a session
pub fn login_with_password(config: &Config, email: &str, password: &str) -> BlogResult<(String, User)> {
    let db = user_db(config)?;
    match db.authenticate(email.trim(), password)? {
        Some(user) => {
            let token = db.create_session(user.id, config.auth.session_ttl_hours)?;
            log::info!("用户登录: {}", user.email);
            Ok((token, user))
        }
        None => {
            log::warn!("登录失败: {}", email.trim());
            Err(BlogError::Unauthorized)
        }
    }
}

pub async fn login(body: web::Json<LoginRequest>, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let (token, user) = match login_with_password(&config, &body.email, &body.password) {
        Ok(session) => session,
        Err(BlogError::Unauthorized) => {
            return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "code": 401,
                "message": "邮箱或密码错误",
                "data": null
            })))
        }
        Err(e) => return Err(e),
    };

    let mut response = ok(serde_json::json!({ "token": token, "user": user }));
    for cookie in login_cookies(&user, &token, &config) {
        response.add_cookie(&cookie).map_err(|e| BlogError::bad_request(e.to_string()))?;
    }
    Ok(response)
}

pub async fn logout(req: HttpRequest, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    require_user(&req, &config)?;
    end_session(&req, &config)?;
    let mut response = ok_message("已退出登录");
    for name in [USER_COOKIE, ADMIN_COOKIE] {
        response
            .add_removal_cookie(&removal_cookie(name))
            .map_err(|e| BlogError::bad_request(e.to_string()))?;
    }
    Ok(response)
}

pub async fn me(req: HttpRequest, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    Ok(ok(require_user(&req, &config)?))
}

pub async fn update_me(
    req: HttpRequest,
    body: web::Json<ProfileUpdate>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let user = require_user(&req, &config)?;
    match user_db(&config)?.update_profile(user.id, &body)? {
        Ok(updated) => Ok(ok(updated)),
        Err(ProfileError::WrongPassword) => Err(BlogError::bad_request("当前密码不正确")),
        Err(ProfileError::PasswordTooShort) => Err(BlogError::bad_request(format!(
            "新密码至少需要 {} 个字符",
            crate::users::MIN_PASSWORD_LEN
        ))),
        Err(ProfileError::EmptyUsername) => Err(BlogError::bad_request("用户名不能为空")),
    }
}

pub async fn upload_avatar(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let user = require_user(&req, &config)?;
    let file = read_file_field(&mut payload, &["avatar"], config.uploads.max_size_bytes).await?;
    let image = ImageDB::new(&config.database_path())?.save_upload(
        &config.paths.uploads_dir,
        &config.uploads,
        &file.filename,
        &file.data,
        Some(user.id),
    )?;
    let db = user_db(&config)?;
    db.set_avatar(user.id, &image.url)?;
    let user = db.get_user(user.id)?.ok_or_else(|| BlogError::not_found("用户"))?;
    Ok(ok(serde_json::json!({ "url": image.url, "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct GithubStart {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GithubCallback {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: Option<String>,
    error_description: Option<String>,
}

/// GitHub's authorize URL, carrying the return path in `state`
pub fn github_authorize_url(config: &Config, return_url: &str) -> String {
    let mut url = format!(
        "{}?client_id={}&scope={}&state={}",
        GITHUB_AUTHORIZE_URL,
        urlencoding::encode(&config.github.client_id),
        urlencoding::encode("read:user user:email"),
        urlencoding::encode(return_url),
    );
    if !config.github.redirect_url.is_empty() {
        url.push_str("&redirect_uri=");
        url.push_str(&urlencoding::encode(&config.github.redirect_url));
    }
    url
}

/// Trade an authorization code for the GitHub profile and a local session
pub async fn github_login(config: &Config, code: &str) -> BlogResult<(String, User)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.proxy.timeout_secs))
        .user_agent("toy_blog")
        .build()?;

    let token: AccessToken = client
        .post(GITHUB_TOKEN_URL)
        .header(header::ACCEPT.as_str(), "application/json")
        .form(&[
            ("client_id", config.github.client_id.as_str()),
            ("client_secret", config.github.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.github.redirect_url.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let Some(access_token) = token.access_token else {
        let reason = token.error_description.unwrap_or_default();
        log::warn!("GitHub 授权失败: {}", reason);
        return Err(BlogError::bad_request("GitHub 授权失败"));
    };

    let profile: GithubProfile = client
        .get(GITHUB_USER_URL)
        .bearer_auth(access_token)
        .header(header::ACCEPT.as_str(), "application/vnd.github+json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let db = user_db(config)?;
    let user = db.upsert_github_user(&profile)?;
    let session = db.create_session(user.id, config.auth.session_ttl_hours)?;
    log::info!("GitHub 用户登录: {} ({})", profile.login, user.id);
    Ok((session, user))
}

pub async fn github_start(
    query: web::Query<GithubStart>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    if !config.github.is_enabled() {
        return Err(BlogError::not_found("GitHub 登录"));
    }
    let return_url = safe_return_url(query.return_url.as_deref());
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, github_authorize_url(&config, &return_url)))
        .finish())
}

pub async fn github_callback(
    query: web::Query<GithubCallback>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    if !config.github.is_enabled() {
        return Err(BlogError::not_found("GitHub 登录"));
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| BlogError::bad_request("缺少授权码"))?;
    let (token, _user) = github_login(&config, code).await?;

    let target = safe_return_url(query.state.as_deref());
    let landing = format!("/auth/callback?returnUrl={}", urlencoding::encode(&target));
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, landing))
        .cookie(session_cookie(USER_COOKIE, token, &config))
        .finish())
}
