//! Public HTML pages.
//!
//! Each handler builds its page in a plain function returning `BlogResult`;
//! failures are rendered with the error template instead of the JSON envelope.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::api::account::login_with_password;
use crate::api::posts::visible_post;
use crate::auth::{
    current_user, login_cookies, logout as end_session, removal_cookie, safe_return_url,
    ADMIN_COOKIE, USER_COOKIE,
};
use crate::collections::{CollectionDB, CollectionKind, CollectionQuery, COLLECTION_SORTABLE};
use crate::comments::{build_comment_tree, CommentDB, CommentStatus, NewComment};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::friends::FriendDB;
use crate::hitokoto::HitokotoDB;
use crate::markdown::{extract_toc, render_markdown};
use crate::pagination::{PageNav, PageParams, PageQuery};
use crate::posts::{PostDB, PostListQuery, StatusFilter, POST_SORTABLE};
use crate::response::{html, see_other, with_notice};
use crate::tags::TagDB;
use crate::templates::{Choice, TemplateRenderer};
use crate::users::User;

const HOME_POSTS: u32 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct Notice {
    pub msg: Option<String>,
}

pub(crate) fn notice(req: &HttpRequest) -> Option<String> {
    web::Query::<Notice>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().msg)
}

/// Render an error page with the error's status code
pub fn error_page(renderer: &TemplateRenderer, err: &BlogError, user: Option<&User>) -> HttpResponse {
    let status = err.status_code();
    if status.is_server_error() {
        log::error!("{}", err);
    }
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(renderer.render_error(status.as_u16(), &err.public_message(), user))
}

fn respond(renderer: &TemplateRenderer, result: BlogResult<HttpResponse>) -> HttpResponse {
    result.unwrap_or_else(|err| error_page(renderer, &err, None))
}

pub(crate) fn kind_choices() -> Vec<Choice> {
    CollectionKind::ALL
        .iter()
        .map(|k| Choice {
            value: k.as_str(),
            label: k.label(),
        })
        .collect()
}

fn index_page(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let path = config.database_path();
    let params = PageParams {
        page_size: Some(HOME_POSTS),
        ..Default::default()
    };
    let query = PostListQuery {
        page: PageQuery::from_params(&params, &config.pagination, POST_SORTABLE),
        tag: None,
        status: StatusFilter::Published,
    };
    let (posts, total) = PostDB::new(&path)?.list(&query)?;
    let tags: Vec<_> = TagDB::new(&path)?
        .list()?
        .into_iter()
        .filter(|t| t.count > 0)
        .collect();

    let mut context = renderer.base_context(user.as_ref(), notice(req).as_deref());
    context.insert("posts", &posts);
    context.insert("total", &total);
    context.insert("tags", &tags);
    context.insert("hitokoto", &HitokotoDB::new(&path)?.random()?);
    Ok(html(renderer.render("index.html", &context)?))
}

pub async fn index(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(&renderer, index_page(&req, &config, &renderer))
}

#[derive(Debug, Default, Deserialize)]
pub struct PostSearch {
    pub tag: Option<String>,
    pub q: Option<String>,
}

fn posts_page(
    req: &HttpRequest,
    config: &Config,
    renderer: &TemplateRenderer,
    params: PageParams,
    search: &PostSearch,
) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let path = config.database_path();
    let q = search
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string);
    let params = PageParams {
        search: q.clone().or(params.search),
        ..params
    };
    let tags = TagDB::new(&path)?;
    let tag = match search.tag.as_deref().filter(|t| !t.is_empty()) {
        Some(key) => Some(tags.find(key)?.ok_or_else(|| BlogError::not_found("标签"))?),
        None => None,
    };

    let query = PostListQuery {
        page: PageQuery::from_params(&params, &config.pagination, POST_SORTABLE),
        tag: tag.as_ref().map(|t| t.slug.clone()),
        status: StatusFilter::Published,
    };
    let (posts, total) = PostDB::new(&path)?.list(&query)?;

    let mut page_base = String::from("/posts?");
    if let Some(tag) = &tag {
        page_base.push_str(&format!("tag={}&", urlencoding::encode(&tag.slug)));
    }
    if let Some(q) = &q {
        page_base.push_str(&format!("q={}&", urlencoding::encode(q)));
    }

    let mut context = renderer.base_context(user.as_ref(), notice(req).as_deref());
    context.insert("posts", &posts);
    context.insert("nav", &PageNav::new(&query.page, total));
    context.insert("page_base", &page_base);
    context.insert("tag", &tag);
    context.insert("q", &q.unwrap_or_default());
    context.insert("tags", &tags.list()?);
    Ok(html(renderer.render("posts.html", &context)?))
}

pub async fn posts(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
    search: web::Query<PostSearch>,
) -> HttpResponse {
    respond(
        &renderer,
        posts_page(&req, &config, &renderer, params.into_inner(), &search),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplyTo {
    pub reply: Option<i64>,
}

fn post_page(
    req: &HttpRequest,
    config: &Config,
    renderer: &TemplateRenderer,
    key: &str,
    reply: Option<i64>,
) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let admin = user.as_ref().map(User::is_admin).unwrap_or(false);
    let db = PostDB::new(&config.database_path())?;
    let mut post = visible_post(&db, key, admin)?;
    db.increment_views(post.id)?;
    post.view_count += 1;

    let comments: Vec<_> = CommentDB::new(&config.database_path())?
        .list_for_post(post.id, false)?
        .iter()
        .map(|c| c.to_public())
        .collect();

    let mut context = renderer.base_context(user.as_ref(), notice(req).as_deref());
    context.insert("content_html", &render_markdown(&post.content));
    context.insert("toc", &extract_toc(&post.content));
    context.insert("comments", &build_comment_tree(comments));
    context.insert("reply_to", &reply);
    context.insert("comments_require_approval", &(config.comments.require_approval && !admin));
    context.insert("comment_max_length", &config.comments.max_length);
    context.insert("post", &post);
    Ok(html(renderer.render("post.html", &context)?))
}

pub async fn post_detail(
    req: HttpRequest,
    path: web::Path<String>,
    reply: web::Query<ReplyTo>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(
        &renderer,
        post_page(&req, &config, &renderer, &path.into_inner(), reply.reply),
    )
}

/// Form post from the comment box; always redirects back to the post
pub async fn submit_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<NewComment>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let post_id = path.into_inner();
    let back = format!("/posts/{}", post_id);
    let result = current_user(&req, &config).and_then(|user| {
        CommentDB::new(&config.database_path())?.create(post_id, &form, user.as_ref(), &config.comments)
    });
    match result {
        Ok(comment) if comment.status == CommentStatus::Approved => {
            see_other(&format!("{}#comment-{}", with_notice(&back, "评论已发布"), comment.id))
        }
        Ok(_) => see_other(&format!("{}#comment-form", with_notice(&back, "评论已提交，审核通过后显示"))),
        Err(BlogError::BadRequest(message)) => {
            see_other(&format!("{}#comment-form", with_notice(&back, &message)))
        }
        Err(err) => error_page(&renderer, &err, None),
    }
}

pub async fn like(
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let id = path.into_inner();
    let result = PostDB::new(&config.database_path())
        .map_err(BlogError::from)
        .and_then(|db| Ok(db.like(id)?));
    match result {
        Ok(Some(_)) => see_other(&with_notice(&format!("/posts/{}", id), "感谢点赞！")),
        Ok(None) => error_page(&renderer, &BlogError::not_found("文章"), None),
        Err(err) => error_page(&renderer, &err, None),
    }
}

fn archive_page(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let mut context = renderer.base_context(user.as_ref(), None);
    context.insert("years", &PostDB::new(&config.database_path())?.archive()?);
    Ok(html(renderer.render("archive.html", &context)?))
}

pub async fn archive(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(&renderer, archive_page(&req, &config, &renderer))
}

#[derive(Debug, Default, Deserialize)]
pub struct ShelfKind {
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
}

fn books_page(
    req: &HttpRequest,
    config: &Config,
    renderer: &TemplateRenderer,
    params: &PageParams,
    kind: Option<CollectionKind>,
) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let query = CollectionQuery {
        page: PageQuery::from_params(params, &config.pagination, COLLECTION_SORTABLE),
        kind,
        status: None,
    };
    let (items, total) = CollectionDB::new(&config.database_path())?.list(&query)?;
    let page_base = match kind {
        Some(k) => format!("/books?type={}&", k.as_str()),
        None => "/books?".to_string(),
    };

    let mut context = renderer.base_context(user.as_ref(), None);
    context.insert("items", &items);
    context.insert("nav", &PageNav::new(&query.page, total));
    context.insert("page_base", &page_base);
    context.insert("kinds", &kind_choices());
    context.insert("kind", &kind.map(|k| k.as_str()).unwrap_or(""));
    Ok(html(renderer.render("books.html", &context)?))
}

pub async fn books(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
    kind: web::Query<ShelfKind>,
) -> HttpResponse {
    let kind = kind.kind.as_deref().and_then(CollectionKind::parse);
    respond(&renderer, books_page(&req, &config, &renderer, &params, kind))
}

fn friends_page(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let mut context = renderer.base_context(user.as_ref(), None);
    context.insert("friends", &FriendDB::new(&config.database_path())?.list()?);
    Ok(html(renderer.render("friends.html", &context)?))
}

pub async fn friends(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(&renderer, friends_page(&req, &config, &renderer))
}

fn hitokoto_page(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let mut context = renderer.base_context(user.as_ref(), None);
    context.insert("quotes", &HitokotoDB::new(&config.database_path())?.list()?);
    Ok(html(renderer.render("hitokoto.html", &context)?))
}

pub async fn hitokoto(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(&renderer, hitokoto_page(&req, &config, &renderer))
}

fn about_page(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer) -> BlogResult<HttpResponse> {
    let user = current_user(req, config)?;
    let mut context = renderer.base_context(user.as_ref(), None);
    context.insert("about_html", &render_markdown(&config.site.about));
    Ok(html(renderer.render("about.html", &context)?))
}

pub async fn about(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    respond(&renderer, about_page(&req, &config, &renderer))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnTo {
    #[serde(rename = "returnUrl", alias = "return_url")]
    pub return_url: Option<String>,
}

fn login_form(
    config: &Config,
    renderer: &TemplateRenderer,
    return_url: &str,
    error: Option<&str>,
) -> BlogResult<String> {
    let mut context = renderer.base_context(None, None);
    context.insert("return_url", return_url);
    context.insert("error", &error);
    context.insert("github_enabled", &config.github.is_enabled());
    Ok(renderer.render("login.html", &context)?)
}

pub async fn login_page(
    query: web::Query<ReturnTo>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let return_url = safe_return_url(query.return_url.as_deref());
    respond(&renderer, login_form(&config, &renderer, &return_url, None).map(html))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub return_url: Option<String>,
}

pub async fn login_submit(
    form: web::Form<LoginForm>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let return_url = safe_return_url(form.return_url.as_deref());
    match login_with_password(&config, &form.email, &form.password) {
        Ok((token, user)) => {
            let target = if return_url == "/" && user.is_admin() {
                "/admin".to_string()
            } else {
                return_url
            };
            let mut response = HttpResponse::SeeOther();
            response.insert_header((header::LOCATION, target));
            for cookie in login_cookies(&user, &token, &config) {
                response.cookie(cookie);
            }
            response.finish()
        }
        Err(BlogError::Unauthorized) => {
            let page = login_form(&config, &renderer, &return_url, Some("邮箱或密码错误"));
            match page {
                Ok(body) => HttpResponse::Unauthorized()
                    .content_type("text/html; charset=utf-8")
                    .body(body),
                Err(err) => error_page(&renderer, &err, None),
            }
        }
        Err(err) => error_page(&renderer, &err, None),
    }
}

/// Clear the session and both cookies, then go home
pub async fn logout(req: HttpRequest, config: web::Data<Config>) -> HttpResponse {
    if let Err(err) = end_session(&req, &config) {
        log::error!("退出登录失败: {}", err);
    }
    let mut response = HttpResponse::SeeOther();
    response.insert_header((header::LOCATION, "/"));
    for name in [USER_COOKIE, ADMIN_COOKIE] {
        response.cookie(removal_cookie(name));
    }
    response.finish()
}

/// Landing page after GitHub sign-in
pub async fn auth_callback(
    req: HttpRequest,
    query: web::Query<ReturnTo>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let result = current_user(&req, &config).and_then(|user| {
        let mut context = renderer.base_context(user.as_ref(), None);
        context.insert("return_url", &safe_return_url(query.return_url.as_deref()));
        Ok(html(renderer.render("auth_callback.html", &context)?))
    });
    respond(&renderer, result)
}

/// Fallback for unmatched routes: JSON under `/api`, an HTML page elsewhere
pub async fn not_found(req: HttpRequest, renderer: web::Data<TemplateRenderer>) -> HttpResponse {
    let err = BlogError::NotFound("页面不存在".to_string());
    if req.path().starts_with("/api/") {
        return err.error_response();
    }
    error_page(&renderer, &err, None)
}
