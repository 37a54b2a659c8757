//! 管理后台页面
//!
//! Every page needs an admin session; without one the browser is sent to
//! `/login`. Form posts answer with a 303 back to the list they came from.

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tera::Context;

use crate::api::stats::DashboardStats;
use crate::api::tags::conflict_on_duplicate;
use crate::auth::admin_session;
use crate::collections::{
    CollectionDB, CollectionInput, CollectionKind, CollectionQuery, ShelfStatus, COLLECTION_SORTABLE,
};
use crate::comments::{CommentDB, CommentStatus};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::friends::{FriendDB, FriendInput};
use crate::hitokoto::{HitokotoDB, HitokotoInput};
use crate::images::{ImageDB, IMAGE_SORTABLE};
use crate::pagination::{PageNav, PageParams, PageQuery};
use crate::pages::{self, error_page, kind_choices, notice};
use crate::posts::{
    Post, PostDB, PostInput, PostListQuery, PostStatus, StatusFilter, TagRef, POST_SORTABLE,
};
use crate::response::{html, see_other, with_notice};
use crate::tags::{TagDB, TagInput};
use crate::templates::TemplateRenderer;
use crate::upload::read_file_field;
use crate::users::User;

const RECENT_ITEMS: u32 = 5;

/// Run `page` for an admin, or redirect to the login page
fn guarded<F>(req: &HttpRequest, config: &Config, renderer: &TemplateRenderer, page: F) -> HttpResponse
where
    F: FnOnce(&User) -> BlogResult<HttpResponse>,
{
    match admin_session(req, config) {
        Ok(Some(admin)) => page(&admin).unwrap_or_else(|err| error_page(renderer, &err, Some(&admin))),
        Ok(None) => {
            let back = format!("/login?returnUrl={}", urlencoding::encode(&request_target(req)));
            see_other(&back)
        }
        Err(err) => error_page(renderer, &err, None),
    }
}

fn request_target(req: &HttpRequest) -> String {
    if req.method() == actix_web::http::Method::GET {
        req.uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/admin".to_string())
    } else {
        "/admin".to_string()
    }
}

fn admin_context(renderer: &TemplateRenderer, req: &HttpRequest, admin: &User, active: &str) -> Context {
    let mut context = renderer.base_context(Some(admin), notice(req).as_deref());
    context.insert("active", active);
    context
}

/// `ids` values of a urlencoded form; repeated keys are kept
fn form_ids(body: &[u8]) -> Vec<i64> {
    url::form_urlencoded::parse(body)
        .filter(|(key, _)| key == "ids" || key == "ids[]")
        .filter_map(|(_, value)| value.trim().parse().ok())
        .collect()
}

/// Redirect to `location`, reporting a validation failure as a notice
fn back_with<T>(location: &str, result: BlogResult<T>, done: &str) -> BlogResult<HttpResponse> {
    match result {
        Ok(_) => Ok(see_other(&with_notice(location, done))),
        Err(BlogError::BadRequest(message)) | Err(BlogError::Conflict(message)) => {
            Ok(see_other(&with_notice(location, &message)))
        }
        Err(err) => Err(err),
    }
}

// ==================== 仪表盘 ====================

pub async fn dashboard(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let params = PageParams {
            page_size: Some(RECENT_ITEMS),
            sort_by: Some("updated_at".to_string()),
            ..Default::default()
        };
        let query = PostListQuery {
            page: PageQuery::from_params(&params, &config.pagination, POST_SORTABLE),
            tag: None,
            status: StatusFilter::All,
        };
        let (recent_posts, _) = PostDB::new(&config.database_path())?.list(&query)?;
        let recent_comments = CommentDB::new(&config.database_path())?.recent(RECENT_ITEMS)?;

        let mut context = admin_context(&renderer, &req, admin, "dashboard");
        context.insert("stats", &DashboardStats::collect(&config)?);
        context.insert("recent_posts", &recent_posts);
        context.insert("recent_comments", &recent_comments);
        Ok(html(renderer.render("admin/dashboard.html", &context)?))
    })
}

// ==================== 文章 ====================

#[derive(Debug, Default, Deserialize)]
pub struct PostStatusParam {
    pub status: Option<String>,
}

pub async fn posts(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
    filter: web::Query<PostStatusParam>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let status = StatusFilter::parse(filter.status.as_deref().or(Some("all")));
        let query = PostListQuery {
            page: PageQuery::from_params(&params, &config.pagination, POST_SORTABLE),
            tag: None,
            status,
        };
        let (posts, total) = PostDB::new(&config.database_path())?.list(&query)?;

        let status_name = match status {
            StatusFilter::Published => "published",
            StatusFilter::Draft => "draft",
            StatusFilter::All => "all",
        };
        let q = query.page.search.clone().unwrap_or_default();
        let page_base = format!(
            "/admin/posts?status={}&search={}&",
            status_name,
            urlencoding::encode(&q)
        );

        let mut context = admin_context(&renderer, &req, admin, "posts");
        context.insert("posts", &posts);
        context.insert("nav", &PageNav::new(&query.page, total));
        context.insert("page_base", &page_base);
        context.insert("status", status_name);
        context.insert("q", &q);
        Ok(html(renderer.render("admin/posts.html", &context)?))
    })
}

#[derive(Debug, Default, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub cover: String,
    pub status: String,
    pub tags: String,
}

impl PostForm {
    fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            slug: post.slug.clone(),
            content: post.content.clone(),
            excerpt: post.excerpt.clone(),
            cover: post.cover.clone(),
            status: post.status.as_str().to_string(),
            tags: post
                .tags
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn to_input(&self) -> PostInput {
        let tags = self
            .tags
            .split(|c| c == ',' || c == '，')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| TagRef::Name(t.to_string()))
            .collect();
        PostInput {
            title: Some(self.title.clone()),
            slug: Some(self.slug.clone()),
            content: Some(self.content.clone()),
            excerpt: Some(self.excerpt.clone()),
            cover: Some(self.cover.clone()),
            status: Some(if self.status == "published" {
                PostStatus::Published
            } else {
                PostStatus::Draft
            }),
            tags: Some(tags),
            created_at: None,
        }
    }
}

fn render_post_form(
    renderer: &TemplateRenderer,
    req: &HttpRequest,
    admin: &User,
    form: Option<&PostForm>,
    editing: Option<i64>,
    error: Option<&str>,
) -> BlogResult<HttpResponse> {
    let mut context = admin_context(renderer, req, admin, "posts");
    context.insert("post", &form);
    context.insert("tags_text", &form.map(|f| f.tags.as_str()).unwrap_or(""));
    context.insert("editing", &editing.is_some());
    context.insert(
        "action",
        &match editing {
            Some(id) => format!("/admin/posts/{}", id),
            None => "/admin/posts".to_string(),
        },
    );
    context.insert("error", &error);
    Ok(html(renderer.render("admin/post_form.html", &context)?))
}

pub async fn new_post(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        render_post_form(&renderer, &req, admin, None, None, None)
    })
}

pub async fn create_post(
    req: HttpRequest,
    form: web::Form<PostForm>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let db = PostDB::new(&config.database_path())?;
        match db.create(&form.to_input(), Some(admin.id)) {
            Ok(post) => Ok(see_other(&with_notice("/admin/posts", &format!("已创建《{}》", post.title)))),
            Err(BlogError::BadRequest(message)) => {
                render_post_form(&renderer, &req, admin, Some(&*form), None, Some(&message))
            }
            Err(err) => Err(err),
        }
    })
}

pub async fn edit_post(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let id = path.into_inner();
    guarded(&req, &config, &renderer, |admin| {
        let post = PostDB::new(&config.database_path())?
            .get(id)?
            .ok_or_else(|| BlogError::not_found("文章"))?;
        let form = PostForm::from_post(&post);
        render_post_form(&renderer, &req, admin, Some(&form), Some(id), None)
    })
}

pub async fn update_post(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<PostForm>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let id = path.into_inner();
    guarded(&req, &config, &renderer, |admin| {
        let db = PostDB::new(&config.database_path())?;
        match db.update(id, &form.to_input()) {
            Ok(Some(post)) => Ok(see_other(&with_notice("/admin/posts", &format!("已保存《{}》", post.title)))),
            Ok(None) => Err(BlogError::not_found("文章")),
            Err(BlogError::BadRequest(message)) => {
                render_post_form(&renderer, &req, admin, Some(&*form), Some(id), Some(&message))
            }
            Err(err) => Err(err),
        }
    })
}

pub async fn delete_post(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        PostDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/posts", "文章已删除")))
    })
}

pub async fn batch_delete_posts(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let deleted = PostDB::new(&config.database_path())?.batch_delete(&form_ids(&body))?;
        Ok(see_other(&with_notice("/admin/posts", &format!("已删除 {} 篇文章", deleted))))
    })
}

// ==================== 评论 ====================

pub async fn comments(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
    filter: web::Query<PostStatusParam>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let status = filter.status.as_deref().and_then(CommentStatus::parse);
        let page = PageQuery::from_params(&params, &config.pagination, &["created_at"]);
        let db = CommentDB::new(&config.database_path())?;
        let (comments, total) = db.list_all(status, &page)?;
        let page_base = match status {
            Some(s) => format!("/admin/comments?status={}&", s.as_str()),
            None => "/admin/comments?".to_string(),
        };

        let mut context = admin_context(&renderer, &req, admin, "comments");
        context.insert("comments", &comments);
        context.insert("stats", &db.stats()?);
        context.insert("status", &status.map(|s| s.as_str()));
        context.insert("nav", &PageNav::new(&page, total));
        context.insert("page_base", &page_base);
        Ok(html(renderer.render("admin/comments.html", &context)?))
    })
}

fn moderate(
    req: &HttpRequest,
    config: &Config,
    renderer: &TemplateRenderer,
    id: i64,
    status: CommentStatus,
    done: &str,
) -> HttpResponse {
    guarded(req, config, renderer, |_| {
        CommentDB::new(&config.database_path())?
            .set_status(id, status)?
            .ok_or_else(|| BlogError::not_found("评论"))?;
        Ok(see_other(&with_notice("/admin/comments", done)))
    })
}

pub async fn approve_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    moderate(&req, &config, &renderer, path.into_inner(), CommentStatus::Approved, "评论已通过")
}

pub async fn reject_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    moderate(&req, &config, &renderer, path.into_inner(), CommentStatus::Rejected, "评论已拒绝")
}

pub async fn delete_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        CommentDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/comments", "评论已删除")))
    })
}

pub async fn batch_delete_comments(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let deleted = CommentDB::new(&config.database_path())?.batch_delete(&form_ids(&body))?;
        Ok(see_other(&with_notice("/admin/comments", &format!("已删除 {} 条评论", deleted))))
    })
}

// ==================== 标签 ====================

pub async fn tags(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let mut context = admin_context(&renderer, &req, admin, "tags");
        context.insert("tags", &TagDB::new(&config.database_path())?.list()?);
        Ok(html(renderer.render("admin/tags.html", &context)?))
    })
}

pub async fn create_tag(
    req: HttpRequest,
    form: web::Form<TagInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = TagDB::new(&config.database_path())?
            .create(&form)
            .map_err(conflict_on_duplicate)
            .and_then(|tag| tag.ok_or_else(|| BlogError::bad_request("标签名称不能为空")));
        back_with("/admin/tags", result, "标签已创建")
    })
}

pub async fn update_tag(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<TagInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = TagDB::new(&config.database_path())?
            .update(path.into_inner(), &form)
            .map_err(conflict_on_duplicate)
            .and_then(|tag| tag.ok_or_else(|| BlogError::not_found("标签")));
        back_with("/admin/tags", result, "标签已保存")
    })
}

pub async fn delete_tag(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        TagDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/tags", "标签已删除")))
    })
}

// ==================== 一言 ====================

pub async fn hitokoto(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let mut context = admin_context(&renderer, &req, admin, "hitokoto");
        context.insert("quotes", &HitokotoDB::new(&config.database_path())?.list()?);
        Ok(html(renderer.render("admin/hitokoto.html", &context)?))
    })
}

pub async fn create_hitokoto(
    req: HttpRequest,
    form: web::Form<HitokotoInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = HitokotoDB::new(&config.database_path())?.create(&form);
        back_with("/admin/hitokoto", result, "已添加")
    })
}

pub async fn update_hitokoto(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<HitokotoInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = HitokotoDB::new(&config.database_path())?
            .update(path.into_inner(), &form)
            .and_then(|item| item.ok_or_else(|| BlogError::not_found("一言")));
        back_with("/admin/hitokoto", result, "已保存")
    })
}

pub async fn delete_hitokoto(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        HitokotoDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/hitokoto", "已删除")))
    })
}

// ==================== 书影音 ====================

#[derive(Debug, Default, Deserialize)]
pub struct ShelfParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub async fn books(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
    shelf: web::Query<ShelfParams>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let kind = shelf.kind.as_deref().and_then(CollectionKind::parse);
        let query = CollectionQuery {
            page: PageQuery::from_params(&params, &config.pagination, COLLECTION_SORTABLE),
            kind,
            status: None,
        };
        let (items, total) = CollectionDB::new(&config.database_path())?.list(&query)?;
        let q = query.page.search.clone().unwrap_or_default();
        let page_base = format!(
            "/admin/books?type={}&search={}&",
            kind.map(|k| k.as_str()).unwrap_or(""),
            urlencoding::encode(&q)
        );

        let mut context = admin_context(&renderer, &req, admin, "books");
        context.insert("items", &items);
        context.insert("nav", &PageNav::new(&query.page, total));
        context.insert("page_base", &page_base);
        context.insert("kinds", &kind_choices());
        context.insert("kind", &kind.map(|k| k.as_str()).unwrap_or(""));
        context.insert("q", &q);
        Ok(html(renderer.render("admin/books.html", &context)?))
    })
}

/// Book form fields as posted; numbers arrive as possibly-empty text
#[derive(Debug, Default, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BookForm {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover: String,
    pub publisher: String,
    pub publish_date: String,
    pub isbn: String,
    pub pages: String,
    pub status: String,
    pub rating: String,
    pub link: String,
}

fn optional_text(value: &str) -> Option<String> {
    Some(value.trim().to_string())
}

fn optional_number(field: &str, value: &str) -> BlogResult<Option<i64>> {
    match value.trim() {
        "" => Ok(None),
        text => text
            .parse()
            .map(Some)
            .map_err(|_| BlogError::bad_request(format!("{}必须是数字", field))),
    }
}

impl BookForm {
    fn to_input(&self) -> BlogResult<CollectionInput> {
        Ok(CollectionInput {
            kind: CollectionKind::parse(&self.kind),
            title: Some(self.title.trim().to_string()),
            author: optional_text(&self.author),
            description: optional_text(&self.description),
            cover: optional_text(&self.cover),
            publisher: optional_text(&self.publisher),
            publish_date: optional_text(&self.publish_date),
            isbn: optional_text(&self.isbn),
            pages: optional_number("页数", &self.pages)?,
            status: ShelfStatus::parse(&self.status),
            rating: optional_number("评分", &self.rating)?,
            link: optional_text(&self.link),
        })
    }
}

fn render_book_form(
    renderer: &TemplateRenderer,
    req: &HttpRequest,
    admin: &User,
    item: Option<serde_json::Value>,
    editing: Option<i64>,
    error: Option<&str>,
) -> BlogResult<HttpResponse> {
    let mut context = admin_context(renderer, req, admin, "books");
    context.insert("item", &item);
    context.insert("kinds", &kind_choices());
    context.insert("editing", &editing.is_some());
    context.insert(
        "action",
        &match editing {
            Some(id) => format!("/admin/books/{}", id),
            None => "/admin/books".to_string(),
        },
    );
    context.insert("error", &error);
    Ok(html(renderer.render("admin/book_form.html", &context)?))
}

pub async fn new_book(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        render_book_form(&renderer, &req, admin, None, None, None)
    })
}

fn save_book(
    renderer: &TemplateRenderer,
    req: &HttpRequest,
    admin: &User,
    config: &Config,
    form: &BookForm,
    editing: Option<i64>,
) -> BlogResult<HttpResponse> {
    let db = CollectionDB::new(&config.database_path())?;
    let result = form.to_input().and_then(|input| match editing {
        Some(id) => db
            .update(id, &input)?
            .ok_or_else(|| BlogError::not_found("条目")),
        None => db.create(&input),
    });
    match result {
        Ok(item) => Ok(see_other(&with_notice("/admin/books", &format!("已保存《{}》", item.title)))),
        Err(BlogError::BadRequest(message)) => {
            let item = serde_json::to_value(form).unwrap_or(serde_json::Value::Null);
            render_book_form(renderer, req, admin, Some(item), editing, Some(&message))
        }
        Err(err) => Err(err),
    }
}

pub async fn create_book(
    req: HttpRequest,
    form: web::Form<BookForm>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        save_book(&renderer, &req, admin, &config, &form, None)
    })
}

pub async fn edit_book(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let id = path.into_inner();
    guarded(&req, &config, &renderer, |admin| {
        let item = CollectionDB::new(&config.database_path())?
            .get(id)?
            .ok_or_else(|| BlogError::not_found("条目"))?;
        let item = serde_json::to_value(&item).unwrap_or(serde_json::Value::Null);
        render_book_form(&renderer, &req, admin, Some(item), Some(id), None)
    })
}

pub async fn update_book(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<BookForm>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    let id = path.into_inner();
    guarded(&req, &config, &renderer, |admin| {
        save_book(&renderer, &req, admin, &config, &form, Some(id))
    })
}

pub async fn delete_book(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        CollectionDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/books", "条目已删除")))
    })
}

pub async fn batch_delete_books(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let deleted = CollectionDB::new(&config.database_path())?.batch_delete(&form_ids(&body))?;
        Ok(see_other(&with_notice("/admin/books", &format!("已删除 {} 个条目", deleted))))
    })
}

// ==================== 友链 ====================

pub async fn friends(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let mut context = admin_context(&renderer, &req, admin, "friends");
        context.insert("friends", &FriendDB::new(&config.database_path())?.list()?);
        Ok(html(renderer.render("admin/friends.html", &context)?))
    })
}

pub async fn create_friend(
    req: HttpRequest,
    form: web::Form<FriendInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = FriendDB::new(&config.database_path())?.create(&form);
        back_with("/admin/friends", result, "友链已添加")
    })
}

pub async fn update_friend(
    req: HttpRequest,
    path: web::Path<i64>,
    form: web::Form<FriendInput>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let result = FriendDB::new(&config.database_path())?
            .update(path.into_inner(), &form)
            .and_then(|friend| friend.ok_or_else(|| BlogError::not_found("友链")));
        back_with("/admin/friends", result, "友链已保存")
    })
}

pub async fn delete_friend(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        FriendDB::new(&config.database_path())?.delete(path.into_inner())?;
        Ok(see_other(&with_notice("/admin/friends", "友链已删除")))
    })
}

// ==================== 图片 ====================

pub async fn images(
    req: HttpRequest,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
    params: web::Query<PageParams>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |admin| {
        let page = PageQuery::from_params(&params, &config.pagination, IMAGE_SORTABLE);
        let (images, total) = ImageDB::new(&config.database_path())?.list(&page)?;

        let mut context = admin_context(&renderer, &req, admin, "images");
        context.insert("images", &images);
        context.insert("nav", &PageNav::new(&page, total));
        context.insert("page_base", "/admin/images?");
        context.insert("max_size_mb", &(config.uploads.max_size_bytes / (1024 * 1024)));
        Ok(html(renderer.render("admin/images.html", &context)?))
    })
}

pub async fn upload_image(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    // The body has to be read before the synchronous guard runs
    let upload = read_file_field(&mut payload, &["file"], config.uploads.max_size_bytes).await;
    guarded(&req, &config, &renderer, |admin| {
        let result = upload.and_then(|file| {
            ImageDB::new(&config.database_path())?.save_upload(
                &config.paths.uploads_dir,
                &config.uploads,
                &file.filename,
                &file.data,
                Some(admin.id),
            )
        });
        match result {
            Ok(image) => Ok(see_other(&with_notice("/admin/images", &format!("已上传 {}", image.url)))),
            Err(BlogError::BadRequest(message)) => Ok(see_other(&with_notice("/admin/images", &message))),
            Err(BlogError::PayloadTooLarge) => {
                Ok(see_other(&with_notice("/admin/images", "上传文件过大")))
            }
            Err(err) => Err(err),
        }
    })
}

pub async fn delete_image(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        ImageDB::new(&config.database_path())?.delete(&config.paths.uploads_dir, path.into_inner())?;
        Ok(see_other(&with_notice("/admin/images", "图片已删除")))
    })
}

pub async fn batch_delete_images(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<Config>,
    renderer: web::Data<TemplateRenderer>,
) -> HttpResponse {
    guarded(&req, &config, &renderer, |_| {
        let deleted = ImageDB::new(&config.database_path())?
            .batch_delete(&config.paths.uploads_dir, &form_ids(&body))?;
        Ok(see_other(&with_notice("/admin/images", &format!("已删除 {} 张图片", deleted))))
    })
}

pub fn configure_admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin", web::get().to(dashboard))
        .route("/admin/", web::get().to(dashboard))
        .route("/admin/logout", web::get().to(pages::logout))
        .route("/admin/posts", web::get().to(posts))
        .route("/admin/posts", web::post().to(create_post))
        .route("/admin/posts/new", web::get().to(new_post))
        .route("/admin/posts/batch-delete", web::post().to(batch_delete_posts))
        .route("/admin/posts/{id}/edit", web::get().to(edit_post))
        .route("/admin/posts/{id}", web::post().to(update_post))
        .route("/admin/posts/{id}/delete", web::post().to(delete_post))
        .route("/admin/comments", web::get().to(comments))
        .route("/admin/comments/batch-delete", web::post().to(batch_delete_comments))
        .route("/admin/comments/{id}/approve", web::post().to(approve_comment))
        .route("/admin/comments/{id}/reject", web::post().to(reject_comment))
        .route("/admin/comments/{id}/delete", web::post().to(delete_comment))
        .route("/admin/tags", web::get().to(tags))
        .route("/admin/tags", web::post().to(create_tag))
        .route("/admin/tags/{id}", web::post().to(update_tag))
        .route("/admin/tags/{id}/delete", web::post().to(delete_tag))
        .route("/admin/hitokoto", web::get().to(hitokoto))
        .route("/admin/hitokoto", web::post().to(create_hitokoto))
        .route("/admin/hitokoto/{id}", web::post().to(update_hitokoto))
        .route("/admin/hitokoto/{id}/delete", web::post().to(delete_hitokoto))
        .route("/admin/books", web::get().to(books))
        .route("/admin/books", web::post().to(create_book))
        .route("/admin/books/new", web::get().to(new_book))
        .route("/admin/books/batch-delete", web::post().to(batch_delete_books))
        .route("/admin/books/{id}/edit", web::get().to(edit_book))
        .route("/admin/books/{id}", web::post().to(update_book))
        .route("/admin/books/{id}/delete", web::post().to(delete_book))
        .route("/admin/friends", web::get().to(friends))
        .route("/admin/friends", web::post().to(create_friend))
        .route("/admin/friends/{id}", web::post().to(update_friend))
        .route("/admin/friends/{id}/delete", web::post().to(delete_friend))
        .route("/admin/images", web::get().to(images))
        .route("/admin/images", web::post().to(upload_image))
        .route("/admin/images/batch-delete", web::post().to(batch_delete_images))
        .route("/admin/images/{id}/delete", web::post().to(delete_image));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_ids_keeps_repeated_keys() {
        assert_eq!(form_ids(b"ids=3&ids=7&other=1&ids=x"), vec![3, 7]);
        assert_eq!(form_ids(b"ids%5B%5D=5"), vec![5]);
        assert!(form_ids(b"").is_empty());
    }

    #[test]
    fn test_form_ids_decodes_values() {
        assert_eq!(form_ids(b"ids%5B%5D=5&ids=%37"), vec![5, 7]);
        assert_eq!(form_ids(b"ids[]=+9+&ids=1%30"), vec![9, 10]);
        assert_eq!(form_ids(b"id%73=4"), vec![4]);
    }

    #[test]
    fn test_post_form_splits_tags() {
        let form = PostForm {
            title: "Hello".into(),
            status: "published".into(),
            tags: "rust, web，  ,sqlite".into(),
            ..Default::default()
        };
        let input = form.to_input();
        assert_eq!(input.status, Some(PostStatus::Published));
        assert_eq!(
            input.tags.unwrap(),
            vec![
                TagRef::Name("rust".into()),
                TagRef::Name("web".into()),
                TagRef::Name("sqlite".into()),
            ]
        );
        assert_eq!(PostForm::default().to_input().status, Some(PostStatus::Draft));
    }

    #[test]
    fn test_book_form_numbers() {
        let form = BookForm {
            kind: "movie".into(),
            title: "Heat".into(),
            rating: "4".into(),
            ..Default::default()
        };
        let input = form.to_input().unwrap();
        assert_eq!(input.kind, Some(CollectionKind::Movie));
        assert_eq!(input.rating, Some(4));
        assert_eq!(input.pages, None);

        let bad = BookForm {
            pages: "many".into(),
            ..Default::default()
        };
        assert!(matches!(bad.to_input(), Err(BlogError::BadRequest(_))));
    }
}
