use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{current_user, require_admin};
use crate::comments::{build_comment_tree, CommentDB, CommentNode, CommentStatus, NewComment};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::images::ImageDB;
use crate::markdown::{extract_toc, render_markdown, TocItem};
use crate::pagination::{PageParams, PageQuery};
use crate::posts::{Post, PostDB, PostInput, PostListQuery, StatusFilter, POST_SORTABLE};
use crate::response::{created, ok, ok_message, ApiResponse, Deleted, IdList, Paged};
use crate::upload::read_file_field;

#[derive(Debug, Deserialize)]
pub struct PostFilter {
    pub tag: Option<String>,
    pub status: Option<String>,
}

/// Post with its rendered body and table of contents
#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub content_html: String,
    pub toc: Vec<TocItem>,
}

impl PostDetail {
    pub fn new(post: Post) -> Self {
        Self {
            content_html: render_markdown(&post.content),
            toc: extract_toc(&post.content),
            post,
        }
    }
}

pub(crate) fn is_admin(req: &HttpRequest, config: &Config) -> BlogResult<bool> {
    Ok(current_user(req, config)?.map(|u| u.is_admin()).unwrap_or(false))
}

/// A post the caller may see: drafts only for admins
pub(crate) fn visible_post(db: &PostDB, key: &str, admin: bool) -> BlogResult<Post> {
    match db.find(key)? {
        Some(post) if post.is_published() || admin => Ok(post),
        _ => Err(BlogError::not_found("文章")),
    }
}

pub async fn list_posts(
    req: HttpRequest,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    filter: web::Query<PostFilter>,
) -> BlogResult<HttpResponse> {
    let status = if is_admin(&req, &config)? {
        StatusFilter::parse(filter.status.as_deref())
    } else {
        StatusFilter::Published
    };
    let page = PageQuery::from_params(&params, &config.pagination, POST_SORTABLE);
    let query = PostListQuery {
        page,
        tag: filter.tag.clone(),
        status,
    };

    let db = PostDB::new(&config.database_path())?;
    let (posts, total) = db.list(&query)?;
    Ok(ok(Paged::new(posts, total, &query.page)))
}

pub async fn archive(config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = PostDB::new(&config.database_path())?;
    Ok(ok(db.archive()?))
}

/// Post detail; counts one view
pub async fn get_post(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let db = PostDB::new(&config.database_path())?;
    let mut post = visible_post(&db, &path.into_inner(), is_admin(&req, &config)?)?;
    db.increment_views(post.id)?;
    post.view_count += 1;
    Ok(ok(PostDetail::new(post)))
}

pub async fn create_post(
    req: HttpRequest,
    body: web::Json<PostInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let admin = require_admin(&req, &config)?;
    let db = PostDB::new(&config.database_path())?;
    let post = db.create(&body, Some(admin.id))?;
    Ok(created(post))
}

pub async fn update_post(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<PostInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = PostDB::new(&config.database_path())?;
    let post = db
        .update(path.into_inner(), &body)?
        .ok_or_else(|| BlogError::not_found("文章"))?;
    Ok(ok(post))
}

pub async fn delete_post(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = PostDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("文章"));
    }
    Ok(ok_message("删除成功"))
}

pub async fn batch_delete_posts(
    req: HttpRequest,
    body: web::Json<IdList>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = PostDB::new(&config.database_path())?;
    let deleted = db.batch_delete(&body.ids)?;
    log::info!("批量删除文章 {} 篇", deleted);
    Ok(ok(Deleted { deleted }))
}

/// Cover upload; the stored image is also listed in the media library
pub async fn upload_cover(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let admin = require_admin(&req, &config)?;
    let file = read_file_field(&mut payload, &["file", "cover"], config.uploads.max_size_bytes).await?;
    let db = ImageDB::new(&config.database_path())?;
    let image = db.save_upload(
        &config.paths.uploads_dir,
        &config.uploads,
        &file.filename,
        &file.data,
        Some(admin.id),
    )?;
    Ok(ok(serde_json::json!({ "url": image.url, "image": image })))
}

pub async fn like_post(path: web::Path<i64>, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = PostDB::new(&config.database_path())?;
    let id = path.into_inner();
    visible_post(&db, &id.to_string(), false)?;
    let likes = db.like(id)?.ok_or_else(|| BlogError::not_found("文章"))?;
    Ok(ok(serde_json::json!({ "likes": likes })))
}

/// Approved comments of a post, threaded
pub async fn list_post_comments(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let id = path.into_inner();
    let posts = PostDB::new(&config.database_path())?;
    visible_post(&posts, &id.to_string(), is_admin(&req, &config)?)?;

    let db = CommentDB::new(&config.database_path())?;
    let comments = db.list_for_post(id, false)?;
    let total = comments.len();
    let tree: Vec<CommentNode> =
        build_comment_tree(comments.iter().map(|c| c.to_public()).collect());
    Ok(ok(serde_json::json!({ "total": total, "items": tree })))
}

pub async fn create_post_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<NewComment>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let user = current_user(&req, &config)?;
    let db = CommentDB::new(&config.database_path())?;
    let comment = db.create(path.into_inner(), &body, user.as_ref(), &config.comments)?;

    let message = match comment.status {
        CommentStatus::Approved => "评论成功",
        _ => "评论已提交，审核通过后显示",
    };
    Ok(HttpResponse::Created().json(ApiResponse {
        code: 0,
        message: message.to_string(),
        data: comment.to_public(),
    }))
}
