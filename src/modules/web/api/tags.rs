use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::require_admin;
use crate::config::Config;
use crate::error::{is_unique_violation, BlogError, BlogResult};
use crate::pagination::{PageParams, PageQuery};
use crate::posts::{PostDB, PostListQuery, StatusFilter, POST_SORTABLE};
use crate::response::{created, ok, ok_message, Paged};
use crate::tags::{TagDB, TagInput};

pub(crate) fn conflict_on_duplicate(err: rusqlite::Error) -> BlogError {
    if is_unique_violation(&err) {
        BlogError::Conflict("标签名称或别名已存在".to_string())
    } else {
        err.into()
    }
}

pub async fn list_tags(config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = TagDB::new(&config.database_path())?;
    Ok(ok(db.list()?))
}

/// Lookup by id or slug
pub async fn get_tag(path: web::Path<String>, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = TagDB::new(&config.database_path())?;
    let tag = db
        .find(&path.into_inner())?
        .ok_or_else(|| BlogError::not_found("标签"))?;
    Ok(ok(tag))
}

pub async fn create_tag(
    req: HttpRequest,
    body: web::Json<TagInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = TagDB::new(&config.database_path())?;
    let tag = db
        .create(&body)
        .map_err(conflict_on_duplicate)?
        .ok_or_else(|| BlogError::bad_request("标签名称不能为空"))?;
    Ok(created(tag))
}

pub async fn update_tag(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<TagInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = TagDB::new(&config.database_path())?;
    let tag = db
        .update(path.into_inner(), &body)
        .map_err(conflict_on_duplicate)?
        .ok_or_else(|| BlogError::not_found("标签"))?;
    Ok(ok(tag))
}

pub async fn delete_tag(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = TagDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("标签"));
    }
    Ok(ok_message("删除成功"))
}

/// Published posts carrying the tag with this slug
pub async fn posts_by_tag_slug(
    path: web::Path<String>,
    params: web::Query<PageParams>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let tags = TagDB::new(&config.database_path())?;
    let tag = tags
        .get_by_slug(&path.into_inner())?
        .ok_or_else(|| BlogError::not_found("标签"))?;

    let query = PostListQuery {
        page: PageQuery::from_params(&params, &config.pagination, POST_SORTABLE),
        tag: Some(tag.slug.clone()),
        status: StatusFilter::Published,
    };
    let (posts, total) = PostDB::new(&config.database_path())?.list(&query)?;
    Ok(ok(serde_json::json!({
        "tag": tag,
        "posts": Paged::new(posts, total, &query.page),
    })))
}
