use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::require_admin;
use crate::comments::{CommentDB, CommentStatus};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::pagination::{PageParams, PageQuery};
use crate::response::{ok, ok_message, Deleted, IdList, Paged};

#[derive(Debug, Deserialize)]
pub struct StatusParam {
    pub status: Option<String>,
}

pub async fn list_comments(
    req: HttpRequest,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    filter: web::Query<StatusParam>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let page = PageQuery::from_params(&params, &config.pagination, &["created_at"]);
    let status = filter.status.as_deref().and_then(CommentStatus::parse);

    let db = CommentDB::new(&config.database_path())?;
    let (comments, total) = db.list_all(status, &page)?;
    Ok(ok(Paged::new(comments, total, &page)))
}

pub async fn pending_comments(req: HttpRequest, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CommentDB::new(&config.database_path())?;
    Ok(ok(db.pending()?))
}

fn moderate(req: &HttpRequest, config: &Config, id: i64, status: CommentStatus) -> BlogResult<HttpResponse> {
    require_admin(req, config)?;
    let db = CommentDB::new(&config.database_path())?;
    let comment = db
        .set_status(id, status)?
        .ok_or_else(|| BlogError::not_found("评论"))?;
    Ok(ok(comment))
}

pub async fn approve_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    moderate(&req, &config, path.into_inner(), CommentStatus::Approved)
}

pub async fn reject_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    moderate(&req, &config, path.into_inner(), CommentStatus::Rejected)
}

pub async fn delete_comment(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CommentDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("评论"));
    }
    Ok(ok_message("删除成功"))
}

pub async fn batch_delete_comments(
    req: HttpRequest,
    body: web::Json<IdList>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CommentDB::new(&config.database_path())?;
    Ok(ok(Deleted {
        deleted: db.batch_delete(&body.ids)?,
    }))
}
