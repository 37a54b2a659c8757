use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::require_admin;
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::hitokoto::{HitokotoDB, HitokotoInput};
use crate::response::{created, ok, ok_message};

pub async fn list_hitokoto(config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = HitokotoDB::new(&config.database_path())?;
    Ok(ok(db.list()?))
}

/// `data` is null when there are no quotes yet
pub async fn random_hitokoto(config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = HitokotoDB::new(&config.database_path())?;
    Ok(ok(db.random()?))
}

pub async fn create_hitokoto(
    req: HttpRequest,
    body: web::Json<HitokotoInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = HitokotoDB::new(&config.database_path())?;
    Ok(created(db.create(&body)?))
}

pub async fn update_hitokoto(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<HitokotoInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = HitokotoDB::new(&config.database_path())?;
    let item = db
        .update(path.into_inner(), &body)?
        .ok_or_else(|| BlogError::not_found("一言"))?;
    Ok(ok(item))
}

pub async fn delete_hitokoto(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = HitokotoDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("一言"));
    }
    Ok(ok_message("删除成功"))
}
