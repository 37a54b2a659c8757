use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::require_admin;
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::friends::{FriendDB, FriendInput};
use crate::response::{created, ok, ok_message};

pub async fn list_friends(config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = FriendDB::new(&config.database_path())?;
    Ok(ok(db.list()?))
}

pub async fn create_friend(
    req: HttpRequest,
    body: web::Json<FriendInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = FriendDB::new(&config.database_path())?;
    Ok(created(db.create(&body)?))
}

pub async fn update_friend(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<FriendInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = FriendDB::new(&config.database_path())?;
    let friend = db
        .update(path.into_inner(), &body)?
        .ok_or_else(|| BlogError::not_found("友链"))?;
    Ok(ok(friend))
}

pub async fn delete_friend(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = FriendDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("友链"));
    }
    Ok(ok_message("删除成功"))
}
