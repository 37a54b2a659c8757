use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::auth::{require_admin, user_db};
use crate::collections::CollectionDB;
use crate::comments::{CommentDB, CommentStats};
use crate::config::Config;
use crate::error::BlogResult;
use crate::friends::FriendDB;
use crate::hitokoto::HitokotoDB;
use crate::images::ImageDB;
use crate::posts::{PostDB, PostStats};
use crate::response::ok;
use crate::tags::TagDB;

/// Numbers shown on the admin dashboard
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub posts: PostStats,
    pub comments: CommentStats,
    pub tags: i64,
    pub hitokoto: i64,
    pub books: i64,
    pub friends: i64,
    pub images: i64,
    pub users: i64,
}

impl DashboardStats {
    pub fn collect(config: &Config) -> BlogResult<Self> {
        let path = config.database_path();
        Ok(Self {
            posts: PostDB::new(&path)?.stats()?,
            comments: CommentDB::new(&path)?.stats()?,
            tags: TagDB::new(&path)?.count()?,
            hitokoto: HitokotoDB::new(&path)?.count()?,
            books: CollectionDB::new(&path)?.count()?,
            friends: FriendDB::new(&path)?.count()?,
            images: ImageDB::new(&path)?.count()?,
            users: user_db(config)?.count_users()?,
        })
    }
}

pub async fn admin_stats(req: HttpRequest, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    Ok(ok(DashboardStats::collect(&config)?))
}

pub async fn health() -> HttpResponse {
    ok(serde_json::json!({ "status": "ok" }))
}
