use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::require_admin;
use crate::collections::{
    CollectionDB, CollectionInput, CollectionKind, CollectionQuery, ShelfStatus, COLLECTION_SORTABLE,
};
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::images::ImageDB;
use crate::pagination::{PageParams, PageQuery};
use crate::response::{created, ok, ok_message, Deleted, IdList, Paged};
use crate::upload::read_file_field;

#[derive(Debug, Deserialize)]
pub struct ShelfFilter {
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

impl ShelfFilter {
    pub fn query(&self, params: &PageParams, config: &Config) -> CollectionQuery {
        CollectionQuery {
            page: PageQuery::from_params(params, &config.pagination, COLLECTION_SORTABLE),
            kind: self.kind.as_deref().and_then(CollectionKind::parse),
            status: self.status.as_deref().and_then(ShelfStatus::parse),
        }
    }
}

pub async fn list_books(
    config: web::Data<Config>,
    params: web::Query<PageParams>,
    filter: web::Query<ShelfFilter>,
) -> BlogResult<HttpResponse> {
    let query = filter.query(&params, &config);
    let db = CollectionDB::new(&config.database_path())?;
    let (items, total) = db.list(&query)?;
    Ok(ok(Paged::new(items, total, &query.page)))
}

pub async fn get_book(path: web::Path<i64>, config: web::Data<Config>) -> BlogResult<HttpResponse> {
    let db = CollectionDB::new(&config.database_path())?;
    let item = db
        .get(path.into_inner())?
        .ok_or_else(|| BlogError::not_found("条目"))?;
    Ok(ok(item))
}

pub async fn create_book(
    req: HttpRequest,
    body: web::Json<CollectionInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CollectionDB::new(&config.database_path())?;
    Ok(created(db.create(&body)?))
}

pub async fn update_book(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<CollectionInput>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CollectionDB::new(&config.database_path())?;
    let item = db
        .update(path.into_inner(), &body)?
        .ok_or_else(|| BlogError::not_found("条目"))?;
    Ok(ok(item))
}

pub async fn delete_book(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CollectionDB::new(&config.database_path())?;
    if !db.delete(path.into_inner())? {
        return Err(BlogError::not_found("条目"));
    }
    Ok(ok_message("删除成功"))
}

pub async fn batch_delete_books(
    req: HttpRequest,
    body: web::Json<IdList>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = CollectionDB::new(&config.database_path())?;
    Ok(ok(Deleted {
        deleted: db.batch_delete(&body.ids)?,
    }))
}

pub async fn upload_book_cover(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let admin = require_admin(&req, &config)?;
    let file = read_file_field(&mut payload, &["file", "cover"], config.uploads.max_size_bytes).await?;
    let image = ImageDB::new(&config.database_path())?.save_upload(
        &config.paths.uploads_dir,
        &config.uploads,
        &file.filename,
        &file.data,
        Some(admin.id),
    )?;
    Ok(ok(serde_json::json!({ "url": image.url })))
}
