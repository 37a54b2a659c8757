use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::require_admin;
use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::images::{ImageDB, IMAGE_SORTABLE};
use crate::pagination::{PageParams, PageQuery};
use crate::response::{created, ok, ok_message, Deleted, IdList, Paged};
use crate::upload::read_file_field;

pub async fn list_images(
    req: HttpRequest,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let page = PageQuery::from_params(&params, &config.pagination, IMAGE_SORTABLE);
    let db = ImageDB::new(&config.database_path())?;
    let (images, total) = db.list(&page)?;
    Ok(ok(Paged::new(images, total, &page)))
}

pub async fn get_image(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = ImageDB::new(&config.database_path())?;
    let image = db
        .get(path.into_inner())?
        .ok_or_else(|| BlogError::not_found("图片"))?;
    Ok(ok(image))
}

pub async fn upload_image(
    req: HttpRequest,
    mut payload: Multipart,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let admin = require_admin(&req, &config)?;
    let file = read_file_field(&mut payload, &["file", "image"], config.uploads.max_size_bytes).await?;
    let image = ImageDB::new(&config.database_path())?.save_upload(
        &config.paths.uploads_dir,
        &config.uploads,
        &file.filename,
        &file.data,
        Some(admin.id),
    )?;
    Ok(created(image))
}

pub async fn delete_image(
    req: HttpRequest,
    path: web::Path<i64>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = ImageDB::new(&config.database_path())?;
    if !db.delete(&config.paths.uploads_dir, path.into_inner())? {
        return Err(BlogError::not_found("图片"));
    }
    Ok(ok_message("删除成功"))
}

pub async fn batch_delete_images(
    req: HttpRequest,
    body: web::Json<IdList>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    require_admin(&req, &config)?;
    let db = ImageDB::new(&config.database_path())?;
    Ok(ok(Deleted {
        deleted: db.batch_delete(&config.paths.uploads_dir, &body.ids)?,
    }))
}
