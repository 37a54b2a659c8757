use actix_web::http::header;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::pagination::{total_pages, PageQuery};

/// JSON envelope returned by every API endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        code: 0,
        message: "ok".to_string(),
        data,
    })
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse {
        code: 0,
        message: "ok".to_string(),
        data,
    })
}

/// Success with a message and no payload
pub fn ok_message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        code: 0,
        message: message.to_string(),
        data: serde_json::Value::Null,
    })
}

/// One page of a list endpoint
#[derive(Debug, Serialize)]
pub struct Paged<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T: Serialize> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, query: &PageQuery) -> Self {
        Self {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
            total_pages: total_pages(total, query.page_size),
        }
    }
}

/// Body of the batch-delete endpoints
#[derive(Debug, Deserialize)]
pub struct IdList {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: usize,
}

pub fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// 303 redirect, used after form posts
pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Append a flash notice (`?msg=`) to a redirect target
pub fn with_notice(location: &str, message: &str) -> String {
    let separator = if location.contains('?') { '&' } else { '?' };
    format!("{}{}msg={}", location, separator, urlencoding::encode(message))
}
