use std::time::Duration;

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{BlogError, BlogResult};
use crate::media::proxy_target;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Whether an upstream `Content-Type` names an image
fn is_image_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|t| t.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// `GET /api/proxy-image?url=`
pub async fn proxy_image(
    query: web::Query<ProxyQuery>,
    config: web::Data<Config>,
) -> BlogResult<HttpResponse> {
    let raw = query
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| BlogError::bad_request("缺少 url 参数"))?;
    let target = proxy_target(raw, &config.proxy).map_err(|rejection| {
        log::warn!("拒绝代理图片 {}: {}", raw, rejection);
        BlogError::bad_request(rejection.to_string())
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.proxy.timeout_secs))
        .user_agent("toy_blog image proxy")
        // 跳转目标不经过白名单校验, 一律不跟随
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let mut upstream = client.get(target.clone()).send().await?;

    if upstream.status().is_redirection() {
        log::warn!("图片源返回跳转 {}: {}", upstream.status(), target);
        return Err(BlogError::BadGateway("图片源返回了跳转".to_string()));
    }
    if !upstream.status().is_success() {
        log::warn!("图片源返回 {}: {}", upstream.status(), target);
        return Err(BlogError::NotFound("图片获取失败".to_string()));
    }
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !is_image_type(&content_type) {
        log::warn!("图片源类型不正确 ({}): {}", content_type, target);
        return Err(BlogError::bad_request("目标不是图片"));
    }

    let max_bytes = config.proxy.max_bytes;
    if upstream.content_length().map_or(false, |len| len as usize > max_bytes) {
        return Err(BlogError::PayloadTooLarge);
    }
    let mut body = Vec::new();
    while let Some(chunk) = upstream.chunk().await? {
        if body.len() + chunk.len() > max_bytes {
            return Err(BlogError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
        .body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App, HttpServer};

    #[::core::prelude::v1::test]
    fn test_is_image_type() {
        assert!(is_image_type("image/png"));
        assert!(is_image_type("Image/JPEG; charset=binary"));
        assert!(!is_image_type("text/html"));
        assert!(!is_image_type(""));
    }

    #[actix_web::test]
    async fn test_rejects_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::test_config(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .route("/api/proxy-image", web::get().to(proxy_image)),
        )
        .await;

        for uri in [
            "/api/proxy-image",
            "/api/proxy-image?url=ftp%3A%2F%2Fcdn.jsdelivr.net%2Fa.png",
            "/api/proxy-image?url=https%3A%2F%2Fevil.example%2Fa.png",
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), 400, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_redirecting_upstream_is_not_followed() {
        // 允许的主机跳转到另一个主机上的"内部"地址
        let internal = HttpServer::new(|| {
            App::new().route(
                "/internal.png",
                web::get().to(|| async { HttpResponse::Ok().content_type("image/png").body("secret") }),
            )
        })
        .bind(("127.0.0.1", 0))
        .unwrap();
        let internal_port = internal.addrs()[0].port();
        actix_web::rt::spawn(internal.run());

        let redirector = HttpServer::new(move || {
            App::new().route(
                "/a.png",
                web::get().to(move || async move {
                    HttpResponse::Found()
                        .insert_header((
                            header::LOCATION,
                            format!("http://localhost:{}/internal.png", internal_port),
                        ))
                        .finish()
                }),
            )
        })
        .bind(("127.0.0.1", 0))
        .unwrap();
        let port = redirector.addrs()[0].port();
        actix_web::rt::spawn(redirector.run());

        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::test_config(dir.path());
        config.proxy.allowed_hosts = vec!["127.0.0.1".to_string()];
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .route("/api/proxy-image", web::get().to(proxy_image)),
        )
        .await;

        let uri = format!("/api/proxy-image?url=http%3A%2F%2F127.0.0.1%3A{}%2Fa.png", port);
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), 502);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 502);
    }
}
