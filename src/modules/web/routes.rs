use actix_files::Files;
use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::header;
use actix_web::{middleware, web, HttpRequest};

use crate::admin;
use crate::api::{account, books, comments, friends, hitokoto, images, posts, stats, tags};
use crate::config::Config;
use crate::error::BlogError;
use crate::pages;
use crate::proxy;

/// Malformed JSON bodies get the same `{code, message}` envelope as other errors
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("无效的 JSON 请求体: {}", err);
    BlogError::bad_request(format!("请求体格式错误: {}", err)).into()
}

const UPLOADS_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("无效的查询参数: {}", err);
    BlogError::bad_request(format!("查询参数错误: {}", err)).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("无效的路径参数: {}", err);
    BlogError::bad_request(format!("路径参数错误: {}", err)).into()
}

fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(stats::health))
        // 账号
        .route("/api/auth/login", web::post().to(account::login))
        .route("/api/auth/logout", web::post().to(account::logout))
        .route("/api/auth/github", web::get().to(account::github_start))
        .route("/api/auth/github/callback", web::get().to(account::github_callback))
        .route("/api/users/me", web::get().to(account::me))
        .route("/api/users/me", web::put().to(account::update_me))
        .route("/api/users/me/avatar", web::post().to(account::upload_avatar))
        // 文章 (literal segments before `{id}`)
        .route("/api/posts", web::get().to(posts::list_posts))
        .route("/api/posts", web::post().to(posts::create_post))
        .route("/api/posts/archive", web::get().to(posts::archive))
        .route("/api/posts/batch-delete", web::post().to(posts::batch_delete_posts))
        .route("/api/posts/upload-cover", web::post().to(posts::upload_cover))
        .route("/api/posts/{id}", web::get().to(posts::get_post))
        .route("/api/posts/{id}", web::put().to(posts::update_post))
        .route("/api/posts/{id}", web::delete().to(posts::delete_post))
        .route("/api/posts/{id}/like", web::post().to(posts::like_post))
        .route("/api/posts/{id}/comments", web::get().to(posts::list_post_comments))
        .route("/api/posts/{id}/comments", web::post().to(posts::create_post_comment))
        // 评论
        .route("/api/comments", web::get().to(comments::list_comments))
        .route("/api/admin/comments/pending", web::get().to(comments::pending_comments))
        .route("/api/comments/batch-delete", web::post().to(comments::batch_delete_comments))
        .route("/api/comments/{id}/approve", web::put().to(comments::approve_comment))
        .route("/api/comments/{id}/reject", web::put().to(comments::reject_comment))
        .route("/api/comments/{id}", web::delete().to(comments::delete_comment))
        // 标签
        .route("/api/tags", web::get().to(tags::list_tags))
        .route("/api/tags", web::post().to(tags::create_tag))
        .route("/api/tags/{id}", web::get().to(tags::get_tag))
        .route("/api/tags/{id}", web::put().to(tags::update_tag))
        .route("/api/tags/{id}", web::delete().to(tags::delete_tag))
        .route("/api/tag-slug/{slug}/posts", web::get().to(tags::posts_by_tag_slug))
        // 一言
        .route("/api/hitokoto", web::get().to(hitokoto::list_hitokoto))
        .route("/api/hitokoto", web::post().to(hitokoto::create_hitokoto))
        .route("/api/hitokoto/random", web::get().to(hitokoto::random_hitokoto))
        .route("/api/hitokoto/{id}", web::put().to(hitokoto::update_hitokoto))
        .route("/api/hitokoto/{id}", web::delete().to(hitokoto::delete_hitokoto))
        // 书影音
        .route("/api/books", web::get().to(books::list_books))
        .route("/api/books", web::post().to(books::create_book))
        .route("/api/books/batch-delete", web::post().to(books::batch_delete_books))
        .route("/api/books/upload-cover", web::post().to(books::upload_book_cover))
        .route("/api/books/{id}", web::get().to(books::get_book))
        .route("/api/books/{id}", web::put().to(books::update_book))
        .route("/api/books/{id}", web::delete().to(books::delete_book))
        // 友链
        .route("/api/friends", web::get().to(friends::list_friends))
        .route("/api/friends", web::post().to(friends::create_friend))
        .route("/api/friends/{id}", web::put().to(friends::update_friend))
        .route("/api/friends/{id}", web::delete().to(friends::delete_friend))
        // 图片
        .route("/api/images", web::get().to(images::list_images))
        .route("/api/images", web::post().to(images::upload_image))
        .route("/api/images/batch-delete", web::post().to(images::batch_delete_images))
        .route("/api/images/{id}", web::get().to(images::get_image))
        .route("/api/images/{id}", web::delete().to(images::delete_image))
        .route("/api/proxy-image", web::get().to(proxy::proxy_image))
        .route("/api/admin/stats", web::get().to(stats::admin_stats));
}

fn configure_pages(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/posts", web::get().to(pages::posts))
        .route("/posts/{id}", web::get().to(pages::post_detail))
        .route("/posts/{id}/comments", web::post().to(pages::submit_comment))
        .route("/posts/{id}/like", web::post().to(pages::like))
        .route("/archive", web::get().to(pages::archive))
        .route("/books", web::get().to(pages::books))
        .route("/friends", web::get().to(pages::friends))
        .route("/hitokoto", web::get().to(pages::hitokoto))
        .route("/about", web::get().to(pages::about))
        .route("/login", web::get().to(pages::login_page))
        .route("/login", web::post().to(pages::login_submit))
        .route("/logout", web::get().to(pages::logout))
        .route("/auth/callback", web::get().to(pages::auth_callback));
}

/// Every route of the site; static directories come from `config.paths`
pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));

    configure_api(cfg);
    admin::configure_admin_routes(cfg);
    configure_pages(cfg);

    // 上传的 SVG 可能带脚本, 只当图片用
    cfg.service(
        web::scope("/uploads")
            .wrap(
                middleware::DefaultHeaders::new()
                    .add((header::CONTENT_SECURITY_POLICY, UPLOADS_CSP))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff")),
            )
            .service(Files::new("", &config.paths.uploads_dir)),
    )
        .service(Files::new("/static", &config.paths.static_dir))
        .default_service(web::to(pages::not_found));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::bootstrap_admin;
    use crate::config::test_config;
    use crate::templates::TemplateRenderer;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};

    macro_rules! app {
        ($config:expr) => {{
            let config: Config = $config;
            bootstrap_admin(&config).unwrap();
            let renderer = TemplateRenderer::new(&config).unwrap();
            test::init_service(
                App::new()
                    .app_data(web::Data::new(config.clone()))
                    .app_data(web::Data::new(renderer))
                    .configure(|cfg| configure_routes(cfg, &config)),
            )
            .await
        }};
    }

    macro_rules! admin_token {
        ($app:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({ "email": "admin@example.com", "password": "secret-password" }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            body["data"]["token"].as_str().unwrap().to_string()
        }};
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[actix_web::test]
    async fn test_login_rejects_bad_password() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "admin@example.com", "password": "wrong" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_mutations_need_admin() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));

        let req = test::TestRequest::post()
            .uri("/api/posts")
            .set_json(json!({ "title": "Nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/api/admin/stats").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_malformed_json_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_uploads_are_served_sandboxed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.paths.uploads_dir).unwrap();
        std::fs::write(
            config.paths.uploads_dir.join("logo.svg"),
            r#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#,
        )
        .unwrap();
        let app = app!(config);

        let req = test::TestRequest::get().uri("/uploads/logo.svg").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
        assert!(csp.contains("default-src 'none'"));
        assert!(csp.contains("sandbox"));
        assert_eq!(resp.headers().get("x-content-type-options").unwrap(), "nosniff");

        let req = test::TestRequest::get().uri("/uploads/missing.png").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_malformed_query_and_path_are_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        for req in [
            test::TestRequest::get().uri("/api/posts?page=abc").to_request(),
            test::TestRequest::get().uri("/api/posts?page_size=-1").to_request(),
            test::TestRequest::post().uri("/api/posts/abc/like").to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["code"], 400);
            assert!(body["data"].is_null());
        }
    }

    #[actix_web::test]
    async fn test_post_and_comment_flow() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let token = admin_token!(app);

        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(&token))
            .set_json(json!({
                "title": "Hello Rust",
                "content": "# Intro\n\nbody",
                "status": "published",
                "tags": ["rust"]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        let id = created["data"]["id"].as_i64().unwrap();

        // Public list sees the published post
        let req = test::TestRequest::get().uri("/api/posts").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 1);

        // Anonymous comment waits for approval
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{}/comments", id))
            .set_json(json!({ "author": "Ann", "email": "ann@example.com", "content": "Nice" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let comment: Value = test::read_body_json(resp).await;
        let comment_id = comment["data"]["id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/posts/{}/comments", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 0);

        let req = test::TestRequest::put()
            .uri(&format!("/api/comments/{}/approve", comment_id))
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get()
            .uri(&format!("/api/posts/{}/comments", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total"], 1);

        // The HTML page renders the approved comment
        let req = test::TestRequest::get()
            .uri(&format!("/posts/{}", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(html.contains("Hello Rust"));
        assert!(html.contains("Nice"));
    }

    #[actix_web::test]
    async fn test_admin_pages_redirect_to_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let req = test::TestRequest::get().uri("/admin/posts").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get("Location").unwrap().to_str().unwrap();
        assert!(location.starts_with("/login?returnUrl="));
    }

    #[actix_web::test]
    async fn test_admin_dashboard_renders() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));
        let token = admin_token!(app);
        let req = test::TestRequest::get()
            .uri("/admin")
            .cookie(actix_web::cookie::Cookie::new("admin_token", token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_unknown_paths_are_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(test_config(dir.path()));

        let req = test::TestRequest::get().uri("/api/nothing-here").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/nothing-here").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
