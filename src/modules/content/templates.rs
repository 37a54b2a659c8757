use std::collections::HashMap;

use serde::Serialize;
use tera::{Context, Tera, Value};

use crate::config::Config;
use crate::media::image_src;
use crate::users::User;

/// Templates compiled into the binary, keyed by their Tera name
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../../templates/base.html")),
    ("macros.html", include_str!("../../../templates/macros.html")),
    ("index.html", include_str!("../../../templates/index.html")),
    ("posts.html", include_str!("../../../templates/posts.html")),
    ("post.html", include_str!("../../../templates/post.html")),
    ("archive.html", include_str!("../../../templates/archive.html")),
    ("books.html", include_str!("../../../templates/books.html")),
    ("friends.html", include_str!("../../../templates/friends.html")),
    ("hitokoto.html", include_str!("../../../templates/hitokoto.html")),
    ("about.html", include_str!("../../../templates/about.html")),
    ("login.html", include_str!("../../../templates/login.html")),
    ("auth_callback.html", include_str!("../../../templates/auth_callback.html")),
    ("error.html", include_str!("../../../templates/error.html")),
    ("admin/base.html", include_str!("../../../templates/admin/base.html")),
    ("admin/macros.html", include_str!("../../../templates/admin/macros.html")),
    ("admin/dashboard.html", include_str!("../../../templates/admin/dashboard.html")),
    ("admin/posts.html", include_str!("../../../templates/admin/posts.html")),
    ("admin/post_form.html", include_str!("../../../templates/admin/post_form.html")),
    ("admin/comments.html", include_str!("../../../templates/admin/comments.html")),
    ("admin/tags.html", include_str!("../../../templates/admin/tags.html")),
    ("admin/hitokoto.html", include_str!("../../../templates/admin/hitokoto.html")),
    ("admin/books.html", include_str!("../../../templates/admin/books.html")),
    ("admin/book_form.html", include_str!("../../../templates/admin/book_form.html")),
    ("admin/friends.html", include_str!("../../../templates/admin/friends.html")),
    ("admin/images.html", include_str!("../../../templates/admin/images.html")),
];

/// `{{ url | image_src }}`: route remote images through the proxy
fn image_src_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::String(url) => Ok(Value::String(image_src(url))),
        Value::Null => Ok(Value::String(String::new())),
        other => Err(tera::Error::msg(format!("image_src expects a string, got {}", other))),
    }
}

pub struct TemplateRenderer {
    tera: Tera,
    config: Config,
}

impl TemplateRenderer {
    /// Built-in templates, with same-named files under `paths.templates_dir` taking precedence
    pub fn new(config: &Config) -> tera::Result<Self> {
        let mut sources: Vec<(String, String)> = Vec::with_capacity(BUILTIN_TEMPLATES.len());
        for (name, builtin) in BUILTIN_TEMPLATES {
            let custom = config.paths.templates_dir.join(name);
            let source = match std::fs::read_to_string(&custom) {
                Ok(text) => {
                    log::info!("使用自定义模板: {}", custom.display());
                    text
                }
                Err(_) => builtin.to_string(),
            };
            sources.push((name.to_string(), source));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(sources)?;
        tera.register_filter("image_src", image_src_filter);
        log::debug!("已加载 {} 个模板", tera.get_template_names().count());

        Ok(Self {
            tera,
            config: config.clone(),
        })
    }

    /// Context shared by every page: site settings, the viewer and a flash notice
    pub fn base_context(&self, user: Option<&User>, notice: Option<&str>) -> Context {
        let mut context = Context::new();
        context.insert("site", &self.config.site);
        context.insert("github_enabled", &self.config.github.is_enabled());
        context.insert("current_user", &user);
        context.insert("user_name", &user.map(User::display_name).unwrap_or(""));
        context.insert("notice", &notice.filter(|n| !n.is_empty()));
        context.insert("year", &chrono::Utc::now().format("%Y").to_string());
        context
    }

    pub fn render(&self, template: &str, context: &Context) -> tera::Result<String> {
        self.tera.render(template, context).map_err(|e| {
            log::error!("渲染模板 {} 失败: {:?}", template, e);
            e
        })
    }

    /// Error page; falls back to plain text if the template itself fails
    pub fn render_error(&self, status: u16, message: &str, user: Option<&User>) -> String {
        let mut context = self.base_context(user, None);
        context.insert("status", &status);
        context.insert("message", message);
        self.render("error.html", &context)
            .unwrap_or_else(|_| format!("{} {}", status, message))
    }
}

/// `{value, label}` pairs for select boxes and filter tabs
#[derive(Debug, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_builtin_templates_compile() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TemplateRenderer::new(&test_config(dir.path())).unwrap();
        let html = renderer.render_error(404, "页面不存在", None);
        assert!(html.contains("404"));
        assert!(html.contains("页面不存在"));
        assert!(html.contains("Toy Blog"));
    }

    #[test]
    fn test_custom_template_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.paths.templates_dir).unwrap();
        std::fs::write(
            config.paths.templates_dir.join("about.html"),
            "custom about for {{ site.title }}",
        )
        .unwrap();

        let renderer = TemplateRenderer::new(&config).unwrap();
        let html = renderer
            .render("about.html", &renderer.base_context(None, None))
            .unwrap();
        assert_eq!(html, "custom about for Toy Blog");
    }

    #[test]
    fn test_image_src_filter() {
        let args = HashMap::new();
        assert_eq!(
            image_src_filter(&Value::String("https://x.test/a.png".into()), &args).unwrap(),
            Value::String("/api/proxy-image?url=https%3A%2F%2Fx.test%2Fa.png".into())
        );
        assert_eq!(
            image_src_filter(&Value::Null, &args).unwrap(),
            Value::String(String::new())
        );
        assert!(image_src_filter(&Value::Bool(true), &args).is_err());
    }
}
