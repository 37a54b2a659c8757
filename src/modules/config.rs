use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "toy_blog.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub comments: CommentConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Mark session cookies `Secure` (set when served behind HTTPS)
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub static_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub url: String,
    pub author: String,
    pub avatar: String,
    pub banner: String,
    /// Markdown shown on the about page
    pub about: String,
    pub social_links: Vec<SocialLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub admin_email: String,
    pub admin_username: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentConfig {
    pub require_approval: bool,
    pub max_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub allowed_hosts: Vec<String>,
    pub timeout_secs: u64,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            cookie_secure: false,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            templates_dir: PathBuf::from("templates"),
            uploads_dir: PathBuf::from("uploads"),
            database_path: PathBuf::from("toy_blog.db"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Toy Blog".to_string(),
            description: "Notes, books and the odd quote".to_string(),
            url: "http://localhost:8080".to_string(),
            author: "admin".to_string(),
            avatar: String::new(),
            banner: "写点代码，读点书。".to_string(),
            about: "## 关于\n\n这里是我的个人博客。".to_string(),
            social_links: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            admin_email: String::new(),
            admin_username: "admin".to_string(),
            admin_password: String::new(),
        }
    }
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            require_approval: true,
            max_length: 2000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec![
                "avatars.githubusercontent.com".to_string(),
                "cdn.jsdelivr.net".to_string(),
                "www.gravatar.com".to_string(),
            ],
            timeout_secs: 10,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 1000,
        }
    }
}

impl GithubConfig {
    pub fn is_enabled(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `toy_blog.toml` in the
    /// working directory is tried, then `<config_dir>/toy_blog/config.toml`,
    /// and finally the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)?;
            return Ok(toml::from_str(&content)?);
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                log::debug!("Reading config from {}", candidate.display());
                let content = std::fs::read_to_string(&candidate)?;
                return Ok(toml::from_str(&content)?);
            }
        }

        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("toy_blog").join("config.toml"));
        }
        paths
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create the directories the server writes into
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.paths.uploads_dir)?;
        std::fs::create_dir_all(&self.paths.static_dir)?;
        if let Some(parent) = self.paths.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> String {
        self.paths.database_path.to_string_lossy().to_string()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Configuration rooted in a scratch directory, for tests
#[cfg(test)]
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.database_path = dir.join("test.db");
    config.paths.uploads_dir = dir.join("uploads");
    config.paths.static_dir = dir.join("static");
    config.paths.templates_dir = dir.join("templates");
    config.auth.admin_email = "admin@example.com".to_string();
    config.auth.admin_password = "secret-password".to_string();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
port = 9000

[comments]
require_approval = false
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.comments.require_approval);
        assert_eq!(config.comments.max_length, 2000);
        assert_eq!(config.pagination.max_page_size, 1000);
        assert!(!config.github.is_enabled());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blog.toml");

        let mut config = Config::default();
        config.site.title = "Elsewhere".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.site.title, "Elsewhere");
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
