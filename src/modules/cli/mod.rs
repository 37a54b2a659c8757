use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use crate::config::Config;
use crate::markdown::{parse_frontmatter, Frontmatter};
use crate::posts::{post_slug, PostDB, PostInput, PostStatus, TagRef};
use crate::users::{NewUser, Role, UserDB, MIN_PASSWORD_LEN};

#[derive(Parser, Debug)]
#[command(name = "toy_blog")]
#[command(version)]
#[command(about = "Toy Blog server and admin tool", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./toy_blog.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Start the blog server (default)")]
    Serve,

    #[command(about = "Manage admin accounts")]
    Admin {
        #[command(subcommand)]
        action: AdminActions,
    },

    #[command(about = "Import Markdown files with frontmatter as posts")]
    Import {
        #[arg(help = "Directory to scan for *.md files")]
        dir: PathBuf,

        /// Publish imported posts unless their frontmatter says `draft: true`
        #[arg(long)]
        publish: bool,
    },

    #[command(name = "new-post")]
    #[command(about = "Write a Markdown skeleton for a new post")]
    NewPost {
        #[arg(help = "Title of the new post")]
        title: String,

        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminActions {
    #[command(about = "Create an admin, or promote and reset an existing account")]
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
    },
}

/// Run a non-server subcommand
pub fn run(command: &Commands, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve => Ok(()),
        Commands::Admin {
            action: AdminActions::Create { email, username, password },
        } => {
            let user = create_admin(config, email, username, password)?;
            println!("✓ Admin '{}' <{}> is ready", user.username, user.email);
            Ok(())
        }
        Commands::Import { dir, publish } => {
            let report = import_markdown(config, dir, *publish)?;
            println!(
                "✓ Imported {} post(s), skipped {} existing, {} failed",
                report.imported, report.skipped, report.failed
            );
            Ok(())
        }
        Commands::NewPost { title, dir } => {
            let path = create_post_file(dir, title)?;
            println!("✓ Post '{}' created at: {}", title, path.display());
            Ok(())
        }
    }
}

fn create_admin(
    config: &Config,
    email: &str,
    username: &str,
    password: &str,
) -> Result<crate::users::User, Box<dyn std::error::Error>> {
    let email = email.trim();
    if !email.contains('@') {
        return Err(format!("Invalid email: {}", email).into());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {} characters", MIN_PASSWORD_LEN).into());
    }
    config.ensure_dirs()?;
    let db = UserDB::new(&config.database_path())?;
    Ok(db.upsert_user(&NewUser {
        username: username.trim().to_string(),
        email: email.to_string(),
        password: password.to_string(),
        role: Role::Admin,
    })?)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Import every `*.md` under `dir`; posts whose slug already exists are skipped
pub fn import_markdown(
    config: &Config,
    dir: &Path,
    publish: bool,
) -> Result<ImportReport, Box<dyn std::error::Error>> {
    if !dir.is_dir() {
        return Err(format!("Not a directory: {}", dir.display()).into());
    }
    config.ensure_dirs()?;
    let db = PostDB::new(&config.database_path())?;
    let mut report = ImportReport::default();

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        match import_file(&db, path, publish) {
            Ok(true) => report.imported += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                log::warn!("导入失败 {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }
    log::info!(
        "导入完成: {} 篇新文章, {} 篇已存在, {} 篇失败",
        report.imported,
        report.skipped,
        report.failed
    );
    Ok(report)
}

fn import_file(db: &PostDB, path: &Path, publish: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let (meta, body) = parse_frontmatter(&raw)?;

    let title = meta
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "untitled".to_string());
    let slug = post_slug(meta.slug.as_deref().unwrap_or(&title));
    if db.get_by_slug(&slug)?.is_some() {
        log::debug!("跳过已存在的文章: {}", slug);
        return Ok(false);
    }

    let status = if publish && !meta.draft.unwrap_or(false) {
        PostStatus::Published
    } else {
        PostStatus::Draft
    };
    let input = PostInput {
        title: Some(title),
        slug: Some(slug),
        content: Some(body.trim().to_string()),
        excerpt: meta.description.clone(),
        cover: meta.cover.clone(),
        status: Some(status),
        tags: meta
            .tags
            .as_ref()
            .map(|tags| tags.iter().cloned().map(TagRef::Name).collect()),
        created_at: meta.parsed_date().map(|d| d.to_rfc3339()),
    };
    db.create(&input, None)?;
    Ok(true)
}

/// Write `<dir>/<slug>.md` with an empty frontmatter block
pub fn create_post_file(dir: &Path, title: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = dir.join(format!("{}.md", post_slug(title)));
    if path.exists() {
        return Err(format!("Post '{}' already exists at '{}'", title, path.display()).into());
    }
    fs::create_dir_all(dir)?;

    let meta = Frontmatter {
        title: Some(title.to_string()),
        date: Some(Utc::now().to_rfc3339()),
        tags: Some(Vec::new()),
        draft: Some(true),
        ..Frontmatter::default()
    };
    let content = format!(
        "---\n{}---\n\n# {}\n\n在这里开始写你的文章内容...\n",
        serde_yaml::to_string(&meta)?,
        title
    );
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::pagination::{PageParams, PageQuery};
    use crate::posts::{PostListQuery, StatusFilter, POST_SORTABLE};

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["toy_blog", "-c", "site.toml", "import", "posts", "--publish"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
        assert!(matches!(cli.command, Some(Commands::Import { publish: true, .. })));

        let cli = Cli::try_parse_from(["toy_blog"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "toy_blog", "admin", "create", "--email", "a@b.c", "--password", "longenough",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Admin { action: AdminActions::Create { username, .. } }) => {
                assert_eq!(username, "admin")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_import_markdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = dir.path().join("md");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(
            source.join("hello.md"),
            "---\ntitle: Hello World\ndate: 2023-05-01\ntags: [rust, web]\ndescription: first\n---\n\n# Hi\n",
        )
        .unwrap();
        fs::write(
            source.join("nested").join("wip.md"),
            "---\ntitle: Work in progress\ndraft: true\n---\nsoon",
        )
        .unwrap();
        fs::write(source.join("notes.txt"), "ignored").unwrap();

        let report = import_markdown(&config, &source, true).unwrap();
        assert_eq!(report, ImportReport { imported: 2, skipped: 0, failed: 0 });

        let db = PostDB::new(&config.database_path()).unwrap();
        let post = db.get_by_slug("hello-world").unwrap().unwrap();
        assert!(post.is_published());
        assert_eq!(post.excerpt, "first");
        assert_eq!(post.tags.len(), 2);
        assert!(post.created_at.starts_with("2023-05-01"));
        assert!(!db.get_by_slug("work-in-progress").unwrap().unwrap().is_published());

        let again = import_markdown(&config, &source, true).unwrap();
        assert_eq!(again, ImportReport { imported: 0, skipped: 2, failed: 0 });
        let query = PostListQuery {
            page: PageQuery::from_params(&PageParams::default(), &config.pagination, POST_SORTABLE),
            tag: None,
            status: StatusFilter::All,
        };
        assert_eq!(db.list(&query).unwrap().1, 2);
    }

    #[test]
    fn test_create_admin_validates_password() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(create_admin(&config, "root@example.com", "root", "short").is_err());
        let user = create_admin(&config, "root@example.com", "root", "long-password").unwrap();
        assert!(user.is_admin());
    }

    #[test]
    fn test_create_post_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_post_file(dir.path(), "My First Post").unwrap();
        assert!(path.ends_with("my-first-post.md"));
        let text = fs::read_to_string(&path).unwrap();
        let (meta, body) = parse_frontmatter(&text).unwrap();
        assert_eq!(meta.title.as_deref(), Some("My First Post"));
        assert_eq!(meta.draft, Some(true));
        assert!(meta.parsed_date().is_some());
        assert!(body.contains("# My First Post"));
        assert!(create_post_file(dir.path(), "My First Post").is_err());
    }

    #[test]
    fn test_create_post_file_quotes_yaml_title() {
        let dir = tempfile::tempdir().unwrap();
        for title in ["Rust: tips", "#1 - [draft] {x}", "yes"] {
            let path = create_post_file(dir.path(), title).unwrap();
            let text = fs::read_to_string(&path).unwrap();
            let (meta, _) = parse_frontmatter(&text).unwrap();
            assert_eq!(meta.title.as_deref(), Some(title));
            assert_eq!(meta.tags, Some(Vec::new()));
        }
    }
}
