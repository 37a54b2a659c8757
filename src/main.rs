mod modules;

use modules::{cli, config, error, pagination};
use modules::database::{collections, comments, friends, hitokoto, images, posts, schema, tags, users};
use modules::content::{markdown, media, templates};
use modules::web::{admin, api, auth, pages, proxy, response, routes, upload};

use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use cli::{Cli, Commands};
use config::{Config, DEFAULT_CONFIG_FILE};
use log::info;
use std::path::Path;
use templates::TemplateRenderer;

fn main() -> std::io::Result<()> {
    let args = Cli::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config.server.log_level.as_str()));

    match args.command {
        None | Some(Commands::Serve) => run_server(config, args.config.is_none()),
        Some(command) => {
            if let Err(e) = cli::run(&command, &config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

#[actix_web::main]
async fn run_server(config: Config, write_default: bool) -> std::io::Result<()> {
    info!("Starting Toy Blog...");

    // Save default config if it doesn't exist
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if write_default && !default_path.exists() {
        match config.save(default_path) {
            Ok(()) => info!("已写入默认配置: {}", default_path.display()),
            Err(e) => info!("Failed to save config file: {}", e),
        }
    }

    config.ensure_dirs()?;
    info!("Database: {}", config.paths.database_path.display());
    info!("Uploads directory: {}", config.paths.uploads_dir.display());

    match auth::bootstrap_admin(&config) {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Failed to prepare database: {}", e);
            std::process::exit(1);
        }
    }

    actix_web::rt::spawn(auth::sweep_sessions(config.clone()));

    let renderer = match TemplateRenderer::new(&config) {
        Ok(r) => web::Data::new(r),
        Err(e) => {
            eprintln!("Failed to load templates: {:?}", e);
            std::process::exit(1);
        }
    };

    let bind_address = config.bind_address();
    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let config = config.clone();
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(renderer.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(move |cfg| routes::configure_routes(cfg, &config))
    })
    .bind(&bind_address)?
    .run()
    .await
}
