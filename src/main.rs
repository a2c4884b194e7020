//! Image Excluder - tile server and review session CLI.
//!
//! This binary parses the command line, sets up logging and runs one of the
//! `serve`, `inspect` or `review` commands.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_excluder::{
    config::{Cli, Command, InspectConfig, ReviewAction, ReviewConfig, ServeConfig},
    server::{create_router, InfoResponse, RouterConfig},
    session::{ReviewOptions, ReviewSession, ViewerUrls},
    slide::{LocalSlideSource, SlideRegistry},
    tile::{dzi::DEFAULT_DZI_TILE_SIZE, TileService, TileServiceOptions},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Inspect(config) => run_inspect(config).await,
        Command::Review(config) => run_review(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_excluder=debug,tower_http=debug"
    } else {
        "image_excluder=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match LocalSlideSource::new(&config.root) {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot open root directory {}: {}", config.root.display(), e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Root: {}", source.root().display());
    info!(
        "  Cache: {}MB tiles, {} decoded images",
        config.cache_tiles / (1024 * 1024),
        config.cache_decoded
    );
    info!(
        "  Tiles: {}px, JPEG quality {}",
        config.tile_size, config.jpeg_quality
    );

    let registry = SlideRegistry::with_flat_options(source, config.tile_size, config.max_flat_bytes);
    let tile_service = TileService::with_options(
        Arc::new(registry),
        TileServiceOptions {
            cache_capacity: config.cache_tiles,
            decoded_capacity: config.cache_decoded,
            dzi_tile_size: config.tile_size,
            default_quality: config.jpeg_quality,
        },
    );

    let router = create_router(tile_service, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/info/<image>", addr);
    info!("    curl http://{}/dzi/<image>.dzi", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_range_chunk(config.range_chunk)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let (Some(name), parent) = (config.path.file_name(), config.path.parent()) else {
        eprintln!("Error: not a file path: {}", config.path.display());
        return ExitCode::FAILURE;
    };
    let parent = match parent {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = name.to_string_lossy().into_owned();

    let source = match LocalSlideSource::new(parent) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let service = TileService::new(SlideRegistry::new(source));

    let slide = match service.descriptor(&name).await {
        Ok(slide) => slide,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let info = InfoResponse::from_slide(name, slide.as_ref(), DEFAULT_DZI_TILE_SIZE);
    match serde_json::to_string_pretty(&info) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Review Command
// =============================================================================

fn run_review(config: ReviewConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = ReviewOptions {
        images_per_page: config.per_page,
        page_overlap: config.overlap,
        backup_dir: config.backup_dir(),
        use_thumbnail_view: false,
    };
    let mut session = match ReviewSession::open(&config.dir, options) {
        Ok(session) => session,
        Err(e) => {
            error!("Cannot open review session: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match review_action(&mut session, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn review_action(
    session: &mut ReviewSession,
    config: &ReviewConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match &config.action {
        ReviewAction::Status => {
            let status = session.status();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        ReviewAction::Page { page } => {
            let urls = ViewerUrls::new(config.tile_server.as_str());
            let page = session.go_to_page(*page);
            println!("Page {} of {}", page + 1, session.total_pages());
            for image in session.page_images() {
                let marker = match session.exclusions().get(image) {
                    Some(record) => format!("excluded ({})", record.reason),
                    None => "included".to_string(),
                };
                println!("  {}  [{}]", image.display(), marker);
                println!("    {}", urls.dzi_url(image));
            }
        }
        ReviewAction::Exclude {
            paths,
            reason,
            page,
        } => match page {
            Some(page) => {
                session.go_to_page(*page);
                let count = session.exclude_page(reason)?;
                println!("Excluded {} image(s) on page {}", count, session.current_page() + 1);
            }
            None => {
                for path in paths {
                    session.exclude(path, reason)?;
                }
                println!("Excluded {} image(s)", paths.len());
            }
        },
        ReviewAction::Include { paths, page } => match page {
            Some(page) => {
                session.go_to_page(*page);
                let count = session.include_page()?;
                println!("Included {} image(s) on page {}", count, session.current_page() + 1);
            }
            None => {
                let mut count = 0;
                for path in paths {
                    if session.include(path)? {
                        count += 1;
                    }
                }
                println!("Included {} image(s)", count);
            }
        },
        ReviewAction::Export { output } => {
            session.export_csv(output)?;
            println!(
                "Wrote {} exclusion(s) to {}",
                session.exclusions().len(),
                output.display()
            );
        }
        ReviewAction::Backup => match session.save_backup()? {
            Some(path) => println!("Saved backup to {}", path.display()),
            None => println!("Backups are disabled"),
        },
        ReviewAction::Reasons { add } => {
            if let Some(reason) = add {
                if session.add_reason(reason)? {
                    println!("Added reason: {}", reason.trim());
                }
            }
            for reason in session.reasons().as_slice() {
                println!("  {}", reason);
            }
        }
    }
    Ok(())
}
