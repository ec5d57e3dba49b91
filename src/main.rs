// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! photo-refine command line: run the gallery server or manage refinements

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use photo_refine::config::AppConfig;
use photo_refine::db::Database;
use photo_refine::gallery::{Gallery, NextView};
use photo_refine::{RefineError, Result};

/// photo-refine - swipe through photo folders down to favorites
#[derive(Parser, Debug)]
#[command(name = "photo-refine")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Self-hosted photo curation by iterative yes/no/skip refinement", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for listings
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List collections (folders with images)
    Collections,

    /// List refinements
    Refinements {
        /// List completed refinements instead of active ones
        #[arg(long)]
        complete: bool,
    },

    /// Start a refinement from a folder or from another refinement
    Start {
        /// Collection folder to snapshot
        #[arg(long, conflicts_with = "from", required_unless_present = "from")]
        folder: Option<String>,

        /// Refinement whose yes items to snapshot
        #[arg(long)]
        from: Option<i64>,

        /// Name for the new refinement
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Show a refinement, its chain and the item up next
    Show {
        id: i64,
    },

    /// Print the folder a refinement's images live in
    Root {
        id: i64,
    },

    /// Initialize a new photo-refine directory
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load(&cli.config)?;
    let json = cli.format == "json";

    match cli.command {
        Some(Commands::Serve { host, port }) => run_serve(config, host, port).await,
        Some(Commands::Collections) => run_collections(&config, json),
        Some(Commands::Refinements { complete }) => run_refinements(&config, complete, json),
        Some(Commands::Start { folder, from, name }) => run_start(&config, folder, from, &name),
        Some(Commands::Show { id }) => run_show(&config, id, json),
        Some(Commands::Root { id }) => run_root(&config, id),
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        Some(Commands::Config { action }) => run_config_command(config, action),
        None => run_serve(config, None, None).await,
    }
}

fn open_gallery(config: &AppConfig) -> Result<Gallery> {
    let db = Database::open(config.database_path())?;
    Ok(Gallery::from_config(config, db))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the web server
async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    let db_path = config.database_path();
    let db = Database::open(&db_path)?;
    info!("Database: {:?}", db_path);

    photo_refine::web::start_server(config, db).await
}

fn run_collections(config: &AppConfig, json: bool) -> Result<()> {
    let collections = open_gallery(config)?.list_collections()?;
    if json {
        return print_json(&collections);
    }

    if collections.is_empty() {
        println!("No collections under {:?}", config.photos_dir);
    }
    for c in collections {
        println!("  {} ({} images)", c.name, c.image_count);
    }
    Ok(())
}

fn run_refinements(config: &AppConfig, complete: bool, json: bool) -> Result<()> {
    let gallery = open_gallery(config)?;
    let refinements = if complete {
        gallery.completed_refinements()?
    } else {
        gallery.active_refinements()?
    };
    if json {
        return print_json(&refinements);
    }

    println!("{} refinements ({}):", if complete { "Completed" } else { "Active" }, refinements.len());
    for r in refinements {
        println!(
            "  #{} {} [{}] {}/{} rated, {} yes, from {} ({})",
            r.id,
            r.name,
            r.status.as_str(),
            r.progress.decided(),
            r.progress.total,
            r.progress.yes,
            r.source.label(),
            r.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

fn run_start(config: &AppConfig, folder: Option<String>, from: Option<i64>, name: &str) -> Result<()> {
    let gallery = open_gallery(config)?;
    let id = match (folder, from) {
        (Some(folder), None) => gallery.start_refinement("collection", &folder, name)?,
        (None, Some(from)) => gallery.start_refinement("refinement", &from.to_string(), name)?,
        _ => {
            return Err(RefineError::InvalidInput(
                "give exactly one of --folder or --from".to_string(),
            ))
        }
    };
    println!("Started refinement #{}", id);
    Ok(())
}

fn run_show(config: &AppConfig, id: i64, json: bool) -> Result<()> {
    let gallery = open_gallery(config)?;
    let next = gallery.current_item(id)?;
    let view = gallery.refinement(id)?;
    let chain = gallery.chain(id)?;

    if json {
        return print_json(&serde_json::json!({
            "refinement": view,
            "chain": chain,
            "next": next,
        }));
    }

    println!("Refinement #{}: {}", view.id, view.name);
    println!("  Status:  {}", view.status.as_str());
    println!("  Created: {}", view.created_at.format("%Y-%m-%d %H:%M"));
    println!(
        "  Items:   {} total, {} pending, {} skipped, {} yes, {} no",
        view.progress.total, view.progress.pending, view.progress.skipped, view.progress.yes, view.progress.no
    );
    let breadcrumb: Vec<String> = chain.iter().rev().map(|r| format!("#{} {}", r.id, r.name)).collect();
    println!(
        "  Chain:   {} > {}",
        view.root_folder.as_deref().unwrap_or("?"),
        breadcrumb.join(" > ")
    );
    match next {
        NextView::Item(item) => println!("  Next:    {} (item {})", item.image.name, item.item_id),
        NextView::Exhausted { yes_count, .. } => println!("  Done:    {} yes", yes_count),
    }
    Ok(())
}

fn run_root(config: &AppConfig, id: i64) -> Result<()> {
    let gallery = open_gallery(config)?;
    println!("{}", gallery.engine().resolve_root_folder(id)?);
    Ok(())
}

/// Initialize a new photo-refine directory
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(RefineError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let photos_dir = target.join("photos");
    let data_dir = target.join("data");
    std::fs::create_dir_all(&photos_dir)?;
    std::fs::create_dir_all(&data_dir)?;

    let config = AppConfig {
        photos_dir,
        data_dir,
        ..AppConfig::default()
    };
    config.save(&config_path)?;

    println!("photo-refine initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - photos/  (one subfolder per collection)");
    println!("  - data/");
    println!("\nNext steps:");
    println!("  1. Copy some folders of images into photos/");
    println!("  2. Start the server: photo-refine serve");

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => print_json(&config),
        ConfigCommands::Generate { output } => generate_config(&output),
    }
}

fn generate_config(output: &Path) -> Result<()> {
    AppConfig::default().save(output)?;
    println!("Generated config at {:?}", output);
    Ok(())
}
