mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tagvault_core::Store;

/// TagVault — tagged media store
#[derive(Parser)]
#[command(name = "tagvault", version, about)]
struct Cli {
    /// Path to the store database
    #[arg(long, default_value_t = default_store_path())]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tag types
    Types {
        #[command(subcommand)]
        action: Option<TypesAction>,
    },
    /// Manage tags
    Tags {
        #[command(subcommand)]
        action: Option<TagsAction>,
    },
    /// Manage catalogued media
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },
    /// Show media similar to the given file
    Similar {
        path: PathBuf,
    },
    /// Run a built-in pseudo-tag as a query
    Find {
        /// Pseudo-tag name (e.g. ext, name, no_file, video)
        pseudo: String,
        /// Pattern or path argument, where the pseudo-tag takes one
        argument: Option<String>,
        /// Match flags: i = case-insensitive, s = case-sensitive
        #[arg(long, default_value = "")]
        flags: String,
    },
    /// Import every supported file under a directory
    Import {
        dir: PathBuf,
    },
    /// Recompute perceptual hashes for the whole catalog
    Rehash,
    /// Show store summary
    Status,
}

#[derive(Subcommand)]
enum TypesAction {
    /// Create a tag type
    Add {
        label: String,
        /// Single symbol glyph, e.g. '@' or '#'
        symbol: char,
        /// RGB color as hex, e.g. ff8800
        #[arg(long, default_value = "cccccc")]
        color: String,
    },
    /// Delete a tag type (its tags survive, untyped)
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Create a tag
    Add {
        label: String,
        /// Tag type id
        #[arg(long = "type")]
        type_id: Option<i64>,
        /// Definition making this a compound (query) tag
        #[arg(long)]
        definition: Option<String>,
    },
    /// Delete a tag, detaching it everywhere
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
enum MediaAction {
    /// Catalog one file
    Add {
        path: PathBuf,
        /// Tags to attach, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove one item from the catalog
    Rm {
        id: i64,
        /// Also delete the file
        #[arg(long)]
        from_disk: bool,
    },
    /// Move the file on disk and repoint the catalog
    Mv {
        id: i64,
        new_path: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Fold a duplicate into a keeper: tags merge, the source goes away
    Merge {
        source: i64,
        dest: i64,
        /// Also delete the source file
        #[arg(long)]
        delete_source: bool,
    },
    /// Attach tags to an item
    Tag {
        id: i64,
        labels: Vec<String>,
    },
    /// Detach tags from an item
    Untag {
        id: i64,
        labels: Vec<String>,
    },
    /// List all media
    Ls,
    /// Show one item with its tags
    Show {
        id: i64,
    },
}

fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".tagvault")
        .join("store.db")
        .to_string_lossy()
        .to_string()
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_env("TAGVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let store = Store::open(&PathBuf::from(&cli.store))?;

    match cli.command {
        Commands::Types { action } => match action {
            None => commands::types::list(&store)?,
            Some(TypesAction::Add { label, symbol, color }) => {
                commands::types::add(&store, label, symbol, &color)?
            }
            Some(TypesAction::Rm { id }) => commands::types::rm(&store, id)?,
        },
        Commands::Tags { action } => match action {
            None => commands::tags::list(&store)?,
            Some(TagsAction::Add { label, type_id, definition }) => {
                commands::tags::add(&store, label, type_id, definition)?
            }
            Some(TagsAction::Rm { id }) => commands::tags::rm(&store, id)?,
        },
        Commands::Media { action } => match action {
            MediaAction::Add { path, tags } => commands::media::add(&store, path, tags)?,
            MediaAction::Rm { id, from_disk } => commands::media::rm(&store, id, from_disk)?,
            MediaAction::Mv { id, new_path, overwrite } => {
                commands::media::mv(&store, id, new_path, overwrite)?
            }
            MediaAction::Merge { source, dest, delete_source } => {
                commands::media::merge(&store, source, dest, delete_source)?
            }
            MediaAction::Tag { id, labels } => commands::media::tag(&store, id, labels)?,
            MediaAction::Untag { id, labels } => commands::media::untag(&store, id, labels)?,
            MediaAction::Ls => commands::media::ls(&store)?,
            MediaAction::Show { id } => commands::media::show(&store, id)?,
        },
        Commands::Similar { path } => commands::search::similar(&store, path)?,
        Commands::Find { pseudo, argument, flags } => {
            commands::search::find(&store, &pseudo, argument.as_deref(), &flags)?
        }
        Commands::Import { dir } => commands::import::run(&store, dir)?,
        Commands::Rehash => commands::import::rehash(&store)?,
        Commands::Status => commands::status::run(&store)?,
    }

    Ok(())
}
