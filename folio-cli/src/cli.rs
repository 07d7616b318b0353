use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Manage article storage backends")]
pub struct Cli {
    /// Path to the backend settings file (JSON or YAML)
    #[clap(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[clap(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    pub log_json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and change the configured backends
    #[clap(subcommand)]
    Backend(BackendCommand),

    /// Copy every article of the primary backend into another backend
    Migrate {
        /// Backend config file describing the target
        #[clap(long)]
        to: PathBuf,

        /// Only validate the target and count what would be migrated
        #[clap(long)]
        dry_run: bool,

        /// Articles per batch
        #[clap(long)]
        batch_size: Option<usize>,

        /// Write a ZIP backup of the primary here before migrating
        #[clap(long)]
        backup_dir: Option<PathBuf>,

        /// Do not copy asset files
        #[clap(long)]
        skip_assets: bool,
    },

    /// Push newer primary articles into the fallback backend
    Sync,

    /// Work with articles on the primary backend
    #[clap(subcommand)]
    Article(ArticleCommand),
}

#[derive(Subcommand, Debug)]
pub enum BackendCommand {
    /// Show the active configuration (secrets redacted)
    Info {
        /// Print as JSON
        #[clap(long)]
        json: bool,
    },

    /// Check that a backend is reachable
    Test {
        /// Backend config file; the primary is tested when omitted
        #[clap(long)]
        config: Option<PathBuf>,
    },

    /// Make another backend the primary
    Switch {
        /// Backend config file
        #[clap(long)]
        config: PathBuf,
    },

    /// Pick and configure a new primary backend interactively
    Select,

    /// Set or clear the fallback backend
    Fallback {
        /// Backend config file
        #[clap(long, conflicts_with = "clear")]
        config: Option<PathBuf>,

        /// Remove the fallback
        #[clap(long)]
        clear: bool,
    },

    /// Turn primary-to-fallback sync on or off
    SyncEnabled {
        /// true or false
        #[clap(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ArticleCommand {
    /// List articles, newest first
    List {
        /// Only articles carrying this tag
        #[clap(long)]
        tag: Option<String>,

        /// Only articles in this category
        #[clap(long)]
        category: Option<String>,

        /// Only featured articles
        #[clap(long)]
        featured: bool,
    },

    /// Show one article
    Show {
        /// Article slug
        slug: String,

        /// Print the full record as JSON
        #[clap(long)]
        json: bool,
    },

    /// Search titles, summaries, tags and categories
    Search {
        /// Text to look for
        query: String,
    },

    /// Create an article interactively
    Create,

    /// Delete one or more articles
    Delete {
        /// Slugs to delete
        #[clap(required = true)]
        slugs: Vec<String>,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Import articles from a ZIP bundle
    Import {
        /// Path to the ZIP file
        file: PathBuf,
    },

    /// Export articles to a ZIP bundle
    Export {
        /// Slugs to export; all articles when omitted
        slugs: Vec<String>,

        /// Output file
        #[clap(long, short = 'o')]
        output: PathBuf,
    },
}
