use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::app::converter::ConverterConfig;
use crate::app::layout::SiteLayout;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the store documents and upload directories.
    Init(InitArgs),
    /// Convert a local document into a book and its per-page posts.
    Ingest(IngestArgs),
    Books {
        #[command(subcommand)]
        command: BooksCommand,
    },
    Posts {
        #[command(subcommand)]
        command: PostsCommand,
    },
}

#[derive(Debug, Clone, Args)]
pub struct SiteArgs {
    /// Directory holding `books.json` and `posts.json`.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory served as the site root; books are generated under `books/`.
    #[arg(long, default_value = "public")]
    pub public_dir: PathBuf,

    /// Directory receiving uploaded files.
    #[arg(long, default_value = "uploads")]
    pub uploads_dir: PathBuf,
}

impl SiteArgs {
    pub fn layout(&self) -> SiteLayout {
        SiteLayout::new(&self.data_dir, &self.public_dir, &self.uploads_dir)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConverterArgs {
    /// Converter executable (default: $FOLIO_CONVERTER_BIN or `python3`).
    #[arg(long)]
    pub converter_bin: Option<String>,

    /// Argument placed before the `--pdf/--out/--title` options (repeatable).
    /// Replaces $FOLIO_CONVERTER_ARGS when given.
    #[arg(long = "converter-arg", allow_hyphen_values = true)]
    pub converter_args: Vec<String>,

    /// Seconds before a running conversion is killed.
    #[arg(long)]
    pub converter_timeout_secs: Option<u64>,
}

impl ConverterArgs {
    /// Environment defaults overridden by whatever was passed on the command line.
    pub fn config(&self) -> ConverterConfig {
        let mut config = ConverterConfig::from_env();
        if let Some(bin) = &self.converter_bin {
            config.bin = bin.clone();
        }
        if !self.converter_args.is_empty() {
            config.args = self.converter_args.clone();
        }
        if let Some(secs) = self.converter_timeout_secs.filter(|s| *s > 0) {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub site: SiteArgs,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    #[command(flatten)]
    pub converter: ConverterArgs,

    /// Document to ingest.
    #[arg(long)]
    pub pdf: PathBuf,

    /// Book title (default: derived from the file name).
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum BooksCommand {
    /// Print all books as JSON, newest first.
    List(ListArgs),
}

#[derive(Debug, Subcommand)]
pub enum PostsCommand {
    /// Print all posts as JSON, newest first.
    List(ListArgs),
    /// Publish a post.
    Add(PostAddArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub site: SiteArgs,
}

#[derive(Debug, Args)]
pub struct PostAddArgs {
    #[command(flatten)]
    pub site: SiteArgs,

    #[arg(long)]
    pub title: String,

    /// Post body; a small set of formatting tags is kept.
    #[arg(long)]
    pub body: String,
}
