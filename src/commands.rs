use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;

use crate::app::blog::{self, PostDraft};
use crate::app::converter::{CommandConverter, ConverterConfig};
use crate::app::model::CreatePostRequest;
use crate::app::server::AppState;
use crate::app::uploads::{UploadKind, stage_local_file};
use crate::cli::{IngestArgs, InitArgs, ListArgs, PostAddArgs, SiteArgs};

pub async fn init(args: InitArgs) -> anyhow::Result<()> {
    let state = open(&args.site, ConverterConfig::from_env()).await?;
    tracing::info!(
        data_dir = %state.layout.data_dir().display(),
        public_dir = %state.layout.public_dir().display(),
        uploads_dir = %state.layout.uploads_dir().display(),
        "site initialized"
    );
    Ok(())
}

pub async fn ingest(args: IngestArgs) -> anyhow::Result<()> {
    let state = open(&args.site, args.converter.config()).await?;

    let upload = stage_local_file(state.layout.uploads_dir(), UploadKind::Pdf, &args.pdf)
        .await
        .with_context(|| format!("stage {}", args.pdf.display()))?;
    let book = state
        .pipeline
        .ingest(&upload, args.title.as_deref())
        .await?;

    print_json(&book)
}

pub async fn list_books(args: ListArgs) -> anyhow::Result<()> {
    let state = open(&args.site, ConverterConfig::from_env()).await?;
    let books = state.books.list().await.context("list books")?;
    print_json(&books)
}

pub async fn list_posts(args: ListArgs) -> anyhow::Result<()> {
    let state = open(&args.site, ConverterConfig::from_env()).await?;
    let posts = state.posts.list().await.context("list posts")?;
    print_json(&posts)
}

pub async fn add_post(args: PostAddArgs) -> anyhow::Result<()> {
    let state = open(&args.site, ConverterConfig::from_env()).await?;

    let draft = PostDraft::from_request(&CreatePostRequest {
        title: Some(args.title),
        body: Some(args.body),
    })?;
    let post = blog::publish(state.posts.as_ref(), draft)
        .await
        .context("publish post")?;
    print_json(&post)
}

async fn open(site: &SiteArgs, converter: ConverterConfig) -> anyhow::Result<AppState> {
    AppState::open(site.layout(), Arc::new(CommandConverter::new(converter))).await
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("write json")?;
    writeln!(stdout).context("write json")?;
    Ok(())
}
