use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use folio::cli::{BooksCommand, Cli, Command, PostsCommand};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    folio::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Init(args) => {
            folio::commands::init(args).await.context("init")?;
        }
        Command::Ingest(args) => {
            folio::commands::ingest(args).await.context("ingest")?;
        }
        Command::Books {
            command: BooksCommand::List(args),
        } => {
            folio::commands::list_books(args)
                .await
                .context("books list")?;
        }
        Command::Posts {
            command: PostsCommand::List(args),
        } => {
            folio::commands::list_posts(args)
                .await
                .context("posts list")?;
        }
        Command::Posts {
            command: PostsCommand::Add(args),
        } => {
            folio::commands::add_post(args).await.context("posts add")?;
        }
    }

    Ok(())
}
