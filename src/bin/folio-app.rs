use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use folio::app::converter::CommandConverter;
use folio::app::server::{self, AppState};
use folio::cli::{ConverterArgs, SiteArgs};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    #[command(flatten)]
    site: SiteArgs,

    #[command(flatten)]
    converter: ConverterArgs,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    folio::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting folio-app");

    let config = args.converter.config();
    tracing::info!(
        bin = %config.bin,
        args = ?config.args,
        timeout_secs = config.timeout.as_secs(),
        "using command converter"
    );
    let converter = Arc::new(CommandConverter::new(config));
    let state = AppState::open(args.site.layout(), converter).await?;

    server::serve(args.addr, state).await
}
