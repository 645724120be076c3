use clap::Parser;
use stream_viewer_lib::config::Cli;
use stream_viewer_lib::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    if let Err(e) = stream_viewer_lib::run(cli).await {
        tracing::error!("{}", e);
        eprintln!("stream-viewer: {}", e);
        std::process::exit(1);
    }
}
