use clap::Parser;
use docshot::{setup_logging, Cli, CliRunner};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(args.verbose)?;

    info!("Starting docshot v{}", env!("CARGO_PKG_VERSION"));

    let runner = CliRunner::new(&args);

    // Auxiliary servers stop when the interrupted build is dropped.
    let result = tokio::select! {
        result = runner.run(args.command) => result,
        _ = signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
