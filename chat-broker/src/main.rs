use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use chat_broker::{
    cli::{Cli, Command},
    simulate,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => {
            let json = args.json;
            let summary = simulate::run(args, shutdown).await?;
            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                println!("{}", summary.render());
            }
        }
    }

    Ok(())
}

fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            return;
        }
        shutdown.cancel();
    });
}
