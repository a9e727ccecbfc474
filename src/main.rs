// src/main.rs

use swarmstate::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("swarmstate error: {err:?}");
        std::process::exit(1);
    }
    // A parked stdin read would otherwise hold up runtime teardown.
    std::process::exit(0);
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
