use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use warden_cli::{init_tracing, load_replay_fixture, run_replay, Cli};
use warden_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.bot_config();
    let fixture = load_replay_fixture(&cli.fixture)?;
    let store = Arc::new(
        Store::open(&cli.store_path)
            .with_context(|| format!("failed to open store {}", cli.store_path.display()))?,
    );
    store
        .seed_allowlist(&config.seed_allowlist)
        .await
        .context("failed to seed allowlist")?;
    tracing::info!(
        store = %cli.store_path.display(),
        prefix = %config.prefix,
        allowlist = store.list_allowlist().len(),
        fixture = %fixture.name,
        "warden starting replay"
    );

    let lines = run_replay(&fixture, store.clone(), config).await?;
    let mut stdout = std::io::stdout().lock();
    for line in &lines {
        let rendered = serde_json::to_string(line).context("failed to render replay line")?;
        writeln!(stdout, "{rendered}").context("failed to write replay output")?;
    }
    store.close().await;
    Ok(())
}
