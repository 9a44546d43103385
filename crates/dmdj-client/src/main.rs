use dmdj_client::console::Console;
use dmdj_proto::config::Config;
use dmdj_proto::platform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise debug for our code, quiet connection internals.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "debug,hyper_util=warn,reqwest=warn,hyper=warn,tungstenite=warn".to_string()
    });
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("dmdj log: {}", log_path.display());
    tracing::info!("dmdj starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config: {} (using defaults)", e);
        Config::default().with_env_override()
    });

    // ── Run console ──────────────────────────────────────────────────────────
    Console::new(config).run().await?;

    tracing::info!("dmdj stopped");
    Ok(())
}
