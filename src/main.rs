use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use fieldops::cli::{parse_args, run, usage, CliContext};
use fieldops::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging; stderr keeps stdout clean for command output
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = std::env::args().collect();
    let program = if args.is_empty() { "fieldops".to_string() } else { args.remove(0) };

    let (overrides, cmd) = match parse_args(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage(&program));
            std::process::exit(2);
        }
    };

    let config = overrides.apply(ClientConfig::from_env()?)?;
    info!(
        target: "fieldops",
        "fieldops starting: api='{}', state_dir='{}', download_dir='{}'",
        config.base_url, config.state_dir.display(), config.download_dir.display()
    );

    let ctx = CliContext::open(config)?;
    run(&ctx, cmd, &program).await
}
