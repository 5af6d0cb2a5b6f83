use driftsyncd::config::SyncSettings;
use driftsyncd::daemon::DaemonRuntime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Once,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => mode = CliMode::Once,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: driftsyncd [--once]");
            println!("  --once   Run a single full sync pass and exit");
            Ok(())
        }
        CliMode::Once => {
            let settings = SyncSettings::from_env()?;
            let daemon = DaemonRuntime::bootstrap(settings).await?;
            let summary = daemon.run_once().await?;
            println!(
                "scanned {} file(s): {} upload(s), {} download(s), {} delete(s), {} conflict(s), {} error(s)",
                summary.scanned,
                summary.uploads,
                summary.downloads,
                summary.deletes,
                summary.conflicts,
                summary.errors
            );
            Ok(())
        }
        CliMode::Run => {
            let settings = SyncSettings::from_env()?;
            let daemon = DaemonRuntime::bootstrap(settings).await?;
            daemon.run().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_run() {
        let mode = parse_cli_mode(vec!["driftsyncd".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Run);
    }

    #[test]
    fn cli_supports_once() {
        let mode = parse_cli_mode(vec!["driftsyncd".to_string(), "--once".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Once);
    }

    #[test]
    fn cli_supports_help() {
        let mode = parse_cli_mode(vec!["driftsyncd".to_string(), "-h".to_string()]).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn cli_rejects_unknown_arguments() {
        assert!(parse_cli_mode(vec!["driftsyncd".to_string(), "--bogus".to_string()]).is_err());
    }
}
