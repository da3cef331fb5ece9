use shelfpod::{Config, cli, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let logging = cli
        .config
        .as_deref()
        .and_then(|path| Config::load(path).ok())
        .map(|config| config.logging)
        .unwrap_or_default();
    telemetry::init(telemetry::TelemetryConfig::new(cli.verbose, logging));

    if let Err(e) = cli::run(cli) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}
