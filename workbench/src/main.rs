use clap::Parser;
use workbench::{init_logging, Workbench, WorkbenchConfig};

/// Intercept Workbench - operator control plane for an intercepting proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture engine push-channel URL
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    engine_url: String,

    /// HTTP API port for the operator REST endpoints
    #[arg(long, default_value_t = 9090)]
    http_port: u16,

    /// Database connection URL
    #[arg(long, default_value = "sqlite:./workbench.db")]
    database_url: String,

    /// Delay between push-channel reconnect attempts in milliseconds
    #[arg(long, default_value_t = 1000)]
    reconnect_delay_ms: u64,

    /// Pause between intruder requests in milliseconds
    #[arg(long, default_value_t = 100)]
    request_delay_ms: u64,

    /// Maximum intruder requests in flight
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Outbound request timeout in seconds
    #[arg(long, default_value_t = 30)]
    dispatch_timeout: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON formatted logs
    #[arg(long)]
    json_logs: bool,

    /// Also write logs to this file, rotated daily
    #[arg(long)]
    log_file: Option<String>,
}

impl Args {
    fn into_config(self) -> WorkbenchConfig {
        let mut config = WorkbenchConfig {
            engine_url: self.engine_url,
            http_port: self.http_port,
            database_url: self.database_url,
            reconnect_delay_ms: self.reconnect_delay_ms,
            dispatch_timeout_secs: self.dispatch_timeout,
            ..Default::default()
        };
        config.intruder.request_delay_ms = self.request_delay_ms;
        config.intruder.concurrency = self.concurrency;
        config.logging.level = self.log_level;
        config.logging.json_format = self.json_logs;
        config.logging.log_file = self.log_file;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();
    config.validate()?;

    // Held until exit so buffered file output is flushed
    let _log_guard = init_logging(&config.logging)?;

    let workbench = Workbench::new(config.clone()).await?;

    println!("🚀 Workbench starting...");
    println!("🔌 Capture engine: {}", config.engine_url);
    println!("🌐 REST API will be available at: http://127.0.0.1:{}/api", config.http_port);
    println!("💾 Database: {}", config.database_url);
    println!();
    println!("💡 Tip: Use --help to see all available options");
    println!();

    let shutdown = workbench.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
    });

    workbench.start().await?;

    Ok(())
}
