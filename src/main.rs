use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dislo_export::{ClientConfig, ExportClient, ExportOptions};
use serde_json::Value;
use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
};
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "dislo-export")]
#[command(about = "Run signed Dislo export reports and queries, printing records as JSON lines")]
#[command(version)]
struct Cli {
    /// YAML config file; DISLO_* environment variables override it
    #[arg(short, long, global = true, env = "DISLO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a saved (expert-mode) report by id
    Report {
        report_id: String,

        #[command(flatten)]
        opts: OptionArgs,
    },

    /// Run an ad-hoc SQL query
    Query {
        sql: String,

        #[command(flatten)]
        opts: OptionArgs,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// Named parameter as NAME=VALUE; VALUE is parsed as JSON when it can be
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    offset: Option<u64>,

    /// Order clause as a JSON value, repeatable
    #[arg(long = "order", value_name = "JSON")]
    order: Vec<String>,
}

/// `"10"` → number, `"true"` → bool, `"abc"` → string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl OptionArgs {
    fn into_options(self) -> Result<ExportOptions> {
        let mut opts = ExportOptions::new();
        for p in &self.params {
            let (name, value) = p
                .split_once('=')
                .with_context(|| format!("parameter `{}` is not NAME=VALUE", p))?;
            opts = opts.param(name.trim(), parse_value(value));
        }
        for o in &self.order {
            let v: Value = serde_json::from_str(o)
                .with_context(|| format!("order `{}` is not valid JSON", o))?;
            opts = opts.order(v);
        }
        opts.limit = self.limit;
        opts.offset = self.offset;
        Ok(opts)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    // stdout carries records, so logs go to stderr
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) configure client ─────────────────────────────────────────
    let config = ClientConfig::load(cli.config.as_deref())?;
    let client = ExportClient::from_config(&config)?;
    info!(endpoint = %client.handler().credentials().endpoint(), "client ready");

    // ─── 3) run the export ──────────────────────────────────────────
    let start = Instant::now();
    let result = match cli.command {
        Commands::Report { report_id, opts } => {
            client.custom_report(&report_id, &opts.into_options()?).await
        }
        Commands::Query { sql, opts } => client.custom_query(&sql, &opts.into_options()?).await,
    };
    let records = result.map_err(|e| {
        error!(error = %e, "export failed");
        e
    })?;

    // ─── 4) print records ───────────────────────────────────────────
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(records = records.len(), elapsed = ?start.elapsed(), "done");
    Ok(())
}
