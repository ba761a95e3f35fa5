use anyhow::{Context, Result};
use clap::Parser;
use core::{query_to_tables, HttpTransport, RetryPolicy, Table};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Download a date range of PatentsView patents into relational CSV tables")]
struct Cli {
    /// Fields to request, comma separated (patent_number is always included)
    #[arg(long, value_delimiter = ',', default_value = "patent_number,patent_date,patent_title")]
    fields: Vec<String>,
    /// Start date in format YYYY-MM-DD, inclusive
    #[arg(long)]
    start: String,
    /// End date in format YYYY-MM-DD, not inclusive
    #[arg(long)]
    end: String,
    /// Results per page (max 10000)
    #[arg(long, default_value_t = 10_000)]
    per_page: usize,
    /// Retry failed requests automatically instead of prompting
    #[arg(long, default_value_t = false)]
    auto_retry: bool,
    /// Seconds to wait before an automatic retry
    #[arg(long, default_value_t = 1)]
    retry_delay: u64,
    /// Give up on a page after this many failed attempts (default: retry forever)
    #[arg(long)]
    max_retries: Option<u32>,
    /// Directory the per-table CSV files are written to
    #[arg(long, default_value = "./tables")]
    output: String,
    /// API endpoint override
    #[arg(long, default_value = core::API_ENDPOINT)]
    endpoint: String,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut policy = if args.auto_retry {
        RetryPolicy::automatic(Duration::from_secs(args.retry_delay))
    } else {
        RetryPolicy::interactive()
    };
    policy.max_retries = args.max_retries;

    let transport = HttpTransport::with_endpoint(&args.endpoint)?;
    let fields: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let tables = query_to_tables(
        &transport,
        &fields,
        &args.start,
        &args.end,
        args.per_page,
        policy,
        prompt_retry,
    )?;

    fs::create_dir_all(&args.output)?;
    for (name, table) in &tables {
        let path = Path::new(&args.output).join(format!("{name}.csv"));
        write_csv(&path, table).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(table = %name, rows = table.len(), path = %path.display(), "table written");
    }
    Ok(())
}

/// Blocking y/n prompt; re-asks on anything else.
fn prompt_retry(status: u16, reason: &str) -> bool {
    eprintln!("Error {status}, reason: {reason}");
    loop {
        eprintln!("Try again? y/n");
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        match line.trim() {
            "y" => return true,
            "n" => return false,
            _ => eprintln!("Input must be y or n"),
        }
    }
}

fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let header: Vec<String> = table.columns().iter().map(|c| csv_escape(c)).collect();
    writeln!(out, "{}", header.join(","))?;
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(csv_cell).collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    Ok(())
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => csv_escape(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => csv_escape(&other.to_string()),
    }
}

fn csv_escape(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}
