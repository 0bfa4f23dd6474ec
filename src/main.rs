use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use calcprobe::suite::{default_checks, run_suite};
use calcprobe::{Client, Config};

#[derive(Parser)]
#[command(name = "calcprobe", version, about = "End-to-end checks for the calculator HTTP API")]
struct Cli {
    /// Config file (default: ./calcprobe.toml if it exists)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, global = true)]
    mock_url: Option<String>,

    /// Seconds allowed for connect, and for each read and write
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Extra PEM trust anchors for https
    #[arg(long, global = true)]
    ca_file: Option<PathBuf>,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the calculator checks (the default)
    Run {
        /// Run only the named checks (add, multiply, divide, divide_by_zero, sqrt)
        #[arg(long)]
        only: Vec<String>,
    },
    /// Issue a single validated GET and print the status and body
    Get { url: String },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

// File values first, then command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(mock_url) = &cli.mock_url {
        config.mock_base_url = mock_url.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_seconds = timeout;
    }
    if let Some(ca_file) = &cli.ca_file {
        config.ca_file = Some(ca_file.clone());
    }
    config.validate()?;
    Ok(config)
}

fn run(client: &Client, config: &Config, only: &[String]) -> anyhow::Result<bool> {
    let mut checks = default_checks(config);
    if !only.is_empty() {
        checks.retain(|check| only.contains(&check.name));
        if checks.is_empty() {
            anyhow::bail!("no checks match {:?}", only);
        }
    }

    let reports = run_suite(client, &checks);
    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(()) => println!("PASS  {:<16} {}", report.name, report.url),
            Err(err) => {
                failed += 1;
                println!("FAIL  {:<16} {}", report.name, err);
            }
        }
    }
    println!("{} passed, {} failed", reports.len() - failed, failed);
    Ok(failed == 0)
}

fn get(client: &Client, url: &str) -> anyhow::Result<bool> {
    let mut response = client.get(url).with_context(|| format!("GET {}", url))?;
    println!("{} {}", response.status(), response.reason());
    let body = response.read();
    response.close();
    println!("{}", String::from_utf8_lossy(&body?));
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = load_config(&cli).and_then(|config| {
        let client = Client::from_config(&config).context("failed to build HTTP client")?;
        match &cli.command {
            None => run(&client, &config, &[]),
            Some(Command::Run { only }) => run(&client, &config, only),
            Some(Command::Get { url }) => get(&client, url),
        }
    });

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("❌ {:#}", err);
            ExitCode::from(2)
        }
    }
}
