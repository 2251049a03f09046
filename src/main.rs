//! Load test CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Small purpose-built HTTP load generator", long_about = None)]
struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override user count
        #[arg(short, long)]
        users: Option<u32>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a quick smoke test against a single endpoint
    Quick {
        /// Target URL
        #[arg(short = 't', long)]
        url: String,

        /// Number of virtual users
        #[arg(short, long, default_value = "5")]
        users: u32,

        /// Total number of requests
        #[arg(short, long, default_value = "100")]
        requests: u64,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run {
            scenario,
            users,
            duration,
            output,
        } => {
            println!("Loading scenario: {}", scenario.display());

            let mut config = loadgen::TestConfig::from_file(&scenario)?;

            // Apply overrides
            if let Some(u) = users {
                config.users = u;
            }
            if let Some(d) = duration {
                config.duration_secs = Some(d);
            }

            config.validate()?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            println!("  Description: {}", config.description);
            if let Some(d) = config.duration_secs {
                println!("  Duration: {}s", d);
            }
            if let Some(n) = config.max_requests {
                println!("  Request budget: {}", n);
            }
            println!("  Users: {}", config.users);
            println!("  Tasks: {}", config.tasks.len());
            println!();

            let runner = loadgen::LoadRunner::new(config);
            let results = runner.run().await?;

            match output.as_str() {
                "json" => {
                    println!("{}", loadgen::ResultsReport::format_json(&results)?);
                }
                "csv" => {
                    println!("{}", loadgen::ResultsReport::csv_header());
                    println!("{}", loadgen::ResultsReport::format_csv(&results));
                }
                _ => {
                    println!("{}", loadgen::ResultsReport::format_table(&results));
                }
            }

            Ok(())
        }
        Commands::Quick {
            url,
            users,
            requests,
        } => {
            println!("Running quick test:");
            println!("  URL: {}", url);
            println!("  Users: {}", users);
            println!("  Requests: {}", requests);
            println!();

            let parsed = reqwest::Url::parse(&url)?;
            let host = parsed.host_str().context("URL must include a host")?;
            let mut base_url = format!("{}://{}", parsed.scheme(), host);
            if let Some(port) = parsed.port() {
                base_url.push_str(&format!(":{port}"));
            }
            let mut path = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                path.push_str(&format!("?{query}"));
            }

            let config = loadgen::TestConfig {
                name: "quick".to_string(),
                description: "Quick smoke test".to_string(),
                base_url,
                users,
                spawn_rate: f64::from(users).max(1.0),
                duration_secs: None,
                max_requests: Some(requests),
                warmup_secs: 0,
                wait: loadgen::WaitRange::default(),
                tasks: vec![loadgen::TaskConfig {
                    name: "get".to_string(),
                    path,
                    weight: 1,
                }],
                seed: None,
                request_timeout_secs: 30,
                log_requests: false,
            };

            let runner = loadgen::LoadRunner::new(config);
            let results = runner.run().await?;

            println!("{}", loadgen::ResultsReport::format_table(&results));

            Ok(())
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            match std::fs::read_dir(&dir) {
                Ok(entries) => {
                    let mut scenarios = Vec::new();

                    for entry in entries.flatten() {
                        let path = entry.path();
                        let is_yaml = matches!(
                            path.extension().and_then(|s| s.to_str()),
                            Some("yaml") | Some("yml")
                        );
                        if is_yaml {
                            if let Ok(config) = loadgen::TestConfig::from_file(&path) {
                                scenarios.push((
                                    entry.file_name().to_string_lossy().to_string(),
                                    config.name,
                                    config.description,
                                ));
                            }
                        }
                    }

                    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

                    if scenarios.is_empty() {
                        println!("No scenario files found");
                    } else {
                        for (filename, name, description) in scenarios {
                            println!("  {} - {}", filename, name);
                            if !description.is_empty() {
                                println!("    {}", description);
                            }
                            println!();
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                }
            }

            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Diagnostics go to stderr; stdout is reserved for results.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }
}
