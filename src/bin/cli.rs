//! kubetrail CLI
//!
//! Command-line interface for kubetrail operations:
//! - Query a resource's payload history
//! - Record resource states
//! - List partitions
//! - Evict expired partitions

use anyhow::{anyhow, bail, Context};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use kubetrail::config::{generate_default_config, Config};
use kubetrail::query::ResourceSelector;
use kubetrail::service::{new_request_id, HistoryService, WatchRecord};
use kubetrail::storage::SqliteKv;
use kubetrail::table::{now_nanos, Tables, TimeWindow, WatchType};
use kubetrail::telemetry::init_tracing;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubetrail")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Historical store for cluster workload state")]
#[command(long_about = "kubetrail records Kubernetes resource snapshots over time.\nQuery what a resource looked like in any time window.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a resource's payload history as JSON
    Query {
        /// Resource kind (e.g. Pod, Node)
        #[arg(short, long)]
        kind: String,
        /// Namespace (ignored for cluster-scoped kinds)
        #[arg(short, long, default_value = "")]
        namespace: String,
        /// Resource name
        name: String,
        /// Window length ending now (e.g. 30m, 6h, 7d)
        #[arg(short, long, default_value = "1h")]
        last: String,
        /// Window start; overrides --last. Supports: "now", RFC 3339, nanoseconds
        #[arg(long)]
        start: Option<String>,
        /// Window end (default: now)
        #[arg(long)]
        end: Option<String>,
        /// Request id for log correlation (default: random)
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Record one resource state
    Record {
        /// Resource kind
        #[arg(short, long)]
        kind: String,
        /// Namespace (empty for cluster-scoped kinds)
        #[arg(short, long, default_value = "")]
        namespace: String,
        /// Resource name
        name: String,
        /// Observation time (default: now). Supports: "now", RFC 3339, nanoseconds
        #[arg(short, long)]
        time: Option<String>,
        /// Watch event type (add, update, delete)
        #[arg(short, long, default_value = "update")]
        watch_type: String,
        /// Payload file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        payload: String,
    },

    /// List partitions that hold data
    Partitions,

    /// Delete partitions outside the retention policy
    Evict {
        /// Maximum age (e.g. 12h, 14d); defaults to the configured value
        #[arg(long)]
        max_age: Option<String>,
        /// Maximum number of partitions to keep
        #[arg(long)]
        max_partitions: Option<usize>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Query {
            kind,
            namespace,
            name,
            last,
            start,
            end,
            request_id,
        } => {
            let service = open_service(&config)?;
            let end = match end {
                Some(s) => parse_time(&s)?,
                None => now_nanos(),
            };
            let start = match start {
                Some(s) => parse_time(&s)?,
                None => end.saturating_sub(duration_nanos(parse_duration(&last)?)),
            };

            let request_id = request_id.unwrap_or_else(new_request_id);
            tracing::info!(request_id = %request_id, "Querying {}/{}/{}", kind, namespace, name);

            let json = service
                .resource_payload_json(
                    ResourceSelector::new(kind, namespace, name),
                    TimeWindow::new(start, end),
                    Some(request_id),
                )
                .await?;
            println!("{}", json);
        }

        Commands::Record {
            kind,
            namespace,
            name,
            time,
            watch_type,
            payload,
        } => {
            let timestamp = match time.as_deref() {
                None => now_nanos(),
                Some(s) => parse_time(s)?,
            };
            let payload = read_payload(&payload)?;
            let service = open_service(&config)?;

            let key = service
                .record(WatchRecord {
                    kind,
                    namespace,
                    name,
                    timestamp,
                    watch_type: watch_type.parse::<WatchType>()?,
                    payload,
                })
                .await?;
            println!("Recorded {}", key);
        }

        Commands::Partitions => {
            let service = open_service(&config)?;
            let scheme = *service.tables().scheme();
            let partitions = service.partitions().await?;

            if partitions.is_empty() {
                println!("No partitions yet.");
            } else {
                println!("{:<12} {:<22} {}", "Partition", "Start", "End");
                println!("{}", "-".repeat(58));
                for id in partitions {
                    let window = scheme.partition_window(id);
                    println!(
                        "{:<12} {:<22} {}",
                        id,
                        format_nanos(window.start),
                        format_nanos(window.end)
                    );
                }
            }
        }

        Commands::Evict {
            max_age,
            max_partitions,
        } => {
            let mut policy = config.retention.policy();
            if let Some(age) = max_age {
                let age = parse_duration(&age)?
                    .to_std()
                    .map_err(|e| anyhow!("invalid max age: {}", e))?;
                policy = policy.max_age(age);
            }
            if let Some(limit) = max_partitions {
                policy = policy.max_partitions(limit);
            }
            if policy.is_unbounded() {
                bail!("No retention limit configured. Use --max-age or --max-partitions");
            }

            let service = open_service(&config)?;
            let report = service.evict_expired(policy).await?;
            println!("{}", report);
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn open_service(config: &Config) -> anyhow::Result<HistoryService<SqliteKv>> {
    init_tracing(&config.logging);
    let tables = Tables::open(config).context("failed to open store")?;
    Ok(HistoryService::new(tables))
}

fn read_payload(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source))
    }
}

/// Parse "now", an RFC 3339 date, or nanoseconds since the epoch
fn parse_time(s: &str) -> anyhow::Result<i64> {
    if s == "now" {
        return Ok(now_nanos());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt
            .timestamp_nanos_opt()
            .ok_or_else(|| anyhow!("timestamp out of range: {}", s));
    }
    s.parse::<i64>()
        .map_err(|_| anyhow!("Invalid timestamp format: {}. Use: now, RFC 3339, nanoseconds", s))
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(minutes) = s.strip_suffix('m') {
        Ok(Duration::minutes(minutes.parse()?))
    } else if let Some(hours) = s.strip_suffix('h') {
        Ok(Duration::hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(Duration::days(days.parse()?))
    } else if let Some(weeks) = s.strip_suffix('w') {
        Ok(Duration::weeks(weeks.parse()?))
    } else {
        bail!("Invalid duration format: {}. Use: 30m, 6h, 7d, 2w", s)
    }
}

fn duration_nanos(d: Duration) -> i64 {
    d.num_nanoseconds().unwrap_or(i64::MAX)
}

fn format_nanos(nanos: i64) -> String {
    chrono::DateTime::<Utc>::from_timestamp_nanos(nanos)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
