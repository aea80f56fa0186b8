mod csv_sink;

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use replybot_client::{
    BlueskyConfig, BlueskySource, MastodonConfig, MastodonSource, ReqwestProber,
    ScraperLinkExtractor,
};
use replybot_core::config::DEFAULT_PUBLISHER_DOMAIN;
use replybot_core::{
    Category, ClassifierConfig, Classifier, FeedConfig, IngestService, LinkResolver, NullSink,
    PipelineConfig, RecordSink, SourceSet, TracingPipelineReporter, is_front_page,
};
use replybot_db::{Database, DatabaseConfig};

use crate::csv_sink::CsvSink;

#[derive(Parser)]
#[command(
    name = "replybot",
    version,
    about = "Finds game shares and recipe links on Mastodon and Bluesky"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Csv,
    Postgres,
    /// Classify and log only
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream posts from the configured sources until interrupted
    Run {
        /// Mastodon instance to stream the public timeline from
        #[arg(long, env = "MASTODON_SERVER")]
        mastodon_server: Option<String>,

        /// Mastodon access token
        #[arg(long, env = "MASTODON_ACCESS_TOKEN", hide_env_values = true)]
        mastodon_access_token: Option<String>,

        /// JSON file listing the Bluesky feeds to poll
        #[arg(long, env = "BLUESKY_FEEDS_CONFIG_FILE")]
        bluesky_feeds: Option<PathBuf>,

        /// Seconds between Bluesky polls
        #[arg(long, default_value_t = 10)]
        poll_interval: u64,

        /// Links resolving under this host are recipe shares
        #[arg(long, env = "REPLYBOT_PUBLISHER_DOMAIN", default_value = DEFAULT_PUBLISHER_DOMAIN)]
        publisher_domain: String,

        /// Where matched posts are written
        #[arg(long, env = "REPLYBOT_SINK", value_enum, default_value_t = SinkKind::Csv)]
        sink: SinkKind,

        /// Output file for the csv sink
        #[arg(short, long, env = "REPLYBOT_OUTPUT", default_value = "posts.csv")]
        output: PathBuf,

        /// Bound of the writer queue
        #[arg(long, default_value_t = 100)]
        queue_capacity: usize,
    },

    /// Classify a single post body (reads stdin if --content is omitted)
    Classify {
        #[arg(short, long)]
        content: Option<String>,

        #[arg(long, env = "REPLYBOT_PUBLISHER_DOMAIN", default_value = DEFAULT_PUBLISHER_DOMAIN)]
        publisher_domain: String,
    },

    /// Follow a shortened link to its destination
    Resolve {
        url: String,
    },

    /// Show recently stored posts (requires DATABASE_URL)
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Only show this category (wordle, connections, strands, crossword, cooking)
        #[arg(short, long)]
        category: Option<Category>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("replybot=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            mastodon_server,
            mastodon_access_token,
            bluesky_feeds,
            poll_interval,
            publisher_domain,
            sink,
            output,
            queue_capacity,
        } => {
            let args = RunArgs {
                mastodon: match (mastodon_server, mastodon_access_token) {
                    (Some(server), Some(token)) => Some(MastodonConfig::new(server, token)),
                    (Some(_), None) => {
                        anyhow::bail!("MASTODON_ACCESS_TOKEN is required when MASTODON_SERVER is set")
                    }
                    _ => None,
                },
                bluesky_feeds,
                poll_interval: Duration::from_secs(poll_interval),
                config: PipelineConfig::default()
                    .with_queue_capacity(queue_capacity)
                    .with_classifier(
                        ClassifierConfig::default().with_publisher_domain(publisher_domain),
                    ),
            };

            match sink {
                SinkKind::Csv => {
                    let sink = CsvSink::open(&output).map_err(|e| anyhow::anyhow!(e))?;
                    cmd_run(args, sink).await?;
                }
                SinkKind::Postgres => {
                    let db = connect_db().await?;
                    cmd_run(args, db.post_repo()).await?;
                }
                SinkKind::None => cmd_run(args, NullSink).await?,
            }
        }
        Commands::Classify {
            content,
            publisher_domain,
        } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read post content from stdin")?;
                    buf
                }
            };
            cmd_classify(&content, &publisher_domain).await?;
        }
        Commands::Resolve { url } => cmd_resolve(&url).await?,
        Commands::Recent { limit, category } => {
            let db = connect_db().await?;
            cmd_recent(&db, limit, category).await?;
        }
    }

    Ok(())
}

struct RunArgs {
    mastodon: Option<MastodonConfig>,
    bluesky_feeds: Option<PathBuf>,
    poll_interval: Duration,
    config: PipelineConfig,
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

fn build_classifier(
    config: ClassifierConfig,
) -> Result<Classifier<ScraperLinkExtractor, ReqwestProber>> {
    let prober = ReqwestProber::new().context("Failed to create HTTP client")?;
    Ok(Classifier::with_config(
        ScraperLinkExtractor::new(),
        prober,
        config,
    ))
}

async fn cmd_run<S: RecordSink + 'static>(args: RunArgs, sink: S) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut sources = SourceSet::new(&args.config, cancel.clone());

    if let Some(mastodon) = args.mastodon {
        sources = sources.add(MastodonSource::new(mastodon).map_err(|e| anyhow::anyhow!(e))?);
    }
    if let Some(path) = &args.bluesky_feeds {
        let feeds = FeedConfig::load(path).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!(feeds = feeds.len(), "Loaded Bluesky feeds");
        let config = BlueskyConfig::new(feeds).with_poll_interval(args.poll_interval);
        sources = sources.add(BlueskySource::new(config).map_err(|e| anyhow::anyhow!(e))?);
    }

    let classifier = build_classifier(args.config.classifier.clone())?;
    let service = IngestService::new(classifier, sink, args.config);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let report = match service.run(sources, cancel, &TracingPipelineReporter).await {
        Ok(report) => report,
        Err(e) if e.is_fatal() => {
            return Err(anyhow::anyhow!(e).context(
                "Cannot start: configure MASTODON_SERVER/MASTODON_ACCESS_TOKEN or BLUESKY_FEEDS_CONFIG_FILE",
            ));
        }
        Err(e) => return Err(anyhow::anyhow!(e)),
    };

    for source in &report.sources {
        tracing::info!(source = %source.name, forwarded = source.forwarded, "Source summary");
    }
    tracing::info!(
        received = report.pipeline.received,
        matched = report.pipeline.matched,
        written = report.writer.written,
        failed = report.writer.failed,
        "Shutdown complete"
    );

    Ok(())
}

async fn cmd_classify(content: &str, publisher_domain: &str) -> Result<()> {
    let classifier = build_classifier(
        ClassifierConfig::default().with_publisher_domain(publisher_domain),
    )?;
    let result = classifier.classify_detailed(content).await;

    println!("category: {}", result.category);
    if let Some(branch) = result.branch {
        println!("pattern:  {branch}");
    }
    for link in &result.resolved {
        let clean = link.clean_url();
        println!("link:     {} -> {}", link.original_url, display_final(&clean));
    }

    Ok(())
}

async fn cmd_resolve(url: &str) -> Result<()> {
    let prober = ReqwestProber::new().context("Failed to create HTTP client")?;
    let link = LinkResolver::new(prober).resolve_link(url).await;
    let clean = link.clean_url();

    println!("{}", display_final(&clean));
    if clean != link.final_url {
        println!("raw:  {}", link.final_url);
    }
    if is_front_page(&clean) {
        println!("note: front page");
    }
    println!("hops: {}", link.hops);

    Ok(())
}

async fn cmd_recent(db: &Database, limit: usize, category: Option<Category>) -> Result<()> {
    let posts = db
        .post_repo()
        .recent(limit, category)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if posts.is_empty() {
        println!("No posts stored yet");
        return Ok(());
    }

    for post in &posts {
        let status = if post.responded { "responded" } else { "pending" };
        println!(
            "  [{}] {} {:<11} {:<8} {}",
            status,
            post.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            post.category.as_str(),
            post.source.as_str(),
            post.url,
        );
    }
    println!("\nTotal: {} posts", posts.len());

    Ok(())
}

fn display_final(final_url: &str) -> &str {
    if final_url.is_empty() {
        "(unresolved)"
    } else {
        final_url
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["replybot", "run"]).unwrap();
        let Commands::Run {
            sink,
            output,
            poll_interval,
            queue_capacity,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(sink, SinkKind::Csv);
        assert_eq!(output, PathBuf::from("posts.csv"));
        assert_eq!(poll_interval, 10);
        assert_eq!(queue_capacity, 100);
    }

    #[test]
    fn recent_parses_category() {
        let cli = Cli::try_parse_from(["replybot", "recent", "--category", "wordle", "-l", "5"])
            .unwrap();
        let Commands::Recent { limit, category } = cli.command else {
            panic!("expected recent");
        };
        assert_eq!(limit, 5);
        assert_eq!(category, Some(Category::Wordle));

        assert!(Cli::try_parse_from(["replybot", "recent", "--category", "sports"]).is_err());
    }

    #[test]
    fn sink_choice() {
        let cli = Cli::try_parse_from(["replybot", "run", "--sink", "postgres"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                sink: SinkKind::Postgres,
                ..
            }
        ));
    }

    #[test]
    fn unresolved_is_labelled() {
        assert_eq!(display_final(""), "(unresolved)");
        assert_eq!(display_final("https://x.y/"), "https://x.y/");
    }
}
