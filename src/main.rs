use std::path::PathBuf;

use tracing::{error, info, warn};

use shelf_scout::antibot::ThreadRngJitter;
use shelf_scout::{
    CancelFlag, CatalogExtractor, CrawlConfig, CrawlDriver, CrawlReport, FetchMode, HttpSource,
    RotatingSession, SnapshotSink,
};

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    categories: Vec<String>,
    csv_out: Option<String>,
    parquet_out: Option<String>,
}

fn parse_args() -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(v));
            }
            "--category" => {
                let v = args.next().ok_or("--category needs a URL")?;
                parsed.categories.push(v);
            }
            "--out" => {
                let v = args.next().ok_or("--out needs a path")?;
                parsed.csv_out = Some(v);
            }
            "--parquet" => {
                let v = args.next().ok_or("--parquet needs a path")?;
                parsed.parquet_out = Some(v);
            }
            "--help" | "-h" => {
                println!(
                    "shelf-scout — bounded infinite-scroll catalog crawler\n\n\
                     USAGE:\n  shelf-scout [--config <path>] [--category <url>]... \
                     [--out <csv>] [--parquet <path>]"
                );
                std::process::exit(0);
            }
            other => {
                if let Some(rest) = other.strip_prefix("--config=") {
                    parsed.config = Some(PathBuf::from(rest));
                } else {
                    return Err(format!("unrecognized argument: {}", other));
                }
            }
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run().await {
        Ok(report) => {
            info!(
                "done: {} record(s) collected over {} fetch(es)",
                report.summary.records, report.summary.fetches
            );
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<CrawlReport> {
    let args = parse_args().map_err(|e| anyhow::anyhow!(e))?;

    let mut config = match &args.config {
        Some(path) => CrawlConfig::from_file(path)?,
        None => CrawlConfig::discover(),
    };
    if !args.categories.is_empty() {
        config.category_urls = args.categories.clone();
    }
    if let Some(csv) = &args.csv_out {
        config.csv_path = csv.clone();
    }
    if let Some(parquet) = &args.parquet_out {
        config.parquet_path = Some(parquet.clone());
    }

    if config.category_urls.is_empty() {
        anyhow::bail!(
            "no category URLs configured — pass --category or set category_urls in shelf-scout.json"
        );
    }

    let extractor = CatalogExtractor::new(&config.selectors)?;
    let sink = SnapshotSink::new(&config.csv_path, config.parquet_path.as_deref());

    // Interrupts finish the in-flight page, persist, and exit cleanly.
    let cancel = CancelFlag::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received — finishing the current page");
            cancel_signal.set();
        }
    });

    info!(
        "starting crawl: {} categor{} → {}",
        config.category_urls.len(),
        if config.category_urls.len() == 1 { "y" } else { "ies" },
        config.csv_path
    );

    let categories = config.category_urls.clone();
    let report = match config.fetch_mode {
        FetchMode::Browser => {
            let source =
                RotatingSession::open(&config, Box::new(ThreadRngJitter), cancel.clone()).await?;
            CrawlDriver::new(
                &config,
                source,
                sink,
                extractor,
                Box::new(ThreadRngJitter),
                cancel,
            )
            .run(&categories)
            .await?
        }
        FetchMode::Http => {
            let source = HttpSource::new(&config, Box::new(ThreadRngJitter))?;
            CrawlDriver::new(
                &config,
                source,
                sink,
                extractor,
                Box::new(ThreadRngJitter),
                cancel,
            )
            .run(&categories)
            .await?
        }
    };

    Ok(report)
}
