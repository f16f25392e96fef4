//! CLI command implementations

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use dialoguer::{Input, Select};
use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analyzer::DepositAnalyzer;
use crate::classifier::ContractClassifier;
use crate::config::Config;
use crate::engine::{ClusterEngine, EngineProgress};
use crate::etherscan::{EtherscanClient, ExplorerApi};
use crate::exchanges::load_exchange_set;
use crate::fetcher::TransactionFetcher;
use crate::funding::{activity_bar, FundingAnalyzer, ACTIVITY_SLOTS};
use crate::types::{Address, Cluster, ExchangeSet, FundingSource};

/// Clusters shown in the report before truncating
const MAX_CLUSTERS_SHOWN: usize = 10;
/// Related users shown per cluster
const MAX_USERS_SHOWN: usize = 10;

/// Components wired for one analysis session
struct Session {
    fetcher: Arc<TransactionFetcher>,
    engine: ClusterEngine,
    exchanges: ExchangeSet,
}

fn build_session(config: &Config) -> Result<Session> {
    let exchanges = load_exchange_set(&config.exchanges.file)
        .context("Failed to load exchange address list")?;

    let api: Arc<dyn ExplorerApi> = Arc::new(
        EtherscanClient::new(&config.etherscan).context("Failed to create Etherscan client")?,
    );
    let fetcher = Arc::new(TransactionFetcher::new(Arc::clone(&api), &config.etherscan));
    let classifier = Arc::new(ContractClassifier::new(api));
    let analyzer = Arc::new(DepositAnalyzer::new(
        Arc::clone(&fetcher),
        classifier,
        config.heuristics.clone(),
    ));
    let engine = ClusterEngine::new(Arc::clone(&fetcher), analyzer, config.engine.max_workers);

    Ok(Session {
        fetcher,
        engine,
        exchanges,
    })
}

fn parse_address(raw: &str) -> Result<Address> {
    let address = Address::new(raw);
    if !address.is_valid() {
        bail!(
            "Invalid Ethereum address format: {} (expected 0x followed by 40 hex characters)",
            raw.trim()
        );
    }
    Ok(address)
}

/// Forward clustering: user -> deposit -> exchange
pub async fn cluster(config: &Config, address: &str) -> Result<()> {
    let user = parse_address(address)?;
    let session = build_session(config)?;

    info!("Analyzing {}", user);
    let started = Instant::now();

    // Ctrl-C cancels the batch; clusters found so far are still reported
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current analyses...");
            ctrl_c_cancel.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::channel::<EngineProgress>(64);
    let progress_task = tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            print!("\rAnalyzing deposits... {}/{}", update.completed, update.total);
            let _ = std::io::stdout().flush();
        }
        println!();
    });

    let clusters = session
        .engine
        .cluster_addresses(&user, &session.exchanges, Some(progress_tx), cancel)
        .await?;
    let _ = progress_task.await;

    print_clusters(&clusters, &session.exchanges);
    println!(
        "\nAnalysis completed in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Backward analysis: which known exchanges funded the target
pub async fn funding(config: &Config, address: &str) -> Result<()> {
    let target = parse_address(address)?;
    let session = build_session(config)?;

    info!("Analyzing funding sources for {}", target);
    let started = Instant::now();

    let analyzer = FundingAnalyzer::new(Arc::clone(&session.fetcher));
    let sources = analyzer
        .find_funding_sources(&target, &session.exchanges)
        .await?;

    print_funding_sources(&sources);
    println!(
        "\nAnalysis completed in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Interactive analysis menu
pub async fn menu(config: &Config) -> Result<()> {
    println!("Ethereum cluster analysis");

    loop {
        let choice = Select::new()
            .with_prompt("Select analysis mode")
            .items(&[
                "Forward clustering (user -> deposit -> exchange)",
                "Backward analysis (funding sources)",
                "Quit",
            ])
            .default(0)
            .interact()?;

        if choice == 2 {
            println!("Session ended");
            return Ok(());
        }

        let address: String = Input::new()
            .with_prompt("Ethereum address")
            .interact_text()?;

        let result = match choice {
            0 => cluster(config, &address).await,
            _ => funding(config, &address).await,
        };

        // One failed analysis never ends the session
        if let Err(e) = result {
            eprintln!("Analysis failed: {:#}", e);
        }
    }
}

/// Show current configuration (API key masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("Etherscan:");
    println!("  api_url: {}", config.etherscan.api_url);
    println!("  api_key: {}", mask_key(&config.etherscan.api_key));
    println!("  page_size: {}", config.etherscan.page_size);
    println!("  pagination_window: {}", config.etherscan.pagination_window);
    println!("  request_delay_ms: {}", config.etherscan.request_delay_ms);
    println!("  timeout_secs: {}", config.etherscan.timeout_secs);
    println!("  max_retries: {}", config.etherscan.max_retries);
    println!("Heuristics:");
    println!("  sender_threshold: {}", config.heuristics.sender_threshold);
    println!(
        "  transaction_ceiling: {}",
        config.heuristics.transaction_ceiling
    );
    println!("Engine:");
    println!("  max_workers: {}", config.engine.max_workers);
    println!("Exchanges:");
    println!("  file: {}", config.exchanges.file);
    Ok(())
}

fn mask_key(key: &str) -> String {
    if key.is_empty() {
        "(not set)".to_string()
    } else if key.len() <= 8 {
        "****".to_string()
    } else {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    }
}

fn print_clusters(clusters: &[Cluster], exchanges: &ExchangeSet) {
    if clusters.is_empty() {
        println!("\nNo deposit clusters found");
        return;
    }

    println!(
        "\nFound {} clusters (showing top {})",
        clusters.len(),
        MAX_CLUSTERS_SHOWN.min(clusters.len())
    );
    println!("{}", "=".repeat(60));

    for (i, cluster) in clusters.iter().take(MAX_CLUSTERS_SHOWN).enumerate() {
        println!("\nCluster #{} (size: {})", i + 1, cluster.cluster_size);
        println!("Deposit:  {}", cluster.deposit);
        println!(
            "Exchange: {} ({})",
            exchanges.label_for(&cluster.exchange),
            cluster.exchange
        );
        if !cluster.complete {
            println!("Note: transaction history truncated, results may be incomplete");
        }

        println!("\nRelated addresses (transactions | total ETH):");
        for (j, address) in cluster.related_users.iter().take(MAX_USERS_SHOWN).enumerate() {
            let stats = &cluster.user_stats[address];
            println!(
                "  {}. {} | Tx: {} | ETH: {:.4}",
                j + 1,
                address,
                stats.count,
                stats.total_eth
            );
        }
        if cluster.related_users.len() > MAX_USERS_SHOWN {
            println!(
                "  ... and {} more",
                cluster.related_users.len() - MAX_USERS_SHOWN
            );
        }
        println!("{}", "-".repeat(40));
    }
}

fn print_funding_sources(sources: &HashMap<Address, FundingSource>) {
    if sources.is_empty() {
        println!("\nNo funding sources from known exchanges found");
        return;
    }

    println!("\nFunding sources:");
    println!("{}", "=".repeat(60));

    // Sort by address for consistent output order
    let mut entries: Vec<(&Address, &FundingSource)> = sources.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (i, (address, source)) in entries.into_iter().enumerate() {
        println!("\n{}. {} ({})", i + 1, source.label, address);
        println!("   Transactions: {}", source.count);
        println!("   First seen:   {}", format_day(source.first_seen));
        println!("   Last seen:    {}", format_day(source.last_seen));
        println!("   Avg amount:   {:.4} ETH", source.average_eth());
        println!("   Total amount: {:.4} ETH", source.total_eth());
        println!("   Time spread:  {} days", source.span_days());
        println!(
            "   Activity:     {}",
            activity_bar(&source.timestamps, ACTIVITY_SLOTS)
        );
    }
}

fn format_day(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .format("%Y-%m-%d")
        .to_string()
}
