//! Operator CLI for the lotto prediction loop.
//!
//! Everything runs against a local SQLite file, so a full
//! predict / reconcile / update-weights cycle works offline.

#![deny(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use lotto_evaluation::{Evaluator, PerformanceAggregator};
use lotto_learning::{AdaptiveLearner, DEFAULT_WINDOW};
use lotto_ledger::PredictionLedger;
use lotto_portfolio::PortfolioGenerator;
use lotto_reconcile::{InMemoryDrawHistory, ReconciliationDriver};
use lotto_storage::sqlite::SqliteLottoStorage;
use lotto_types::{DrawRecord, PredictionId, Ticket};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lotto prediction loop CLI
#[derive(Parser)]
#[command(name = "lotto")]
#[command(about = "Prediction ledger with an adaptive feedback loop", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "LOTTO_DB", default_value = "lotto.db")]
    db: PathBuf,

    /// Log level
    #[arg(long, env = "LOTTO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "LOTTO_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a portfolio and record it as a pending prediction
    Predict {
        /// Strategy name
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,

        /// Number of tickets in the portfolio
        #[arg(long, default_value_t = 10)]
        size: usize,

        /// Draw date the prediction targets (YYYY-MM-DD)
        #[arg(long)]
        target_date: NaiveDate,

        /// JSON file with historical draws for the frequency pool
        #[arg(long)]
        draws: Option<PathBuf>,

        /// Model version tag stored with the prediction
        #[arg(long, default_value = "v1")]
        model_version: String,
    },

    /// Evaluate one prediction against a known winning draw
    Evaluate {
        /// Prediction id
        #[arg(long)]
        id: i64,

        /// The 7 winning numbers
        #[arg(long, value_delimiter = ',', num_args = 7)]
        numbers: Vec<u8>,
    },

    /// Evaluate every pending prediction whose draw is in the file
    Reconcile {
        /// JSON file with historical draws
        #[arg(long)]
        draws: PathBuf,
    },

    /// Adjust strategy weights from recent evaluated performance
    UpdateWeights {
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,

        /// How many recent outcomes to consider
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
    },

    /// Show windowed performance for a strategy
    Performance {
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,

        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
    },

    /// Show the current weight mixture for a strategy
    Weights {
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,
    },

    /// Show the full weight adjustment history for a strategy
    History {
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,
    },

    /// List predictions still waiting for a draw result
    Pending,

    /// Show recent evaluation outcomes for a strategy
    Results {
        #[arg(long, default_value = "hybrid_v1")]
        strategy: String,

        /// Max outcomes to show (0 for all)
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one prediction by id
    Show {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let storage = SqliteLottoStorage::open(&cli.db)
        .await
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    let ledger = PredictionLedger::with_storage(Arc::new(storage));

    match cli.command {
        Commands::Predict {
            strategy,
            size,
            target_date,
            draws,
            model_version,
        } => predict(ledger, &strategy, size, target_date, draws, &model_version).await,
        Commands::Evaluate { id, numbers } => evaluate(ledger, id, &numbers).await,
        Commands::Reconcile { draws } => reconcile(ledger, &draws).await,
        Commands::UpdateWeights { strategy, window } => {
            update_weights(ledger, &strategy, window).await
        }
        Commands::Performance { strategy, window } => {
            performance(ledger, &strategy, window).await
        }
        Commands::Weights { strategy } => weights(ledger, &strategy).await,
        Commands::History { strategy } => history(ledger, &strategy).await,
        Commands::Pending => pending(ledger).await,
        Commands::Results { strategy, limit } => results(ledger, &strategy, limit).await,
        Commands::Show { id } => show(ledger, id).await,
    }
}

async fn predict(
    ledger: PredictionLedger,
    strategy: &str,
    size: usize,
    target_date: NaiveDate,
    draws: Option<PathBuf>,
    model_version: &str,
) -> anyhow::Result<()> {
    let history = match draws {
        Some(path) => load_draws(&path)?,
        None => Vec::new(),
    };

    let learner = AdaptiveLearner::new(ledger.clone());
    learner.ensure_default_weights(strategy).await?;

    let generator = PortfolioGenerator::new(ledger.clone());
    let portfolio = generator.generate(strategy, size, &history).await?;
    let prediction = ledger
        .create_prediction(
            target_date,
            strategy,
            portfolio.tickets,
            model_version,
            portfolio.mixture,
        )
        .await?;

    println!(
        "Prediction {} recorded for {} ({} tickets)",
        prediction.id, prediction.target_draw_date, prediction.tickets.len()
    );
    for ticket in &prediction.tickets {
        println!("  {ticket}");
    }
    for (name, value) in &prediction.metadata {
        println!("  {name} = {value:.2}");
    }
    Ok(())
}

async fn evaluate(ledger: PredictionLedger, id: i64, numbers: &[u8]) -> anyhow::Result<()> {
    let actual = Ticket::from_slice(numbers).context("invalid winning numbers")?;
    let evaluator = Evaluator::new(ledger);
    let summary = evaluator.evaluate(PredictionId(id), actual).await?;

    println!(
        "Prediction {} evaluated: best_match={} total_matches={} prize={}",
        summary.prediction_id, summary.best_match, summary.total_matches, summary.prize_value
    );
    Ok(())
}

async fn reconcile(ledger: PredictionLedger, draws: &PathBuf) -> anyhow::Result<()> {
    let source = InMemoryDrawHistory::new(load_draws(draws)?);
    let driver = ReconciliationDriver::new(ledger);
    let report = driver.reconcile_pending(&source).await?;

    println!(
        "Reconciled {} of {} pending prediction(s)",
        report.evaluated, report.pending
    );
    Ok(())
}

async fn update_weights(
    ledger: PredictionLedger,
    strategy: &str,
    window: usize,
) -> anyhow::Result<()> {
    let learner = AdaptiveLearner::new(ledger);
    match learner.update(strategy, window).await? {
        Some(update) => {
            println!(
                "Weights updated: frequency_ratio={:.2} random_ratio={:.2}",
                update.frequency_ratio, update.random_ratio
            );
            println!(
                "  score={:.3} over {} outcome(s), posterior Beta({}, {})",
                update.performance_score,
                update.n_observations,
                update.posterior_alpha,
                update.posterior_beta
            );
        }
        None => println!("Not enough evaluated outcomes yet; weights unchanged"),
    }
    Ok(())
}

async fn performance(
    ledger: PredictionLedger,
    strategy: &str,
    window: usize,
) -> anyhow::Result<()> {
    let aggregator = PerformanceAggregator::new(ledger);
    match aggregator.windowed_performance(strategy, window).await? {
        Some(summary) => {
            println!("Performance for '{strategy}' over last {window} outcome(s):");
            println!("  evaluated:      {}", summary.n_results);
            println!("  avg best match: {:.2}", summary.avg_best_match);
            println!("  avg matches:    {:.2}", summary.avg_total_matches);
            println!("  avg prize:      {:.2}", summary.avg_prize_value);
            println!("  hit rate (3+):  {:.3}", summary.hit_rate_3plus);
            println!("  best ever:      {}", summary.best_ever);
            println!("  total won:      {}", summary.total_prize_won);
        }
        None => println!("No evaluated outcomes for '{strategy}' yet"),
    }
    Ok(())
}

async fn weights(ledger: PredictionLedger, strategy: &str) -> anyhow::Result<()> {
    let current = ledger.current_weights(strategy).await?;
    if current.is_empty() {
        println!("No weights recorded for '{strategy}' yet");
        return Ok(());
    }
    for (name, state) in current {
        println!(
            "{name} = {:.2} (score={:.3}, n={})",
            state.value, state.performance_score, state.n_observations
        );
    }
    Ok(())
}

async fn history(ledger: PredictionLedger, strategy: &str) -> anyhow::Result<()> {
    let snapshots = ledger.weight_history(strategy).await?;
    if snapshots.is_empty() {
        println!("No weight history for '{strategy}' yet");
        return Ok(());
    }
    println!(
        "{:<6} {:<22} {:<18} {:<8} {:<8} {:<4}",
        "SEQ", "UPDATED", "WEIGHT", "VALUE", "SCORE", "N"
    );
    for snap in snapshots {
        println!(
            "{:<6} {:<22} {:<18} {:<8.2} {:<8.3} {:<4}",
            snap.sequence,
            snap.updated_at.format("%Y-%m-%d %H:%M:%S"),
            snap.weight_name,
            snap.value,
            snap.performance_score,
            snap.n_observations
        );
    }
    Ok(())
}

async fn pending(ledger: PredictionLedger) -> anyhow::Result<()> {
    let unresolved = ledger.list_unresolved().await?;
    if unresolved.is_empty() {
        println!("No pending predictions");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<12} {:<8}", "ID", "TARGET", "STRATEGY", "TICKETS");
    for prediction in unresolved {
        println!(
            "{:<6} {:<12} {:<12} {:<8}",
            prediction.id,
            prediction.target_draw_date.to_string(),
            prediction.strategy_name,
            prediction.portfolio_size()
        );
    }
    Ok(())
}

async fn results(ledger: PredictionLedger, strategy: &str, limit: usize) -> anyhow::Result<()> {
    let outcomes = ledger.query_results(strategy, limit).await?;
    if outcomes.is_empty() {
        println!("No evaluated outcomes for '{strategy}' yet");
        return Ok(());
    }
    println!(
        "{:<6} {:<22} {:<6} {:<8} {:<10}",
        "PRED", "EVALUATED", "BEST", "MATCHES", "PRIZE"
    );
    for outcome in outcomes {
        println!(
            "{:<6} {:<22} {:<6} {:<8} {:<10}",
            outcome.prediction_id,
            outcome.evaluated_at.format("%Y-%m-%d %H:%M:%S"),
            outcome.best_match,
            outcome.total_matches,
            outcome.prize_value
        );
    }
    Ok(())
}

async fn show(ledger: PredictionLedger, id: i64) -> anyhow::Result<()> {
    let Some(prediction) = ledger.get_prediction(PredictionId(id)).await? else {
        bail!("no prediction with id {id}");
    };
    println!("Prediction {}", prediction.id);
    println!("  created:   {}", prediction.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  target:    {}", prediction.target_draw_date);
    println!("  strategy:  {}", prediction.strategy_name);
    println!("  model:     {}", prediction.model_version);
    println!("  resolved:  {}", prediction.resolved);
    for ticket in &prediction.tickets {
        println!("  {ticket}");
    }
    Ok(())
}

fn load_draws(path: &PathBuf) -> anyhow::Result<Vec<DrawRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading draws file {}", path.display()))?;
    let draws: Vec<DrawRecord> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(draws)
}
