// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # IOU Ledger Node
//!
//! Entry point for the `iou-node` binary. Parses CLI arguments, initializes
//! logging and metrics, starts an in-process network of parties and serves
//! the HTTP API over it.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the network and serve the API and metrics
//! - `demo`    — walk through issuance, transfer and settlement, then exit
//! - `version` — print build version information

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use iou_node::api;
use iou_node::cli::{self, Commands, IouNodeCli};
use iou_node::logging;
use iou_node::metrics::{self, NodeMetrics};
use iou_node::node::{Network, Node};
use iou_protocol::config::{DEFAULT_LOG_FILTER, DEFAULT_NOTARY_NAME, PROTOCOL_VERSION};
use iou_protocol::{Amount, Currency, IouState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IouNodeCli::parse();
    let format = cli.log_format;

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(&format!("{DEFAULT_LOG_FILTER},tower_http=debug"), format);
            run_node(args).await
        }
        Commands::Demo(args) => {
            logging::init_logging(DEFAULT_LOG_FILTER, format);
            run_demo(args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the parties, the API server and the metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        parties = ?args.parties,
        notary = %args.notary,
        "starting iou-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Network ---
    let network = Arc::new(Network::with_notary(&args.notary, Arc::clone(&node_metrics)));
    for name in args.parties.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        network
            .add_node(name)
            .with_context(|| format!("failed to start party {name}"))?;
    }

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("iou-node stopped");
    Ok(())
}

/// Issues an IOU, transfers it, settles it in two payments and shows the
/// refusals along the way.
async fn run_demo(args: cli::DemoArgs) -> Result<()> {
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let network = Network::with_notary(DEFAULT_NOTARY_NAME, node_metrics);
    network.set_session_timeout(Duration::from_millis(args.timeout_ms));

    let lender = network.add_node("Lender")?;
    let borrower = network.add_node("Borrower")?;
    let new_lender = network.add_node("NewLender")?;

    let amount = |s: &str| s.parse::<Amount>();

    println!("== issue 100.00 USD owed by Borrower to Lender");
    let iou = IouState::new(
        amount("100.00 USD")?,
        lender.identity().clone(),
        borrower.identity().clone(),
    );
    let linear_id = iou.linear_id.clone();
    let stx = borrower.issue_iou(iou).await?;
    println!("   tx {}", stx.id());
    print_iou(&lender, &linear_id);

    println!("== transfer to NewLender");
    let stx = lender
        .transfer_iou(linear_id.clone(), new_lender.identity().clone())
        .await?;
    println!("   tx {}", stx.id());
    print_iou(&new_lender, &linear_id);

    println!("== settle 40.00 USD without cash");
    report_refusal(borrower.settle_iou(linear_id.clone(), amount("40.00 USD")?).await);

    println!("== Borrower self-issues 50.00 USD");
    borrower.self_issue_cash(amount("50.00 USD")?).await?;
    print_balances(&[&borrower, &new_lender], &Currency::USD)?;

    println!("== settle 40.00 USD");
    let stx = borrower
        .settle_iou(linear_id.clone(), amount("40.00 USD")?)
        .await?;
    println!("   tx {}", stx.id());
    print_iou(&new_lender, &linear_id);
    print_balances(&[&borrower, &new_lender], &Currency::USD)?;

    println!("== settle 10.00 GBP");
    report_refusal(borrower.settle_iou(linear_id.clone(), amount("10.00 GBP")?).await);

    println!("== NewLender tries to settle");
    report_refusal(new_lender.settle_iou(linear_id.clone(), amount("10.00 USD")?).await);

    println!("== Borrower self-issues 100.00 USD, then settles 70.00 USD");
    borrower.self_issue_cash(amount("100.00 USD")?).await?;
    report_refusal(borrower.settle_iou(linear_id.clone(), amount("70.00 USD")?).await);

    println!("== settle the remaining 60.00 USD");
    let stx = borrower
        .settle_iou(linear_id.clone(), amount("60.00 USD")?)
        .await?;
    println!("   tx {}", stx.id());
    print_iou(&new_lender, &linear_id);
    print_balances(&[&borrower, &new_lender], &Currency::USD)?;

    println!(
        "== notary committed {} transaction(s)",
        network.notary().committed_count()
    );
    Ok(())
}

fn print_iou(node: &Node, linear_id: &iou_protocol::UniqueIdentifier) {
    match node.iou(linear_id) {
        Some(iou) => println!(
            "   {}: {} owed by {} to {}, paid {}",
            node.identity().name,
            iou.amount,
            iou.borrower.name,
            iou.lender.name,
            iou.paid
        ),
        None => println!("   {}: no unconsumed IOU {}", node.identity().name, linear_id),
    }
}

fn print_balances(nodes: &[&Arc<Node>], currency: &Currency) -> Result<()> {
    for node in nodes {
        let balance = node.vault().cash_balance(currency)?;
        println!("   {} holds {}", node.identity().name, balance);
    }
    Ok(())
}

fn report_refusal<T>(result: std::result::Result<T, iou_node::flow::FlowError>) {
    match result {
        Ok(_) => println!("   unexpectedly accepted"),
        Err(e) => println!("   refused: {}", e),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("iou-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
