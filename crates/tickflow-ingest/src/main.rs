//! tickflow-ingest binary entry point
//!
//! Wires the Coinbase feed into both delivery paths: the in-process event
//! bus and the NATS JetStream durable log, with a Postgres-backed ticker
//! store behind the dispatcher.

mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickflow_feed::{CoinbaseConnector, Connector, Runner};
use tickflow_middleware::{NatsTransport, Transport};
use tickflow_pipeline::bus::spawn_dispatch_task;
use tickflow_pipeline::pg::{create_pool, run_migrations};
use tickflow_pipeline::{
    ConsumerPool, ConsumerSettings, Dispatcher, EventBus, FanoutWriter, LogProducer, PgTickerStore,
    TickerStore,
};

use server::{run_server, ServerState};

const FEED_NAME: &str = "coinbase";

#[derive(Parser, Debug)]
#[command(name = "tickflow-ingest")]
#[command(about = "Coinbase ticker ingestion to a durable log and Postgres")]
struct Args {
    /// Coinbase WebSocket feed URL
    #[arg(long, env = "WS_URL", default_value = tickflow_feed::coinbase::DEFAULT_WS_URL)]
    ws_url: String,

    /// Products to subscribe to
    #[arg(long, env = "SYMBOLS", value_delimiter = ',', default_value = "BTC-USD")]
    symbols: Vec<String>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    nats_url: String,

    /// JetStream stream name backing the durable log
    #[arg(long, env = "LOG_STREAM", default_value = "MARKET_DATA")]
    stream: String,

    /// Durable log topic (subject prefix)
    #[arg(long, env = "LOG_TOPIC", default_value = "market-data")]
    topic: String,

    /// Consumer group id
    #[arg(long, env = "CONSUMER_GROUP", default_value = "market-data-consumer")]
    group: String,

    /// Log consumer worker count
    #[arg(long, env = "CONSUMER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Partition count of the durable log topic
    #[arg(long, env = "LOG_PARTITIONS", default_value_t = 10)]
    partitions: u32,

    /// Health/metrics listen address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(
        ws_url = %args.ws_url,
        symbols = ?args.symbols,
        nats_url = %args.nats_url,
        topic = %args.topic,
        concurrency = args.concurrency,
        partitions = args.partitions,
        "Starting tickflow-ingest"
    );

    // Store
    let pool = create_pool(&args.database_url)?;
    run_migrations(&pool).await?;
    let store = Arc::new(PgTickerStore::new(pool)) as Arc<dyn TickerStore>;
    let dispatcher = Arc::new(Dispatcher::new(store, FEED_NAME));

    // Durable log
    let transport = NatsTransport::connect(&args.nats_url, &args.stream).await?;
    transport
        .ensure_stream(vec![format!("{}.>", args.topic)])
        .await?;
    let transport = Arc::new(transport) as Arc<dyn Transport>;

    let shutdown = CancellationToken::new();

    // Event bus path
    let bus = EventBus::new();
    let bus_task = spawn_dispatch_task(&bus, Arc::clone(&dispatcher), shutdown.clone());

    // Durable log path
    let settings = ConsumerSettings {
        topic: args.topic.clone(),
        group: args.group.clone(),
        concurrency: args.concurrency,
        partitions: args.partitions,
        ..Default::default()
    };
    let mut consumers = ConsumerPool::spawn(
        Arc::clone(&transport),
        settings,
        Arc::clone(&dispatcher),
        shutdown.clone(),
    )
    .await?;

    // Feed
    let producer = LogProducer::new(Arc::clone(&transport), &args.topic, args.partitions);
    let connector = CoinbaseConnector::new(&args.ws_url, args.symbols.clone());
    let connection = connector.connection();
    let mut runner = Runner::new(FEED_NAME, connector, FanoutWriter::new(bus, producer));

    let (runner_shutdown_tx, runner_shutdown_rx) = tokio::sync::watch::channel(false);
    let mut runner_task = tokio::spawn(async move { runner.run(runner_shutdown_rx).await });

    // Health/metrics server
    let server_state = ServerState::new(FEED_NAME, connection);
    let http_addr = args.http_addr;
    let server_task = tokio::spawn(async move {
        if let Err(e) = run_server(http_addr, server_state).await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %http_addr, "Health server listening");

    // Wait for a signal or a feed failure
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut runner_finished = false;
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        _ = sigint.recv() => info!("SIGINT received, shutting down"),
        result = &mut runner_task => {
            runner_finished = true;
            match result {
                Ok(Ok(())) => info!("Feed runner finished"),
                Ok(Err(e)) => error!(error = %e, "Feed runner failed"),
                Err(e) => error!(error = %e, "Feed runner panicked"),
            }
        }
    }

    // Drain: stop the feed pump, let consumers finish their in-flight
    // batch, then stop. Anything still buffered on the bus is dropped.
    runner_shutdown_tx.send(true).ok();
    shutdown.cancel();

    if !runner_finished {
        match runner_task.await {
            Ok(Ok(())) => info!("Feed runner stopped"),
            Ok(Err(e)) => error!(error = %e, "Feed runner failed during shutdown"),
            Err(e) => error!(error = %e, "Feed runner panicked during shutdown"),
        }
    }

    while let Some(result) = consumers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Consumer worker panicked during shutdown");
        }
    }
    bus_task.await.ok();
    server_task.abort();

    info!("tickflow-ingest stopped");
    Ok(())
}
