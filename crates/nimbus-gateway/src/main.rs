use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nimbus_client::ClusterClients;
use nimbus_gateway::collaborators::{AllowAllAuthenticator, InMemoryCollectionDirectory, InMemoryKeyIndex, InMemoryUsageAccountant};
use nimbus_gateway::http::{build_router, AppState};
use nimbus_gateway::{Cluster, Config, HandoffRequestor};
use tokio_util::sync::CancellationToken;

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let config = Config::parse();
    tracing::info!(node_name = %config.node_name, "starting nimbus-gateway");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let task = runtime.spawn(async_main(config));
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(Duration::from_secs(5));
    result?
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let topology = config.topology()?;
    let addrs = config.node_address_map()?;
    let clients = ClusterClients::connect(&topology, &addrs).context("assembling cluster client registry")?;
    let segmenter = config.segmenter(topology.node_count())?;

    let cluster = Arc::new(Cluster::new(
        topology.clone(),
        clients,
        segmenter,
        config.min_segments,
        config.reply_timeout(),
    ));

    let state = Arc::new(AppState {
        cluster: cluster.clone(),
        collections: Arc::new(InMemoryCollectionDirectory::new()),
        accounting: Arc::new(InMemoryUsageAccountant::new()),
        key_index: Arc::new(InMemoryKeyIndex::new()),
        authenticator: Arc::new(AllowAllAuthenticator),
    });

    let listener = tokio::net::TcpListener::bind(&config.http_bind).await.context("failed to bind HTTP port")?;
    let router = build_router(state);

    let halt = CancellationToken::new();
    let halt_for_signal = halt.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        halt_for_signal.cancel();
    });

    let peers: Vec<_> = topology
        .nodes()
        .iter()
        .filter(|name| name.as_str() != config.node_name)
        .filter_map(|name| cluster.client(name))
        .collect();
    let requestor = HandoffRequestor::new(
        topology.segment_for_node(&config.node_name).unwrap_or(0),
        config.node_name.clone(),
        config.node_name.clone(),
        addrs.get(&config.node_name).cloned().unwrap_or_default(),
        peers,
        config.handoff_cadence(),
    );
    let halt_for_requestor = halt.clone();
    let requestor_task = tokio::spawn(async move { requestor.run(halt_for_requestor).await });

    let shutdown = {
        let halt = halt.clone();
        async move { halt.cancelled().await }
    };
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await.context("HTTP server failed")?;

    halt.cancel();
    let _ = requestor_task.await;

    Ok(())
}
