#![allow(clippy::cognitive_complexity)]
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::{
    runtime::Builder,
    signal,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

mod config;

use config::{
    cli::{self, Parser},
    trace,
};
use external_api::{ExternalApi, Health};
use node_sync::{NodeSync, StartupOutcome};
use zk_coordination::ZkSession;

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.mq_sync_log, &config.log_format)?;
    debug!(?config, ?trace_config);
    if let Err(err) = dotenv::dotenv() {
        debug!(?err, ".env file not loaded");
    }

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    // if we have a configured value here, set it
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    // build the runtime
    let rt = builder.build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => error!(?err, "failed to start mq-sync"),
            Ok(Err(err)) => error!(?err, "exited with error"),
            Ok(_) => debug!("exiting..."),
        }
    });

    Ok(())
}

async fn start(config: cli::Config) -> Result<()> {
    let sync_config = config.sync_config();
    let path = sync_config.group_path()?;
    info!(%path, zk_servers = %config.zk_servers, "following broker group");

    let token = CancellationToken::new();
    let (tx, endpoints) = watch::channel(Vec::new());

    // start external api for healthchecks
    let api = ExternalApi::new(config.external_api, endpoints.clone());
    let api_sender = api.sender();
    let api_task = api.start(token.clone());

    let session = ZkSession::connect(config.zk_config())
        .await
        .map_err(|err| anyhow!("ZooKeeper connection failed: {err}"))?;
    info!(
        servers = session.servers(),
        state = ?session.connection_state(),
        "ZooKeeper session ready"
    );
    let mut sync = NodeSync::new(Arc::new(session), sync_config)?.with_token(token.clone());

    let outcome = match sync.start(tx).await {
        Ok(outcome) => outcome,
        Err(err) => {
            report_bad_health(&api_sender).await;
            token.cancel();
            return Err(err).context("endpoint sync failed to start");
        }
    };
    match outcome {
        StartupOutcome::Synced { endpoints } => info!(endpoints, "initial endpoint list synced"),
        StartupOutcome::Retrying(code) => {
            warn!(%code, "started without endpoints, retrying in background")
        }
        StartupOutcome::Failed(code) => {
            error!(%code, "started without endpoints, list will not refresh")
        }
    }

    debug!("changing health to good after first sync outcome");
    api_sender
        .send(Health::Good)
        .await
        .context("error occurred in changing health status to Good")?;

    let log_task = spawn_endpoint_logger(endpoints, token.clone());

    shutdown_signal(token.clone()).await?;
    info!("shutdown requested");
    report_bad_health(&api_sender).await;
    sync.shutdown().await;

    if let Err(err) = flatten(api_task).await {
        error!(?err, "error waiting for web server API");
    }
    if let Err(err) = log_task.await {
        error!(?err, "error waiting for endpoint logger");
    }
    Ok(())
}

/// log every list the sync publishes
fn spawn_endpoint_logger(
    mut endpoints: watch::Receiver<Vec<String>>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("endpoint logger stopping");
                    return;
                }
                changed = endpoints.changed() => {
                    if changed.is_err() {
                        debug!("endpoint sender dropped");
                        return;
                    }
                    let list = endpoints.borrow_and_update().clone();
                    info!(count = list.len(), endpoints = ?list, "endpoint list refreshed");
                }
            }
        }
    })
}

/// returns false if the API is no longer listening
async fn report_bad_health(api_sender: &mpsc::Sender<Health>) -> bool {
    match api_sender.send(Health::Bad).await {
        Ok(()) => true,
        Err(err) => {
            debug!(?err, "health listener gone, not reporting Bad");
            false
        }
    }
}

async fn flatten(handle: JoinHandle<()>) -> Result<(), anyhow::Error> {
    handle.await.map_err(|err| anyhow!(err))
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow!(err));
    token.cancel();
    ret
}
