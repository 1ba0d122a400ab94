//! Fetch stored events for configured identities from every relay.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use relaysync_client::{
    resolve_identity, ClientConfig, ClientError, EventSink, Nip05Resolver, RelayClient,
    SinkError, SubscriptionSummary,
};
use relaysync_types::{Filter, VerifiedEvent};
use std::collections::{BTreeSet, HashSet};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackfillConfig;

/// Events buffered between relay tasks and the stdout writer.
const CHANNEL_CAPACITY: usize = 256;

/// Forwards verified events to the output task.
struct ChannelSink(mpsc::Sender<VerifiedEvent>);

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: VerifiedEvent) -> Result<(), SinkError> {
        self.0
            .send(event)
            .await
            .map_err(|_| SinkError::from("output closed"))
    }
}

/// Run the backfill command.
pub async fn run(backfill: &BackfillConfig, client_config: &ClientConfig) -> Result<()> {
    if backfill.identities.is_empty() {
        bail!("no identities configured; add [backfill] identities or pass --identity");
    }

    let resolver =
        Nip05Resolver::new(client_config).context("failed to build NIP-05 resolver")?;
    let mut authors = BTreeSet::new();
    let mut relays = Vec::new();
    add_relays(&mut relays, &backfill.relays);

    for input in &backfill.identities {
        let identity = resolve_identity(input, &resolver)
            .await
            .with_context(|| format!("failed to resolve identity {input}"))?;
        info!(input = %input, hex = %identity.hex, source = %identity.source, "resolved identity");
        add_relays(&mut relays, &identity.relays);
        authors.insert(identity.hex);
    }

    if relays.is_empty() {
        bail!("no relays configured and no NIP-05 relay hints found");
    }

    let filter = backfill.filter(authors);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, cancelling subscriptions");
                cancel.cancel();
            }
        });
    }

    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut tasks = JoinSet::new();
    for relay in &relays {
        tasks.spawn(backfill_relay(
            relay.clone(),
            filter.clone(),
            client_config.clone(),
            ChannelSink(tx.clone()),
            cancel.clone(),
        ));
    }
    drop(tx);

    let mut seen = HashSet::new();
    while let Some(event) = rx.recv().await {
        if seen.insert(event.id.clone()) {
            let line = serde_json::to_string(&event).context("failed to serialize event")?;
            println!("{line}");
        }
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (relay, result) = joined.context("relay task panicked")?;
        match result {
            Ok(summary) => log_summary(&relay, &summary),
            Err(ClientError::Cancelled) => info!(relay = %relay, "cancelled"),
            Err(e) => {
                failed += 1;
                warn!(relay = %relay, error = %e, "backfill failed");
            }
        }
    }

    info!(
        relays = relays.len(),
        failed,
        events = seen.len(),
        "backfill complete"
    );
    if failed == relays.len() {
        bail!("every relay failed");
    }
    Ok(())
}

/// Append relay URLs not already present, keeping first-seen order.
fn add_relays(relays: &mut Vec<String>, new: &[String]) {
    for relay in new {
        let relay = relay.trim();
        if !relay.is_empty() && !relays.iter().any(|r| r == relay) {
            relays.push(relay.to_string());
        }
    }
}

async fn backfill_relay(
    relay: String,
    filter: Filter,
    config: ClientConfig,
    sink: ChannelSink,
    cancel: CancellationToken,
) -> (String, Result<SubscriptionSummary, ClientError>) {
    let client = RelayClient::websocket(relay.clone(), config);
    let result = async {
        client.connect().await?;
        client.subscribe(filter, &sink, &cancel).await
    }
    .await;
    if let Err(e) = client.close().await {
        debug!(relay = %client.url(), error = %e, "close failed");
    }
    (relay, result)
}

fn log_summary(relay: &str, summary: &SubscriptionSummary) {
    info!(
        relay = %relay,
        end = %summary.end,
        delivered = summary.delivered,
        rejected = summary.rejected,
        malformed = summary.malformed,
        "relay done"
    );
}
