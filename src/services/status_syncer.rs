use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;

use super::reporter::Reporter;
use crate::{
    apis::{Proxy, Status, StatusHolder},
    common::{GeneratedProxies, Keyed, Report, ResourceKey, ResourceReports},
    store::ResourceClient,
};

#[derive(Error, Debug)]
#[error("unable to write statuses of {}", .failures.join(", "))]
pub struct SyncError {
    pub failures: Vec<String>,
}

type MergedStatus = (Report, BTreeMap<String, Status>);

/// Combines the reports of the latest translation with the statuses the proxies received and writes
/// one status per resource. Owned by a single task, so no locking is involved.
#[derive(TypedBuilder)]
pub struct StatusSyncer {
    reporter: Arc<dyn Reporter>,
    #[builder(setter(into))]
    status_namespace: String,
    #[builder(default)]
    current_proxies: GeneratedProxies,
    #[builder(default)]
    proxy_statuses: BTreeMap<ResourceKey, Status>,
}

impl StatusSyncer {
    pub fn set_current_proxies(&mut self, proxies: GeneratedProxies) {
        self.current_proxies = proxies;
    }

    /// Records the statuses live proxies currently carry. Proxies without one count as pending.
    pub fn set_statuses(&mut self, proxies: &[Proxy]) {
        self.proxy_statuses = proxies
            .iter()
            .filter_map(|proxy| proxy.status_for(&self.status_namespace).map(|status| (proxy.resource_key(), status.clone())))
            .collect();
    }

    fn merged_statuses(&self) -> BTreeMap<ResourceKey, MergedStatus> {
        let mut merged: BTreeMap<ResourceKey, MergedStatus> = BTreeMap::new();
        for (proxy_key, generated) in &self.current_proxies {
            let proxy_status = self.proxy_statuses.get(proxy_key).cloned().unwrap_or_default();
            for (key, report) in &generated.reports {
                let (merged_report, subresource_statuses) = merged.entry(key.clone()).or_default();
                merged_report.merge(report);
                subresource_statuses.insert(proxy_key.to_string(), proxy_status.clone());
            }
        }
        merged
    }

    /// Hands every merged status to the reporter, which skips resources already carrying it. Failed
    /// writes are retried on the next call.
    pub async fn sync_status(&self) -> Result<(), SyncError> {
        let mut failures = vec![];
        for (key, (report, subresource_statuses)) in self.merged_statuses() {
            let mut reports = ResourceReports::default();
            reports.insert(key.clone(), report);
            if let Err(e) = self.reporter.write_reports(&reports, &subresource_statuses).await {
                warn!("Status of {} {key} not written {e}", key.kind);
                failures.push(key.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError { failures })
        }
    }
}

#[derive(TypedBuilder)]
pub struct StatusSyncerService {
    syncer: StatusSyncer,
    generated_proxies_receiver: mpsc::Receiver<GeneratedProxies>,
    proxy_client: Arc<dyn ResourceClient<Proxy>>,
    #[builder(setter(into))]
    write_namespace: String,
    retry_interval: Duration,
    cancellation_token: CancellationToken,
}

impl StatusSyncerService {
    pub async fn start(self) -> crate::Result<()> {
        let Self { mut syncer, mut generated_proxies_receiver, proxy_client, write_namespace, retry_interval, cancellation_token } = self;
        let mut proxies = proxy_client.watch(Some(&write_namespace));
        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => {
                    info!("Status syncer cancelled");
                    return crate::Result::<()>::Ok(());
                }
                Some(generated) = generated_proxies_receiver.recv() => {
                    let span = span!(Level::INFO, "StatusSyncerService", event = "GeneratedProxies", proxies = generated.len());
                    syncer.set_current_proxies(generated);
                    retry_at = sync(&syncer, retry_interval).instrument(span).await;
                }
                Some(listing) = proxies.next() => {
                    let span = span!(Level::INFO, "StatusSyncerService", event = "ProxyStatuses");
                    match listing {
                        Ok(listing) => {
                            syncer.set_statuses(&listing);
                            retry_at = sync(&syncer, retry_interval).instrument(span).await;
                        },
                        Err(e) => span.in_scope(|| warn!("Proxy watch failed {e}")),
                    }
                }
                () = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    let span = span!(Level::INFO, "StatusSyncerService", event = "Retry");
                    retry_at = sync(&syncer, retry_interval).instrument(span).await;
                }
                else => {
                    warn!("All status syncer channels are closed...exiting");
                    return crate::Result::<()>::Ok(());
                }
            }
        }
    }
}

async fn sync(syncer: &StatusSyncer, retry_interval: Duration) -> Option<Instant> {
    match syncer.sync_status().await {
        Ok(()) => {
            debug!("Statuses in sync");
            None
        },
        Err(e) => {
            warn!("{e}, retrying in {retry_interval:?}");
            Some(Instant::now() + retry_interval)
        },
    }
}
