use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;

use super::reconciler::ProxyReconciler;
use crate::{
    common::{ApiSnapshot, GeneratedProxies},
    translator::ProxyTranslator,
};

/// Translates every snapshot, reconciles the resulting proxies and hands them to the status syncer.
#[derive(TypedBuilder)]
pub struct TranslatorService {
    translator: ProxyTranslator,
    reconciler: ProxyReconciler,
    snapshot_receiver: mpsc::Receiver<ApiSnapshot>,
    generated_proxies_sender: mpsc::Sender<GeneratedProxies>,
    cancellation_token: CancellationToken,
}

impl TranslatorService {
    pub async fn start(self) -> crate::Result<()> {
        let Self { translator, reconciler, mut snapshot_receiver, generated_proxies_sender, cancellation_token } = self;
        let mut pass = 0_u64;
        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => {
                    info!("Translator cancelled");
                    return crate::Result::<()>::Ok(());
                }
                Some(snapshot) = snapshot_receiver.recv() => {
                    pass += 1;
                    let span = span!(Level::INFO, "TranslatorService", pass);
                    let generated = match span.in_scope(|| translator.translate_all(&snapshot)) {
                        Ok(generated) => generated,
                        Err(e) => {
                            span.in_scope(|| error!("Translation failed {e}"));
                            continue;
                        },
                    };
                    span.in_scope(|| info!("Generated {} proxies from {} gateways", generated.len(), snapshot.gateways.len()));

                    if let Err(e) = reconciler.reconcile(&generated).instrument(span.clone()).await {
                        span.in_scope(|| warn!("Reconciling proxies failed {e}"));
                    }
                    if generated_proxies_sender.send(generated).await.is_err() {
                        span.in_scope(|| warn!("Status syncer is gone...exiting"));
                        return crate::Result::<()>::Ok(());
                    }
                }
                else => {
                    warn!("Snapshot channel is closed...exiting");
                    return crate::Result::<()>::Ok(());
                }
            }
        }
    }
}
