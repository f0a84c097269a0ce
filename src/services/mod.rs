mod reconciler;
mod reporter;
mod snapshot_emitter;
mod status_syncer;
mod translator_syncer;

pub use reconciler::{listener_status_key, strip_invalid, ProxyReconciler, ReconcileError};
pub use reporter::{status_from_report, Reporter, ReporterError, StatusReporter};
pub use snapshot_emitter::SnapshotEmitter;
pub use status_syncer::{StatusSyncer, StatusSyncerService, SyncError};
pub use translator_syncer::TranslatorService;
