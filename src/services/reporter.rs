use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, span, warn, Instrument, Level};
use typed_builder::TypedBuilder;

use crate::{
    apis::{Gateway, RouteTable, State, Status, StatusHolder, VirtualService},
    common::{errors_to_string, Report, ResourceKey, ResourceKind, ResourceReports},
    store::{ResourceClient, StoreError, StoreResource},
};

const DEFAULT_CONFLICT_RETRIES: usize = 3;

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("store error {0}")]
    Store(#[from] StoreError),
    #[error("gave up writing status of {0} after repeated conflicts")]
    TooManyConflicts(String),
    #[error("no status can be written for {0}")]
    UnsupportedKind(ResourceKind),
}

/// Turns reports into statuses on the reported resources.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn write_reports(&self, reports: &ResourceReports, subresource_statuses: &BTreeMap<String, Status>) -> Result<(), ReporterError>;

    fn status_from_report(&self, report: &Report, subresource_statuses: &BTreeMap<String, Status>) -> Status;
}

/// Errors reject a resource and warnings downgrade it to a warning. Warnings are kept in the reason
/// of a rejected resource.
pub fn status_from_report(reported_by: &str, report: &Report, subresource_statuses: &BTreeMap<String, Status>) -> Status {
    let warning_reason = (!report.warnings.is_empty()).then(|| format!("warning: \n  {}", report.warnings.join("\n")));
    let (state, reason) = match (report.has_errors(), warning_reason) {
        (true, Some(warnings)) => (State::Rejected, format!("{}\n{warnings}", errors_to_string(&report.errors))),
        (true, None) => (State::Rejected, errors_to_string(&report.errors)),
        (false, Some(warnings)) => (State::Warning, warnings),
        (false, None) => (State::Accepted, String::new()),
    };
    Status { state, reason, reported_by: reported_by.to_owned(), subresource_statuses: subresource_statuses.clone() }
}

/// Writes statuses through the resource clients. Each resource only gets its entry for
/// `status_namespace` replaced, entries of other reporters are left alone.
#[derive(TypedBuilder)]
pub struct StatusReporter {
    #[builder(setter(into))]
    reported_by: String,
    #[builder(setter(into))]
    status_namespace: String,
    gateway_client: Arc<dyn ResourceClient<Gateway>>,
    virtual_service_client: Arc<dyn ResourceClient<VirtualService>>,
    route_table_client: Arc<dyn ResourceClient<RouteTable>>,
    #[builder(default = DEFAULT_CONFLICT_RETRIES)]
    conflict_retries: usize,
}

impl StatusReporter {
    async fn write_status<R: StoreResource>(&self, client: &dyn ResourceClient<R>, key: &ResourceKey, status: &Status) -> Result<(), ReporterError> {
        for attempt in 0..=self.conflict_retries {
            let Some(mut resource) = client.read(&key.namespace, &key.name).await? else {
                debug!("{} {key} is gone, skipping status", key.kind);
                return Ok(());
            };
            if resource.status_for(&self.status_namespace) == Some(status) {
                debug!("{} {key} status unchanged", key.kind);
                return Ok(());
            }

            resource.set_status_for(&self.status_namespace, status.clone());
            match client.write_status(&resource).await {
                Ok(_) => {
                    info!("{} {key} status {}", key.kind, status.state);
                    return Ok(());
                },
                Err(e) if e.is_conflict() => {
                    debug!("{} {key} status conflict, attempt {attempt}", key.kind);
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(ReporterError::TooManyConflicts(key.to_string()))
    }
}

#[async_trait]
impl Reporter for StatusReporter {
    async fn write_reports(&self, reports: &ResourceReports, subresource_statuses: &BTreeMap<String, Status>) -> Result<(), ReporterError> {
        let mut result = Ok(());
        for (key, report) in reports {
            let span = span!(Level::INFO, "StatusReporter", id = %key);
            let status = self.status_from_report(report, subresource_statuses);
            let written = match key.kind {
                ResourceKind::Gateway => self.write_status(self.gateway_client.as_ref(), key, &status).instrument(span.clone()).await,
                ResourceKind::VirtualService => self.write_status(self.virtual_service_client.as_ref(), key, &status).instrument(span.clone()).await,
                ResourceKind::RouteTable => self.write_status(self.route_table_client.as_ref(), key, &status).instrument(span.clone()).await,
                ResourceKind::Proxy => Err(ReporterError::UnsupportedKind(key.kind)),
            };
            if let Err(e) = written {
                span.in_scope(|| warn!("Unable to write status {e}"));
                result = Err(e);
            }
        }
        result
    }

    fn status_from_report(&self, report: &Report, subresource_statuses: &BTreeMap<String, Status>) -> Status {
        status_from_report(&self.reported_by, report, subresource_statuses)
    }
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;

    use super::*;
    use crate::{
        apis::{NamespacedStatuses, VirtualServiceSpec},
        common::ValidationError,
        store::{InMemoryResourceClient, WriteOptions},
    };

    fn virtual_service(name: &str) -> VirtualService {
        VirtualService {
            metadata: ObjectMeta { name: Some(name.to_owned()), namespace: Some("default".to_owned()), ..Default::default() },
            spec: VirtualServiceSpec::default(),
            status: None,
        }
    }

    fn reporter(virtual_services: &Arc<InMemoryResourceClient<VirtualService>>) -> StatusReporter {
        StatusReporter::builder()
            .reported_by("gateway")
            .status_namespace("gloo-system")
            .gateway_client(Arc::new(InMemoryResourceClient::<Gateway>::new()))
            .virtual_service_client(Arc::clone(virtual_services) as Arc<dyn ResourceClient<VirtualService>>)
            .route_table_client(Arc::new(InMemoryResourceClient::<RouteTable>::new()))
            .build()
    }

    #[test]
    fn test_status_from_report() {
        let sub = BTreeMap::from([("gloo-system.gateway-proxy".to_owned(), Status::accepted("gloo"))]);

        let accepted = status_from_report("gateway", &Report::default(), &sub);
        assert_eq!(accepted.state, State::Accepted);
        assert_eq!(accepted.subresource_statuses, sub);

        let warned = status_from_report("gateway", &Report { errors: vec![], warnings: vec!["route table ns.rt missing".to_owned()] }, &sub);
        assert_eq!(warned.state, State::Warning);
        assert_eq!(warned.reason, "warning: \n  route table ns.rt missing");

        let rejected = status_from_report(
            "gateway",
            &Report { errors: vec![ValidationError::NoAction], warnings: vec!["route table ns.rt missing".to_owned()] },
            &BTreeMap::new(),
        );
        assert_eq!(rejected.state, State::Rejected);
        assert_eq!(rejected.reason, format!("{}\nwarning: \n  route table ns.rt missing", ValidationError::NoAction));
    }

    #[tokio::test]
    async fn test_only_own_status_entry_is_replaced() {
        let virtual_services = Arc::new(InMemoryResourceClient::<VirtualService>::new());
        let mut vs = virtual_service("vs");
        vs.status = Some(NamespacedStatuses { statuses: BTreeMap::from([("other".to_owned(), Status::accepted("someone-else"))]) });
        virtual_services.write(vs, WriteOptions::default()).await.unwrap();

        let key = ResourceKey::virtual_service("vs", "default");
        let mut reports = ResourceReports::default();
        reports.add_error(&key, ValidationError::NoAction);
        reporter(&virtual_services).write_reports(&reports, &BTreeMap::new()).await.unwrap();

        let stored = virtual_services.read("default", "vs").await.unwrap().unwrap();
        assert_eq!(stored.status_for("other"), Some(&Status::accepted("someone-else")));
        assert_eq!(stored.status_for("gloo-system").unwrap().state, State::Rejected);
        let version = stored.metadata.resource_version.clone();

        reporter(&virtual_services).write_reports(&reports, &BTreeMap::new()).await.unwrap();
        let stored = virtual_services.read("default", "vs").await.unwrap().unwrap();
        assert_eq!(stored.metadata.resource_version, version);
    }

    #[tokio::test]
    async fn test_missing_resources_are_skipped() {
        let virtual_services = Arc::new(InMemoryResourceClient::<VirtualService>::new());
        let mut reports = ResourceReports::default();
        reports.accept([&ResourceKey::virtual_service("gone", "default")]);
        assert!(reporter(&virtual_services).write_reports(&reports, &BTreeMap::new()).await.is_ok());
    }
}
