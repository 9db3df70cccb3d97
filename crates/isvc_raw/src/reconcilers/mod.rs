use std::collections::BTreeMap;
use std::future::Future;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;

use crate::constants;
use crate::util::errors::{Error, Result};
use crate::util::metrics::Metrics;

pub mod deployment;
pub mod hpa;
pub mod ingress;
pub mod object;
pub mod raw_kube;
pub mod service;

pub use deployment::DeploymentReconciler;
pub use hpa::HpaReconciler;
pub use ingress::IngressReconciler;
pub use object::{CheckResult, DesiredState, ObjectReconciler};
pub use raw_kube::{ComponentResources, RawKubeReconciler};
pub use service::ServiceReconciler;

/// State shared between the reconcilers of one operator process
#[derive(Clone, Default)]
pub struct State {
    /// Metrics registry
    registry: prometheus::Registry,
}

impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Create a reconciler Context whose metrics land in this State's registry
    pub fn to_context(&self, client: Client) -> Result<Context, prometheus::Error> {
        Ok(Context {
            client,
            metrics: Metrics::default().register(&self.registry)?,
        })
    }
}

// Context for our reconcilers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Prometheus metrics
    pub metrics: Metrics,
}

/// Await one sub-resource reconcile, counting it and recording its failure per kind
pub(crate) async fn measured<T, F>(ctx: &Context, kind: &str, component: &str, reconcile: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _timer = ctx.metrics.count_and_measure(kind);
    reconcile.await.map_err(|e| {
        ctx.metrics.reconcile_failure(kind, component, &e);
        e
    })
}

pub(crate) fn component_name(meta: &ObjectMeta) -> Result<&str> {
    meta.name
        .as_deref()
        .ok_or_else(|| Error::MetadataMissing("component metadata without a name".to_string()))
}

pub(crate) fn component_namespace(meta: &ObjectMeta) -> Result<&str> {
    meta.namespace.as_deref().ok_or_else(|| {
        Error::MetadataMissing(format!(
            "component '{}' without a namespace",
            meta.name.as_deref().unwrap_or_default()
        ))
    })
}

/// `{app: isvc.<name>}`, the selector tying a component's Service to its Deployment's pods
pub fn app_selector(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        constants::APP_LABEL_KEY.to_string(),
        constants::raw_service_label(name),
    )])
}

/// Component metadata with the derived `app` label appended
pub(crate) fn with_app_label(meta: &ObjectMeta, name: &str) -> ObjectMeta {
    let mut meta = meta.clone();
    meta.labels.get_or_insert_with(BTreeMap::new).extend(app_selector(name));
    meta
}
