use crate::api::ComponentExtensionSpec;
use crate::config::{ClusterConfig, IngressConfig};
use crate::features::{ComponentFeatures, DeploymentMode};
use crate::reconcilers::ingress::{external_url, internal_address};
use crate::reconcilers::{
    component_name, component_namespace, measured, Context, DeploymentReconciler, HpaReconciler,
    ServiceReconciler,
};
use crate::util::errors::{Error, Result};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{PodSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use tracing::{info, instrument, warn};

/// Objects a component converged to, with the addresses it is served at
#[derive(Clone, Debug)]
pub struct ComponentResources {
    pub deployment: Deployment,
    pub service: Service,
    pub hpa: Option<HorizontalPodAutoscaler>,
    /// External URL, or the in-cluster one for cluster-local components. `None` when the
    /// domain template cannot produce a host for this component.
    pub url: Option<String>,
    /// In-cluster address of the component Service
    pub address: String,
}

/// Runs the Deployment, Service and HPA reconcilers of one component, in that order
pub struct RawKubeReconciler {
    ctx: Context,
    name: String,
    deployment: DeploymentReconciler,
    service: ServiceReconciler,
    hpa: HpaReconciler,
    component_meta: ObjectMeta,
    ingress: IngressConfig,
    cluster_local: bool,
    address: String,
}

impl RawKubeReconciler {
    pub fn new(
        ctx: &Context,
        component_meta: &ObjectMeta,
        component_ext: &ComponentExtensionSpec,
        pod_spec: PodSpec,
        config: &ClusterConfig,
    ) -> Result<Self> {
        let name = component_name(component_meta)?;
        let namespace = component_namespace(component_meta)?;
        let features = ComponentFeatures::from_meta(component_meta);
        if features.deployment_mode != DeploymentMode::RawDeployment {
            return Err(Error::InvalidArgument(format!(
                "component '{}' requests deployment mode {}",
                name, features.deployment_mode
            )));
        }

        let address = internal_address(name, namespace);

        let client = ctx.client.clone();
        Ok(RawKubeReconciler {
            service: ServiceReconciler::new(client.clone(), component_meta, component_ext, &pod_spec, &features)?,
            hpa: HpaReconciler::new(client.clone(), component_meta, component_ext, &features)?,
            deployment: DeploymentReconciler::new(
                client,
                component_meta,
                component_ext,
                pod_spec,
                &features,
                &config.oauth_proxy,
            )?,
            ctx: ctx.clone(),
            name: name.to_string(),
            component_meta: component_meta.clone(),
            ingress: config.ingress.clone(),
            cluster_local: features.cluster_local,
            address,
        })
    }

    /// Read the cluster ConfigMap, then build the reconciler
    pub async fn load(
        ctx: &Context,
        component_meta: &ObjectMeta,
        component_ext: &ComponentExtensionSpec,
        pod_spec: PodSpec,
    ) -> Result<Self> {
        let config = ClusterConfig::load(&ctx.client).await;
        RawKubeReconciler::new(ctx, component_meta, component_ext, pod_spec, &config)
    }

    pub fn deployment(&self) -> &Deployment {
        self.deployment.deployment()
    }

    pub fn service(&self) -> &Service {
        self.service.service()
    }

    pub fn hpa(&self) -> Option<&HorizontalPodAutoscaler> {
        self.hpa.hpa()
    }

    /// Converge every sub-resource, stopping at the first failure.
    ///
    /// Sub-resources applied before the failure are left in place.
    #[instrument(skip(self), fields(component = %self.name))]
    pub async fn reconcile(self) -> Result<ComponentResources> {
        let RawKubeReconciler {
            ctx,
            name,
            deployment,
            service,
            hpa,
            component_meta,
            ingress,
            cluster_local,
            address,
        } = self;

        let deployment = measured(&ctx, "Deployment", &name, deployment.reconcile()).await?;
        let service = measured(&ctx, "Service", &name, service.reconcile()).await?;
        let hpa = measured(&ctx, "HorizontalPodAutoscaler", &name, hpa.reconcile()).await?;

        let url = if cluster_local {
            Some(address.clone())
        } else {
            match external_url(&name, &component_meta, &ingress) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Component '{}' has no external url: {}", name, e);
                    None
                }
            }
        };
        info!("Component '{}' reconciled, url: {:?}", name, url);

        Ok(ComponentResources {
            deployment,
            service,
            hpa,
            url,
            address,
        })
    }
}
