use crate::api::{ComponentExtensionSpec, ScaleMetric};
use crate::constants;
use crate::features::{AutoscalerClass, ComponentFeatures};
use crate::reconcilers::object::{to_comparable, DesiredState, ObjectReconciler};
use crate::reconcilers::{component_name, component_namespace, with_app_label};
use crate::util::errors::{Error, Result};

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use kube::api::{Api, DeleteParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::info;

impl DesiredState for HorizontalPodAutoscaler {
    // the server fills in unset behavior rules
    const DRY_RUN_BEFORE_DIFF: bool = true;

    fn comparable(&self) -> Result<Value> {
        to_comparable(&self.spec)
    }
}

/// Reconciles the HPA of one component, or removes a stale one once scaling is external
pub struct HpaReconciler {
    api: Api<HorizontalPodAutoscaler>,
    name: String,
    inner: Option<ObjectReconciler<HorizontalPodAutoscaler>>,
}

impl HpaReconciler {
    pub fn new(
        client: Client,
        component_meta: &ObjectMeta,
        component_ext: &ComponentExtensionSpec,
        features: &ComponentFeatures,
    ) -> Result<Self> {
        let name = component_name(component_meta)?;
        let namespace = component_namespace(component_meta)?;
        let inner = match build_hpa(component_meta, component_ext, features)? {
            Some(hpa) => Some(ObjectReconciler::new(client.clone(), hpa)?),
            None => None,
        };
        Ok(HpaReconciler {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            inner,
        })
    }

    pub fn hpa(&self) -> Option<&HorizontalPodAutoscaler> {
        self.inner.as_ref().map(ObjectReconciler::desired)
    }

    pub async fn reconcile(self) -> Result<Option<HorizontalPodAutoscaler>> {
        match self.inner {
            Some(inner) => inner.reconcile().await.map(Some),
            None => {
                delete_stale(&self.api, &self.name).await?;
                Ok(None)
            }
        }
    }
}

/// Delete the component's HPA, but only one this operator labelled as the component's own
async fn delete_stale(api: &Api<HorizontalPodAutoscaler>, name: &str) -> Result<()> {
    let existing = match api.get(name).await {
        Ok(existing) => existing,
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => return Ok(()),
        Err(e) => return Err(Error::KubeError(e)),
    };
    if !is_owned(&existing, name) {
        info!("Keeping HorizontalPodAutoscaler '{}', it is not managed for this component", name);
        return Ok(());
    }

    info!("Deleting HorizontalPodAutoscaler '{}', autoscaling is external", name);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

fn is_owned(hpa: &HorizontalPodAutoscaler, name: &str) -> bool {
    hpa.labels().get(constants::APP_LABEL_KEY) == Some(&constants::raw_service_label(name))
}

fn scaling_policy(type_: &str, value: i32) -> HPAScalingPolicy {
    HPAScalingPolicy {
        type_: type_.to_string(),
        value,
        period_seconds: 15,
    }
}

fn behavior() -> HorizontalPodAutoscalerBehavior {
    HorizontalPodAutoscalerBehavior {
        scale_up: Some(HPAScalingRules {
            stabilization_window_seconds: Some(0),
            select_policy: Some("Max".to_string()),
            policies: Some(vec![scaling_policy("Pods", 4), scaling_policy("Percent", 100)]),
            ..Default::default()
        }),
        scale_down: Some(HPAScalingRules {
            select_policy: Some("Max".to_string()),
            policies: Some(vec![scaling_policy("Percent", 100)]),
            ..Default::default()
        }),
    }
}

/// Desired HPA of a component, `None` when an external autoscaler owns the replicas
pub fn build_hpa(
    component_meta: &ObjectMeta,
    component_ext: &ComponentExtensionSpec,
    features: &ComponentFeatures,
) -> Result<Option<HorizontalPodAutoscaler>> {
    if features.autoscaler_class == AutoscalerClass::External {
        return Ok(None);
    }
    let name = component_name(component_meta)?;

    let min_replicas = component_ext
        .min_replicas
        .unwrap_or(constants::DEFAULT_MIN_REPLICAS)
        .max(constants::DEFAULT_MIN_REPLICAS);
    let max_replicas = component_ext.max_replicas.max(min_replicas);
    let metric = component_ext.scale_metric.unwrap_or(features.metric);
    let utilization = component_ext
        .scale_target
        .or(features.target_utilization)
        .unwrap_or(constants::DEFAULT_CPU_UTILIZATION);

    let metric_name = match metric {
        ScaleMetric::Cpu => "cpu",
        ScaleMetric::Memory => "memory",
    };

    Ok(Some(HorizontalPodAutoscaler {
        metadata: with_app_label(component_meta, name),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: name.to_string(),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: metric_name.to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(utilization),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            behavior: Some(behavior()),
        }),
        ..Default::default()
    }))
}
