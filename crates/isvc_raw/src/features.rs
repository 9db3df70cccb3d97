//! Feature flags carried by component labels and annotations, resolved once per reconcile pass.

use core::fmt;
use std::collections::BTreeMap;
use std::fmt::Display;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::warn;

use crate::api::ScaleMetric;
use crate::constants;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentMode {
    Serverless,
    #[default]
    RawDeployment,
    ModelMesh,
}

impl Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeploymentMode::Serverless => write!(f, "Serverless"),
            DeploymentMode::RawDeployment => write!(f, "RawDeployment"),
            DeploymentMode::ModelMesh => write!(f, "ModelMesh"),
        }
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoscalerClass {
    #[default]
    Hpa,
    /// Replicas are managed outside the operator, no HPA is produced
    External,
}

/// Typed view over the reserved label and annotation keys of a component.
///
/// | field | key | read from |
/// |---|---|---|
/// | `deployment_mode` | `serving.kserve.io/deploymentMode` | annotations |
/// | `autoscaler_class` | `serving.kserve.io/autoscalerClass` | annotations |
/// | `metric` | `serving.kserve.io/metrics` | annotations |
/// | `target_utilization` | `serving.kserve.io/targetUtilizationPercentage` | annotations |
/// | `cluster_local` | `networking.kserve.io/visibility` or `serving.knative.dev/visibility` | labels |
/// | `auth_enabled` | `security.opendatahub.io/enable-auth` | labels |
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct ComponentFeatures {
    pub deployment_mode: DeploymentMode,
    pub autoscaler_class: AutoscalerClass,
    pub metric: ScaleMetric,
    pub target_utilization: Option<i32>,
    pub cluster_local: bool,
    pub auth_enabled: bool,
}

impl ComponentFeatures {
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        let empty = BTreeMap::new();
        let labels = meta.labels.as_ref().unwrap_or(&empty);
        let annotations = meta.annotations.as_ref().unwrap_or(&empty);

        let deployment_mode = match annotations
            .get(constants::DEPLOYMENT_MODE_ANNOTATION_KEY)
            .map(String::as_str)
        {
            None | Some("RawDeployment") => DeploymentMode::RawDeployment,
            Some("Serverless") => DeploymentMode::Serverless,
            Some("ModelMesh") => DeploymentMode::ModelMesh,
            Some(other) => {
                warn!("unknown deployment mode '{}', assuming RawDeployment", other);
                DeploymentMode::RawDeployment
            }
        };

        let autoscaler_class = match annotations
            .get(constants::AUTOSCALER_CLASS_ANNOTATION_KEY)
            .map(String::as_str)
        {
            None | Some("hpa") => AutoscalerClass::Hpa,
            Some("external") => AutoscalerClass::External,
            Some(other) => {
                warn!("unknown autoscaler class '{}', assuming hpa", other);
                AutoscalerClass::Hpa
            }
        };

        let metric = match annotations.get(constants::METRICS_ANNOTATION_KEY) {
            None => ScaleMetric::default(),
            Some(value) => ScaleMetric::parse(value).unwrap_or_else(|| {
                warn!("unsupported scale metric '{}', assuming cpu", value);
                ScaleMetric::default()
            }),
        };

        let target_utilization = annotations
            .get(constants::TARGET_UTILIZATION_ANNOTATION_KEY)
            .and_then(|value| match value.parse::<i32>() {
                Ok(percent) if percent > 0 => Some(percent),
                _ => {
                    warn!("ignoring invalid target utilization '{}'", value);
                    None
                }
            });

        let cluster_local = [
            constants::VISIBILITY_LABEL_KEY,
            constants::KNATIVE_VISIBILITY_LABEL_KEY,
        ]
        .iter()
        .any(|key| labels.get(*key).map(String::as_str) == Some(constants::CLUSTER_LOCAL_VISIBILITY));

        let auth_enabled =
            labels.get(constants::ENABLE_AUTH_LABEL_KEY).map(String::as_str) == Some("true");

        ComponentFeatures {
            deployment_mode,
            autoscaler_class,
            metric,
            target_utilization,
            cluster_local,
            auth_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_without_flags() {
        assert_eq!(
            ComponentFeatures::from_meta(&ObjectMeta::default()),
            ComponentFeatures::default()
        );
    }

    #[test]
    fn reads_annotations_and_labels() {
        let features = ComponentFeatures::from_meta(&meta(
            &[
                (constants::VISIBILITY_LABEL_KEY, "cluster-local"),
                (constants::ENABLE_AUTH_LABEL_KEY, "true"),
            ],
            &[
                (constants::DEPLOYMENT_MODE_ANNOTATION_KEY, "RawDeployment"),
                (constants::AUTOSCALER_CLASS_ANNOTATION_KEY, "external"),
                (constants::METRICS_ANNOTATION_KEY, "memory"),
                (constants::TARGET_UTILIZATION_ANNOTATION_KEY, "75"),
            ],
        ));

        assert_eq!(features.deployment_mode, DeploymentMode::RawDeployment);
        assert_eq!(features.autoscaler_class, AutoscalerClass::External);
        assert_eq!(features.metric, ScaleMetric::Memory);
        assert_eq!(features.target_utilization, Some(75));
        assert!(features.cluster_local);
        assert!(features.auth_enabled);
    }

    #[test]
    fn flags_in_the_wrong_place_are_ignored() {
        // auth is a label, not an annotation
        let features = ComponentFeatures::from_meta(&meta(
            &[],
            &[(constants::ENABLE_AUTH_LABEL_KEY, "true")],
        ));
        assert!(!features.auth_enabled);
    }

    #[test]
    fn invalid_values_fall_back() {
        let features = ComponentFeatures::from_meta(&meta(
            &[(constants::ENABLE_AUTH_LABEL_KEY, "yes")],
            &[
                (constants::AUTOSCALER_CLASS_ANNOTATION_KEY, "kpa"),
                (constants::METRICS_ANNOTATION_KEY, "rps"),
                (constants::TARGET_UTILIZATION_ANNOTATION_KEY, "lots"),
            ],
        ));
        assert_eq!(features, ComponentFeatures::default());
    }

    #[test]
    fn knative_visibility_label_is_honoured() {
        let features = ComponentFeatures::from_meta(&meta(
            &[(constants::KNATIVE_VISIBILITY_LABEL_KEY, "cluster-local")],
            &[],
        ));
        assert!(features.cluster_local);
    }
}
