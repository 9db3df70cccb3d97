use core::fmt;
use std::fmt::Display;

use k8s_openapi::api::apps::v1::DeploymentStrategy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Role of a component within an inference service
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Predictor,
    Transformer,
    Explainer,
}

impl ComponentType {
    /// Name of the Deployment/Service/HPA generated for this component of `isvc_name`
    pub fn resource_name(&self, isvc_name: &str) -> String {
        match self {
            ComponentType::Predictor => constants::predictor_service_name(isvc_name),
            ComponentType::Transformer => constants::transformer_service_name(isvc_name),
            ComponentType::Explainer => constants::explainer_service_name(isvc_name),
        }
    }
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ComponentType::Predictor => write!(f, "predictor"),
            ComponentType::Transformer => write!(f, "transformer"),
            ComponentType::Explainer => write!(f, "explainer"),
        }
    }
}

/// Resource metric an HPA scales on
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMetric {
    #[default]
    Cpu,
    Memory,
}

impl ScaleMetric {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cpu" => Some(ScaleMetric::Cpu),
            "memory" => Some(ScaleMetric::Memory),
            _ => None,
        }
    }
}

impl Display for ScaleMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScaleMetric::Cpu => write!(f, "cpu"),
            ScaleMetric::Memory => write!(f, "memory"),
        }
    }
}

/// Fields shared by every component of an inference service
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentExtensionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: i32,
    /// Utilization target, takes precedence over the target-utilization annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_target: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_metric: Option<ScaleMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_strategy: Option<DeploymentStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batcher: Option<Batcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerSpec>,
}

impl ComponentExtensionSpec {
    /// Batcher and logger agents intercept traffic ahead of the model server
    pub fn has_agent(&self) -> bool {
        self.batcher.is_some() || self.logger.is_some()
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Batcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<i32>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<i32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoggerMode {
    #[default]
    All,
    Request,
    Response,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub mode: LoggerMode,
}
