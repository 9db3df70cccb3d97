//! Reserved names, label keys and fixed ports shared by the raw-deployment reconcilers.

/// Name of the model-server container in a component's pod template
pub const INFERENCE_SERVICE_CONTAINER_NAME: &str = "kserve-container";
/// Name of the transformer container when it is collocated with the model server
pub const TRANSFORMER_CONTAINER_NAME: &str = "transformer-container";

pub const DEPLOYMENT_MODE_ANNOTATION_KEY: &str = "serving.kserve.io/deploymentMode";
pub const AUTOSCALER_CLASS_ANNOTATION_KEY: &str = "serving.kserve.io/autoscalerClass";
pub const METRICS_ANNOTATION_KEY: &str = "serving.kserve.io/metrics";
pub const TARGET_UTILIZATION_ANNOTATION_KEY: &str = "serving.kserve.io/targetUtilizationPercentage";
pub const VISIBILITY_LABEL_KEY: &str = "networking.kserve.io/visibility";
pub const KNATIVE_VISIBILITY_LABEL_KEY: &str = "serving.knative.dev/visibility";
pub const CLUSTER_LOCAL_VISIBILITY: &str = "cluster-local";
pub const ENABLE_AUTH_LABEL_KEY: &str = "security.opendatahub.io/enable-auth";
pub const SERVING_CERT_ANNOTATION_KEY: &str = "service.beta.openshift.io/serving-cert-secret-name";

/// Selector label shared by a component's Deployment, its pods and its Service
pub const APP_LABEL_KEY: &str = "app";

/// Port every component Service exposes for plain HTTP traffic
pub const COMMON_DEFAULT_HTTP_PORT: i32 = 80;
/// Port the model server listens on when its container declares none
pub const INFERENCE_SERVICE_DEFAULT_HTTP_PORT: i32 = 8080;
/// Port of the batcher/logger agent sitting in front of the model server
pub const INFERENCE_SERVICE_DEFAULT_AGENT_PORT: i32 = 9081;

pub const OAUTH_PROXY_CONTAINER_NAME: &str = "oauth-proxy";
pub const OAUTH_PROXY_PORT: i32 = 8443;
pub const OAUTH_PROXY_PORT_NAME: &str = "https";
pub const OAUTH_PROXY_IMAGE: &str = "quay.io/openshift/origin-oauth-proxy:4.14";
pub const OAUTH_PROXY_RESOURCE_CPU_LIMIT: &str = "200m";
pub const OAUTH_PROXY_RESOURCE_MEMORY_LIMIT: &str = "128Mi";
pub const OAUTH_PROXY_RESOURCE_CPU_REQUEST: &str = "100m";
pub const OAUTH_PROXY_RESOURCE_MEMORY_REQUEST: &str = "64Mi";
pub const PROXY_TLS_VOLUME_NAME: &str = "proxy-tls";
pub const PROXY_TLS_MOUNT_PATH: &str = "/etc/tls/private";

/// Service account every raw-deployment pod runs as
pub const KSERVE_SERVICE_ACCOUNT_NAME: &str = "kserve-sa";

pub const KSERVE_NAMESPACE: &str = "kserve";
pub const INFERENCE_SERVICE_CONFIG_MAP_NAME: &str = "inferenceservice-config";

pub const DEFAULT_MIN_REPLICAS: i32 = 1;
pub const DEFAULT_CPU_UTILIZATION: i32 = 80;

/// Value of the `app` selector label for the component resource `name`
pub fn raw_service_label(name: &str) -> String {
    format!("isvc.{}", name)
}

pub fn predictor_service_name(isvc_name: &str) -> String {
    format!("{}-predictor", isvc_name)
}

pub fn transformer_service_name(isvc_name: &str) -> String {
    format!("{}-transformer", isvc_name)
}

pub fn explainer_service_name(isvc_name: &str) -> String {
    format!("{}-explainer", isvc_name)
}
