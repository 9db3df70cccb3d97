//! Cluster-wide defaults read from the `inferenceservice-config` ConfigMap.
//!
//! A missing ConfigMap, a missing key or malformed JSON never fails a reconcile: every
//! value falls back to its hard-coded default.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::constants;

pub const DEPLOY_CONFIG_KEY: &str = "deploy";
pub const INGRESS_CONFIG_KEY: &str = "ingress";

pub const DEFAULT_INGRESS_DOMAIN: &str = "example.com";
pub const DEFAULT_DOMAIN_TEMPLATE: &str = "{{ .Name }}-{{ .Namespace }}.{{ .IngressDomain }}";
pub const DEFAULT_URL_SCHEME: &str = "http";

// decimal or binary SI suffix, or a decimal exponent, as the API server parses quantities
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([KMGTPE]i|[numkMGTPE]|[eE][+-]?[0-9]+)?$")
        .expect("failed to compile quantity regex")
});

/// Image and resources of the auth proxy sidecar
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OauthProxyConfig {
    pub image: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
}

impl Default for OauthProxyConfig {
    fn default() -> Self {
        OauthProxyConfig {
            image: constants::OAUTH_PROXY_IMAGE.to_string(),
            cpu_limit: constants::OAUTH_PROXY_RESOURCE_CPU_LIMIT.to_string(),
            memory_limit: constants::OAUTH_PROXY_RESOURCE_MEMORY_LIMIT.to_string(),
            cpu_request: constants::OAUTH_PROXY_RESOURCE_CPU_REQUEST.to_string(),
            memory_request: constants::OAUTH_PROXY_RESOURCE_MEMORY_REQUEST.to_string(),
        }
    }
}

impl OauthProxyConfig {
    /// Parse the `deploy` entry. Each key is taken when it holds a string and defaulted otherwise.
    pub fn from_config_data(data: &str) -> Self {
        let mut config = OauthProxyConfig::default();
        let fields = match serde_json::from_str::<Map<String, Value>>(data) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    "malformed '{}' entry in ConfigMap {}, using default proxy settings: {}",
                    DEPLOY_CONFIG_KEY,
                    constants::INFERENCE_SERVICE_CONFIG_MAP_NAME,
                    e
                );
                return config;
            }
        };

        for (key, target, is_quantity) in [
            ("image", &mut config.image, false),
            ("cpuLimit", &mut config.cpu_limit, true),
            ("memoryLimit", &mut config.memory_limit, true),
            ("cpuRequest", &mut config.cpu_request, true),
            ("memoryRequest", &mut config.memory_request, true),
        ] {
            match fields.get(key) {
                Some(Value::String(value)) if value.is_empty() => {
                    warn!("ignoring empty proxy setting {}", key)
                }
                Some(Value::String(value)) if is_quantity && !QUANTITY_REGEX.is_match(value) => {
                    warn!("ignoring proxy setting {}={}, not a resource quantity", key, value)
                }
                Some(Value::String(value)) => *target = value.clone(),
                Some(other) => warn!("ignoring non-string proxy setting {}={}", key, other),
                None => {}
            }
        }
        config
    }
}

/// How component hostnames are derived and exposed
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    #[serde(default = "default_ingress_domain")]
    pub ingress_domain: String,
    #[serde(default = "default_domain_template")]
    pub domain_template: String,
    #[serde(default = "default_url_scheme")]
    pub url_scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub disable_ingress_creation: bool,
}

fn default_ingress_domain() -> String {
    DEFAULT_INGRESS_DOMAIN.to_string()
}
fn default_domain_template() -> String {
    DEFAULT_DOMAIN_TEMPLATE.to_string()
}
fn default_url_scheme() -> String {
    DEFAULT_URL_SCHEME.to_string()
}

impl Default for IngressConfig {
    fn default() -> Self {
        IngressConfig {
            ingress_domain: default_ingress_domain(),
            domain_template: default_domain_template(),
            url_scheme: default_url_scheme(),
            ingress_class_name: None,
            disable_ingress_creation: false,
        }
    }
}

impl IngressConfig {
    pub fn from_config_data(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or_else(|e| {
            warn!(
                "malformed '{}' entry in ConfigMap {}, using default ingress settings: {}",
                INGRESS_CONFIG_KEY,
                constants::INFERENCE_SERVICE_CONFIG_MAP_NAME,
                e
            );
            IngressConfig::default()
        })
    }
}

/// Everything the reconcilers read from the cluster ConfigMap
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    pub oauth_proxy: OauthProxyConfig,
    pub ingress: IngressConfig,
}

impl ClusterConfig {
    pub fn from_config_map(config_map: &ConfigMap) -> Self {
        let empty = BTreeMap::new();
        let data = config_map.data.as_ref().unwrap_or(&empty);
        ClusterConfig {
            oauth_proxy: data
                .get(DEPLOY_CONFIG_KEY)
                .map(|d| OauthProxyConfig::from_config_data(d))
                .unwrap_or_default(),
            ingress: data
                .get(INGRESS_CONFIG_KEY)
                .map(|d| IngressConfig::from_config_data(d))
                .unwrap_or_default(),
        }
    }

    /// Fetch the ConfigMap from the operator namespace, falling back to defaults on any failure
    pub async fn load(client: &Client) -> Self {
        let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), constants::KSERVE_NAMESPACE);
        match config_maps.get_opt(constants::INFERENCE_SERVICE_CONFIG_MAP_NAME).await {
            Ok(Some(config_map)) => ClusterConfig::from_config_map(&config_map),
            Ok(None) => {
                info!(
                    "ConfigMap '{}/{}' not found, using defaults",
                    constants::KSERVE_NAMESPACE,
                    constants::INFERENCE_SERVICE_CONFIG_MAP_NAME
                );
                ClusterConfig::default()
            }
            Err(e) => {
                warn!(
                    "failed to read ConfigMap '{}/{}', using defaults: {}",
                    constants::KSERVE_NAMESPACE,
                    constants::INFERENCE_SERVICE_CONFIG_MAP_NAME,
                    e
                );
                ClusterConfig::default()
            }
        }
    }
}
