//! Service API bridge
//!
//! Dispatches locally-terminated `run_service_api_method` calls into
//! the per-domain APIs bound at startup, by method name.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::RequestContext;

use super::domain_types::MethodArgs;
use super::traits::{Catalog, ServiceApi, ServiceApiError};

/// The service domains reachable through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Compute,
    Network,
    Volume,
}

impl FromStr for ServiceName {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "compute" => Ok(Self::Compute),
            "network" => Ok(Self::Network),
            "volume" => Ok(Self::Volume),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compute => f.write_str("compute"),
            Self::Network => f.write_str("network"),
            Self::Volume => f.write_str("volume"),
        }
    }
}

/// The method description carried inside a `run_service_api_method`
/// call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCallInfo {
    pub method: String,
    #[serde(default)]
    pub method_args: Vec<Value>,
    #[serde(default)]
    pub method_kwargs: MethodArgs,
}

/// Routes service API calls to the bound per-domain implementations.
pub struct ServiceApiBridge {
    catalog: Arc<dyn Catalog>,
    apis: HashMap<ServiceName, Arc<dyn ServiceApi>>,
}

impl ServiceApiBridge {
    /// Binds the available service APIs. Unbound services reject
    /// calls at dispatch time.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        compute: Option<Arc<dyn ServiceApi>>,
        network: Option<Arc<dyn ServiceApi>>,
        volume: Option<Arc<dyn ServiceApi>>,
    ) -> Self {
        let mut apis = HashMap::new();
        if let Some(api) = compute {
            apis.insert(ServiceName::Compute, api);
        }
        if let Some(api) = network {
            apis.insert(ServiceName::Network, api);
        }
        if let Some(api) = volume {
            apis.insert(ServiceName::Volume, api);
        }
        Self { catalog, apis }
    }

    /// Invokes `method_info` against the named service.
    ///
    /// For compute calls the first positional argument is an instance
    /// uuid, resolved into the full instance record before invocation.
    pub async fn run_method(
        &self,
        ctx: &RequestContext,
        service_name: &str,
        method_info: MethodCallInfo,
    ) -> Result<Value, ServiceApiError> {
        let service =
            ServiceName::from_str(service_name).map_err(|()| ServiceApiError::MethodNotFound {
                detail: format!("unknown service API: {service_name}"),
            })?;
        let api = self
            .apis
            .get(&service)
            .ok_or_else(|| ServiceApiError::MethodNotFound {
                detail: format!("unknown service API: {service_name}"),
            })?;

        let mut args = method_info.method_args;
        if service == ServiceName::Compute {
            let uuid = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ServiceApiError::failed(format!(
                        "method '{}' in compute API requires an instance uuid argument",
                        method_info.method
                    ))
                })?
                .to_owned();
            let instance = self.catalog.instance_get_by_uuid(ctx, &uuid).await?;
            args[0] = Value::Object(instance);
        }

        debug!(service = %service, method = %method_info.method, "running service API method");
        api.invoke(ctx, &method_info.method, args, method_info.method_kwargs)
            .await
    }
}
