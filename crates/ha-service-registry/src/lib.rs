//! Service registry
//!
//! Services are async handlers keyed by `domain.service`. A call can be
//! awaited (`blocking`) or spawned in the background, in which case the
//! handler's failure is only logged. Registered JSON schemas are checked
//! before the handler runs. When a bus is attached every call is announced
//! as a `call_service` event.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::events::CallServiceData;
use ha_core::{Context, ServiceCall, SupportsResponse};
use ha_event_bus::EventBus;
use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

pub type ServiceResult = Result<Option<Value>, ServiceError>;

pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// JSON schema the call data must satisfy
    pub schema: Option<Value>,
    /// Target selector (which entities the service applies to)
    pub target: Option<Value>,
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_target(mut self, target: Value) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_supports_response(mut self, supports_response: SupportsResponse) -> Self {
        self.supports_response = supports_response;
        self
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    validator: Option<Arc<JSONSchema>>,
    description: ServiceDescription,
}

pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
    bus: Option<Arc<EventBus>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            bus: None,
        }
    }

    /// Registry that fires `call_service` on `bus` for each call
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            services: DashMap::new(),
            bus: Some(bus),
        }
    }

    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.register_with_description(ServiceDescription::new(domain, service), handler);
    }

    /// Register (or replace) a service. A schema that fails to compile is
    /// logged and the service is registered without validation.
    #[instrument(skip_all, fields(service = %format!("{}.{}", description.domain, description.service)))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let validator = description.schema.as_ref().and_then(|schema| {
            match JSONSchema::compile(schema) {
                Ok(compiled) => Some(Arc::new(compiled)),
                Err(err) => {
                    warn!(%err, "invalid service schema, validation disabled");
                    None
                }
            }
        });
        debug!("registering service");

        let handler: ServiceHandler = Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(
            key(&description.domain, &description.service),
            RegisteredService {
                handler,
                validator,
                description,
            },
        );
    }

    /// Invoke `domain.service`.
    ///
    /// With `blocking == false` the handler is spawned and `Ok(None)` is
    /// returned as soon as the data has been validated.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: Value,
        context: Context,
        blocking: bool,
        return_response: bool,
    ) -> ServiceResult {
        let (handler, validator, supports_response) = {
            let registered = self.services.get(&key(domain, service)).ok_or_else(|| {
                warn!("service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;
            (
                registered.handler.clone(),
                registered.validator.clone(),
                registered.description.supports_response,
            )
        };

        if return_response && supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }
        if let Some(validator) = validator {
            if let Err(errors) = validator.validate(&service_data) {
                let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                return Err(ServiceError::InvalidData(message));
            }
        }

        if let Some(bus) = &self.bus {
            bus.fire_typed(
                CallServiceData {
                    domain: domain.to_string(),
                    service: service.to_string(),
                    service_data: service_data.clone(),
                },
                context.clone(),
            );
        }

        let call = ServiceCall::new(domain, service, service_data, context);
        if !blocking {
            let id = call.service_id();
            tokio::spawn(async move {
                if let Err(err) = handler(call).await {
                    error!(service = %id, %err, "background service call failed");
                }
            });
            return Ok(None);
        }

        debug!("calling service");
        let response = handler(call).await?;
        Ok(if return_response { response } else { None })
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&key(domain, service))
    }

    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&key(domain, service))
            .map(|s| s.description.clone())
    }

    /// Service names per domain, sorted
    pub fn services(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.services.iter() {
            out.entry(entry.description.domain.clone())
                .or_default()
                .push(entry.description.service.clone());
        }
        out.values_mut().for_each(|v| v.sort());
        out
    }

    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        self.services.remove(&key(domain, service)).is_some()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn key(domain: &str, service: &str) -> String {
    format!("{domain}.{service}")
}

pub type SharedServiceRegistry = Arc<ServiceRegistry>;
