//! Config and options flows
//!
//! A flow is a small state machine of named steps. Each step either shows a
//! form, finishes with `create_entry`, or aborts. [`FlowManager`] owns the
//! flows in progress and turns a finished flow into a config entry (config
//! flows) or an options update (options flows).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::entry::{ConfigEntry, ConfigEntrySource, ConfigEntryUpdate};
use crate::manager::{ConfigEntries, ConfigEntriesError};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    #[error("no flow handler for {0}")]
    UnknownHandler(String),

    #[error("unknown step {step} in flow {handler}")]
    UnknownStep { handler: String, step: String },

    #[error("invalid user input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),
}

pub type FlowOutcome = Result<FlowResult, FlowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
}

impl FormField {
    fn new(name: &str, field_type: &str, selector: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            required: false,
            default: None,
            selector,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, "string", Some(serde_json::json!({ "text": {} })))
    }

    pub fn number(name: &str, min: f64, max: f64, step: f64) -> Self {
        Self::new(
            name,
            "float",
            Some(serde_json::json!({ "number": { "min": min, "max": max, "step": step, "mode": "box" } })),
        )
    }

    /// Drop-down of `(value, label)` pairs
    pub fn select(name: &str, options: Vec<(String, String)>) -> Self {
        let options: Vec<Value> = options
            .into_iter()
            .map(|(value, label)| serde_json::json!({ "value": value, "label": label }))
            .collect();
        Self::new(
            name,
            "select",
            Some(serde_json::json!({ "select": { "options": options, "mode": "dropdown" } })),
        )
    }

    /// Entity picker limited to `domains`
    pub fn entity(name: &str, domains: &[&str]) -> Self {
        Self::new(
            name,
            "string",
            Some(serde_json::json!({ "entity": { "domain": domains } })),
        )
    }

    /// List of service actions
    pub fn action(name: &str) -> Self {
        Self::new(name, "list", Some(serde_json::json!({ "action": {} })))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn selector_domains(&self) -> Vec<String> {
        self.selector
            .as_ref()
            .and_then(|s| s.pointer("/entity/domain"))
            .and_then(Value::as_array)
            .map(|d| d.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }
}

/// Result of a flow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow_id: String,
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default)]
    pub data_schema: Vec<FormField>,
    #[serde(default)]
    pub errors: HashMap<String, String>,
    #[serde(default)]
    pub description_placeholders: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Entry data (config flow) or the new options (options flow)
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Initial options of an entry created by a config flow
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<bool>,
    /// Entry id once a config flow has created its entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl FlowResult {
    fn empty(result_type: FlowResultType) -> Self {
        Self {
            flow_id: String::new(),
            handler: String::new(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: HashMap::new(),
            description_placeholders: HashMap::new(),
            title: None,
            reason: None,
            data: Map::new(),
            options: Map::new(),
            last_step: None,
            result: None,
        }
    }

    pub fn form(step_id: impl Into<String>, data_schema: Vec<FormField>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            data_schema,
            ..Self::empty(FlowResultType::Form)
        }
    }

    pub fn create_entry(title: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            title: Some(title.into()),
            data,
            ..Self::empty(FlowResultType::CreateEntry)
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::empty(FlowResultType::Abort)
        }
    }

    pub fn with_errors(mut self, errors: HashMap<String, String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_last_step(mut self, last_step: bool) -> Self {
        self.last_step = Some(last_step);
        self
    }

    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.description_placeholders.insert(key.into(), value.into());
        self
    }

    pub fn is_form(&self) -> bool {
        self.result_type == FlowResultType::Form
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.data_schema.iter().find(|f| f.name == name)
    }
}

/// What a flow may know about its surroundings
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub flow_id: String,
    pub handler: String,
    pub source: ConfigEntrySource,
    /// Entry being edited by an options flow
    pub entry_id: Option<String>,
    /// Other flows of the same handler currently in progress
    pub other_flows_in_progress: usize,
    /// Config entries that already exist for the handler
    pub existing_entries: usize,
}

/// One config or options flow, dispatching on step id
#[async_trait]
pub trait FlowHandler: Send + Sync {
    async fn step(&mut self, step_id: &str, user_input: Option<Value>, ctx: &FlowContext) -> FlowOutcome;

    /// Unique id the created entry should carry
    fn unique_id(&self) -> Option<String> {
        None
    }
}

pub type ConfigFlowFactory = Arc<dyn Fn(ConfigEntrySource) -> Box<dyn FlowHandler> + Send + Sync>;
pub type OptionsFlowFactory = Arc<dyn Fn(&ConfigEntry) -> Box<dyn FlowHandler> + Send + Sync>;

#[derive(Debug, Clone)]
enum FlowKind {
    Config,
    Options { entry_id: String },
}

struct ActiveFlow {
    handler: Box<dyn FlowHandler>,
    domain: String,
    source: ConfigEntrySource,
    kind: FlowKind,
    step_id: String,
}

pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    config_flows: DashMap<String, ConfigFlowFactory>,
    options_flows: DashMap<String, OptionsFlowFactory>,
    flows: DashMap<String, Arc<Mutex<ActiveFlow>>>,
    flow_domains: DashMap<String, String>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            config_flows: DashMap::new(),
            options_flows: DashMap::new(),
            flows: DashMap::new(),
            flow_domains: DashMap::new(),
        }
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.entries
    }

    pub fn register_config_flow<F>(&self, domain: impl Into<String>, factory: F)
    where
        F: Fn(ConfigEntrySource) -> Box<dyn FlowHandler> + Send + Sync + 'static,
    {
        self.config_flows.insert(domain.into(), Arc::new(factory));
    }

    pub fn register_options_flow<F>(&self, domain: impl Into<String>, factory: F)
    where
        F: Fn(&ConfigEntry) -> Box<dyn FlowHandler> + Send + Sync + 'static,
    {
        self.options_flows.insert(domain.into(), Arc::new(factory));
    }

    /// Flow ids in progress for `domain`
    pub fn in_progress(&self, domain: &str) -> Vec<String> {
        self.flow_domains
            .iter()
            .filter(|f| f.value() == domain)
            .map(|f| f.key().clone())
            .collect()
    }

    pub fn abort(&self, flow_id: &str) -> Result<(), FlowError> {
        self.remove_flow(flow_id)
            .map(|_| ())
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    fn remove_flow(&self, flow_id: &str) -> Option<Arc<Mutex<ActiveFlow>>> {
        self.flow_domains.remove(flow_id);
        self.flows.remove(flow_id).map(|(_, f)| f)
    }

    /// Start a config flow at the step matching `source`. `data` is the
    /// discovery payload for non-user sources.
    #[instrument(skip(self, data))]
    pub async fn start_config_flow(
        &self,
        domain: &str,
        source: ConfigEntrySource,
        data: Option<Value>,
    ) -> FlowOutcome {
        let factory = self
            .config_flows
            .get(domain)
            .map(|f| f.clone())
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))?;
        let flow = ActiveFlow {
            handler: factory(source),
            domain: domain.to_string(),
            source,
            kind: FlowKind::Config,
            step_id: source.initial_step().to_string(),
        };
        self.start(flow, data).await
    }

    /// Start the options flow of an existing entry at step `init`
    #[instrument(skip(self))]
    pub async fn start_options_flow(&self, entry_id: &str) -> FlowOutcome {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        let factory = self
            .options_flows
            .get(&entry.domain)
            .map(|f| f.clone())
            .ok_or_else(|| FlowError::UnknownHandler(entry.domain.clone()))?;
        let flow = ActiveFlow {
            handler: factory(&entry),
            domain: entry.domain.clone(),
            source: entry.source,
            kind: FlowKind::Options {
                entry_id: entry.entry_id.clone(),
            },
            step_id: "init".to_string(),
        };
        self.start(flow, None).await
    }

    async fn start(&self, flow: ActiveFlow, input: Option<Value>) -> FlowOutcome {
        let flow_id = ulid::Ulid::new().to_string();
        debug!(%flow_id, domain = %flow.domain, step = %flow.step_id, "starting flow");
        self.flow_domains.insert(flow_id.clone(), flow.domain.clone());
        self.flows.insert(flow_id.clone(), Arc::new(Mutex::new(flow)));
        self.progress(&flow_id, input).await
    }

    /// Feed `user_input` to the step the flow is waiting on
    #[instrument(skip(self, user_input))]
    pub async fn progress(&self, flow_id: &str, user_input: Option<Value>) -> FlowOutcome {
        let flow = self
            .flows
            .get(flow_id)
            .map(|f| f.clone())
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        let mut flow = flow.lock().await;

        let ctx = FlowContext {
            flow_id: flow_id.to_string(),
            handler: flow.domain.clone(),
            source: flow.source,
            entry_id: match &flow.kind {
                FlowKind::Options { entry_id } => Some(entry_id.clone()),
                FlowKind::Config => None,
            },
            other_flows_in_progress: self.in_progress(&flow.domain).len().saturating_sub(1),
            existing_entries: self.entries.get_by_domain(&flow.domain).len(),
        };

        let step_id = flow.step_id.clone();
        let result = match flow.handler.step(&step_id, user_input, &ctx).await {
            Ok(result) => result,
            Err(err) => {
                // keep the flow on the same step so the caller may retry
                warn!(%err, step = %step_id, "flow step failed");
                return Err(err);
            }
        };
        let mut result = FlowResult {
            flow_id: flow_id.to_string(),
            handler: flow.domain.clone(),
            ..result
        };

        match result.result_type {
            FlowResultType::Form => {
                if let Some(next) = &result.step_id {
                    flow.step_id = next.clone();
                }
            }
            FlowResultType::Abort => {
                debug!(reason = ?result.reason, "flow aborted");
                drop(flow);
                self.remove_flow(flow_id);
            }
            FlowResultType::CreateEntry => {
                let unique_id = flow.handler.unique_id();
                let kind = flow.kind.clone();
                let domain = flow.domain.clone();
                let source = flow.source;
                drop(flow);
                self.remove_flow(flow_id);
                result = self.finish(kind, &domain, source, unique_id, result).await?;
            }
        }
        Ok(result)
    }

    async fn finish(
        &self,
        kind: FlowKind,
        domain: &str,
        source: ConfigEntrySource,
        unique_id: Option<String>,
        mut result: FlowResult,
    ) -> FlowOutcome {
        match kind {
            FlowKind::Options { entry_id } => {
                let options: HashMap<String, Value> = result.data.clone().into_iter().collect();
                self.entries
                    .update(&entry_id, ConfigEntryUpdate::new().options(options))
                    .await?;
                info!(%entry_id, "options updated");
                result.result = Some(entry_id);
                Ok(result)
            }
            FlowKind::Config => {
                let mut entry = ConfigEntry::new(domain, result.title.clone().unwrap_or_default())
                    .with_data(result.data.clone().into_iter().collect())
                    .with_options(result.options.clone().into_iter().collect())
                    .with_source(source);
                if let Some(unique_id) = unique_id {
                    entry = entry.with_unique_id(unique_id);
                }
                let entry = match self.entries.add(entry).await {
                    Ok(entry) => entry,
                    Err(ConfigEntriesError::AlreadyExists { .. }) => {
                        return Ok(FlowResult {
                            flow_id: result.flow_id,
                            handler: result.handler,
                            ..FlowResult::abort("already_configured")
                        });
                    }
                    Err(err) => return Err(err.into()),
                };
                if self.entries.has_handler(domain) {
                    if let Err(err) = self.entries.setup(&entry.entry_id).await {
                        warn!(%err, entry_id = %entry.entry_id, "setup of new entry failed");
                    }
                }
                result.result = Some(entry.entry_id);
                Ok(result)
            }
        }
    }
}
