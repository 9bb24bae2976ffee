//! Capability traits and registry
//!
//! A capability is a named, schema-checked external fetch the model may
//! request. Capabilities are written against the typed [`Capability`] trait
//! and stored type-erased as [`Tool`] in the [`ToolRegistry`].

use crate::error::OrchestrationError;
use crate::models::View;
use crate::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod stock_price;
pub mod trade_history;

pub use stock_price::StockPriceTool;
pub use trade_history::TradeHistoryTool;

/// Name, description and argument schema advertised to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A capability with typed arguments and output
#[async_trait::async_trait]
pub trait Capability: Send + Sync + 'static {
    type Args: DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + Send + Sync;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of `Args`, advertised to the model
    fn parameters(&self) -> Value;

    /// Checks the deserializer cannot express (e.g. non-empty strings)
    fn check(&self, _args: &Self::Args) -> Result<()> {
        Ok(())
    }

    /// The external call. Only ever invoked with checked arguments.
    async fn fetch(&self, args: &Self::Args) -> Result<Self::Output>;

    fn render(&self, output: &Self::Output) -> View;

    /// Note recorded in the conversation once the result is on screen
    fn summary(&self, args: &Self::Args) -> String;

    /// Fixed user-facing text when the call cannot be completed
    fn apology(&self) -> &'static str;
}

/// Arguments that passed a tool's validation.
///
/// Only [`Tool::validate`] can produce one.
pub struct ValidatedArgs {
    tool: &'static str,
    args: Box<dyn Any + Send + Sync>,
}

impl ValidatedArgs {
    pub fn tool_name(&self) -> &'static str {
        self.tool
    }
}

impl std::fmt::Debug for ValidatedArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedArgs").field("tool", &self.tool).finish()
    }
}

/// Successful capability outcome
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub summary: String,
    pub data: Value,
    pub view: View,
}

/// Object-safe face of a capability
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn apology(&self) -> &'static str;
    fn validate(&self, raw: &Value) -> Result<ValidatedArgs>;
    async fn execute(&self, args: &ValidatedArgs) -> Result<ToolOutput>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[async_trait::async_trait]
impl<C: Capability> Tool for C {
    fn name(&self) -> &'static str {
        Capability::name(self)
    }

    fn description(&self) -> &'static str {
        Capability::description(self)
    }

    fn parameters(&self) -> Value {
        Capability::parameters(self)
    }

    fn apology(&self) -> &'static str {
        Capability::apology(self)
    }

    fn validate(&self, raw: &Value) -> Result<ValidatedArgs> {
        let args: C::Args = serde_json::from_value(raw.clone()).map_err(|e| {
            OrchestrationError::InvalidToolInput(format!(
                "{}: {}",
                Capability::name(self),
                e
            ))
        })?;
        self.check(&args)?;

        Ok(ValidatedArgs {
            tool: Capability::name(self),
            args: Box::new(args),
        })
    }

    async fn execute(&self, args: &ValidatedArgs) -> Result<ToolOutput> {
        let typed = args.args.downcast_ref::<C::Args>().ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!(
                "arguments validated for '{}' passed to '{}'",
                args.tool,
                Capability::name(self)
            ))
        })?;

        let output = self.fetch(typed).await?;

        Ok(ToolOutput {
            summary: self.summary(typed),
            data: serde_json::to_value(&output)?,
            view: self.render(&output),
        })
    }
}

/// Registry of capabilities, fixed after startup
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.tools.contains_key(name) {
            return Err(OrchestrationError::DuplicateCapability(name.to_string()));
        }

        debug!(tool = %name, "Registered capability");
        self.tools.insert(name.to_string(), tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve and validate in one step
    pub fn validate(&self, name: &str, raw: &Value) -> Result<ValidatedArgs> {
        let tool = self
            .resolve(name)
            .ok_or_else(|| OrchestrationError::ToolNotFound(name.to_string()))?;
        tool.validate(raw)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Definitions handed to the model, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client for the financial backend
#[derive(Clone)]
pub struct FinancialApiClient {
    client: Client,
    base_url: String,
}

impl FinancialApiClient {
    /// No total request timeout is set here: the dispatcher's configured
    /// bound is the only limit on a capability call.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!(
                    "Financial API request failed for {}: {}",
                    path, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::ToolError(format!(
                "Financial API returned {} for {}: {}",
                status, path, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))
    }
}

/// Registry with the two built-in capabilities
pub fn create_default_registry(api: FinancialApiClient) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(StockPriceTool::new(api.clone())))?;
    registry.register(Arc::new(TradeHistoryTool::new(api)))?;

    info!(tools = ?registry.list(), "Capability registry ready");
    Ok(registry)
}
