//! Tool-call handling.
//!
//! The model may ask the client to run a declared function. Every call gets
//! exactly one correlated [`FunctionResponse`], including calls naming a tool
//! the registry does not know.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::protocol::{Behavior, FunctionCall, FunctionDeclaration, FunctionResponse, Scheduling, ToolResult};

/// Name of the demo weather tool.
pub const WEATHER_TOOL: &str = "get_weather_vegas";

/// A client-side function the model can call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name the model uses to call this tool.
    fn name(&self) -> &str;

    /// Declared calling behaviour.
    fn behavior(&self) -> Behavior {
        Behavior::NonBlocking
    }

    /// Run the tool.
    async fn call(&self, args: Option<&Value>) -> ToolResult;
}

/// The set of tools offered to the model.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Declarations sent in the setup message.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.handlers
            .values()
            .map(|h| FunctionDeclaration {
                name: h.name().to_string(),
                behavior: h.behavior(),
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Answer one call. Never fails: unknown tools get an error result.
    pub async fn respond(&self, call: &FunctionCall) -> FunctionResponse {
        let response = match self.handlers.get(&call.name) {
            Some(handler) => {
                tracing::info!(tool = %call.name, id = ?call.id, "Running tool call");
                handler.call(call.args.as_ref()).await
            }
            None => {
                tracing::warn!(tool = %call.name, id = ?call.id, "Unknown tool requested");
                ToolResult {
                    result: json!({ "error": format!("Unknown tool '{}'", call.name) }),
                    scheduling: None,
                }
            }
        };

        FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    /// Answer every call of one request, in order.
    pub async fn respond_all(&self, calls: &[FunctionCall]) -> Vec<FunctionResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            responses.push(self.respond(call).await);
        }
        responses
    }
}

/// Canned Las Vegas weather, answered after a simulated slow lookup.
///
/// The result is delivered with [`Scheduling::Interrupt`] so the model speaks
/// about it as soon as it arrives.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    delay: Duration,
}

impl WeatherTool {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ToolHandler for WeatherTool {
    fn name(&self) -> &str {
        WEATHER_TOOL
    }

    async fn call(&self, _args: Option<&Value>) -> ToolResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        ToolResult {
            result: json!({ "weather": "Sunny, 42 degrees" }),
            scheduling: Some(Scheduling::Interrupt),
        }
    }
}
