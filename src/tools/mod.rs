pub mod save_order;

pub use save_order::{LoggingOrderStore, Order, OrderItem, OrderStore, SaveOrderTool};

use crate::error::RelayError;
use crate::types::FunctionDeclaration;
use serde_json::{Map, Value};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{info, warn};

/// A locally executed capability the model can call.
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: Map<String, Value>) -> Result<Value, RelayError>;
}

impl<F> ToolHandler for F
where
    F: Fn(Map<String, Value>) -> Result<Value, RelayError> + Send + Sync,
{
    fn call(&self, args: Map<String, Value>) -> Result<Value, RelayError> {
        self(args)
    }
}

struct RegisteredTool {
    declaration: FunctionDeclaration,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the relay's built-in tools (`save_order`).
    pub fn with_builtin_tools(store: Arc<dyn OrderStore>) -> Self {
        let mut registry = Self::new();
        registry.register(save_order::declaration(), SaveOrderTool::new(store));
        registry
    }

    /// Registers `handler` under the declaration's name. A second
    /// registration with the same name replaces the first.
    pub fn register<H>(&mut self, declaration: FunctionDeclaration, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let handler: Arc<dyn ToolHandler> = Arc::new(handler);
        if let Some(existing) = self
            .tools
            .iter_mut()
            .find(|tool| tool.declaration.name == declaration.name)
        {
            warn!(
                "[Tools] Replacing existing handler for '{}'",
                declaration.name
            );
            existing.declaration = declaration;
            existing.handler = handler;
            return;
        }
        info!("[Tools] Registered tool '{}'", declaration.name);
        self.tools.push(RegisteredTool {
            declaration,
            handler,
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.declaration.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations in registration order, ready to be advertised in the
    /// remote session's setup.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools
            .iter()
            .map(|tool| tool.declaration.clone())
            .collect()
    }

    /// Runs the handler registered for `name`.
    ///
    /// Handler errors and panics are both reported as
    /// [`RelayError::ToolDispatch`]; nothing escapes past this call.
    pub fn dispatch(&self, name: &str, args: Map<String, Value>) -> Result<Value, RelayError> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.declaration.name == name)
            .ok_or_else(|| RelayError::UnknownTool(name.to_string()))?;

        let handler = tool.handler.clone();
        match catch_unwind(AssertUnwindSafe(move || handler.call(args))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(RelayError::ToolDispatch { name, reason })) => {
                Err(RelayError::ToolDispatch { name, reason })
            }
            Ok(Err(e)) => Err(RelayError::tool_dispatch(name, e.to_string())),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                Err(RelayError::tool_dispatch(name, format!("panic: {}", reason)))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| &tool.declaration.name))
            .finish()
    }
}
