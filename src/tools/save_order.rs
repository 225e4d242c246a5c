use super::ToolHandler;
use crate::error::RelayError;
use crate::types::FunctionDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::info;

pub const SAVE_ORDER: &str = "save_order";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub menu: String,
    pub qty: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Where confirmed orders end up.
pub trait OrderStore: Send + Sync {
    fn save(&self, order: &Order) -> Result<(), RelayError>;
}

/// Records orders in the log and nowhere else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingOrderStore;

impl OrderStore for LoggingOrderStore {
    fn save(&self, order: &Order) -> Result<(), RelayError> {
        info!(
            items = ?order.items,
            note = order.note.as_deref().unwrap_or(""),
            "[Tools] Order saved"
        );
        Ok(())
    }
}

pub fn declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: SAVE_ORDER.to_string(),
        description: "Save the customer's food or drink order to the system.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "menu": {
                                "type": "string",
                                "description": "Menu item ordered, e.g. fried chicken, cola, french fries. Do not record unrelated things such as animals, foreign objects or irrelevant words."
                            },
                            "qty": {
                                "type": "integer",
                                "description": "Quantity ordered, e.g. 1, 2, 5"
                            }
                        },
                        "required": ["menu", "qty"]
                    }
                },
                "note": {
                    "type": "string",
                    "description": "Additional note from the customer"
                }
            },
            "required": ["items"]
        }),
    }
}

pub struct SaveOrderTool {
    store: Arc<dyn OrderStore>,
}

impl SaveOrderTool {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    fn parse(args: Map<String, Value>) -> Result<Order, RelayError> {
        let order: Order = serde_json::from_value(Value::Object(args))
            .map_err(|e| RelayError::tool_dispatch(SAVE_ORDER, format!("invalid arguments: {}", e)))?;

        if order.items.is_empty() {
            return Err(RelayError::tool_dispatch(SAVE_ORDER, "order has no items"));
        }
        for item in &order.items {
            if item.menu.trim().is_empty() {
                return Err(RelayError::tool_dispatch(SAVE_ORDER, "item menu is empty"));
            }
            if item.qty < 1 {
                return Err(RelayError::tool_dispatch(
                    SAVE_ORDER,
                    format!("quantity for '{}' must be at least 1", item.menu),
                ));
            }
        }
        Ok(order)
    }
}

impl ToolHandler for SaveOrderTool {
    fn call(&self, args: Map<String, Value>) -> Result<Value, RelayError> {
        let order = Self::parse(args)?;
        self.store.save(&order)?;
        Ok(json!({
            "status": "ok",
            "items": order.items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        orders: Mutex<Vec<Order>>,
    }

    impl OrderStore for RecordingStore {
        fn save(&self, order: &Order) -> Result<(), RelayError> {
            self.orders.lock().unwrap().push(order.clone());
            Ok(())
        }
    }

    struct FailingStore;

    impl OrderStore for FailingStore {
        fn save(&self, _order: &Order) -> Result<(), RelayError> {
            Err(RelayError::Io(std::io::Error::other("disk full")))
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("Expected object, got {}", other),
        }
    }

    #[test]
    fn test_save_order_echoes_items_and_persists() {
        let store = Arc::new(RecordingStore::default());
        let tool = SaveOrderTool::new(store.clone());

        let result = tool
            .call(args(json!({
                "items": [{"menu": "ayam goreng", "qty": 2}],
                "note": "tanpa sambal"
            })))
            .unwrap();

        assert_eq!(
            result,
            json!({"status": "ok", "items": [{"menu": "ayam goreng", "qty": 2}]})
        );
        let orders = store.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].note.as_deref(), Some("tanpa sambal"));
    }

    #[test]
    fn test_save_order_rejects_invalid_arguments() {
        let store = Arc::new(RecordingStore::default());
        let tool = SaveOrderTool::new(store.clone());

        for bad in [
            json!({}),
            json!({"items": []}),
            json!({"items": [{"menu": "cola", "qty": 0}]}),
            json!({"items": [{"menu": "cola", "qty": -1}]}),
            json!({"items": [{"menu": "  ", "qty": 1}]}),
            json!({"items": [{"menu": "cola"}]}),
        ] {
            let result = tool.call(args(bad.clone()));
            assert!(
                matches!(result, Err(RelayError::ToolDispatch { ref name, .. }) if name == SAVE_ORDER),
                "Expected ToolDispatch for {}, got {:?}",
                bad,
                result
            );
        }
        assert!(store.orders.lock().unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_is_reported() {
        let tool = SaveOrderTool::new(Arc::new(FailingStore));
        let result = tool.call(args(json!({"items": [{"menu": "fanta", "qty": 1}]})));
        assert!(result.is_err());
    }

    #[test]
    fn test_declaration_schema() {
        let decl = declaration();
        assert_eq!(decl.name, SAVE_ORDER);
        assert_eq!(decl.parameters["required"], json!(["items"]));
        assert_eq!(
            decl.parameters["properties"]["items"]["items"]["required"],
            json!(["menu", "qty"])
        );
    }
}
