use crate::error::RelayError;
use crate::types::{FunctionDeclaration, Tool};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const FUNCTION_DECLARATION_KEYS: [&str; 2] = ["functionDeclarations", "function_declarations"];

/// Turns the client's opaque setup object into the one sent upstream.
///
/// The client owns everything except the model name, which the relay pins,
/// and the function declarations of relay-side tools, which are merged in.
#[derive(Debug, Clone)]
pub struct SetupBuilder {
    setup: Map<String, Value>,
}

impl SetupBuilder {
    pub fn from_client_config(config: Value) -> Result<Self, RelayError> {
        match config {
            Value::Object(setup) => Ok(Self { setup }),
            other => Err(RelayError::Protocol(format!(
                "setup configuration must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn model(mut self, model: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        if let Some(previous) = self.setup.get("model").and_then(Value::as_str) {
            if previous != model {
                debug!(
                    "[SetupBuilder] Overriding client model '{}' with '{}'",
                    previous, model
                );
            }
        }
        self.setup.insert("model".to_string(), Value::String(model));
        self
    }

    pub fn strip_response_modalities(mut self) -> Self {
        for (config_key, field) in [
            ("generation_config", "response_modalities"),
            ("generationConfig", "responseModalities"),
        ] {
            if let Some(Value::Object(generation_config)) = self.setup.get_mut(config_key) {
                if generation_config.remove(field).is_some() {
                    debug!("[SetupBuilder] Removed {}.{}", config_key, field);
                }
            }
        }
        self
    }

    /// Appends `declarations` to the first tool entry that already lists
    /// function declarations, or adds a new entry. Client declarations that
    /// share a name with a relay tool are dropped.
    pub fn add_tool_declarations(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        if declarations.is_empty() {
            return self;
        }

        let tools = self
            .setup
            .entry("tools")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !tools.is_array() {
            warn!(
                "[SetupBuilder] Client 'tools' is not a list ({}), replacing it.",
                tools
            );
            *tools = Value::Array(Vec::new());
        }
        let Value::Array(tools_vec) = tools else {
            return self;
        };

        let relay_names: Vec<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
        let mut declarations_json: Vec<Value> = Vec::with_capacity(declarations.len());
        for declaration in &declarations {
            match serde_json::to_value(declaration) {
                Ok(value) => declarations_json.push(value),
                Err(e) => warn!(
                    "[SetupBuilder] Failed to serialize declaration '{}': {}",
                    declaration.name, e
                ),
            }
        }

        for tool in tools_vec.iter_mut() {
            for key in FUNCTION_DECLARATION_KEYS {
                if let Some(Value::Array(existing)) = tool.get_mut(key) {
                    existing.retain(|decl| {
                        let name = decl.get("name").and_then(Value::as_str).unwrap_or_default();
                        !relay_names.contains(&name)
                    });
                }
            }
        }

        let mut target: Option<&mut Vec<Value>> = None;
        for tool in tools_vec.iter_mut() {
            let Some(key) = FUNCTION_DECLARATION_KEYS
                .into_iter()
                .find(|key| matches!(tool.get(*key), Some(Value::Array(_))))
            else {
                continue;
            };
            target = tool.get_mut(key).and_then(Value::as_array_mut);
            break;
        }

        match target {
            Some(existing) => existing.extend(declarations_json),
            None => {
                let tool = Tool {
                    function_declarations: declarations,
                };
                match serde_json::to_value(&tool) {
                    Ok(value) => tools_vec.push(value),
                    Err(e) => warn!("[SetupBuilder] Failed to serialize tool entry: {}", e),
                }
            }
        }
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn save_order_decl() -> FunctionDeclaration {
        FunctionDeclaration {
            name: "save_order".to_string(),
            description: "Save an order".to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_non_object_setup_is_protocol_error() {
        assert!(matches!(
            SetupBuilder::from_client_config(json!([1, 2])),
            Err(RelayError::Protocol(_))
        ));
    }

    #[test]
    fn test_model_is_pinned_and_prefixed() {
        let setup = SetupBuilder::from_client_config(json!({"model": "models/other"}))
            .unwrap()
            .model("gemini-2.0-flash-live-001")
            .build();
        assert_eq!(setup["model"], json!("models/gemini-2.0-flash-live-001"));
    }

    #[test]
    fn test_tools_entry_is_created() {
        let setup = SetupBuilder::from_client_config(json!({}))
            .unwrap()
            .add_tool_declarations(vec![save_order_decl()])
            .build();
        assert_eq!(
            setup["tools"],
            json!([{"functionDeclarations": [
                {"name": "save_order", "description": "Save an order", "parameters": {"type": "object"}}
            ]}])
        );
    }

    #[test]
    fn test_declarations_merge_into_existing_entry() {
        let setup = SetupBuilder::from_client_config(json!({
            "tools": [
                {"google_search": {}},
                {"function_declarations": [
                    {"name": "lookup_menu", "description": "x", "parameters": {}},
                    {"name": "save_order", "description": "client copy", "parameters": {}}
                ]}
            ]
        }))
        .unwrap()
        .add_tool_declarations(vec![save_order_decl()])
        .build();

        let tools = setup["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0], json!({"google_search": {}}));
        let names: Vec<&str> = tools[1]["function_declarations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["lookup_menu", "save_order"]);
        assert_eq!(
            tools[1]["function_declarations"][1]["description"],
            json!("Save an order")
        );
    }

    #[test]
    fn test_non_list_tools_are_replaced() {
        let setup = SetupBuilder::from_client_config(json!({"tools": "bogus"}))
            .unwrap()
            .add_tool_declarations(vec![save_order_decl()])
            .build();
        assert_eq!(setup["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_strip_response_modalities() {
        let setup = SetupBuilder::from_client_config(json!({
            "generation_config": {"response_modalities": ["AUDIO"], "temperature": 0.5},
            "generationConfig": {"responseModalities": ["TEXT"]}
        }))
        .unwrap()
        .strip_response_modalities()
        .build();
        assert_eq!(setup["generation_config"], json!({"temperature": 0.5}));
        assert_eq!(setup["generationConfig"], json!({}));
    }
}
