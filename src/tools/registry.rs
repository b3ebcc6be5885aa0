//! Capability registry: tools, resources and prompts by name.

use crate::error::{ProtocolError, ProtocolResult, ToolError, ToolResult};
use crate::protocol::{Capability, CapabilityKind};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Tool definition.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> Tool;

    /// Run the tool on its raw JSON parameters.
    async fn call(&self, params: &[u8]) -> ToolResult<Value>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn read(&self) -> ToolResult<Value>;
}

/// Static help text.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub name: String,
    pub description: String,
    pub content: String,
}

/// Collects capabilities during setup. Names must be unique per kind.
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    tools: IndexMap<String, Arc<dyn ToolHandler>>,
    resources: IndexMap<String, Arc<dyn ResourceHandler>>,
    prompts: IndexMap<String, Prompt>,
}

impl CapabilityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool<T: ToolHandler + 'static>(&mut self, tool: T) -> ProtocolResult<()> {
        let name = tool.definition().name;
        if self.tools.contains_key(&name) {
            return Err(duplicate(CapabilityKind::Tool, name));
        }
        debug!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn register_resource<R: ResourceHandler + 'static>(
        &mut self,
        resource: R,
    ) -> ProtocolResult<()> {
        let name = resource.name().to_string();
        if self.resources.contains_key(&name) {
            return Err(duplicate(CapabilityKind::Resource, name));
        }
        debug!("Registering resource: {}", name);
        self.resources.insert(name, Arc::new(resource));
        Ok(())
    }

    pub fn register_prompt(&mut self, prompt: Prompt) -> ProtocolResult<()> {
        if self.prompts.contains_key(&prompt.name) {
            return Err(duplicate(CapabilityKind::Prompt, prompt.name));
        }
        debug!("Registering prompt: {}", prompt.name);
        self.prompts.insert(prompt.name.clone(), prompt);
        Ok(())
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            tools: self.tools,
            resources: self.resources,
            prompts: self.prompts,
        }
    }
}

fn duplicate(kind: CapabilityKind, name: String) -> ProtocolError {
    ProtocolError::DuplicateCapability {
        kind: kind.as_str(),
        name,
    }
}

/// Frozen set of capabilities served to the client.
///
/// A name registered in more than one namespace resolves to the tool first,
/// then the resource, then the prompt.
pub struct CapabilityRegistry {
    tools: IndexMap<String, Arc<dyn ToolHandler>>,
    resources: IndexMap<String, Arc<dyn ResourceHandler>>,
    prompts: IndexMap<String, Prompt>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::new()
    }

    /// Tools, then resources, then prompts, each in registration order.
    pub fn list(&self) -> Vec<Capability> {
        let tools = self.tools.values().map(|tool| {
            let definition = tool.definition();
            Capability {
                name: definition.name,
                kind: CapabilityKind::Tool,
                description: definition.description,
                schema: Some(definition.input_schema),
            }
        });
        let resources = self.resources.values().map(|resource| Capability {
            name: resource.name().to_string(),
            kind: CapabilityKind::Resource,
            description: resource.description().to_string(),
            schema: None,
        });
        let prompts = self.prompts.values().map(|prompt| Capability {
            name: prompt.name.clone(),
            kind: CapabilityKind::Prompt,
            description: prompt.description.clone(),
            schema: None,
        });

        tools.chain(resources).chain(prompts).collect()
    }

    pub fn resolve(&self, name: &str) -> Option<CapabilityKind> {
        if self.tools.contains_key(name) {
            Some(CapabilityKind::Tool)
        } else if self.resources.contains_key(name) {
            Some(CapabilityKind::Resource)
        } else if self.prompts.contains_key(name) {
            Some(CapabilityKind::Prompt)
        } else {
            None
        }
    }

    #[instrument(skip(self, params))]
    pub async fn invoke(&self, name: &str, params: &[u8]) -> ProtocolResult<Value> {
        if let Some(tool) = self.tools.get(name) {
            return Ok(tool.call(params).await?);
        }
        if let Some(resource) = self.resources.get(name) {
            return Ok(resource.read().await?);
        }
        if let Some(prompt) = self.prompts.get(name) {
            return Ok(Value::String(prompt.content.clone()));
        }
        Err(ProtocolError::UnknownCapability(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode tool parameters, reporting failures as invalid arguments.
pub fn parse_params<T: DeserializeOwned>(params: &[u8]) -> ToolResult<T> {
    serde_json::from_slice(params).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[macro_export]
macro_rules! define_tool {
    (
        name: $name:expr,
        description: $desc:expr,
        schema: $schema:tt
    ) => {
        $crate::tools::Tool {
            name: $name.into(),
            description: $desc.into(),
            input_schema: serde_json::json!($schema),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct TestTool {
        name: &'static str,
    }

    #[derive(Deserialize)]
    struct EchoArgs {
        message: String,
    }

    #[async_trait]
    impl ToolHandler for TestTool {
        fn definition(&self) -> Tool {
            define_tool! {
                name: self.name,
                description: "A test tool",
                schema: {
                    "type": "object",
                    "properties": {"message": {"type": "string"}}
                }
            }
        }

        async fn call(&self, params: &[u8]) -> ToolResult<Value> {
            let args: EchoArgs = parse_params(params)?;
            if args.message == "fail" {
                return Err(ToolError::ExecutionFailed("asked to fail".into()));
            }
            Ok(json!({"from": "tool", "message": args.message}))
        }
    }

    struct TestResource {
        name: &'static str,
    }

    #[async_trait]
    impl ResourceHandler for TestResource {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "A test resource"
        }

        async fn read(&self) -> ToolResult<Value> {
            Ok(json!({"from": "resource"}))
        }
    }

    fn prompt(name: &str) -> Prompt {
        Prompt {
            name: name.into(),
            description: "Help".into(),
            content: format!("help for {name}"),
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut builder = CapabilityRegistry::builder();
        builder.register_prompt(prompt("help")).unwrap();
        builder.register_resource(TestResource { name: "shared" }).unwrap();
        builder.register_tool(TestTool { name: "echo" }).unwrap();
        builder.register_tool(TestTool { name: "shared" }).unwrap();
        builder.register_resource(TestResource { name: "items" }).unwrap();
        builder.build()
    }

    #[test]
    fn test_duplicate_within_namespace_rejected() {
        let mut builder = CapabilityRegistry::builder();
        builder.register_tool(TestTool { name: "echo" }).unwrap();

        let err = builder.register_tool(TestTool { name: "echo" }).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DuplicateCapability { kind: "tool", ref name } if name == "echo"
        ));

        builder.register_prompt(prompt("p")).unwrap();
        assert!(builder.register_prompt(prompt("p")).is_err());
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_list_groups_by_kind_in_registration_order() {
        let listed = registry().list();
        let names: Vec<(&str, CapabilityKind)> =
            listed.iter().map(|c| (c.name.as_str(), c.kind)).collect();

        assert_eq!(
            names,
            vec![
                ("echo", CapabilityKind::Tool),
                ("shared", CapabilityKind::Tool),
                ("shared", CapabilityKind::Resource),
                ("items", CapabilityKind::Resource),
                ("help", CapabilityKind::Prompt),
            ]
        );
        assert!(listed[0].schema.is_some());
        assert!(listed[4].schema.is_none());
    }

    #[tokio::test]
    async fn test_tool_wins_name_collision() {
        let registry = registry();
        assert_eq!(registry.resolve("shared"), Some(CapabilityKind::Tool));

        let result = registry
            .invoke("shared", br#"{"message":"hi"}"#)
            .await
            .unwrap();
        assert_eq!(result["from"], "tool");
    }

    #[tokio::test]
    async fn test_invoke_each_kind() {
        let registry = registry();

        let resource = registry.invoke("items", b"{}").await.unwrap();
        assert_eq!(resource["from"], "resource");

        let help = registry.invoke("help", b"{}").await.unwrap();
        assert_eq!(help, json!("help for help"));
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let err = registry().invoke("missing", b"{}").await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCapability(ref n) if n == "missing"));
        assert_eq!(err.code(), -32001);
    }

    #[tokio::test]
    async fn test_tool_errors_are_shaped() {
        let registry = registry();

        let invalid = registry.invoke("echo", b"{\"nope\":1}").await.unwrap_err();
        assert_eq!(invalid.code(), -32602);

        let failed = registry
            .invoke("echo", br#"{"message":"fail"}"#)
            .await
            .unwrap_err();
        assert_eq!(failed.code(), -32000);
        assert!(failed.to_string().contains("asked to fail"));
    }
}
