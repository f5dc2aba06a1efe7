//! The tool registry shared by both protocol surfaces
//!
//! Tools are registered through [`ToolRegistryBuilder`] during startup. Once
//! [`ToolRegistryBuilder::build`] runs, the resulting [`ToolRegistry`] only
//! exposes read access and is shared behind an `Arc`.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::domain::schema::{Arguments, SchemaError, ToolSchema};

pub type ToolHandler = Arc<dyn Fn(&Arguments) -> Result<Value, ToolError> + Send + Sync>;

/// Failure raised by a tool handler while it runs.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("argument `{0}` is missing or has the wrong type")]
    Argument(String),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("tool `{0}` is already registered")]
    Duplicate(String),
    #[error("tool `{name}` has an invalid schema: {source}")]
    InvalidSchema {
        name: String,
        #[source]
        source: SchemaError,
    },
}

#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    schema: ToolSchema,
    handler: ToolHandler,
}

impl ToolDefinition {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(&Arguments) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let schema = ToolSchema::compile(schema).map_err(|source| RegistryError::InvalidSchema {
            name: name.clone(),
            source,
        })?;

        Ok(Self {
            name,
            description: description.into(),
            schema,
            handler: Arc::new(handler),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn handler(&self) -> ToolHandler {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", self.schema.raw())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, definition: ToolDefinition) -> Result<Self, RegistryError> {
        if self.index.contains_key(definition.name()) {
            return Err(RegistryError::Duplicate(definition.name().to_string()));
        }

        self.index
            .insert(definition.name().to_string(), self.tools.len());
        self.tools.push(definition);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            index: self.index,
        }
    }
}

#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    /// Registered tools in registration order.
    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
