//! Tools served by the gateway
//!
//! Provides `add`, `subtract` and `zodiac_sign`, and assembles them into the
//! registry both protocol surfaces read from.

use serde_json::{json, Value};

use crate::domain::{
    registry::{RegistryError, ToolDefinition, ToolError, ToolRegistry},
    schema::Arguments,
    zodiac::{parse_birthdate, sign_for_date},
};

pub const ADD_TOOL: &str = "add";
pub const SUBTRACT_TOOL: &str = "subtract";
pub const ZODIAC_SIGN_TOOL: &str = "zodiac_sign";

pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    Ok(ToolRegistry::builder()
        .register(zodiac_sign_tool()?)?
        .register(add_tool()?)?
        .register(subtract_tool()?)?
        .build())
}

fn integer_pair_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "integer"},
            "b": {"type": "integer"}
        },
        "required": ["a", "b"],
        "additionalProperties": false
    })
}

pub fn add_tool() -> Result<ToolDefinition, RegistryError> {
    ToolDefinition::new(ADD_TOOL, "Suma dos números", integer_pair_schema(), add)
}

pub fn subtract_tool() -> Result<ToolDefinition, RegistryError> {
    ToolDefinition::new(
        SUBTRACT_TOOL,
        "Resta dos números",
        integer_pair_schema(),
        subtract,
    )
}

pub fn zodiac_sign_tool() -> Result<ToolDefinition, RegistryError> {
    ToolDefinition::new(
        ZODIAC_SIGN_TOOL,
        "Calcula el signo zodiacal a partir de YYYY-MM-DD",
        json!({
            "type": "object",
            "properties": {
                "birthdate": {
                    "type": "string",
                    "description": "YYYY-MM-DD",
                    "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}$"
                }
            },
            "required": ["birthdate"],
            "additionalProperties": false
        }),
        zodiac_sign,
    )
}

fn add(arguments: &Arguments) -> Result<Value, ToolError> {
    integer_value(arguments.integer("a")? + arguments.integer("b")?)
}

fn subtract(arguments: &Arguments) -> Result<Value, ToolError> {
    integer_value(arguments.integer("a")? - arguments.integer("b")?)
}

fn zodiac_sign(arguments: &Arguments) -> Result<Value, ToolError> {
    let raw = arguments.string("birthdate")?;
    let date = parse_birthdate(raw)
        .map_err(|err| ToolError::failed(format!("invalid birthdate `{raw}`: {err}")))?;

    sign_for_date(date)
        .map(Value::from)
        .ok_or_else(|| ToolError::failed(format!("no zodiac sign covers {date}")))
}

fn integer_value(value: i128) -> Result<Value, ToolError> {
    i64::try_from(value)
        .map(Value::from)
        .or_else(|_| u64::try_from(value).map(Value::from))
        .map_err(|_| ToolError::failed(format!("result {value} does not fit in 64 bits")))
}
