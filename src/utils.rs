//! Utility functions for the MCP wallet server

use serde::de::DeserializeOwned;
use serde_json::{from_value, Value};

use crate::gate::models::Arguments;
use crate::wallet::BackendError;

/// Helper function to extract a required argument from the invocation arguments
pub fn get_required_arg<T: DeserializeOwned>(args: &Arguments, key: &str) -> Result<T, BackendError> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        BackendError::invalid_arguments(format!("Missing or invalid required argument: '{}'", key))
    })
}

/// Like [`get_required_arg`], but absent or `null` yields `None`
pub fn get_optional_arg<T: DeserializeOwned>(
    args: &Arguments,
    key: &str,
) -> Result<Option<T>, BackendError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => from_value(v.clone())
            .map(Some)
            .map_err(|_| BackendError::invalid_arguments(format!("Invalid argument: '{}'", key))),
    }
}

/// Turns a JSON-RPC `arguments` value into an argument map. Absent means empty.
pub fn arguments_from_value(value: Option<&Value>) -> Option<Arguments> {
    match value {
        None | Some(Value::Null) => Some(Arguments::new()),
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => None,
    }
}
