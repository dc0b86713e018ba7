//! Parameter validation and typed decoding for command handlers.

use chatter_core::ChatterError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Fail with `MissingParam` for the first declared name that is absent or
/// null in `params`.
pub fn check_required(params: &Value, required: &[&str]) -> Result<(), ChatterError> {
    for name in required {
        if params.get(name).is_none_or(Value::is_null) {
            return Err(ChatterError::MissingParam {
                name: (*name).to_owned(),
            });
        }
    }
    Ok(())
}

/// Decode `params` into the handler's typed parameter struct.
pub fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ChatterError> {
    serde_json::from_value(params).map_err(|e| ChatterError::InvalidParams {
        message: e.to_string(),
    })
}
