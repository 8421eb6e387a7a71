use serde_json::Value;

use crate::domain::{RequestArguments, RpcError};

/// Checks the shape of a page-supplied `request` argument.
pub fn validate_request_args(args: &Value) -> Result<RequestArguments, RpcError> {
    let Value::Object(obj) = args else {
        return Err(RpcError::invalid_request(
            "expected a single, non-array, object argument",
        )
        .with_data(args.clone()));
    };

    let method = match obj.get("method") {
        Some(Value::String(method)) if !method.is_empty() => method.clone(),
        _ => {
            return Err(RpcError::invalid_request(
                "'args.method' must be a non-empty string",
            )
            .with_data(args.clone()))
        }
    };

    let params = match obj.get("params") {
        None => None,
        Some(params @ (Value::Array(_) | Value::Object(_))) => Some(params.clone()),
        Some(_) => {
            return Err(RpcError::invalid_request(
                "'args.params' must be an object or array if provided",
            )
            .with_data(args.clone()))
        }
    };

    Ok(RequestArguments { method, params })
}
