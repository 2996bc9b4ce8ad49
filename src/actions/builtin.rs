//! Builtin Actions
//!
//! Actions compiled into the probe binary. They are served in-process by
//! the registry, or out of process through `probe builtin <action>`.

use serde_json::{json, Value};

use crate::workflow::Mapping;

use super::{Action, ActionError};

/// Greeting used when no `name` input is given.
const DEFAULT_NAME: &str = "world";

/// Deterministic greeting action.
///
/// Input: `name` (string, optional). The response body is JSON text so
/// later steps can read it through `bodyjson`.
pub struct Hello;

impl Action for Hello {
    fn run(&self, input: &Mapping) -> Result<Mapping, ActionError> {
        let name = match input.get("name") {
            None | Some(Value::Null) => DEFAULT_NAME,
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(ActionError::InvalidInput(format!(
                    "'name' must be a string, got {}",
                    other
                )))
            }
        };

        let body = json!({ "message": format!("Hello, {}!", name) });

        let mut request = Mapping::new();
        request.insert("name".to_string(), json!(name));

        let mut response = Mapping::new();
        response.insert("code".to_string(), json!(0));
        response.insert("body".to_string(), Value::String(body.to_string()));

        let mut result = Mapping::new();
        result.insert("request".to_string(), Value::Object(request));
        result.insert("response".to_string(), Value::Object(response));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_default_name() {
        let result = Hello.run(&Mapping::new()).unwrap();

        assert_eq!(result["request"]["name"], json!("world"));
        assert_eq!(
            result["response"]["body"],
            json!(r#"{"message":"Hello, world!"}"#)
        );
    }

    #[test]
    fn test_hello_named() {
        let mut input = Mapping::new();
        input.insert("name".to_string(), json!("x"));

        let result = Hello.run(&input).unwrap();
        assert_eq!(result["request"]["name"], json!("x"));
        assert_eq!(result["response"]["code"], json!(0));
    }

    #[test]
    fn test_hello_rejects_non_string_name() {
        let mut input = Mapping::new();
        input.insert("name".to_string(), json!(42));

        let err = Hello.run(&input).unwrap_err();
        assert!(err.to_string().contains("'name' must be a string"));
    }

    #[test]
    fn test_hello_is_deterministic() {
        let mut input = Mapping::new();
        input.insert("name".to_string(), json!("same"));

        assert_eq!(Hello.run(&input).unwrap(), Hello.run(&input).unwrap());
    }
}
