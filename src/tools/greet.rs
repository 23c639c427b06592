//! Greeting tool
//!
//! Has no external dependencies, so it answers even when the repository API is
//! unreachable or no credential is configured. Useful to check the channel is alive.

use super::{Arguments, ParamType, Tool, ToolDescriptor, ToolError, ToolParameter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct GreetTool;

#[derive(Debug, Deserialize)]
struct GreetArgs {
    name: String,
}

#[async_trait]
impl Tool for GreetTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "greet",
            "Return a friendly greeting for the given name.",
            vec![ToolParameter::required(
                "name",
                ParamType::String,
                "Name of the person to greet",
            )],
        )
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: GreetArgs = args.parse()?;
        Ok(Value::String(format!("Hello, {}! 👋", args.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_greet() {
        let tool = GreetTool;
        let args = Arguments::validate(&tool.descriptor(), json!({"name": "Rohit"})).unwrap();

        let payload = tool.execute(args).await.unwrap();
        assert_eq!(payload, json!("Hello, Rohit! 👋"));
    }
}
