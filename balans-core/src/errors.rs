// balans-core/src/errors.rs
use thiserror::Error;

/// Errors that can occur while running the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The chat-completion API request failed.
    #[error("API Error: {0}")]
    Api(#[source] anyhow::Error),

    /// A remote tool server could not be reached or rejected a call.
    #[error("Tool Server Error: {0}")]
    ToolServer(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_display_prefixes_identify_the_failing_side() {
        let api = AgentError::Api(anyhow!("API error: 400 - bad request"));
        assert_eq!(api.to_string(), "API Error: API error: 400 - bad request");

        let server = AgentError::ToolServer(anyhow!("Tool catalog request failed"));
        assert_eq!(
            server.to_string(),
            "Tool Server Error: Tool catalog request failed"
        );
    }
}
