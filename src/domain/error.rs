//! Domain error types.

/// A parse error with position information for graph text fields.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for flowtrader.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    GraphParse(#[from] ParseError),

    #[error("invalid strategy graph: {reason}")]
    GraphInvalid { reason: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("price series is empty")]
    EmptySeries,

    #[error("price series is not strictly increasing at bar {index}")]
    UnorderedSeries { index: usize },

    #[error("invalid price bar {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub(crate) fn graph(reason: impl Into<String>) -> Self {
        FlowError::GraphInvalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        FlowError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_missing(section: &str, key: &str) -> Self {
        FlowError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn param(name: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&FlowError> for std::process::ExitCode {
    fn from(err: &FlowError) -> Self {
        let code: u8 = match err {
            FlowError::Io(_) => 1,
            FlowError::ConfigParse { .. }
            | FlowError::ConfigMissing { .. }
            | FlowError::ConfigInvalid { .. } => 2,
            FlowError::Data { .. }
            | FlowError::EmptySeries
            | FlowError::UnorderedSeries { .. }
            | FlowError::InvalidBar { .. } => 3,
            FlowError::GraphParse(_) | FlowError::GraphInvalid { .. } => 4,
            FlowError::InvalidParameter { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_caret_points_at_position() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("SMA(20");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "SMA(20");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn graph_error_message() {
        let err = FlowError::graph("cycle detected");
        assert_eq!(err.to_string(), "invalid strategy graph: cycle detected");
    }

    #[test]
    fn parse_error_converts_into_flow_error() {
        let err: FlowError = ParseError {
            message: "bad".into(),
            position: 0,
        }
        .into();
        assert!(matches!(err, FlowError::GraphParse(_)));
    }
}
