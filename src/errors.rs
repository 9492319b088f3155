//! Fatal, pre-run error types.
//!
//! Per-request failures (transport errors, status mismatches) are never
//! modeled as these — they become fields on a `RequestEvent` instead (see
//! [`crate::metrics`]). These types cover only the configuration/scenario/
//! credential load errors that abort the process before any worker starts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read script file '{path}': {source}")]
    ScriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario file '{path}': {source}")]
    ScenarioParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("scenario '{path}' has no actions")]
    EmptyScenario { path: String },

    #[error("invalid duration for '{field}' in scenario '{path}': {reason}")]
    InvalidDuration {
        path: String,
        field: String,
        reason: String,
    },

    #[error("failed to read credentials file '{path}': {source}")]
    CredentialsRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials file '{path}' at line {line}: {reason}")]
    CredentialsParse {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("invalid login header '{0}', expected 'name:value'")]
    InvalidLoginHeader(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_path() {
        let err = LoadError::EmptyScenario {
            path: "scenario.yaml".into(),
        };
        assert!(err.to_string().contains("scenario.yaml"));
    }

    #[test]
    fn credentials_parse_error_includes_line_number() {
        let err = LoadError::CredentialsParse {
            path: "creds.txt".into(),
            line: 3,
            reason: "empty password".into(),
        };
        assert!(err.to_string().contains("line 3"));
    }
}
