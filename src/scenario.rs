//! Scenario data model and loader.
//!
//! A scenario file is a human-editable YAML document: a top-level list of
//! action records. This module parses it into frozen [`Action`] values via a
//! serde DTO layer (`RawAction`) and an `into_action` conversion.

use crate::errors::LoadError;
use crate::utils::parse_duration_string;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One HTTP step in the scenario, named for metric aggregation.
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    pub method: String,
    pub url: String,
    pub json_body: Option<String>,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub expect_status: u16,
    pub timeout: Option<Duration>,
    pub delay: Option<DelaySpec>,
}

/// Either a fixed delay or a min/max pair for uniform random delay.
#[derive(Debug, Clone, Copy)]
pub enum DelaySpec {
    Fixed(Duration),
    Range(Duration, Duration),
}

/// The ordered sequence of actions walked repeatedly by each worker.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    method: String,
    url: String,
    #[serde(default)]
    json_body: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    expect_status: u16,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    delay: Option<String>,
    #[serde(default)]
    delay_min: Option<String>,
    #[serde(default)]
    delay_max: Option<String>,
}

impl RawAction {
    fn into_action(self, path: &str) -> Result<Action, LoadError> {
        let invalid = |field: &str, reason: String| LoadError::InvalidDuration {
            path: path.to_string(),
            field: field.to_string(),
            reason,
        };

        let timeout = self
            .timeout
            .as_deref()
            .map(parse_duration_string)
            .transpose()
            .map_err(|reason| invalid("timeout", reason))?;

        let delay = match (self.delay, self.delay_min, self.delay_max) {
            (Some(d), _, _) => Some(DelaySpec::Fixed(
                parse_duration_string(&d).map_err(|reason| invalid("delay", reason))?,
            )),
            (None, Some(min), Some(max)) => {
                let min = parse_duration_string(&min).map_err(|reason| invalid("delay_min", reason))?;
                let max = parse_duration_string(&max).map_err(|reason| invalid("delay_max", reason))?;
                Some(DelaySpec::Range(min, max))
            }
            _ => None,
        };

        Ok(Action {
            name: self.name,
            method: self.method,
            url: self.url,
            json_body: self.json_body,
            body: self.body,
            headers: self.headers,
            expect_status: self.expect_status,
            timeout,
            delay,
        })
    }
}

/// Parse a scenario file's contents into a [`Scenario`]. Unknown YAML fields
/// are ignored. Called once at startup; failures are fatal before any worker
/// starts.
pub fn load_scenario(path: &str, contents: &str) -> Result<Scenario, LoadError> {
    let raw: Vec<RawAction> =
        serde_yaml::from_str(contents).map_err(|source| LoadError::ScenarioParse {
            path: path.to_string(),
            source,
        })?;

    if raw.is_empty() {
        return Err(LoadError::EmptyScenario {
            path: path.to_string(),
        });
    }

    let actions = raw
        .into_iter()
        .map(|r| r.into_action(path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Scenario { actions })
}
