//! Gameplay actions and the HTTP submission contract
//!
//! Actions are predicted locally, queued, and later submitted to
//! `POST /api/actions/{type}`. The body is the action's own fields plus an
//! envelope carrying the enqueue timestamp and the client's prediction, so the
//! server can judge staleness and decide to honor, adjust, or reject.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action discriminator. One submission endpoint per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Crime,
    Heist,
    Property,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Crime => "crime",
            ActionType::Heist => "heist",
            ActionType::Property => "property",
        }
    }

    /// Path of the submission endpoint, relative to the server origin.
    pub fn endpoint(&self) -> String {
        format!("/api/actions/{}", self.as_str())
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperation {
    Buy,
    Sell,
    Upgrade,
    Collect,
}

/// A gameplay action that changes authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GameAction {
    /// Commit a single crime
    Crime { crime_id: String },
    /// Run a heist with a crew
    Heist {
        heist_id: String,
        #[serde(default)]
        crew: Vec<String>,
    },
    /// Buy, sell, upgrade, or collect from a property
    Property {
        property_id: String,
        operation: PropertyOperation,
    },
}

impl GameAction {
    pub fn crime(crime_id: impl Into<String>) -> Self {
        GameAction::Crime {
            crime_id: crime_id.into(),
        }
    }

    pub fn heist(heist_id: impl Into<String>, crew: Vec<String>) -> Self {
        GameAction::Heist {
            heist_id: heist_id.into(),
            crew,
        }
    }

    pub fn property(property_id: impl Into<String>, operation: PropertyOperation) -> Self {
        GameAction::Property {
            property_id: property_id.into(),
            operation,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            GameAction::Crime { .. } => ActionType::Crime,
            GameAction::Heist { .. } => ActionType::Heist,
            GameAction::Property { .. } => ActionType::Property,
        }
    }

    /// The action's own fields as a JSON object, without the type tag.
    pub fn payload_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        Ok(match value {
            Value::Object(mut outer) => match outer.remove("payload") {
                Some(Value::Object(fields)) => fields,
                _ => Map::new(),
            },
            _ => Map::new(),
        })
    }
}

/// Body of an action submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitActionRequest {
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    /// Enqueue time, epoch milliseconds
    pub timestamp: i64,
    /// What the client predicted and already showed the player
    #[serde(rename = "localResult")]
    pub local_result: Value,
}

impl SubmitActionRequest {
    pub fn new(
        action: &GameAction,
        timestamp: i64,
        local_result: Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            payload: action.payload_fields()?,
            timestamp,
            local_result,
        })
    }
}

/// Server verdict on a submitted action.
///
/// `adjusted` is optional: servers that omit it leave the client to compare
/// `result` against its own prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitActionResponse {
    /// The action was invalid or stale and was not applied
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Authoritative outcome
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub adjusted: Option<bool>,
    /// Server-computed correction, display only
    #[serde(default)]
    pub adjustments: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoints_are_type_specific() {
        assert_eq!(ActionType::Crime.endpoint(), "/api/actions/crime");
        assert_eq!(ActionType::Heist.endpoint(), "/api/actions/heist");
        assert_eq!(ActionType::Property.endpoint(), "/api/actions/property");
    }

    #[test]
    fn game_action_is_adjacently_tagged() {
        let action = GameAction::property("laundromat", PropertyOperation::Upgrade);
        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "property",
                "payload": { "property_id": "laundromat", "operation": "upgrade" }
            })
        );
        assert_eq!(action.action_type(), ActionType::Property);
    }

    #[test]
    fn submission_body_flattens_payload_with_envelope() {
        let action = GameAction::heist("first-national", vec!["vinnie".to_string()]);
        let request = SubmitActionRequest::new(&action, 1_700_000_000_000, json!({"cash": 150}))
            .expect("build request");

        let body = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            body,
            json!({
                "heist_id": "first-national",
                "crew": ["vinnie"],
                "timestamp": 1_700_000_000_000i64,
                "localResult": { "cash": 150 }
            })
        );
    }

    #[test]
    fn sparse_response_uses_defaults() {
        let response: SubmitActionResponse =
            serde_json::from_str(r#"{"result":{"cash":100}}"#).expect("deserialize");
        assert!(!response.rejected);
        assert_eq!(response.adjusted, None);
        assert_eq!(response.result, json!({"cash": 100}));
        assert!(response.adjustments.is_none());
    }
}
