//! Wire types for the v2 stream rules API.

use serde::{Deserialize, Serialize};

/// A server-side filtered-stream rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamRule {
    /// Rule ID, assigned by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Rule value (query)
    pub value: String,

    /// Human-readable rule tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl StreamRule {
    /// Create an unsubmitted rule with a tag.
    #[must_use]
    pub fn new(value: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
            tag: Some(tag.into()),
        }
    }
}

/// Add stream rules request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddStreamRulesRequest {
    /// Rules to add
    pub add: Vec<StreamRule>,
}

/// Delete stream rules request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteStreamRulesRequest {
    /// Rules to delete
    pub delete: DeleteRulesSpec,
}

/// Delete rules specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRulesSpec {
    /// Rule IDs to delete
    pub ids: Vec<String>,
}

/// Stream rules response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRulesResponse {
    /// Rules affected or listed
    #[serde(default)]
    pub data: Option<Vec<StreamRule>>,

    /// Metadata
    #[serde(default)]
    pub meta: Option<StreamRulesMeta>,

    /// Per-rule errors
    #[serde(default)]
    pub errors: Option<Vec<ApiError>>,
}

/// Stream rules metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRulesMeta {
    /// Server timestamp
    #[serde(default)]
    pub sent: Option<String>,

    /// Summary of changes
    #[serde(default)]
    pub summary: Option<RulesSummary>,
}

/// Rules change summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSummary {
    #[serde(default)]
    pub created: Option<u32>,

    #[serde(default)]
    pub not_created: Option<u32>,

    #[serde(default)]
    pub deleted: Option<u32>,

    #[serde(default)]
    pub not_deleted: Option<u32>,

    #[serde(default)]
    pub valid: Option<u32>,

    #[serde(default)]
    pub invalid: Option<u32>,
}

/// An error entry from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub detail: Option<String>,

    /// The offending rule value, when the error concerns a rule
    #[serde(default)]
    pub value: Option<String>,
}

impl ApiError {
    /// Best human-readable description available.
    #[must_use]
    pub fn describe(&self) -> String {
        let message = self
            .detail
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("unknown error");
        match &self.value {
            Some(value) => format!("{message} (rule: {value})"),
            None => message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubmitted_rule_serializes_without_id() {
        let rule = StreamRule::new("cats OR dogs", "keywords");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": "cats OR dogs", "tag": "keywords"})
        );
    }

    #[test]
    fn rules_response_parses_summary() {
        let raw = r#"{
            "meta": {
                "sent": "2024-01-01T00:00:00.000Z",
                "summary": {"created": 2, "not_created": 0, "valid": 2, "invalid": 0}
            },
            "data": [
                {"id": "100", "value": "from:12", "tag": "users"},
                {"id": "101", "value": "snow", "tag": "keywords"}
            ]
        }"#;
        let response: StreamRulesResponse = serde_json::from_str(raw).unwrap();
        let summary = response.meta.unwrap().summary.unwrap();
        assert_eq!(summary.created, Some(2));
        assert_eq!(response.data.unwrap().len(), 2);
    }

    #[test]
    fn api_error_description_includes_rule_value() {
        let err = ApiError {
            title: Some("UnprocessableEntity".into()),
            detail: Some("Rules must be valid".into()),
            value: Some("bounding_box:[]".into()),
        };
        assert_eq!(err.describe(), "Rules must be valid (rule: bounding_box:[])");
    }
}
