//! Suspensions and their classification
//!
//! The reasoning process pauses a run by emitting interrupts. Each one is
//! carried around as an opaque [`Suspension`] and only interpreted here, by
//! looking at which flags its payload sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload flag raised when a tool needs out-of-band authorization
pub const AUTHORIZATION_FLAG: &str = "authorization_required";
/// Payload flag raised when a tool call needs a human's approval
pub const HUMAN_APPROVAL_FLAG: &str = "hitl_required";
/// Shown for approval requests that do not name their tool
pub const UNNAMED_TOOL: &str = "(unnamed tool)";

/// A point at which the reasoning process cannot continue without a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    /// Interrupt id assigned by the reasoning process, when it sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Raw interrupt payload
    #[serde(default)]
    pub value: Value,
}

impl Suspension {
    /// Wrap a raw payload
    pub fn new(value: Value) -> Self {
        Self { id: None, value }
    }

    /// Attach the interrupt id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Authorization descriptor for a tool that needs out-of-band consent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Tool that triggered the request
    pub tool_name: String,
    /// Resource identifier to wait on at the authorization backend
    pub authorization_id: String,
    /// Where the user completes the authorization, if the backend gave one
    pub url: Option<String>,
}

/// A tool call waiting for a human's yes/no
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    /// Tool the reasoning process wants to call
    pub tool_name: String,
    /// Proposed tool input
    pub input: Value,
}

/// Classified suspension
#[derive(Debug, Clone, PartialEq)]
pub enum SuspensionKind {
    /// Resolved by waiting on the authorization backend
    Authorization(AuthorizationRequest),
    /// Resolved by asking the user
    HumanApproval(ApprovalRequest),
    /// Neither flag set, or the payload is missing required fields.
    /// Always denied.
    Unrecognized { reason: String },
}

impl SuspensionKind {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SuspensionKind::Authorization(_) => AUTHORIZATION_FLAG,
            SuspensionKind::HumanApproval(_) => HUMAN_APPROVAL_FLAG,
            SuspensionKind::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Determine what kind of suspension this is.
///
/// `authorization_required` takes precedence over `hitl_required` when both
/// are set. An authorization request missing its tool name or
/// authorization id is unrecognized. An approval request without a tool
/// name still goes to the user, under a placeholder name.
pub fn classify(suspension: &Suspension) -> SuspensionKind {
    let value = &suspension.value;

    if flag_set(value, AUTHORIZATION_FLAG) {
        let Some(tool_name) = tool_name(value) else {
            return unrecognized("authorization request without tool_name");
        };
        let response = value.get("authorization_response");
        let Some(authorization_id) = response
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            return unrecognized("authorization request without authorization_response.id");
        };
        let url = response
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        return SuspensionKind::Authorization(AuthorizationRequest {
            tool_name,
            authorization_id: authorization_id.to_string(),
            url,
        });
    }

    if flag_set(value, HUMAN_APPROVAL_FLAG) {
        let tool_name = tool_name(value).unwrap_or_else(|| UNNAMED_TOOL.to_string());
        let input = value.get("input").cloned().unwrap_or(Value::Null);
        return SuspensionKind::HumanApproval(ApprovalRequest { tool_name, input });
    }

    unrecognized("neither authorization_required nor hitl_required is set")
}

fn unrecognized(reason: &str) -> SuspensionKind {
    SuspensionKind::Unrecognized {
        reason: reason.to_string(),
    }
}

fn tool_name(value: &Value) -> Option<String> {
    value
        .get("tool_name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

// Flags are truthy checks: `false`, `null`, `0` and `""` all mean unset.
fn flag_set(value: &Value, flag: &str) -> bool {
    match value.get(flag) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
