//! Approval resolvers
//!
//! Turns a suspension into a decision:
//! - Authorization: show the URL, then wait on the authorization backend
//! - Human approval: show the proposed call and ask the user
//! - Anything else: deny without asking anyone
//!
//! Resolvers never fail. A fault while resolving is logged and becomes a
//! denial, so one bad suspension cannot take down its siblings.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthBackend;
use crate::console::Console;
use crate::decision::Decision;
use crate::suspension::{classify, ApprovalRequest, AuthorizationRequest, Suspension, SuspensionKind};
use crate::Result;

/// Dispatches suspensions to the resolver for their kind
#[derive(Clone)]
pub struct Resolver {
    auth: Arc<dyn AuthBackend>,
}

impl Resolver {
    pub fn new(auth: Arc<dyn AuthBackend>) -> Self {
        Self { auth }
    }

    /// Classify and resolve one suspension
    pub async fn resolve(&self, suspension: &Suspension, console: &mut dyn Console) -> Decision {
        let kind = classify(suspension);
        debug!(kind = kind.label(), id = ?suspension.id, "Resolving suspension");
        self.resolve_kind(kind, console).await
    }

    /// Resolve an already classified suspension
    pub async fn resolve_kind(&self, kind: SuspensionKind, console: &mut dyn Console) -> Decision {
        let outcome = match kind {
            SuspensionKind::Authorization(request) => self.authorize(&request, console).await,
            SuspensionKind::HumanApproval(request) => approve(&request, console).await,
            SuspensionKind::Unrecognized { reason } => {
                warn!("Denying unrecognized suspension: {}", reason);
                return Decision::deny();
            }
        };

        match outcome {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Resolver failed, denying: {}", e);
                Decision::deny()
            }
        }
    }

    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        console: &mut dyn Console,
    ) -> Result<Decision> {
        console
            .status(&format!(
                "Authorization required for tool call {}",
                request.tool_name
            ))
            .await?;
        match &request.url {
            Some(url) => {
                console
                    .status(&format!("Please authorize in your browser {}", url))
                    .await?
            }
            None => {
                console
                    .status("The authorization backend did not provide a URL")
                    .await?
            }
        }
        console
            .status("Waiting for you to complete authorization...")
            .await?;

        match self.auth.wait_for_completion(&request.authorization_id).await {
            Ok(()) => {
                info!(tool = %request.tool_name, "Authorization granted");
                console
                    .status("Authorization granted. Resuming execution...")
                    .await?;
                Ok(Decision::allow())
            }
            Err(e) => {
                warn!(tool = %request.tool_name, "Authorization wait failed: {}", e);
                console
                    .status(&format!(
                        "Error waiting for authorization to complete: {}",
                        e
                    ))
                    .await?;
                Ok(Decision::deny())
            }
        }
    }
}

async fn approve(request: &ApprovalRequest, console: &mut dyn Console) -> Result<Decision> {
    console
        .status(&format!(
            "Human in the loop required for tool call {}",
            request.tool_name
        ))
        .await?;
    let input = serde_json::to_string_pretty(&request.input)?;
    console
        .status(&format!("Please approve the tool call {}", input))
        .await?;

    let approved = console.confirm("Do you approve this tool call?").await?;
    info!(tool = %request.tool_name, approved, "Tool call reviewed");
    console
        .status(if approved {
            "Tool call approved. Resuming execution..."
        } else {
            "Tool call declined."
        })
        .await?;
    Ok(Decision::from(approved))
}
