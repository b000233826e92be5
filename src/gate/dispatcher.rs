//! Dispatcher: the single entry point between the transport and the wallet.
//!
//! ```text
//! handle(request)
//!     1. catalog lookup        miss  -> Failed{NotFound}
//!     2. policy gate           Deny  -> Rejected{PolicyDenied}
//!                              Allow -> backend -> Success / Failed{BackendFailure}
//!                              RequireConfirmation -> broker -> Pending{token}
//!
//! resolve_confirmation(token, decision)
//!     Approve -> Allow path with the stored arguments
//!     Deny    -> Rejected{DeniedByApprover}
//!     expired -> Rejected{ConfirmationExpired}
//!     unknown -> Failed{NotFound}
//! ```
//!
//! Only the Allow path touches the backend.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::catalog::{Catalog, OperationDescriptor};
use super::confirmation::{ConfirmationBroker, ConfirmationError, Resolution};
use super::models::{
    Arguments, Decision, ErrorKind, InvocationRequest, InvocationResult, PendingConfirmation,
    RejectReason,
};
use super::policy::{evaluate, DisconnectPolicy, GateDecision, ServerPolicy};
use crate::wallet::WalletBackend;

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: Catalog,
    policy: RwLock<Arc<ServerPolicy>>,
    broker: ConfirmationBroker,
    backend: Arc<dyn WalletBackend>,
}

impl Dispatcher {
    pub fn new(catalog: Catalog, policy: ServerPolicy, backend: Arc<dyn WalletBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                policy: RwLock::new(Arc::new(policy)),
                broker: ConfirmationBroker::new(),
                backend,
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn broker(&self) -> &ConfirmationBroker {
        &self.inner.broker
    }

    /// Snapshot of the current policy.
    pub async fn policy(&self) -> Arc<ServerPolicy> {
        self.inner.policy.read().await.clone()
    }

    /// Swaps in a new policy. In-flight calls keep the snapshot they started with.
    pub async fn replace_policy(&self, policy: ServerPolicy) {
        info!(
            "Replacing server policy: allowed={:?} require_confirmation={}",
            policy.allowed_categories, policy.require_confirmation
        );
        *self.inner.policy.write().await = Arc::new(policy);
    }

    /// Operations the current policy lets the assistant see.
    pub async fn tools(&self) -> Vec<OperationDescriptor> {
        let policy = self.policy().await;
        self.inner.catalog.permitted(&policy).cloned().collect()
    }

    pub fn pending(&self) -> Vec<PendingConfirmation> {
        self.inner.broker.pending()
    }

    pub async fn handle(&self, request: InvocationRequest) -> InvocationResult {
        let Some(descriptor) = self.inner.catalog.lookup(&request.operation_name) else {
            warn!("Unknown operation requested: {}", request.operation_name);
            return InvocationResult::not_found(format!(
                "Unknown operation: {}",
                request.operation_name
            ));
        };

        let policy = self.policy().await;
        match evaluate(descriptor, &policy) {
            GateDecision::Deny => {
                info!(
                    "Denied '{}' (request {}): category '{}' not allowed",
                    descriptor.name, request.request_id, descriptor.category
                );
                InvocationResult::Rejected {
                    reason: RejectReason::PolicyDenied {
                        category: descriptor.category,
                    },
                }
            }
            GateDecision::Allow => self.execute(&descriptor.name, &request.arguments).await,
            GateDecision::RequireConfirmation => {
                match self.inner.broker.register(&request, policy.confirmation_timeout) {
                    Ok(pending) => InvocationResult::Pending {
                        confirmation_token: pending.token,
                        expires_at: pending.expires_at,
                    },
                    Err(ConfirmationError::AlreadyPending(id)) => {
                        warn!("Request {} already awaits confirmation", id);
                        InvocationResult::Rejected {
                            reason: RejectReason::AlreadyPending,
                        }
                    }
                    Err(e) => InvocationResult::not_found(e.to_string()),
                }
            }
        }
    }

    /// Entry point for the approval channel.
    pub async fn resolve_confirmation(&self, token: &str, decision: Decision) -> InvocationResult {
        match self.inner.broker.resolve(token, decision) {
            Ok(Resolution::Approved(pending)) => {
                let policy = self.policy().await;
                match self.inner.catalog.lookup(&pending.operation_name) {
                    Some(d) if policy.allows(d.category) => {
                        self.execute(&pending.operation_name, &pending.arguments).await
                    }
                    Some(d) => {
                        info!(
                            "Approved '{}' dropped: category '{}' no longer allowed",
                            d.name, d.category
                        );
                        InvocationResult::Rejected {
                            reason: RejectReason::PolicyDenied {
                                category: d.category,
                            },
                        }
                    }
                    None => InvocationResult::not_found(format!(
                        "Unknown operation: {}",
                        pending.operation_name
                    )),
                }
            }
            Ok(Resolution::Denied(_)) => InvocationResult::Rejected {
                reason: RejectReason::DeniedByApprover,
            },
            Err(ConfirmationError::Expired(_)) => InvocationResult::Rejected {
                reason: RejectReason::ConfirmationExpired,
            },
            Err(_) => {
                warn!("Resolution attempted for unknown confirmation token {}", token);
                InvocationResult::not_found("Unknown or already resolved confirmation token")
            }
        }
    }

    /// Called by a transport when one of its sessions goes away.
    pub async fn session_closed(&self, session: &str) {
        if self.policy().await.on_disconnect == DisconnectPolicy::Cancel {
            self.inner.broker.cancel_session(session);
        }
    }

    async fn execute(&self, operation: &str, arguments: &Arguments) -> InvocationResult {
        match self.inner.backend.invoke(operation, arguments).await {
            Ok(value) => InvocationResult::Success { value },
            Err(e) => {
                warn!("Backend failed '{}': {}", operation, e);
                InvocationResult::Failed {
                    error_kind: ErrorKind::BackendFailure,
                    backend_kind: Some(e.kind),
                    message: e.message,
                }
            }
        }
    }
}
