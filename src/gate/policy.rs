// src/gate/policy.rs

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::catalog::OperationDescriptor;
use super::models::OperationCategory;

/// What happens to parked confirmations when their transport session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Confirmations outlive the session that created them.
    #[default]
    Retain,
    /// Confirmations are dropped with their session.
    Cancel,
}

/// Capability and confirmation policy. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPolicy {
    pub allowed_categories: BTreeSet<OperationCategory>,
    pub require_confirmation: bool,
    pub confirmation_timeout: Duration,
    pub on_disconnect: DisconnectPolicy,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            allowed_categories: [
                OperationCategory::Read,
                OperationCategory::Prepare,
                OperationCategory::Info,
            ]
            .into_iter()
            .collect(),
            require_confirmation: true,
            confirmation_timeout: Duration::from_secs(300),
            on_disconnect: DisconnectPolicy::Retain,
        }
    }
}

impl ServerPolicy {
    pub fn new(
        allowed_categories: impl IntoIterator<Item = OperationCategory>,
        require_confirmation: bool,
    ) -> Self {
        Self {
            allowed_categories: allowed_categories.into_iter().collect(),
            require_confirmation,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_disconnect_policy(mut self, on_disconnect: DisconnectPolicy) -> Self {
        self.on_disconnect = on_disconnect;
        self
    }

    pub fn allows(&self, category: OperationCategory) -> bool {
        self.allowed_categories.contains(&category)
    }
}

/// Outcome of the policy gate for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny,
    RequireConfirmation,
}

/// Category permission is checked first: a disallowed operation never reaches
/// confirmation, whatever its mutation flag.
pub fn evaluate(descriptor: &OperationDescriptor, policy: &ServerPolicy) -> GateDecision {
    if !policy.allows(descriptor.category) {
        return GateDecision::Deny;
    }
    if descriptor.mutates && policy.require_confirmation {
        return GateDecision::RequireConfirmation;
    }
    GateDecision::Allow
}
