//! Confirmation broker.
//!
//! Holds mutating invocations that need an explicit human decision. Each
//! parked invocation moves through
//! `Created -> AwaitingApproval -> {Approved, Denied, Expired}` and is removed
//! from the table on whichever terminal state it reaches first.
//!
//! Removal from the table is the single point where a token is claimed, so an
//! approval racing the expiry sweep (or a second approval) can never both win.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{Decision, InvocationRequest, PendingConfirmation};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("unknown or already resolved confirmation token")]
    NotFound,
    #[error("confirmation expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("request '{0}' already has a pending confirmation")]
    AlreadyPending(String),
}

/// Terminal decision on a parked invocation; carries the stored call.
#[derive(Debug, Clone)]
pub enum Resolution {
    Approved(PendingConfirmation),
    Denied(PendingConfirmation),
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationBroker {
    // token -> parked invocation
    pending: Arc<DashMap<String, PendingConfirmation>>,
    // request id -> token, to keep one confirmation per request
    by_request: Arc<DashMap<String, String>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `request` and returns the stored entry with its fresh token.
    pub fn register(
        &self,
        request: &InvocationRequest,
        timeout: Duration,
    ) -> Result<PendingConfirmation, ConfirmationError> {
        self.register_at(request, timeout, Utc::now())
    }

    pub fn register_at(
        &self,
        request: &InvocationRequest,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<PendingConfirmation, ConfirmationError> {
        let lifetime = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let expires_at = now
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = PendingConfirmation {
            token: Uuid::new_v4().to_string(),
            request_id: request.request_id.clone(),
            operation_name: request.operation_name.clone(),
            arguments: request.arguments.clone(),
            session: request.session.clone(),
            created_at: now,
            expires_at,
        };

        match self.by_request.entry(request.request_id.clone()) {
            Entry::Occupied(mut slot) => {
                let live = self
                    .pending
                    .get(slot.get())
                    .map(|p| !p.is_expired_at(now))
                    .unwrap_or(false);
                if live {
                    return Err(ConfirmationError::AlreadyPending(request.request_id.clone()));
                }
                // Stale mapping: the old entry expired or was resolved.
                self.pending.remove(slot.get());
                self.pending.insert(entry.token.clone(), entry.clone());
                slot.insert(entry.token.clone());
            }
            Entry::Vacant(slot) => {
                // Inserted while the request slot is held, so a concurrent
                // register for the same id always sees the live entry.
                self.pending.insert(entry.token.clone(), entry.clone());
                slot.insert(entry.token.clone());
            }
        }

        info!(
            "Confirmation {} created for '{}' (request {}), expires {}",
            entry.token, entry.operation_name, entry.request_id, entry.expires_at
        );
        Ok(entry)
    }

    pub fn resolve(&self, token: &str, decision: Decision) -> Result<Resolution, ConfirmationError> {
        self.resolve_at(token, decision, Utc::now())
    }

    /// Claims `token`. Any later call for the same token yields `NotFound`.
    pub fn resolve_at(
        &self,
        token: &str,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ConfirmationError> {
        let (_, entry) = self
            .pending
            .remove(token)
            .ok_or(ConfirmationError::NotFound)?;
        self.forget_request(&entry);

        if entry.is_expired_at(now) {
            info!("Confirmation {} for '{}' expired", entry.token, entry.operation_name);
            return Err(ConfirmationError::Expired(entry.expires_at));
        }

        info!(
            "Confirmation {} for '{}' resolved: {:?}",
            entry.token, entry.operation_name, decision
        );
        Ok(match decision {
            Decision::Approve => Resolution::Approved(entry),
            Decision::Deny => Resolution::Denied(entry),
        })
    }

    /// Live entries, oldest first.
    pub fn pending(&self) -> Vec<PendingConfirmation> {
        self.pending_at(Utc::now())
    }

    pub fn pending_at(&self, now: DateTime<Utc>) -> Vec<PendingConfirmation> {
        let mut live: Vec<PendingConfirmation> = self
            .pending
            .iter()
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.value().clone())
            .collect();
        live.sort_by_key(|e| e.created_at);
        live
    }

    pub fn get(&self, token: &str) -> Option<PendingConfirmation> {
        self.pending.get(token).map(|e| e.value().clone())
    }

    /// Number of entries still in the table, expired or not.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.remove_where(|e| e.is_expired_at(now))
    }

    /// Drops every entry registered from `session`.
    pub fn cancel_session(&self, session: &str) -> usize {
        let removed = self.remove_where(|e| e.session.as_deref() == Some(session));
        if removed > 0 {
            info!("Cancelled {} pending confirmation(s) of session {}", removed, session);
        }
        removed
    }

    fn remove_where(&self, pred: impl Fn(&PendingConfirmation) -> bool) -> usize {
        let mut removed = Vec::new();
        self.pending.retain(|_, e| {
            if pred(e) {
                removed.push((e.request_id.clone(), e.token.clone()));
                false
            } else {
                true
            }
        });
        for (request_id, token) in &removed {
            debug!("Removed confirmation {} (request {})", token, request_id);
            self.by_request.remove_if(request_id, |_, t| t == token);
        }
        removed.len()
    }

    fn forget_request(&self, entry: &PendingConfirmation) {
        self.by_request
            .remove_if(&entry.request_id, |_, t| *t == entry.token);
    }
}

/// Runs `sweep` every `every` until `shutdown` fires.
pub fn spawn_sweeper(
    broker: ConfirmationBroker,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Confirmation sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = broker.sweep();
                    if removed > 0 {
                        info!("Swept {} expired confirmation(s)", removed);
                    }
                }
            }
        }
    })
}
