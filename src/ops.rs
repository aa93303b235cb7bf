//! Core operations shared by the command handlers
//!
//! Async functions over providers that return `Result<T>`.
//! No formatting - callers decide how to present results.

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::cloud::{ComputeProvider, InstanceFilter, KeyPair, LifecycleChange};
use crate::params::Params;

/// Whether to mint a fresh keypair or reuse the user's current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOption {
    New,
    Existing,
}

impl KeyOption {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "new" => Some(KeyOption::New),
            "existing" => Some(KeyOption::Existing),
            _ => None,
        }
    }
}

/// Result of keypair selection
#[derive(Debug, Clone)]
pub struct KeySelection {
    pub key: KeyPair,
    /// True when the key was just created (material is set)
    pub created: bool,
}

/// Pick the keypair for a new VM. Each user has one key per cloud, named
/// after their user id.
///
/// `New` replaces any existing key. `Existing` yields `None` when the user
/// has no key yet.
pub async fn select_keypair(
    provider: &dyn ComputeProvider,
    user: &str,
    option: KeyOption,
) -> Result<Option<KeySelection>> {
    let existing = provider
        .describe_keypair(user)
        .await
        .context("failed to look up keypair")?;
    debug!(user, found = existing.is_some(), "existing keypair lookup");

    match option {
        KeyOption::New => {
            if existing.is_some() {
                let deleted = provider
                    .delete_keypair(user)
                    .await
                    .context("failed to delete old keypair")?;
                if !deleted {
                    bail!("old keypair for {} could not be deleted", user);
                }
                debug!(user, "deleted old keypair");
            }
            let key = provider
                .create_keypair(user)
                .await
                .context("failed to create keypair")?;
            info!(
                user,
                cloud = provider.label(),
                fingerprint = %key.fingerprint,
                "created keypair"
            );
            Ok(Some(KeySelection { key, created: true }))
        }
        KeyOption::Existing => Ok(existing.map(|key| KeySelection {
            key,
            created: false,
        })),
    }
}

/// Lifecycle actions on an existing VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyAction {
    Stop,
    Start,
    Delete,
}

impl ModifyAction {
    pub fn flag(&self) -> &'static str {
        match self {
            ModifyAction::Stop => "stop",
            ModifyAction::Start => "start",
            ModifyAction::Delete => "delete",
        }
    }

    /// Actions given as flags, restricted to `allowed`
    pub fn requested(params: &Params, allowed: &[ModifyAction]) -> Vec<ModifyAction> {
        allowed
            .iter()
            .copied()
            .filter(|action| params.flag(action.flag()))
            .collect()
    }
}

pub async fn modify_instance(
    provider: &dyn ComputeProvider,
    id: &str,
    action: ModifyAction,
) -> Result<LifecycleChange> {
    let change = match action {
        ModifyAction::Stop => provider.stop_instance(id).await,
        ModifyAction::Start => provider.start_instance(id).await,
        ModifyAction::Delete => provider.delete_instance(id).await,
    };
    change.with_context(|| format!("failed to {} {}", action.flag(), id))
}

/// Build an AWS list filter from `--state`, `--type`, `--instance-ids`
pub fn aws_filter(params: &Params) -> InstanceFilter {
    InstanceFilter {
        states: params.list_values("state"),
        types: params.list_values("type"),
        ids: params.list_values("instance-ids"),
    }
}
