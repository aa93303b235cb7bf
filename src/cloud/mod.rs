//! Compute provider seam
//!
//! Commands talk to AWS and OpenStack through [`ComputeProvider`]. SDK-backed
//! implementations live outside this crate; [`MemoryCloud`] backs tests and
//! dry runs.

mod memory;

pub use memory::{MemoryCloud, StateNames};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("instance {0} not found")]
    NotFound(String),
    #[error("instance {id} is {state}, cannot {action}")]
    InvalidState {
        id: String,
        state: String,
        action: &'static str,
    },
    #[error("keypair {0} already exists")]
    KeyPairExists(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A VM as seen by list/create
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    /// EC2 instance type or OpenStack flavor
    pub instance_type: String,
    /// EC2 state name or OpenStack status
    pub state: String,
    pub key_name: Option<String>,
    pub network: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

impl Instance {
    /// Look up a display column by name
    ///
    /// Accepts both AWS and OpenStack column names (`instance_id`/`server_id`,
    /// `instance_type`/`flavor`, `state`/`status`).
    pub fn field(&self, column: &str) -> Option<String> {
        match column {
            "instance_id" | "server_id" | "id" => Some(self.id.clone()),
            "name" => Some(self.name.clone()),
            "instance_type" | "flavor" => Some(self.instance_type.clone()),
            "state" | "status" => Some(self.state.clone()),
            "key_name" => self.key_name.clone(),
            "network" => self.network.clone(),
            "public_ip" => self.public_ip.clone(),
            "private_ip" => self.private_ip.clone(),
            _ => None,
        }
    }
}

/// List filter; an empty list means "don't filter on this"
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub states: Vec<String>,
    pub types: Vec<String>,
    pub ids: Vec<String>,
}

impl InstanceFilter {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.types.is_empty() && self.ids.is_empty()
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        (self.states.is_empty()
            || self
                .states
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&instance.state)))
            && (self.types.is_empty() || self.types.contains(&instance.instance_type))
            && (self.ids.is_empty() || self.ids.contains(&instance.id))
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: Option<String>,
    pub image: String,
    pub instance_type: String,
    pub key_name: String,
    pub network: Option<String>,
}

/// Outcome of a stop/start/delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleChange {
    pub id: String,
    pub name: String,
    pub previous_state: String,
    pub current_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub name: String,
    pub fingerprint: String,
    /// Private key, only present right after creation
    pub material: Option<String>,
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Human-readable cloud name ("AWS", "OpenStack")
    fn label(&self) -> &str;

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, CloudError>;

    async fn create_instance(&self, request: &CreateRequest) -> Result<Instance, CloudError>;

    async fn stop_instance(&self, id: &str) -> Result<LifecycleChange, CloudError>;

    async fn start_instance(&self, id: &str) -> Result<LifecycleChange, CloudError>;

    async fn delete_instance(&self, id: &str) -> Result<LifecycleChange, CloudError>;

    async fn describe_keypair(&self, name: &str) -> Result<Option<KeyPair>, CloudError>;

    async fn create_keypair(&self, name: &str) -> Result<KeyPair, CloudError>;

    /// Returns false if there was nothing to delete
    async fn delete_keypair(&self, name: &str) -> Result<bool, CloudError>;
}
