//! Shared bot state

use std::sync::Arc;

use crate::cloud::{ComputeProvider, MemoryCloud};
use crate::config::BotConfig;
use crate::registry::CommandRegistry;
use crate::rota::{MemorySheet, RotaService};

/// Everything a command handler can reach
pub struct SharedState {
    pub config: BotConfig,
    pub registry: CommandRegistry,
    pub aws: Arc<dyn ComputeProvider>,
    pub openstack: Arc<dyn ComputeProvider>,
    pub rota: RotaService,
}

impl SharedState {
    /// State backed by in-process clouds and an in-process rota sheet
    pub fn in_memory(config: BotConfig) -> Self {
        Self {
            config,
            registry: CommandRegistry::with_defaults(),
            aws: Arc::new(MemoryCloud::aws()),
            openstack: Arc::new(MemoryCloud::openstack()),
            rota: RotaService::new(Arc::new(MemorySheet::new())),
        }
    }
}
