/*!
 * Registry Builder
 * Builder pattern for Registry construction
 */

use super::manager::Registry;
use crate::core::types::VmResult;
use crate::topology::{DiscoveryConfig, TopologyDiscovery};
use crate::transport::{LocalTransport, Transport};
use std::sync::Arc;
use tracing::info;

/// Builder for Registry
pub struct RegistryBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: DiscoveryConfig,
}

impl RegistryBuilder {
    /// Create a new Registry builder
    pub fn new() -> Self {
        Self {
            transport: None,
            config: DiscoveryConfig::default(),
        }
    }

    /// Use `transport` instead of the in-process one
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Share an existing transport
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Hardware overrides applied at bring-up
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Load hardware overrides from `PETVM_*` variables
    pub fn with_env_config(mut self) -> VmResult<Self> {
        self.config = DiscoveryConfig::from_env()?;
        Ok(self)
    }

    /// Build the Registry
    pub fn build(self) -> Registry {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(LocalTransport::new()));

        info!(
            transport = transport.name(),
            images = ?self.config.images,
            pes_per_image = ?self.config.pes_per_image,
            "Registry configured"
        );

        Registry::from_parts(transport, TopologyDiscovery::new(self.config))
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
