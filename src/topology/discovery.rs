/*!
 * Topology Discovery
 *
 * Probes the host once per bring-up and produces the `Topology` the Global
 * VM is built from. Hardware detection can be overridden per field through
 * `DiscoveryConfig`, either with builder methods or `PETVM_*` variables.
 */

use super::types::Topology;
use crate::core::errors::VmError;
use crate::core::limits::{
    ENV_IMAGES, ENV_PES_PER_IMAGE, ENV_THREAD_COMPAT, FALLBACK_PES, MAX_IMAGES, MAX_PES_PER_IMAGE,
};
use crate::core::serde::is_none;
use crate::core::types::VmResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Overrides applied on top of detected hardware
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DiscoveryConfig {
    /// Number of shared-memory images (default 1)
    #[serde(skip_serializing_if = "is_none")]
    pub images: Option<usize>,
    /// Cores per image (default: detected parallelism split across images)
    #[serde(skip_serializing_if = "is_none")]
    pub pes_per_image: Option<usize>,
    /// Whether the Global VM permits nested threading
    pub thread_compat: bool,
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_images(mut self, images: usize) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_pes_per_image(mut self, pes: usize) -> Self {
        self.pes_per_image = Some(pes);
        self
    }

    pub fn with_thread_compat(mut self, enabled: bool) -> Self {
        self.thread_compat = enabled;
        self
    }

    /// Read overrides from the environment
    ///
    /// Environment variables:
    /// - PETVM_IMAGES: number of images
    /// - PETVM_PES_PER_IMAGE: cores per image
    /// - PETVM_THREAD_COMPAT: `1`/`true` to permit nested threading
    pub fn from_env() -> VmResult<Self> {
        let images = read_count(ENV_IMAGES)?;
        let pes_per_image = read_count(ENV_PES_PER_IMAGE)?;
        let thread_compat = std::env::var(ENV_THREAD_COMPAT)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            images,
            pes_per_image,
            thread_compat,
        })
    }

    /// Check overrides against topology limits
    pub fn validate(&self) -> VmResult<()> {
        if let Some(images) = self.images {
            if images == 0 || images > MAX_IMAGES {
                return Err(VmError::Config(format!(
                    "images must be in 1..={}, got {}",
                    MAX_IMAGES, images
                )));
            }
        }
        if let Some(pes) = self.pes_per_image {
            if pes == 0 || pes > MAX_PES_PER_IMAGE {
                return Err(VmError::Config(format!(
                    "pes_per_image must be in 1..={}, got {}",
                    MAX_PES_PER_IMAGE, pes
                )));
            }
        }
        Ok(())
    }
}

fn read_count(var: &str) -> VmResult<Option<usize>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| VmError::Config(format!("{}={:?}: {}", var, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Hardware probe run at bring-up
#[derive(Debug, Clone, Default)]
pub struct TopologyDiscovery {
    config: DiscoveryConfig,
}

impl TopologyDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Detected hardware parallelism of this host
    pub fn detect_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|e| {
                warn!(error = %e, fallback = FALLBACK_PES, "Failed to detect CPU count");
                FALLBACK_PES
            })
    }

    /// Probe the host and apply overrides
    pub fn discover(&self) -> VmResult<Topology> {
        self.config.validate()?;

        let images = self.config.images.unwrap_or(1);
        let pes_per_image = match self.config.pes_per_image {
            Some(pes) => pes,
            None => {
                let detected = Self::detect_parallelism();
                debug!(detected, images, "Splitting detected cores across images");
                (detected / images).clamp(1, MAX_PES_PER_IMAGE)
            }
        };

        let topology =
            Topology::uniform(images, pes_per_image).with_thread_compat(self.config.thread_compat);

        info!(
            images = topology.image_count(),
            pes = topology.pe_count(),
            thread_compat = topology.thread_compat,
            "Topology discovered"
        );

        Ok(topology)
    }
}
