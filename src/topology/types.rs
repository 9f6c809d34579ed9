/*!
 * Topology Types
 * Discovered hardware layout of the host
 */

use crate::core::types::{ImageId, PeId};
use serde::{Deserialize, Serialize};

/// One shared-memory image and the cores it hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImageInfo {
    pub id: ImageId,
    pub cores: usize,
}

impl ImageInfo {
    /// Processing elements of this image in core order
    pub fn pes(&self) -> impl Iterator<Item = PeId> + '_ {
        (0..self.cores).map(move |core| PeId::new(self.id, core))
    }
}

/// Hardware topology produced once per bring-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Topology {
    pub images: Vec<ImageInfo>,
    /// Whether the Global VM permits nested thread-level parallelism
    pub thread_compat: bool,
}

impl Topology {
    /// Build a topology of `images` identical images
    pub fn uniform(images: usize, cores_per_image: usize) -> Self {
        Self {
            images: (0..images)
                .map(|id| ImageInfo {
                    id,
                    cores: cores_per_image,
                })
                .collect(),
            thread_compat: false,
        }
    }

    pub fn with_thread_compat(mut self, thread_compat: bool) -> Self {
        self.thread_compat = thread_compat;
        self
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Total processing elements across all images
    pub fn pe_count(&self) -> usize {
        self.images.iter().map(|img| img.cores).sum()
    }

    /// All processing elements, image-major
    pub fn pes(&self) -> impl Iterator<Item = PeId> + '_ {
        self.images.iter().flat_map(ImageInfo::pes)
    }
}
