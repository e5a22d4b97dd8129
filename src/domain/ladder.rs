//! Resolution ladder and rendition planning.

use crate::error::PlanError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Minimum accepted source dimension (on the shorter side).
pub const MIN_SOURCE_DIMENSION: u32 = 360;

/// `(reference height, target width)` per tier, ascending.
pub const LADDER: [(u32, u32); 6] = [
    (360, 640),
    (480, 854),
    (720, 1280),
    (1080, 1920),
    (1620, 2880),
    (2430, 4320),
];

/// One target-resolution variant of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendition {
    pub directory: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Rendition {
    /// Directory and folder name, e.g. `720p`.
    pub fn name(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Renditions to produce for a source, strictly ascending by height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionPlan {
    renditions: Vec<Rendition>,
}

impl RenditionPlan {
    /// Include every tier whose reference height fits in the source, and
    /// always the lowest tier.
    pub fn for_source(width: u32, height: u32, base_dir: &Path) -> Result<Self, PlanError> {
        if width == 0 || height == 0 {
            return Err(PlanError::InvalidDimensions { width, height });
        }

        let renditions = LADDER
            .iter()
            .enumerate()
            .filter(|(rank, (tier_height, _))| *rank == 0 || *tier_height <= height)
            .map(|(_, &(tier_height, tier_width))| Rendition {
                directory: base_dir.join(format!("{}p", tier_height)),
                width: tier_width,
                height: tier_height,
            })
            .collect();

        Ok(Self { renditions })
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    pub fn len(&self) -> usize {
        self.renditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renditions.is_empty()
    }
}

impl IntoIterator for RenditionPlan {
    type Item = Rendition;
    type IntoIter = std::vec::IntoIter<Rendition>;

    fn into_iter(self) -> Self::IntoIter {
        self.renditions.into_iter()
    }
}
