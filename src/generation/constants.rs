//! Generation constants loaded once from configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;

/// Parameters controlling terrain generation.
///
/// Loaded once at startup and invariant for the lifetime of a
/// [`GenerationContext`](crate::generation::GenerationContext). The fractal
/// noise parameters feed the heightfield kernel directly; the width constants
/// size every device buffer in the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationConstants {
    /// FBM lacunarity (frequency multiplier per octave, 2.0 typical)
    pub lacunarity: f32,
    /// FBM gain (amplitude multiplier per octave; 0 yields a flat field)
    pub gain: f32,
    /// FBM octaves (detail levels)
    pub octaves: u32,
    /// Noise domain offset
    pub offset: f32,
    /// Horizontal noise scale (larger = smoother)
    pub horizontal_scale: f32,
    /// Vertical scale (max height)
    pub vertical_scale: f32,
    /// Width of one grid cell in meters
    pub block_width: f32,
    /// Chunk width in blocks; must be a power of two
    pub chunk_width_in_blocks: u32,
}

impl Default for GenerationConstants {
    fn default() -> Self {
        Self {
            lacunarity: 2.0,
            gain: 0.5,
            octaves: 5,
            offset: 0.0,
            horizontal_scale: 150.0,
            vertical_scale: 80.0,
            block_width: 2.0,
            chunk_width_in_blocks: 64,
        }
    }
}

impl GenerationConstants {
    /// Load constants from a JSON config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        let constants: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        constants.validate()?;
        Ok(constants)
    }

    /// Validate width constants against what the quadtree passes require.
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_width_in_blocks < 2 || !self.chunk_width_in_blocks.is_power_of_two() {
            return Err(Error::Config(format!(
                "chunk_width_in_blocks must be a power of two >= 2, got {}",
                self.chunk_width_in_blocks
            )));
        }
        if self.block_width <= 0.0 {
            return Err(Error::Config(format!(
                "block_width must be positive, got {}",
                self.block_width
            )));
        }
        Ok(())
    }

    /// Vertices per chunk side (one more than blocks per side).
    pub fn chunk_width_in_verts(&self) -> u32 {
        self.chunk_width_in_blocks + 1
    }

    /// Total vertices in one chunk grid.
    pub fn vertex_count(&self) -> u32 {
        let verts = self.chunk_width_in_verts();
        verts * verts
    }

    /// Width of one chunk in meters.
    pub fn chunk_width_in_meters(&self) -> f32 {
        self.block_width * self.chunk_width_in_blocks as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = GenerationConstants::default();
        assert_eq!(c.lacunarity, 2.0);
        assert_eq!(c.gain, 0.5);
        assert_eq!(c.octaves, 5);
        assert_eq!(c.chunk_width_in_blocks, 64);
        assert_eq!(c.chunk_width_in_verts(), 65);
        assert_eq!(c.vertex_count(), 65 * 65);
        c.validate().unwrap();
    }

    #[test]
    fn test_scenario_widths() {
        let c = GenerationConstants {
            chunk_width_in_blocks: 8,
            ..Default::default()
        };
        assert_eq!(c.chunk_width_in_verts(), 9);
        assert_eq!(c.vertex_count(), 81);
    }

    #[test]
    fn test_validate_rejects_non_power_of_two() {
        let c = GenerationConstants {
            chunk_width_in_blocks: 48,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = GenerationConstants {
            chunk_width_in_blocks: 1,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let c = GenerationConstants {
            gain: 0.42,
            octaves: 7,
            chunk_width_in_blocks: 32,
            ..Default::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: GenerationConstants = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generation.json");
        let c = GenerationConstants::default();
        std::fs::write(&path, serde_json::to_string_pretty(&c).unwrap()).unwrap();

        let loaded = GenerationConstants::load(&path).unwrap();
        assert_eq!(loaded, c);

        assert!(GenerationConstants::load(&dir.path().join("missing.json")).is_err());
    }
}
