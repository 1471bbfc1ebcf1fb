//! Node data shared by the element layer and the contact geometry.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A node in reference configuration. Unused trailing coordinates are zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node index (0-based, equals its position in the node list)
    pub id: usize,
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Node {
    pub fn new(id: usize, x: f64, y: f64, z: f64) -> Self {
        Self { id, x, y, z }
    }

    /// Get coordinates as an array
    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// In-plane coordinates.
    pub fn planar(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}
