//! Pixel-center coordinate grids.

use ndarray::{Array3, ArrayView3};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Per-pixel coordinates for a `width` x `height` image.
///
/// Channel 0 holds `x + 0.5`, channel 1 holds `y + 0.5`: coordinates refer to
/// pixel centers, not top-left corners.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    coords: Array3<f32>,
}

impl PixelGrid {
    pub fn new(width: usize, height: usize) -> Self {
        let coords = Array3::from_shape_fn((2, height, width), |(c, y, x)| {
            let v = if c == 0 { x } else { y };
            v as f32 + 0.5
        });
        Self {
            width,
            height,
            coords,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.coords.view()
    }

    pub fn to_feature_map(&self) -> Array3<f32> {
        self.coords.clone()
    }
}

/// Caller-owned cache of immutable grids keyed by `(width, height)`.
///
/// Each entry is built for exactly its key and never mutated afterwards, so
/// callers on different threads asking for different sizes never observe each
/// other's grid.
#[derive(Debug, Default)]
pub struct GridCache {
    grids: RwLock<HashMap<(usize, usize), Arc<PixelGrid>>>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid for `width` x `height`, built on first use.
    pub fn get(&self, width: usize, height: usize) -> Arc<PixelGrid> {
        let key = (width, height);
        if let Ok(grids) = self.grids.read() {
            if let Some(grid) = grids.get(&key) {
                return Arc::clone(grid);
            }
        }

        let grid = Arc::new(PixelGrid::new(width, height));
        match self.grids.write() {
            Ok(mut grids) => {
                trace!("Caching pixel grid {}x{}", width, height);
                Arc::clone(grids.entry(key).or_insert(grid))
            }
            // A poisoned lock only loses caching; the grid itself is still correct.
            Err(_) => grid,
        }
    }

    /// Number of cached sizes.
    pub fn len(&self) -> usize {
        self.grids.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut grids) = self.grids.write() {
            grids.clear();
        }
    }
}
