use ndarray::ArrayView2;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;

/// 8-connected foreground region of a mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub bbox: BBox,
    /// foreground pixel count
    pub area: u32,
}

impl Blob {
    /// Share of the bounding box covered by foreground pixels
    #[inline]
    pub fn solidity(&self) -> f32 {
        self.area as f32 / self.bbox.area().max(1) as f32
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.bbox.aspect_ratio()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct BlobFilterConfig {
    pub min_area: u32,
    pub min_solidity: f32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for BlobFilterConfig {
    fn default() -> Self {
        Self {
            min_area: 800,
            min_solidity: 0.4,
            min_aspect: 0.2,
            max_aspect: 5.0,
        }
    }
}

impl BlobFilterConfig {
    pub fn accepts(&self, blob: &Blob) -> bool {
        if blob.area < self.min_area {
            return false;
        }

        // sparse, noisy regions
        if blob.solidity() < self.min_solidity {
            return false;
        }

        let aspect = blob.aspect();
        aspect >= self.min_aspect && aspect <= self.max_aspect
    }
}

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Labels 8-connected regions of non-zero pixels.
///
/// Regions come out in raster order of their first pixel.
pub fn find_blobs(mask: ArrayView2<'_, u8>) -> Vec<Blob> {
    let (rows, cols) = mask.dim();
    let mut visited = vec![false; rows * cols];
    let mut stack = Vec::new();
    let mut blobs = Vec::new();

    for (r0, c0) in (0..rows).flat_map(|r| (0..cols).map(move |c| (r, c))) {
        if mask[[r0, c0]] == 0 || visited[r0 * cols + c0] {
            continue;
        }

        visited[r0 * cols + c0] = true;
        stack.push((r0, c0));

        let mut area = 0u32;
        let (mut top, mut bottom, mut left, mut right) = (r0, r0, c0, c0);

        while let Some((r, c)) = stack.pop() {
            area += 1;
            top = top.min(r);
            bottom = bottom.max(r);
            left = left.min(c);
            right = right.max(c);

            for (dr, dc) in NEIGHBOURS {
                let (nr, nc) = (r as isize + dr, c as isize + dc);
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }

                let (nr, nc) = (nr as usize, nc as usize);
                if mask[[nr, nc]] != 0 && !visited[nr * cols + nc] {
                    visited[nr * cols + nc] = true;
                    stack.push((nr, nc));
                }
            }
        }

        blobs.push(Blob {
            bbox: BBox::ltrb(left as i32, top as i32, right as i32 + 1, bottom as i32 + 1),
            area,
        });
    }

    blobs
}

pub struct BlobFilter {
    config: BlobFilterConfig,
}

impl BlobFilter {
    pub fn new(config: BlobFilterConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &BlobFilterConfig {
        &self.config
    }

    /// Boxes of the regions that pass the area and shape checks
    pub fn apply(&self, mask: ArrayView2<'_, u8>) -> Vec<BBox> {
        find_blobs(mask)
            .into_iter()
            .filter(|b| self.config.accepts(b))
            .map(|b| b.bbox)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2};

    fn mask_with(rects: &[(usize, usize, usize, usize)]) -> Array2<u8> {
        let mut mask = Array2::zeros((60, 80));
        for &(x, y, w, h) in rects {
            mask.slice_mut(s![y..y + h, x..x + w]).fill(255);
        }
        mask
    }

    #[test]
    fn finds_separate_regions_in_raster_order() {
        let mask = mask_with(&[(40, 2, 5, 5), (1, 10, 10, 4)]);
        let blobs = find_blobs(mask.view());

        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].bbox, BBox::ltwh(40, 2, 5, 5));
        assert_eq!(blobs[0].area, 25);
        assert_eq!(blobs[1].bbox, BBox::ltwh(1, 10, 10, 4));
        assert_eq!(blobs[1].area, 40);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut mask = Array2::zeros((5, 5));
        mask[[0, 0]] = 1;
        mask[[1, 1]] = 1;
        mask[[2, 2]] = 1;

        let blobs = find_blobs(mask.view());
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].bbox, BBox::ltwh(0, 0, 3, 3));
        assert_eq!(blobs[0].area, 3);
        assert!((blobs[0].solidity() - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_small_sparse_and_sliver_regions() {
        let config = BlobFilterConfig {
            min_area: 20,
            ..Default::default()
        };
        let filter = BlobFilter::new(config);

        // small, sliver (aspect 30 / 1), good
        let mask = mask_with(&[(0, 0, 3, 3), (0, 20, 30, 1), (50, 30, 10, 10)]);
        assert_eq!(filter.apply(mask.view()), vec![BBox::ltwh(50, 30, 10, 10)]);

        let mut sparse = Array2::zeros((20, 20));
        for i in 0..20 {
            sparse[[i, i]] = 255;
            sparse[[i, 19 - i]] = 255;
        }
        assert!(filter.apply(sparse.view()).is_empty());
    }

    #[test]
    fn empty_mask_has_no_blobs() {
        let mask = Array2::<u8>::zeros((10, 10));
        assert!(find_blobs(mask.view()).is_empty());
    }
}
