use crate::geo::{haversine_km, BoundingBox, GeoPoint, Located, KM_PER_DEGREE};
use std::collections::HashMap;

/// Spatial hash grid for O(1) region queries.
/// Divides the plane into square degree cells; each item is stored once,
/// in the cell holding its position.
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    /// Grid cells indexed by (lon cell, lat cell)
    cells: HashMap<(i32, i32), Vec<usize>>,
    /// All items, in insertion order (indices into this vec stored in cells)
    items: Vec<T>,
    /// Cell size in degrees
    cell_size: f64,
}

impl<T: Located> SpatialGrid<T> {
    /// Create an empty grid with given cell size in degrees
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            items: Vec::new(),
            cell_size,
        }
    }

    /// Build a grid holding every item
    pub fn build(items: impl IntoIterator<Item = T>, cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        for item in items {
            grid.insert(item);
        }
        grid
    }

    /// Convert lon/lat to cell coordinates
    #[inline(always)]
    fn to_cell(&self, point: GeoPoint) -> (i32, i32) {
        let x = (point.lon / self.cell_size).floor() as i32;
        let y = (point.lat / self.cell_size).floor() as i32;
        (x, y)
    }

    pub fn insert(&mut self, item: T) {
        let idx = self.items.len();
        let cell = self.to_cell(item.position());
        self.items.push(item);
        self.cells.entry(cell).or_default().push(idx);
    }

    /// Items inside `bbox` (closed interval), in insertion order
    pub fn query_bbox(&self, bbox: &BoundingBox) -> Vec<&T> {
        let min_cell = self.to_cell(GeoPoint::new(bbox.min_lat, bbox.min_lon));
        let max_cell = self.to_cell(GeoPoint::new(bbox.max_lat, bbox.max_lon));

        let mut indices = Vec::new();
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                if let Some(cell) = self.cells.get(&(x, y)) {
                    indices.extend(
                        cell.iter()
                            .copied()
                            .filter(|&i| bbox.contains(self.items[i].position())),
                    );
                }
            }
        }
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.items[i]).collect()
    }

    /// Closest item by great-circle distance.
    ///
    /// Searches rings of cells outward from the target. A ring at Chebyshev
    /// distance `r` only holds items at least `(r - 1) * cell_size` degrees
    /// away on one axis, so the search stops once that bound exceeds the best
    /// distance found. Ties resolve to the earliest inserted item.
    pub fn nearest(&self, target: GeoPoint) -> Option<(&T, f64)> {
        if self.items.is_empty() {
            return None;
        }
        let (cx, cy) = self.to_cell(target);
        let max_ring = self.max_ring_from((cx, cy));
        let mut best: Option<(usize, f64)> = None;

        for ring in 0..=max_ring {
            if let Some((_, best_km)) = best {
                // Lower bound for anything in this ring. Longitude degrees
                // shrink poleward, so scale by the ring's most poleward latitude.
                let min_deg = (ring - 1).max(0) as f64 * self.cell_size;
                let far_lat = (target.lat.abs() + (ring + 1) as f64 * self.cell_size).min(90.0);
                let lower_km = min_deg * KM_PER_DEGREE * far_lat.to_radians().cos() * 0.99;
                if lower_km > best_km {
                    break;
                }
            }
            for (x, y) in ring_cells(cx, cy, ring) {
                let Some(cell) = self.cells.get(&(x, y)) else {
                    continue;
                };
                for &idx in cell {
                    let d = haversine_km(target, self.items[idx].position());
                    let better = match best {
                        None => true,
                        Some((best_idx, best_km)) => d < best_km || (d == best_km && idx < best_idx),
                    };
                    if better {
                        best = Some((idx, d));
                    }
                }
            }
        }

        best.map(|(idx, d)| (&self.items[idx], d))
    }

    /// Ring radius that covers every occupied cell
    fn max_ring_from(&self, (cx, cy): (i32, i32)) -> i32 {
        self.cells
            .keys()
            .map(|&(x, y)| (x - cx).abs().max((y - cy).abs()))
            .max()
            .unwrap_or(0)
    }

    /// Get item by index
    #[inline(always)]
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx)
    }

    /// Get all items
    #[inline(always)]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of items
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cells on the square ring at Chebyshev distance `r` around (cx, cy)
fn ring_cells(cx: i32, cy: i32, r: i32) -> impl Iterator<Item = (i32, i32)> {
    let side = if r == 0 { 1 } else { 2 * r + 1 };
    (0..side).flat_map(move |j| {
        let y = cy - r + j;
        let edge_row = r == 0 || j == 0 || j == side - 1;
        let xs: Vec<i32> = if edge_row {
            (cx - r..=cx + r).collect()
        } else {
            vec![cx - r, cx + r]
        };
        xs.into_iter().map(move |x| (x, y))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::demo::SplitMix;
    use crate::spatial::nearest::nearest_linear;

    #[test]
    fn test_ring_cells_counts() {
        assert_eq!(ring_cells(0, 0, 0).count(), 1);
        assert_eq!(ring_cells(0, 0, 1).count(), 8);
        assert_eq!(ring_cells(5, -3, 2).count(), 16);
    }

    #[test]
    fn test_query_bbox_matches_scan() {
        let mut rng = SplitMix::new(7);
        let points: Vec<GeoPoint> = (0..500)
            .map(|_| GeoPoint::new(rng.range(22.0, 25.5), rng.range(120.0, 122.0)))
            .collect();
        let grid = SpatialGrid::build(points.clone(), 0.05);
        let bbox = BoundingBox {
            min_lat: 23.0,
            max_lat: 24.1,
            min_lon: 120.5,
            max_lon: 121.3,
        };
        let from_grid: Vec<GeoPoint> = grid.query_bbox(&bbox).into_iter().copied().collect();
        let scanned: Vec<GeoPoint> = points.into_iter().filter(|p| bbox.contains(*p)).collect();
        assert_eq!(from_grid, scanned);
    }

    #[test]
    fn test_nearest_matches_linear_scan() {
        let mut rng = SplitMix::new(99);
        let stations: Vec<GeoPoint> = (0..300)
            .map(|_| GeoPoint::new(rng.range(21.9, 25.3), rng.range(120.0, 122.0)))
            .collect();
        let grid = SpatialGrid::build(stations.clone(), 0.1);
        for _ in 0..50 {
            let target = GeoPoint::new(rng.range(21.0, 26.0), rng.range(119.0, 123.0));
            let (_, grid_km) = grid.nearest(target).unwrap();
            let (_, linear_km) = nearest_linear(target, &stations).unwrap();
            assert!((grid_km - linear_km).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_grid_has_no_nearest() {
        let grid: SpatialGrid<GeoPoint> = SpatialGrid::new(0.1);
        assert!(grid.nearest(GeoPoint::new(25.0, 121.5)).is_none());
        assert!(grid.is_empty());
    }
}
