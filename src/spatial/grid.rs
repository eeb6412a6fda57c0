use crate::geo::{bucket_key, bucket_value, Located};
use crate::model::GridCell;
use rayon::prelude::*;
use std::collections::HashMap;

/// Default bucket precision: two decimal digits, cells of about 1.1 km
pub const DEFAULT_PRECISION: u32 = 2;

/// Hotspot precision: three decimal digits, cells of about 110 m
pub const HOTSPOT_PRECISION: u32 = 3;

/// Inputs at least this large are counted on the rayon pool
pub const PARALLEL_THRESHOLD: usize = 50_000;

type CellCounts = HashMap<(i64, i64), u64>;

/// Bucket records by rounded coordinates and count each bucket.
///
/// Single pass over the input. The sum of all counts equals `records.len()`.
/// Cells come back sorted by key so equal inputs give equal outputs.
pub fn aggregate<T: Located + Sync>(records: &[T], precision: u32) -> Vec<GridCell> {
    let counts = if records.len() >= PARALLEL_THRESHOLD {
        records
            .par_iter()
            .fold(CellCounts::new, |mut acc, r| {
                *acc.entry(key_of(r, precision)).or_insert(0) += 1;
                acc
            })
            .reduce(CellCounts::new, merge)
    } else {
        let mut acc = CellCounts::new();
        for r in records {
            *acc.entry(key_of(r, precision)).or_insert(0) += 1;
        }
        acc
    };

    let mut cells: Vec<GridCell> = counts
        .into_iter()
        .map(|((lat, lon), count)| GridCell {
            lat_bucket: bucket_value(lat, precision),
            lon_bucket: bucket_value(lon, precision),
            count,
        })
        .collect();
    cells.sort_unstable_by(|a, b| {
        a.lat_bucket
            .total_cmp(&b.lat_bucket)
            .then(a.lon_bucket.total_cmp(&b.lon_bucket))
    });
    cells
}

#[inline(always)]
fn key_of<T: Located>(record: &T, precision: u32) -> (i64, i64) {
    let p = record.position();
    (bucket_key(p.lat, precision), bucket_key(p.lon, precision))
}

fn merge(mut a: CellCounts, b: CellCounts) -> CellCounts {
    if a.len() < b.len() {
        return merge(b, a);
    }
    for (key, count) in b {
        *a.entry(key).or_insert(0) += count;
    }
    a
}

/// The `n` busiest cells, busiest first; ties by coordinate
pub fn top_cells(cells: &[GridCell], n: usize) -> Vec<GridCell> {
    let mut sorted = cells.to_vec();
    sorted.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.lat_bucket.total_cmp(&b.lat_bucket))
            .then(a.lon_bucket.total_cmp(&b.lon_bucket))
    });
    sorted.truncate(n);
    sorted
}

/// Total records represented by `cells`
pub fn total_count(cells: &[GridCell]) -> u64 {
    cells.iter().map(|c| c.count).sum()
}
