use crate::geo::{bbox, BoundingBox, GeoPoint, Located};

/// Records inside `bounds`, preserving input order
pub fn within<'a, T: Located>(records: &'a [T], bounds: &BoundingBox) -> Vec<&'a T> {
    records
        .iter()
        .filter(|r| bounds.contains(r.position()))
        .collect()
}

/// Records inside the square of half-width `radius_km` around `center`
pub fn around<'a, T: Located>(records: &'a [T], center: GeoPoint, radius_km: f64) -> Vec<&'a T> {
    within(records, &bbox(center, radius_km))
}

/// How many records fall inside `bounds`
pub fn count_within<T: Located>(records: &[T], bounds: &BoundingBox) -> usize {
    records.iter().filter(|r| bounds.contains(r.position())).count()
}
