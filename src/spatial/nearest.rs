use crate::geo::{haversine_km, GeoPoint, Located};
use rayon::prelude::*;

/// Candidate sets at least this large are scanned on the rayon pool
pub const PARALLEL_THRESHOLD: usize = 4_096;

/// Closest candidate to `target` and its great-circle distance in km.
///
/// `None` means no candidate is known, which callers treat as "no station" or
/// "no venue" rather than as a failure. Equal distances resolve to the
/// earliest candidate.
pub fn nearest<T: Located + Sync>(target: GeoPoint, candidates: &[T]) -> Option<(&T, f64)> {
    if candidates.len() >= PARALLEL_THRESHOLD {
        nearest_parallel(target, candidates)
    } else {
        nearest_linear(target, candidates)
    }
}

/// Sequential linear scan tracking the minimum
pub fn nearest_linear<T: Located>(target: GeoPoint, candidates: &[T]) -> Option<(&T, f64)> {
    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let d = haversine_km(target, candidate.position());
        if best.map_or(true, |(_, best_km)| d < best_km) {
            best = Some((candidate, d));
        }
    }
    best
}

fn nearest_parallel<T: Located + Sync>(target: GeoPoint, candidates: &[T]) -> Option<(&T, f64)> {
    candidates
        .par_iter()
        .enumerate()
        .map(|(idx, c)| (idx, haversine_km(target, c.position())))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(idx, d)| (&candidates[idx], d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::demo::SplitMix;
    use crate::geo::EARTH_RADIUS_KM;

    /// Independent spherical law of cosines distance
    fn cosine_law_km(a: GeoPoint, b: GeoPoint) -> f64 {
        let (p1, p2) = (a.lat.to_radians(), b.lat.to_radians());
        let dl = (b.lon - a.lon).to_radians();
        let c = (p1.sin() * p2.sin() + p1.cos() * p2.cos() * dl.cos()).clamp(-1.0, 1.0);
        EARTH_RADIUS_KM * c.acos()
    }

    #[test]
    fn test_empty_candidates() {
        let none: [GeoPoint; 0] = [];
        assert!(nearest(GeoPoint::new(25.0, 121.5), &none).is_none());
    }

    #[test]
    fn test_matches_brute_force_minimum() {
        let mut rng = SplitMix::new(2024);
        let candidates: Vec<GeoPoint> = (0..64)
            .map(|_| GeoPoint::new(rng.range(21.9, 25.3), rng.range(120.0, 122.0)))
            .collect();
        for _ in 0..25 {
            let target = GeoPoint::new(rng.range(22.0, 25.0), rng.range(120.2, 121.8));
            let (found, km) = nearest(target, &candidates).unwrap();
            let brute = candidates
                .iter()
                .map(|c| cosine_law_km(target, *c))
                .fold(f64::INFINITY, f64::min);
            assert!((km - brute).abs() < 1e-3, "{km} vs {brute}");
            assert!((cosine_law_km(target, *found) - brute).abs() < 1e-3);
        }
    }

    #[test]
    fn test_parallel_scan_agrees_with_linear() {
        let mut rng = SplitMix::new(5);
        let candidates: Vec<GeoPoint> = (0..PARALLEL_THRESHOLD * 2)
            .map(|_| GeoPoint::new(rng.range(21.9, 25.3), rng.range(120.0, 122.0)))
            .collect();
        let target = GeoPoint::new(23.5, 121.0);
        let (a, da) = nearest(target, &candidates).unwrap();
        let (b, db) = nearest_linear(target, &candidates).unwrap();
        assert_eq!(a, b);
        assert_eq!(da, db);
    }

    #[test]
    fn test_ties_pick_first() {
        let candidates = [GeoPoint::new(25.0, 121.75), GeoPoint::new(25.0, 121.25)];
        let (found, _) = nearest(GeoPoint::new(25.0, 121.5), &candidates).unwrap();
        assert_eq!(*found, candidates[0]);
    }
}
