//! Star-shaped polygon synthesis around a centre point.
//!
//! Vertex `i` of `n` is placed at angle `i·2π/n + δ` with `|δ| <= jitter`
//! and radius in `[radial_min, radial_max]·base_size`. As long as
//! `2·jitter < 2π/n` every vertex stays inside its own angular sector, so the
//! ring is monotonic in angle and therefore simple.

use std::f64::consts::TAU;

use rand::Rng;

use crate::config::SynthesisConfig;
use crate::geo::LatLng;

#[derive(Debug, Clone)]
pub struct PolygonSynthesizer {
    min_vertices: usize,
    max_vertices: usize,
    angular_jitter: f64,
    radial_min: f64,
    radial_max: f64,
}

impl Default for PolygonSynthesizer {
    fn default() -> Self {
        Self {
            min_vertices: 4,
            max_vertices: 6,
            angular_jitter: 0.25,
            radial_min: 0.7,
            radial_max: 1.3,
        }
    }
}

impl PolygonSynthesizer {
    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self {
            min_vertices: config.min_vertices,
            max_vertices: config.max_vertices,
            angular_jitter: config.angular_jitter,
            radial_min: config.radial_min,
            radial_max: config.radial_max,
        }
    }

    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        center: LatLng,
        base_size: f64,
        rng: &mut R,
    ) -> Vec<LatLng> {
        let n = rng.gen_range(self.min_vertices..=self.max_vertices);
        let step = TAU / n as f64;
        (0..n)
            .map(|i| {
                let jitter = rng.gen_range(-self.angular_jitter..=self.angular_jitter);
                let angle = step * i as f64 + jitter;
                let distance = base_size * rng.gen_range(self.radial_min..=self.radial_max);
                LatLng::new(
                    center.lat + angle.cos() * distance,
                    center.lng + angle.sin() * distance,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn angle_from(center: LatLng, p: LatLng) -> f64 {
        let a = (p.lng - center.lng).atan2(p.lat - center.lat);
        if a < -0.5 {
            a + TAU
        } else {
            a
        }
    }

    #[test]
    fn vertex_count_and_radius_are_bounded() {
        let synth = PolygonSynthesizer::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let center = LatLng::new(-12.05, -77.04);
        for _ in 0..200 {
            let ring = synth.synthesize(center, 0.001, &mut rng);
            assert!((4..=6).contains(&ring.len()));
            for p in &ring {
                let r = center.distance(p);
                assert!(r >= 0.0007 - 1e-12 && r <= 0.0013 + 1e-12, "radius {r}");
            }
        }
    }

    #[test]
    fn vertices_increase_in_angle() {
        let synth = PolygonSynthesizer::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let center = LatLng::new(0.0, 0.0);
        for _ in 0..200 {
            let ring = synth.synthesize(center, 1.0, &mut rng);
            let angles: Vec<f64> = ring.iter().map(|p| angle_from(center, *p)).collect();
            assert!(angles.windows(2).all(|w| w[0] < w[1]), "{angles:?}");
        }
    }

    #[test]
    fn same_seed_same_geometry() {
        let synth = PolygonSynthesizer::default();
        let center = LatLng::new(1.0, 2.0);
        let a = synth.synthesize(center, 0.5, &mut ChaCha8Rng::seed_from_u64(99));
        let b = synth.synthesize(center, 0.5, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
