//! Cylinder geometry derived from the cloud bounds, and the ring-major probe lattice on it.

use std::f64::consts::PI;

use nalgebra::{Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};
use shellscan_core::{Aabb, SampleError};

use crate::SampleConfig;

/// Scaffold radius multiplier over the half major diameter. Observable in results; not a tunable.
pub const INFLATION: f64 = 1.1;

/// Decimal places kept on probe x/y before querying.
pub const PROBE_XY_DECIMALS: i32 = 3;

/// Round half away from zero to [`PROBE_XY_DECIMALS`] places, judged on `v` itself.
///
/// `v * scale` can land exactly on a half even though `v` sits just below it;
/// the fused residual tells which side `v` really is on.
#[inline]
pub fn round_dp3(v: f64) -> f64 {
    let scale = 10f64.powi(PROBE_XY_DECIMALS);
    let p = v * scale;
    let err = v.mul_add(scale, -p);
    let r = if p.fract().abs() == 0.5 && err != 0.0 && (err < 0.0) != (p < 0.0) {
        p.trunc()
    } else {
        p.round()
    };
    r / scale
}

/// z-aligned sampling cylinder. Only the major xy diameter feeds the radius.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CylinderParams {
    pub center: [f64; 2],
    pub ground_z: f64,
    pub element_height: f64,
    pub radius: f64,
}

impl CylinderParams {
    pub fn from_aabb(bounds: &Aabb, cfg: &SampleConfig) -> Result<Self, SampleError> {
        cfg.validate()?;
        let e = bounds.extents();
        let c = bounds.center();
        let major_diameter = e.dx.max(e.dy);
        Ok(Self {
            center: [c[0], c[1]],
            ground_z: bounds.min[2],
            element_height: e.dz / cfg.sample_along as f64,
            radius: major_diameter / 2.0 * INFLATION,
        })
    }

    /// Height of ring `k`, counted from the bottom.
    #[inline]
    pub fn ring_z(&self, k: usize) -> f64 { self.ground_z + self.element_height * k as f64 }

    /// Unrounded point on the scaffold at ring `k`, angle `theta` (radians, CCW from +x).
    pub fn surface_point(&self, k: usize, theta: f64) -> Point3<f64> {
        let c = Point2::from(self.center);
        let xy = c + Vector2::new(theta.cos(), theta.sin()) * self.radius;
        Point3::new(xy.x, xy.y, self.ring_z(k))
    }
}

/// Probes of every ring, ring 0 first; within a ring by increasing angle from +x.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeLattice {
    probes: Vec<Point3<f64>>,
    along: usize,
    around: usize,
}

impl ProbeLattice {
    pub fn generate(cyl: &CylinderParams, cfg: &SampleConfig) -> Result<Self, SampleError> {
        cfg.validate()?;
        let (along, around) = (cfg.sample_along, cfg.sample_around);

        // One rounded xy circle, reused for every ring; z is left exact.
        let circle: Vec<Point2<f64>> = (0..around)
            .map(|j| {
                let p = cyl.surface_point(0, j as f64 * 2.0 * PI / around as f64);
                Point2::new(round_dp3(p.x), round_dp3(p.y))
            })
            .collect();

        let mut probes = Vec::with_capacity(along * around);
        for k in 0..along {
            let z = cyl.ring_z(k);
            probes.extend(circle.iter().map(|xy| Point3::new(xy.x, xy.y, z)));
        }
        log::debug!(
            "scaffold: center=({:.6}, {:.6}) r={:.6} dz/ring={:.6} probes={}",
            cyl.center[0], cyl.center[1], cyl.radius, cyl.element_height, probes.len()
        );
        Ok(Self { probes, along, around })
    }

    pub fn len(&self) -> usize { self.probes.len() }
    pub fn is_empty(&self) -> bool { self.probes.is_empty() }
    pub fn rings(&self) -> usize { self.along }
    pub fn per_ring(&self) -> usize { self.around }
    pub fn probes(&self) -> &[Point3<f64>] { &self.probes }

    pub fn ring(&self, k: usize) -> &[Point3<f64>] {
        &self.probes[k * self.around..(k + 1) * self.around]
    }

    /// Flat query array in ring-major order.
    pub fn queries(&self) -> Vec<[f64; 3]> {
        self.probes.iter().map(|p| [p.x, p.y, p.z]).collect()
    }
}
