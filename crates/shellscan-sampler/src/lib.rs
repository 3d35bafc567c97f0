//! shellscan-sampler — boundary shell sampling via a cylindrical probe scaffold.
//!
//! Pipeline: bounds → cylinder → probe lattice; cloud → kd-tree; (probes, tree) → snapped points.
//! Nothing is kept between calls.

pub mod scaffold;

use serde::{Deserialize, Serialize};
use shellscan_core::{Aabb, Cloud, SampleError};
use shellscan_nn::{KdTree, NeighborIndex3};

pub use scaffold::{round_dp3, CylinderParams, ProbeLattice, INFLATION};

/// Ring count along z and probes per ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub sample_along: usize,
    pub sample_around: usize,
}

impl Default for SampleConfig {
    fn default() -> Self { Self { sample_along: 30, sample_around: 30 } }
}

impl SampleConfig {
    pub fn new(sample_along: usize, sample_around: usize) -> Result<Self, SampleError> {
        let cfg = Self { sample_along, sample_around };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        let fits = self.sample_along.checked_mul(self.sample_around).is_some();
        if self.sample_along == 0 || self.sample_around == 0 || !fits {
            return Err(SampleError::InvalidSampling {
                along: self.sample_along,
                around: self.sample_around,
            });
        }
        Ok(())
    }

    pub fn probe_count(&self) -> usize { self.sample_along * self.sample_around }
}

/// Sampled shell plus the scaffold that produced it.
#[derive(Clone, Debug)]
pub struct SampleOutput {
    pub points: Cloud,
    pub bounds: Aabb,
    pub cylinder: CylinderParams,
}

/// Replace each probe by its nearest input point, keeping probe order.
/// Emitted coordinates are the cloud's own values, never the probe's.
pub fn snap<I>(index: &I, cloud: &Cloud, probes: &ProbeLattice) -> Cloud
where
    I: NeighborIndex3 + Sync,
{
    let hits = index.nearest_batch(&probes.queries());
    let mut out = Cloud::with_capacity(hits.len());
    for i in hits {
        out.push(cloud.x[i], cloud.y[i], cloud.z[i]);
    }
    out
}

/// Full pipeline. Either the whole ring-major sequence comes back or an error does.
pub fn sample_boundary(cloud: &Cloud, cfg: &SampleConfig) -> Result<SampleOutput, SampleError> {
    cfg.validate()?;
    let bounds = Aabb::from_cloud(cloud)?;
    let cylinder = CylinderParams::from_aabb(&bounds, cfg)?;
    let probes = ProbeLattice::generate(&cylinder, cfg)?;
    let tree = KdTree::build(cloud.into())?;
    let points = snap(&tree, cloud, &probes);
    debug_assert_eq!(points.len(), cfg.probe_count());
    log::debug!("sampled {} of {} points", points.len(), cloud.len());
    Ok(SampleOutput { points, bounds, cylinder })
}

/// Probes alone, for inspecting the scaffold against the cloud.
pub fn scaffold_for(cloud: &Cloud, cfg: &SampleConfig) -> Result<ProbeLattice, SampleError> {
    let bounds = Aabb::from_cloud(cloud)?;
    let cylinder = CylinderParams::from_aabb(&bounds, cfg)?;
    ProbeLattice::generate(&cylinder, cfg)
}
