//! shellscan-core — core data model and shared math/types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong between a parsed cloud and a sampled shell.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("point cloud is empty")]
    EmptyCloud,
    #[error("point {index} has a non-finite {axis} coordinate")]
    NonFiniteInput { index: usize, axis: char },
    #[error("sampling counts must be positive with a representable product (along={along}, around={around})")]
    InvalidSampling { along: usize, around: usize },
    #[error("line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
}

/// Structure-of-Arrays point cloud.
/// Columns stay f64 end to end; output points are copied out bit-for-bit.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cloud {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Cloud {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    pub fn push(&mut self, px: f64, py: f64, pz: f64) {
        self.x.push(px); self.y.push(py); self.z.push(pz);
    }
    pub fn reserve(&mut self, n: usize) {
        self.x.reserve(n); self.y.reserve(n); self.z.reserve(n);
    }
    pub fn with_capacity(n: usize) -> Self {
        let mut c = Self::default();
        c.reserve(n);
        c
    }
    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] { [self.x[i], self.y[i], self.z[i]] }

    pub fn iter(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }

    pub fn from_points(pts: &[[f64; 3]]) -> Self {
        let mut c = Self::with_capacity(pts.len());
        for p in pts { c.push(p[0], p[1], p[2]); }
        c
    }

    pub fn to_points(&self) -> Vec<[f64; 3]> { self.iter().collect() }
}

/// Zero-copy view into a Cloud (slice-of-SoA).
#[derive(Copy, Clone, Debug)]
pub struct CloudView<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub z: &'a [f64],
}

impl<'a> From<&'a Cloud> for CloudView<'a> {
    fn from(c: &'a Cloud) -> Self { Self { x: &c.x, y: &c.y, z: &c.z } }
}

impl<'a> CloudView<'a> {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] { [self.x[i], self.y[i], self.z[i]] }
}

/// Side lengths of an [`Aabb`], all non-negative.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extents { pub dx: f64, pub dy: f64, pub dz: f64 }

/// Simple AABB
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb { pub min: [f64; 3], pub max: [f64; 3] }

impl Aabb {
    /// Tight bounds of `view`.
    ///
    /// Rejects empty views and any NaN/infinite coordinate, reporting the first
    /// offending point in input order.
    pub fn from_view(view: CloudView<'_>) -> Result<Self, SampleError> {
        if view.is_empty() { return Err(SampleError::EmptyCloud); }
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for i in 0..view.len() {
            let p = view.point(i);
            for (a, axis) in ['x', 'y', 'z'].into_iter().enumerate() {
                let v = p[a];
                if !v.is_finite() {
                    return Err(SampleError::NonFiniteInput { index: i, axis });
                }
                if v < min[a] { min[a] = v; }
                if v > max[a] { max[a] = v; }
            }
        }
        Ok(Self { min, max })
    }

    pub fn from_cloud(c: &Cloud) -> Result<Self, SampleError> { Self::from_view(c.into()) }

    pub fn extents(&self) -> Extents {
        Extents {
            dx: self.max[0] - self.min[0],
            dy: self.max[1] - self.min[1],
            dz: self.max[2] - self.min[2],
        }
    }

    pub fn center(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }
}

#[inline]
pub fn dist2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}
