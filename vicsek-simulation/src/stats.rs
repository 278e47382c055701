//! Read-only reductions over committed population state.

use crate::population::Population;
use serde::Serialize;
use std::f64::consts::{PI, TAU};
use vicsek_core::{SimError, SimResult, Vector, DIM};

/// Connected velocity correlation binned by pair distance.
///
/// `sums[i]` is the sum over pairs in bin `i` of
/// `(v_a − ⟨v⟩)·(v_b − ⟨v⟩)`, normalised by `v0² − |⟨v⟩|²`; `counts[i]` is
/// the number of pairs. Bins are kept apart so callers can accumulate
/// cumulative correlations and susceptibilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationHistogram {
    pub bin_width: f64,
    pub sums: Vec<f64>,
    pub counts: Vec<u64>,
}

impl CorrelationHistogram {
    /// `(bin centre, sum, count)` for every bin.
    pub fn rows(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.sums
            .iter()
            .zip(self.counts.iter())
            .enumerate()
            .map(move |(bin, (&sum, &count))| ((bin as f64 + 0.5) * self.bin_width, sum, count))
    }
}

impl Population {
    fn require_live(&self) -> SimResult<()> {
        if self.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        Ok(())
    }

    pub fn mean_position(&self) -> SimResult<Vector> {
        self.require_live()?;
        Ok(self.positions().iter().copied().sum::<Vector>() / self.live() as f64)
    }

    /// Centre of mass in a periodic box: each axis is mapped onto a circle
    /// and the mean angle is mapped back into `[0, box_extent)`.
    pub fn mean_periodic_position(&self) -> SimResult<Vector> {
        self.require_live()?;
        let scale = TAU / self.box_extent();
        let mut cos_sum = Vector::ZERO;
        let mut sin_sum = Vector::ZERO;
        for p in self.positions() {
            for axis in 0..DIM {
                let (sin, cos) = (p[axis] * scale).sin_cos();
                sin_sum[axis] += sin;
                cos_sum[axis] += cos;
            }
        }
        let mut mean = Vector::ZERO;
        for axis in 0..DIM {
            mean[axis] = (f64::atan2(-sin_sum[axis], -cos_sum[axis]) + PI) / scale;
        }
        Ok(mean)
    }

    /// Mean velocity and its squared norm.
    pub fn mean_velocity(&self) -> SimResult<(Vector, f64)> {
        self.require_live()?;
        let mean = self.velocities().iter().copied().sum::<Vector>() / self.live() as f64;
        Ok((mean, mean.length_squared()))
    }

    /// `|⟨v⟩| / v0`: 1 for a fully aligned population, 0 for one whose
    /// velocities cancel.
    pub fn order_parameter(&self, v0: f64) -> SimResult<f64> {
        let (_, speed2) = self.mean_velocity()?;
        Ok(speed2.sqrt() / v0)
    }

    /// Longest distance in the periodic box: centre to corner.
    pub fn max_distance(&self) -> f64 {
        self.box_extent() * (DIM as f64 / 4.0).sqrt()
    }

    /// Velocity-fluctuation correlation over all pairs, binned on
    /// `[0, max_distance]`. A pair at exactly `max_distance` lands in the
    /// last bin; pairs farther apart (possible under plain geometry) are
    /// skipped.
    pub fn correlation_histo(&self, nbins: usize, v0: f64) -> SimResult<CorrelationHistogram> {
        if nbins == 0 {
            return Err(SimError::invalid("correlation histogram needs at least one bin"));
        }
        let (mean, speed2) = self.mean_velocity()?;
        let spread = v0 * v0 - speed2;
        if spread.abs() <= f64::EPSILON * v0 * v0 {
            return Err(SimError::DegenerateCorrelation);
        }

        let max_distance = self.max_distance();
        let max_distance2 = self.box_extent() * self.box_extent() * DIM as f64 / 4.0;
        let per_unit = nbins as f64 / max_distance;
        let geometry = self.geometry();
        let positions = self.positions();
        let velocities = self.velocities();
        let mut sums = vec![0.0; nbins];
        let mut counts = vec![0u64; nbins];

        for a in 0..self.live() {
            let fluct_a = velocities[a] - mean;
            for b in (a + 1)..self.live() {
                let distance2 = geometry.distance2(positions[a], positions[b]);
                if distance2 > max_distance2 {
                    continue;
                }
                let bin = ((distance2.sqrt() * per_unit) as usize).min(nbins - 1);
                counts[bin] += 1;
                sums[bin] += fluct_a.dot(velocities[b] - mean);
            }
        }

        let norm = 1.0 / spread;
        sums.iter_mut().for_each(|s| *s *= norm);
        Ok(CorrelationHistogram {
            bin_width: max_distance / nbins as f64,
            sums,
            counts,
        })
    }
}
