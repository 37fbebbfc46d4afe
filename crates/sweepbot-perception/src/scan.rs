//! Rangefinder scan clustering.
//!
//! A [`ScanClusterer`] reads a few revolutions from a [`RangeSource`], turns
//! each revolution into object candidates, and reduces the candidates to the
//! single nearest [`DetectedObject`].
//!
//! Per revolution:
//!
//! 1. keep returns inside the field of interest and the valid range, sorted
//!    by bearing, and project them to Cartesian;
//! 2. chain consecutive points whose Euclidean gap is at most
//!    `max_gap_mm`; drop chains shorter than `min_points`;
//! 3. fold every later cluster whose centroid lies within
//!    `merge_cluster_threshold_mm` of an earlier one into it (single greedy
//!    pass, base centroid fixed);
//! 4. estimate angular span, chord width, size class and bearing.
//!
//! Candidates from all revolutions are then grouped by bearing and range and
//! averaged, so the same object seen on four revolutions is reported once.

use serde::{Deserialize, Serialize};
use sweepbot_hal::{RangeSource, ScanGuard};
use sweepbot_types::{DetectedObject, RoverError, ScanPoint, SizeClass};
use tracing::{debug, info, warn};

use crate::heading::normalize_deg;

/// Tunables of the clusterer. Distances in millimetres, angles in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub fov_min_deg: f32,
    pub fov_max_deg: f32,
    /// Sensor bearing that points straight ahead of the robot.
    pub forward_deg: f32,
    pub max_distance_mm: f32,
    pub min_quality: u8,
    pub max_gap_mm: f32,
    pub min_points: usize,
    pub merge_cluster_threshold_mm: f32,
    pub min_physical_width_mm: f32,
    pub big_object_threshold_mm: f32,
    /// Clusters at or closer than this get at least `near_field_min_span_deg`.
    pub near_field_mm: f32,
    pub near_field_min_span_deg: f32,
    /// Revolutions to accumulate per detection.
    pub max_attempts: usize,
    pub dedup_angle_deg: f32,
    pub dedup_distance_mm: f32,
    /// Consecutive missing samples tolerated before the scan is cut short.
    pub max_consecutive_dropouts: usize,
    /// Upper bound on samples in one revolution, in case the source never
    /// wraps.
    pub max_batch_samples: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fov_min_deg: 225.0,
            fov_max_deg: 315.0,
            forward_deg: 270.0,
            max_distance_mm: 2000.0,
            min_quality: 0,
            max_gap_mm: 300.0,
            min_points: 2,
            merge_cluster_threshold_mm: 150.0,
            min_physical_width_mm: 25.0,
            big_object_threshold_mm: 150.0,
            near_field_mm: 250.0,
            near_field_min_span_deg: 20.0,
            max_attempts: 4,
            dedup_angle_deg: 2.0,
            dedup_distance_mm: 150.0,
            max_consecutive_dropouts: 500,
            max_batch_samples: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Projected {
    angle_deg: f32,
    distance_mm: f32,
    x: f32,
    y: f32,
}

impl Projected {
    fn from_point(p: &ScanPoint) -> Self {
        let rad = p.angle_deg.to_radians();
        Self {
            angle_deg: p.angle_deg,
            distance_mm: p.distance_mm,
            x: p.distance_mm * rad.cos(),
            y: p.distance_mm * rad.sin(),
        }
    }

    fn gap(&self, other: &Projected) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

fn centroid(cluster: &[Projected]) -> (f32, f32) {
    let n = cluster.len() as f32;
    let (sx, sy) = cluster
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    (sx / n, sy / n)
}

/// Turns rangefinder revolutions into object estimates.
#[derive(Debug, Clone, Default)]
pub struct ScanClusterer {
    config: ScanConfig,
}

impl ScanClusterer {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `max_attempts` revolutions from `source` and return the nearest
    /// de-duplicated object, or `None` if nothing qualifies.
    ///
    /// The source is started and stopped through a [`ScanGuard`], so it is
    /// stopped on every exit path.
    ///
    /// # Errors
    ///
    /// Propagates a failure to start the source.
    pub fn detect<S: RangeSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<Option<DetectedObject>, RoverError> {
        let cfg = &self.config;
        let mut scan = ScanGuard::start(source)?;

        let mut candidates = Vec::new();
        let mut batch: Vec<ScanPoint> = Vec::new();
        let mut prev_angle: Option<f32> = None;
        let mut revolutions = 0;
        let mut dropouts = 0;

        while revolutions < cfg.max_attempts {
            let Some(point) = scan.next_sample() else {
                dropouts += 1;
                if dropouts > cfg.max_consecutive_dropouts {
                    warn!(
                        revolutions,
                        dropouts, "range source stopped delivering samples, ending scan early"
                    );
                    break;
                }
                continue;
            };
            dropouts = 0;

            let wrapped = matches!(prev_angle, Some(prev) if point.angle_deg < prev);
            if wrapped || batch.len() >= cfg.max_batch_samples {
                revolutions += 1;
                let found = self.cluster_revolution(&batch);
                debug!(
                    revolution = revolutions,
                    samples = batch.len(),
                    found = found.len(),
                    "revolution analysed"
                );
                candidates.extend(found);
                batch.clear();
            }
            prev_angle = Some(point.angle_deg);
            batch.push(point);
        }
        drop(scan);

        let objects = self.deduplicate(&candidates);
        match objects.first() {
            Some(obj) => {
                info!(
                    size = ?obj.size_class,
                    distance_mm = obj.distance_mm,
                    relative_angle = obj.relative_angle_deg,
                    candidates = candidates.len(),
                    "object detected"
                );
                Ok(Some(*obj))
            }
            None => {
                debug!(candidates = candidates.len(), "no object in field of view");
                Ok(None)
            }
        }
    }

    /// Cluster one revolution's samples into object candidates.
    pub fn cluster_revolution(&self, points: &[ScanPoint]) -> Vec<DetectedObject> {
        let cfg = &self.config;

        let mut projected: Vec<Projected> = points
            .iter()
            .filter(|p| p.distance_mm > 0.0 && p.distance_mm <= cfg.max_distance_mm)
            .filter(|p| p.quality >= cfg.min_quality)
            .filter(|p| (cfg.fov_min_deg..=cfg.fov_max_deg).contains(&p.angle_deg))
            .map(Projected::from_point)
            .collect();
        projected.sort_by(|a, b| a.angle_deg.total_cmp(&b.angle_deg));

        // Chain by Euclidean gap.
        let mut clusters: Vec<Vec<Projected>> = Vec::new();
        let mut current: Vec<Projected> = Vec::new();
        for p in projected {
            let breaks = current.last().is_some_and(|last| last.gap(&p) > cfg.max_gap_mm);
            if breaks {
                if current.len() >= cfg.min_points {
                    clusters.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            current.push(p);
        }
        if current.len() >= cfg.min_points {
            clusters.push(current);
        }

        // Greedy merge against each base cluster's original centroid.
        let mut merged = vec![false; clusters.len()];
        let mut finals: Vec<Vec<Projected>> = Vec::new();
        for i in 0..clusters.len() {
            if merged[i] {
                continue;
            }
            merged[i] = true;
            let (bx, by) = centroid(&clusters[i]);
            let mut base = clusters[i].clone();
            for j in (i + 1)..clusters.len() {
                if merged[j] {
                    continue;
                }
                let (cx, cy) = centroid(&clusters[j]);
                if (bx - cx).hypot(by - cy) <= cfg.merge_cluster_threshold_mm {
                    base.extend_from_slice(&clusters[j]);
                    merged[j] = true;
                }
            }
            finals.push(base);
        }

        finals.iter().filter_map(|c| self.estimate(c)).collect()
    }

    fn estimate(&self, cluster: &[Projected]) -> Option<DetectedObject> {
        let cfg = &self.config;

        let mut angles: Vec<f32> = cluster.iter().map(|p| p.angle_deg).collect();
        angles.sort_by(f32::total_cmp);
        let first = *angles.first()?;
        let last = *angles.last()?;

        let mut span = if angles.len() >= 2 {
            let steps = angles.len() - 1;
            let mean_step = angles.windows(2).map(|w| w[1] - w[0]).sum::<f32>() / steps as f32;
            (mean_step * steps as f32).max(last - first)
        } else {
            0.0
        };

        let distance = cluster.iter().map(|p| p.distance_mm).sum::<f32>() / cluster.len() as f32;
        if distance <= cfg.near_field_mm && span < cfg.near_field_min_span_deg {
            span = cfg.near_field_min_span_deg;
        }

        let width = 2.0 * distance * (span / 2.0).to_radians().tan();
        if width < cfg.min_physical_width_mm {
            return None;
        }

        let center = (first + span / 2.0).rem_euclid(360.0);
        Some(DetectedObject {
            width_mm: width,
            distance_mm: distance,
            angle_center_deg: center,
            relative_angle_deg: normalize_deg(center - cfg.forward_deg),
            size_class: if width >= cfg.big_object_threshold_mm {
                SizeClass::Big
            } else {
                SizeClass::Small
            },
        })
    }

    /// Group candidates that agree on bearing and range, average each group,
    /// and return the groups nearest first.
    pub fn deduplicate(&self, candidates: &[DetectedObject]) -> Vec<DetectedObject> {
        let cfg = &self.config;
        let mut used = vec![false; candidates.len()];
        let mut out = Vec::new();

        for i in 0..candidates.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let base = &candidates[i];
            let mut group = vec![base];
            for j in (i + 1)..candidates.len() {
                if used[j] {
                    continue;
                }
                let other = &candidates[j];
                if (base.relative_angle_deg - other.relative_angle_deg).abs() <= cfg.dedup_angle_deg
                    && (base.distance_mm - other.distance_mm).abs() <= cfg.dedup_distance_mm
                {
                    group.push(other);
                    used[j] = true;
                }
            }

            let n = group.len() as f32;
            let mean = |f: fn(&DetectedObject) -> f32| group.iter().map(|o| f(o)).sum::<f32>() / n;
            let widest = group
                .iter()
                .max_by(|a, b| a.width_mm.total_cmp(&b.width_mm))
                .map_or(base.size_class, |o| o.size_class);
            out.push(DetectedObject {
                width_mm: mean(|o| o.width_mm),
                distance_mm: mean(|o| o.distance_mm),
                angle_center_deg: mean(|o| o.angle_center_deg),
                relative_angle_deg: mean(|o| o.relative_angle_deg),
                size_class: widest,
            });
        }

        out.sort_by(|a, b| a.distance_mm.total_cmp(&b.distance_mm));
        out
    }
}
