//! Gives cones an identity across sweeps.
//!
//! Detection itself is memoryless; this tracker sits on top of it and associates each
//! new detection with the nearest existing track. Association happens in the vehicle
//! frame, so it only holds while the vehicle moves less than `association_radius`
//! between two sweeps.

use anyhow::ensure;
use common::robot::Landmark;
use kd_tree::KdMap;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// A detection further than this (meters) from a track never updates it.
    pub association_radius: f32,

    /// Number of consecutive sweeps a track may go unobserved before it is dropped.
    pub max_age: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            association_radius: 0.5,
            max_age: 3,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.association_radius.is_finite() && self.association_radius > 0.0,
            "association_radius must be a positive distance, got {}",
            self.association_radius
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub id: usize,
    pub landmark: Landmark,

    /// Sweeps since this track was last matched.
    pub age: u32,

    /// Number of sweeps this track was matched in, including the one that created it.
    pub hits: u32,
}

#[derive(Debug, Default)]
pub struct LandmarkTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: usize,
}

fn detections_to_kdmap(detections: &[Landmark]) -> KdMap<[f32; 2], usize> {
    let s: Vec<([f32; 2], usize)> = detections
        .iter()
        .enumerate()
        .map(|(i, l)| ([l.x, l.y], i))
        .collect();
    KdMap::build_by_ordered_float(s)
}

impl LandmarkTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Associates the detections of one sweep with the existing tracks and returns the
    /// updated track list. Older tracks get first pick of the detections.
    pub fn update(&mut self, detections: &[Landmark]) -> &[Track] {
        let mut claimed = vec![false; detections.len()];
        let radius_sq = self.config.association_radius.powi(2);

        let tree = (!detections.is_empty()).then(|| detections_to_kdmap(detections));

        for track in self.tracks.iter_mut() {
            let matched = tree
                .as_ref()
                .and_then(|t| t.nearest(&[track.landmark.x, track.landmark.y]))
                .filter(|n| n.squared_distance < radius_sq && !claimed[n.item.1])
                .map(|n| n.item.1);

            match matched {
                Some(i) => {
                    claimed[i] = true;
                    track.landmark = detections[i];
                    track.age = 0;
                    track.hits += 1;
                }
                None => track.age += 1,
            }
        }

        let max_age = self.config.max_age;
        let before = self.tracks.len();
        self.tracks.retain(|t| t.age <= max_age);
        let evicted = before - self.tracks.len();

        for (i, landmark) in detections.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            self.tracks.push(Track {
                id: self.next_id,
                landmark: *landmark,
                age: 0,
                hits: 1,
            });
            self.next_id += 1;
        }

        if evicted > 0 {
            tracing::debug!("Evicted {evicted} stale tracks, {} remain", self.tracks.len());
        }

        &self.tracks
    }
}
