use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use swayroom_shared::config::RoomConfig;
use swayroom_shared::protocol::{clamp_unit, UserWire};

use super::palette::resolve_color;
use super::transform::StageSize;

/// Star points, degrees
pub const STAR_ANGLES_DEG: [f64; 5] = [0.0, 72.0, 144.0, 216.0, 288.0];
/// Duplicate offset radii as fractions of the shorter stage side
pub const STAR_RADII: [f64; 3] = [0.18, 0.23, 0.28];
pub const MAX_DUPLICATES_PER_USER: usize = 3;

/// Stable identity of a rendered slot. Base entries and duplicates never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    Base(usize),
    Duplicate { participant: usize, copy: usize },
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Base(p) => write!(f, "u{p}"),
            SlotKey::Duplicate { participant, copy } => write!(f, "u{participant}-d{copy}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySlot {
    pub key: SlotKey,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Resolved `#rgb`/`#rrggbb`
    pub color: String,
    pub nickname: String,
    pub opacity: f64,
}

/// Uniformly random `capacity` indices out of `0..population`, ascending.
/// Everything is admitted when the population fits.
pub fn fair_subset<R: Rng + ?Sized>(population: usize, capacity: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..population).collect();
    if population > capacity {
        indices.shuffle(rng);
        indices.truncate(capacity);
        indices.sort_unstable();
    }
    indices
}

/// Extra copies per participant needed to make a sparse room look populated.
pub fn duplicates_per_user(population: usize, threshold: usize) -> usize {
    if population == 0 || population >= threshold {
        return 0;
    }
    let deficit = threshold - population;
    deficit
        .div_ceil(population)
        .clamp(1, MAX_DUPLICATES_PER_USER)
}

/// Pixel offset of duplicate `copy` (1-based) of `participant`.
pub fn star_offset(participant: usize, copy: usize, stage: StageSize) -> (f64, f64) {
    let step = participant + copy;
    let angle = STAR_ANGLES_DEG[step % STAR_ANGLES_DEG.len()].to_radians();
    let radius = STAR_RADII[step % STAR_RADII.len()] * stage.min_side();
    (radius * angle.cos(), radius * angle.sin())
}

/// Decides which roster entries a display renders, and how many times.
pub struct AdmissionController<R> {
    config: RoomConfig,
    roster: Vec<UserWire>,
    /// Present only while the roster exceeds capacity
    subset: Option<Vec<usize>>,
    rng: R,
}

impl<R: Rng> AdmissionController<R> {
    pub fn new(config: RoomConfig, rng: R) -> Self {
        Self {
            config,
            roster: Vec::new(),
            subset: None,
            rng,
        }
    }

    pub fn reconfigure(&mut self, config: RoomConfig) {
        let capacity_changed = config.capacity != self.config.capacity;
        self.config = config;
        if capacity_changed || self.subset_is_stale() {
            self.refresh();
        }
    }

    /// Replace the roster wholesale. The current subset survives unless it no
    /// longer fits the new roster.
    pub fn replace_roster(&mut self, users: Vec<UserWire>) {
        self.roster = users;
        if self.subset_is_stale() {
            self.refresh();
        }
    }

    /// Draw a new subset. Called on the refresh timer.
    pub fn refresh(&mut self) {
        let population = self.roster.len();
        let capacity = self.config.capacity;
        self.subset = if population > capacity {
            Some(fair_subset(population, capacity, &mut self.rng))
        } else {
            None
        };
    }

    /// Roster indices currently on screen, ascending.
    pub fn admitted(&self) -> Vec<usize> {
        match &self.subset {
            Some(subset) => subset.clone(),
            None => (0..self.roster.len().min(self.config.capacity)).collect(),
        }
    }

    /// Slots for this cycle: every admitted entry followed by its duplicates.
    pub fn slots(&self, stage: StageSize) -> Vec<DisplaySlot> {
        let admitted = self.admitted();
        // Counted on the whole roster, applied to each admitted entry
        let copies = if self.config.duplicate_users {
            duplicates_per_user(self.roster.len(), self.config.duplicate_threshold)
        } else {
            0
        };

        let mut slots = Vec::with_capacity(admitted.len() * (copies + 1));
        for &p in &admitted {
            let user = &self.roster[p];
            let base = DisplaySlot {
                key: SlotKey::Base(p),
                x: clamp_unit(user.x),
                y: clamp_unit(user.y),
                theta: user.theta,
                color: resolve_color(&user.color, &self.config),
                nickname: user.nickname.clone(),
                opacity: 1.0,
            };
            slots.push(base.clone());

            for copy in 1..=copies {
                let (dx, dy) = star_offset(p, copy, stage);
                slots.push(DisplaySlot {
                    key: SlotKey::Duplicate { participant: p, copy },
                    x: clamp_unit(base.x + dx / stage.width),
                    y: clamp_unit(base.y + dy / stage.height),
                    opacity: self.config.duplicate_opacity,
                    ..base.clone()
                });
            }
        }
        slots
    }

    fn subset_is_stale(&self) -> bool {
        let population = self.roster.len();
        let capacity = self.config.capacity;
        match &self.subset {
            _ if population <= capacity => self.subset.is_some(),
            None => true,
            Some(subset) => subset.len() != capacity || subset.iter().any(|&i| i >= population),
        }
    }
}
