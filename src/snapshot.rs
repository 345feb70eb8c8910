use anyhow::bail;
use bevy::prelude::*;
use serde::{Serialize, Deserialize};

/// One timestamped state record sent by the authority.
///
/// `timestamp` is chosen by the sender and is only compared against
/// other timestamps of the same entity, never against local time.
/// `terrain` marks a discrete event (surface transition, collision)
/// which happened at or before this snapshot.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub timestamp: i32,
    pub terrain: Option<i32>
}

impl Default for Snapshot {
    fn default() -> Self {
        Self{
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            timestamp: 0,
            terrain: None
        }
    }
}

impl Snapshot {
    #[inline]
    pub fn new(
        position: Vec3,
        velocity: Vec3,
        orientation: Quat,
        timestamp: i32
    ) -> Self {
        Self{
            position,
            velocity,
            orientation,
            timestamp,
            terrain: None
        }
    }

    #[inline]
    pub fn at(position: Vec3, timestamp: i32) -> Self {
        Self::new(position, Vec3::ZERO, Quat::IDENTITY, timestamp)
    }

    #[inline]
    pub fn with_terrain(mut self, terrain: i32) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.position.is_finite() {
            bail!("failed to validate position");
        }
        if !self.velocity.is_finite() {
            bail!("failed to validate velocity");
        }
        if !self.orientation.is_finite() {
            bail!("failed to validate orientation");
        }
        if self.orientation.length_squared() <= f32::EPSILON {
            bail!("orientation is not normalizable");
        }

        Ok(())
    }
}

/// A snapshot for the entity carrying `NetworkId(id)`.
#[derive(Event, Serialize, Deserialize, Clone, Copy, Debug)]
pub struct NetworkSnapshot {
    pub id: u32,
    pub snapshot: Snapshot
}

/// The authority removed the entity carrying `NetworkId(id)`.
#[derive(Event, Serialize, Deserialize, Clone, Copy, Debug)]
pub struct NetworkDespawn {
    pub id: u32
}
