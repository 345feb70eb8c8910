pub mod dev;
pub mod interpolation;
pub mod motion;
pub mod network_entity;
pub mod replication;
pub mod ring_buffer;
pub mod snapshot;
pub mod snapshot_buffer;

pub mod prelude {
    pub use crate::{
        interpolation::*,
        motion::*,
        network_entity::*,
        replication::*,
        ring_buffer::*,
        snapshot::*,
        snapshot_buffer::*,
        SnapshotInterpolationPlugin
    };
}

use bevy::prelude::*;
use prelude::*;

/// Linear and Hermite interpolation side by side.
pub struct SnapshotInterpolationPlugin;

impl Plugin for SnapshotInterpolationPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            InterpolationPlugin::<Linear>::default(),
            InterpolationPlugin::<Hermite>::default()
        ));
    }
}
