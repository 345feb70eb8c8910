use bevy::prelude::*;
use serde::{Serialize, Deserialize};
use crate::prelude::*;

/// Id assigned by the authority, used to route incoming snapshots.
#[derive(Component, Serialize, Deserialize, Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub struct NetworkId(u32);

impl NetworkId {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }
}

#[derive(Bundle)]
pub struct NetworkInterpolationBundle<M: MotionModel> {
    pub network_id: NetworkId,
    pub snaps: SnapshotBuffer<M>,
    pub transform: TransformBundle
}

impl<M: MotionModel> NetworkInterpolationBundle<M> {
    /// The entity starts at the seed pose and waits there until
    /// enough snapshots are buffered.
    #[inline]
    pub fn new(
        id: u32,
        seed: Snapshot,
        config: &InterpolationConfig<M>
    ) -> anyhow::Result<Self> {
        let snaps = SnapshotBuffer::with_seed(seed, config)?;
        let transform = Transform::from_translation(seed.position)
        .with_rotation(seed.orientation);

        Ok(Self{
            network_id: NetworkId::new(id),
            snaps,
            transform: TransformBundle::from_transform(transform)
        })
    }
}
