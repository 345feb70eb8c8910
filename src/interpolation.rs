use std::marker::PhantomData;
use anyhow::bail;
use bevy::{
    prelude::*,
    utils::HashMap
};
use crate::prelude::*;

/// Buffer settings are copied into each `SnapshotBuffer` when it is
/// created, changing the resource later only affects new entities.
#[derive(Resource, Clone, Debug)]
pub struct InterpolationConfig<M: MotionModel> {
    pub capacity: usize,
    /// snapshots queued before playback starts
    pub target_fill: usize,
    /// only used by models which shrink long gaps
    pub max_time_gap_ms: i32,
    /// gap a stalled segment is shrunk to
    pub gap_catch_up_ms: i32,
    /// Assumed rate of the sender, used to turn the distance between
    /// two snapshots into an impact speed for terrain contacts.
    /// Effects are tuned against 20hz updates.
    pub assumed_send_rate_hz: f32,
    pub phantom: PhantomData<M>
}

impl<M: MotionModel> Default for InterpolationConfig<M> {
    fn default() -> Self {
        Self{
            capacity: DEFAULT_CAPACITY,
            target_fill: DEFAULT_TARGET_FILL,
            max_time_gap_ms: DEFAULT_MAX_TIME_GAP_MS,
            gap_catch_up_ms: DEFAULT_GAP_CATCH_UP_MS,
            assumed_send_rate_hz: DEFAULT_SEND_RATE_HZ,
            phantom: PhantomData::<M>
        }
    }
}

pub const DEFAULT_CAPACITY: usize = 8;
pub const DEFAULT_TARGET_FILL: usize = 5;
pub const DEFAULT_MAX_TIME_GAP_MS: i32 = 250;
pub const DEFAULT_GAP_CATCH_UP_MS: i32 = 10;
pub const DEFAULT_SEND_RATE_HZ: f32 = 20.0;

impl<M: MotionModel> InterpolationConfig<M> {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity < 2 {
            bail!("capacity: {} can not hold a segment", self.capacity);
        }
        if self.target_fill < 2 || self.target_fill > self.capacity {
            bail!(
                "target fill: {} must be within 2..={}",
                self.target_fill,
                self.capacity
            );
        }
        if self.gap_catch_up_ms <= 0 || self.gap_catch_up_ms >= self.max_time_gap_ms {
            bail!(
                "gap catch up: {}ms must be within 1..{}",
                self.gap_catch_up_ms,
                self.max_time_gap_ms
            );
        }
        if !self.assumed_send_rate_hz.is_finite() || self.assumed_send_rate_hz <= 0.0 {
            bail!("send rate: {} is not positive", self.assumed_send_rate_hz);
        }

        Ok(())
    }
}

/// Counters for network quality problems upstream.
#[derive(Resource, Debug)]
pub struct InterpolationStats<M: MotionModel> {
    pub accepted: u64,
    pub discarded: u64,
    pub unrouted: u64,
    pub starvations: u64,
    pub terrain_contacts: u64,
    pub invariant_violations: u64,
    pub phantom: PhantomData<M>
}

impl<M: MotionModel> Default for InterpolationStats<M> {
    fn default() -> Self {
        Self{
            accepted: 0,
            discarded: 0,
            unrouted: 0,
            starvations: 0,
            terrain_contacts: 0,
            invariant_violations: 0,
            phantom: PhantomData::<M>
        }
    }
}

/// Sent once per tagged snapshot, when its segment is retired.
#[derive(Event, Clone, Copy, Debug)]
pub struct TerrainContact {
    pub entity: Entity,
    pub network_id: Option<u32>,
    pub position: Vec3,
    pub approx_impact_speed_sq: f32,
    pub terrain: i32
}

#[derive(SystemSet, Clone, Eq, PartialEq, Hash, Debug)]
pub enum InterpolationSet {
    /// PreUpdate, snapshots are routed to buffers
    Receive,
    /// Update, transforms are written
    Interpolate
}

pub(crate) fn receive_snapshot_system<M: MotionModel>(
    mut snapshots: EventReader<NetworkSnapshot>,
    mut query: Query<(Entity, &NetworkId, &mut SnapshotBuffer<M>)>,
    mut stats: ResMut<InterpolationStats<M>>
) {
    if snapshots.is_empty() {
        return;
    }

    let mut entities = HashMap::new();
    for (e, net_id, _) in query.iter() {
        if let Some(other) = entities.insert(net_id.get(), e) {
            warn!(
                "network id: {} is shared by {other:?} and {e:?}, routing to {e:?}",
                net_id.get()
            );
        }
    }

    for NetworkSnapshot { id, snapshot } in snapshots.read() {
        let Some(&e) = entities.get(id) else {
            // may belong to another motion model
            stats.unrouted += 1;
            continue;
        };

        let Ok((_, _, mut buffer)) = query.get_mut(e) else {
            continue;
        };

        match buffer.add_point(*snapshot) {
            Ok(()) => stats.accepted += 1,
            Err(e) => {
                stats.discarded += 1;
                debug!("discarding snapshot for network id: {id}: {e}");
            }
        }
    }
}

pub(crate) fn despawn_network_entity_system<M: MotionModel>(
    mut commands: Commands,
    mut despawns: EventReader<NetworkDespawn>,
    query: Query<(Entity, &NetworkId), With<SnapshotBuffer<M>>>
) {
    for NetworkDespawn { id } in despawns.read() {
        for (e, net_id) in query.iter() {
            if net_id.get() == *id {
                commands.entity(e).despawn_recursive();
                debug!("despawned network id: {id}");
            }
        }
    }
}

pub(crate) fn interpolation_system<M: MotionModel>(
    mut query: Query<(
        Entity,
        Option<&NetworkId>,
        &mut Transform,
        &mut SnapshotBuffer<M>
    )>,
    mut contacts: EventWriter<TerrainContact>,
    mut stats: ResMut<InterpolationStats<M>>,
    time: Res<Time>
) {
    let delta = time.delta();
    for (e, net_id, mut transform, mut buffer) in query.iter_mut() {
        let advance = buffer.advance(delta, transform.translation);

        if advance.starved {
            stats.starvations += 1;
        }
        if advance.invariant_violated {
            stats.invariant_violations += 1;
        }

        for hit in advance.hits {
            stats.terrain_contacts += 1;
            contacts.send(TerrainContact{
                entity: e,
                network_id: net_id.map(NetworkId::get),
                position: hit.position,
                approx_impact_speed_sq: hit.approx_impact_speed_sq,
                terrain: hit.terrain
            });
        }

        if let Some(pose) = advance.pose {
            transform.translation = pose.translation;
            transform.rotation = pose.rotation;
        }
    }
}

/// Drives every entity carrying a `SnapshotBuffer<M>`.
/// Insert `InterpolationConfig<M>` before adding to override defaults.
pub struct InterpolationPlugin<M: MotionModel>(pub PhantomData<M>);

impl<M: MotionModel> Default for InterpolationPlugin<M> {
    fn default() -> Self {
        Self(PhantomData::<M>)
    }
}

impl<M: MotionModel> Plugin for InterpolationPlugin<M> {
    fn build(&self, app: &mut App) {
        app.init_resource::<InterpolationConfig<M>>()
        .init_resource::<InterpolationStats<M>>()
        .add_event::<NetworkSnapshot>()
        .add_event::<NetworkDespawn>()
        .add_event::<TerrainContact>()
        .configure_sets(PreUpdate, InterpolationSet::Receive)
        .configure_sets(Update, InterpolationSet::Interpolate)
        .add_systems(PreUpdate, (
            receive_snapshot_system::<M>,
            despawn_network_entity_system::<M>
        ).chain().in_set(InterpolationSet::Receive))
        .add_systems(Update,
            interpolation_system::<M>
            .in_set(InterpolationSet::Interpolate)
        );
    }
}
