//! Headless playground: a simulated authority rolls a ball and sends its
//! snapshots over a lossy in-memory link.

use std::time::Duration;
use anyhow::bail;
use bevy::{log::Level, prelude::*};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use crate::prelude::*;

pub const LOG_LEVEL: Level = Level::INFO;
pub const DEV_TICK_DELTA: f32 = 1.0 / 60.0;
pub const DEV_RUN_SECONDS: f32 = 6.0;
pub const DEV_BALL_ID: u32 = 1;

pub const TERRAIN_FAIRWAY: i32 = 1;
pub const TERRAIN_GREEN: i32 = 2;

#[derive(Resource, Clone)]
pub struct LossyLinkConfig {
    pub send_rate_hz: f32,
    pub max_jitter_ms: u32,
    pub drop_chance: f64,
    pub duplicate_chance: f64,
    pub seed: u64
}

impl LossyLinkConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.send_rate_hz.is_finite()
        || self.send_rate_hz <= 0.0
        || self.send_rate_hz > 1000.0 {
            bail!("send rate: {} must be within (0, 1000]hz", self.send_rate_hz);
        }
        if !(0.0..=1.0).contains(&self.drop_chance)
        || !(0.0..=1.0).contains(&self.duplicate_chance) {
            bail!(
                "drop chance: {} and duplicate chance: {} must be within 0..=1",
                self.drop_chance,
                self.duplicate_chance
            );
        }

        Ok(())
    }

    #[inline]
    fn send_interval_ms(&self) -> u64 {
        ((1000.0 / self.send_rate_hz) as u64).max(1)
    }
}

impl Default for LossyLinkConfig {
    fn default() -> Self {
        Self{
            send_rate_hz: DEFAULT_SEND_RATE_HZ,
            max_jitter_ms: 40,
            drop_chance: 0.05,
            duplicate_chance: 0.05,
            seed: 7
        }
    }
}

struct InFlight {
    arrival_ms: u64,
    snapshot: Snapshot
}

#[derive(Resource)]
pub struct LossyLink {
    rng: StdRng,
    in_flight: Vec<InFlight>,
    clock_ms: u64,
    next_send_ms: u64,
    on_green: bool
}

impl LossyLink {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self{
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
            clock_ms: 0,
            next_send_ms: 0,
            on_green: false
        }
    }
}

/// Ball rolling around a circle of radius 5, one lap per 4 seconds.
pub fn ball_snapshot(timestamp_ms: u64) -> Snapshot {
    let secs = timestamp_ms as f32 / 1000.0;
    let angular = std::f32::consts::TAU / 4.0;
    let angle = secs * angular;
    let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * 5.0;
    let velocity = Vec3::new(-angle.sin(), 0.0, angle.cos()) * 5.0 * angular;

    Snapshot::new(
        position,
        velocity,
        Quat::from_rotation_y(-angle),
        i32::try_from(timestamp_ms).unwrap_or(i32::MAX)
    )
}

fn setup_ball_system(
    mut commands: Commands,
    config: Res<InterpolationConfig<Hermite>>
) {
    match NetworkInterpolationBundle::<Hermite>::new(DEV_BALL_ID, ball_snapshot(0), &config) {
        Ok(bundle) => {
            commands.spawn(bundle);
        }
        Err(e) => error!("failed to spawn ball: {e}")
    }
}

fn lossy_link_system(
    mut link: ResMut<LossyLink>,
    config: Res<LossyLinkConfig>,
    mut snapshots: EventWriter<NetworkSnapshot>,
    time: Res<Time>
) {
    let link = link.as_mut();
    link.clock_ms = u64::try_from(time.elapsed().as_millis()).unwrap_or(u64::MAX);
    let send_interval = config.send_interval_ms();

    while link.next_send_ms <= link.clock_ms {
        let mut snapshot = ball_snapshot(link.next_send_ms);
        link.next_send_ms += send_interval;

        // half a lap on the green, half on the fairway
        let on_green = snapshot.position.z > 0.0;
        if on_green != link.on_green {
            link.on_green = on_green;
            snapshot = snapshot.with_terrain(if on_green {
                TERRAIN_GREEN
            } else {
                TERRAIN_FAIRWAY
            });
        }

        if link.rng.gen_bool(config.drop_chance) {
            debug!("dropped snapshot: {}", snapshot.timestamp);
            continue;
        }

        let copies = if link.rng.gen_bool(config.duplicate_chance) { 2 } else { 1 };
        for _ in 0..copies {
            let jitter = link.rng.gen_range(0..=config.max_jitter_ms);
            link.in_flight.push(InFlight{
                arrival_ms: link.clock_ms.saturating_add(jitter as u64),
                snapshot
            });
        }
    }

    let now = link.clock_ms;
    let mut arrived = Vec::new();
    link.in_flight.retain(|f| {
        if f.arrival_ms <= now {
            arrived.push(f.snapshot);
            false
        } else {
            true
        }
    });

    arrived.shuffle(&mut link.rng);
    for snapshot in arrived {
        snapshots.send(NetworkSnapshot{
            id: DEV_BALL_ID,
            snapshot
        });
    }
}

fn log_ball_system(
    query: Query<(&Transform, &SnapshotBuffer<Hermite>), With<NetworkId>>,
    mut contacts: EventReader<TerrainContact>,
    stats: Res<InterpolationStats<Hermite>>,
    mut elapsed: Local<Duration>,
    time: Res<Time>
) {
    for contact in contacts.read() {
        info!(
            "terrain contact: {} at: {} speed sq: {:.2}",
            contact.terrain,
            contact.position,
            contact.approx_impact_speed_sq
        );
    }

    *elapsed += time.delta();
    if elapsed.as_millis() < 500 {
        return;
    }
    *elapsed = Duration::ZERO;

    for (transform, buffer) in query.iter() {
        info!(
            "ball at: {} speed: {:.2} buffered: {} buffering: {}",
            transform.translation,
            buffer.velocity().length(),
            buffer.len(),
            buffer.is_buffering()
        );
    }
    debug!("{:?}", *stats);
}

fn exit_system(mut exit: EventWriter<AppExit>, time: Res<Time>) {
    if time.elapsed_seconds() >= DEV_RUN_SECONDS {
        exit.send(AppExit::Success);
    }
}

pub struct LossyLinkPlugin;

impl Plugin for LossyLinkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LossyLinkConfig>();
        let config = app.world().resource::<LossyLinkConfig>();
        if let Err(e) = config.validate() {
            panic!("invalid lossy link config: {e}");
        }
        let seed = config.seed;

        app.add_plugins(InterpolationPlugin::<Hermite>::default())
        .insert_resource(LossyLink::new(seed))
        .add_systems(Startup, setup_ball_system)
        .add_systems(PreUpdate,
            lossy_link_system.before(InterpolationSet::Receive)
        )
        .add_systems(Update, (
            log_ball_system.after(InterpolationSet::Interpolate),
            exit_system
        ));
    }
}
