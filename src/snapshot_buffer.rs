use std::{marker::PhantomData, time::Duration};
use anyhow::bail;
use bevy::prelude::*;
use crate::{
    interpolation::InterpolationConfig,
    motion::{FrameMotion, MotionModel},
    ring_buffer::RingBuffer,
    snapshot::Snapshot
};

/// Time played back since the last retirement.
/// `carryover` is what was left of the tick that crossed the boundary.
#[derive(Default, Clone, Copy, Debug)]
pub struct PlaybackClock {
    since_retire: Duration,
    carryover: i32
}

impl PlaybackClock {
    #[inline]
    pub fn elapsed_ms(&self) -> i32 {
        let played = i32::try_from(self.since_retire.as_millis())
        .unwrap_or(i32::MAX);
        self.carryover.saturating_add(played)
    }

    #[inline]
    fn advance(&mut self, delta: Duration) {
        self.since_retire += delta;
    }

    #[inline]
    fn restart(&mut self, carryover: i32) {
        self.since_retire = Duration::ZERO;
        self.carryover = carryover;
    }
}

/// Discrete terrain event recovered from a retired segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHit {
    pub position: Vec3,
    /// Rough estimate for effects, not physics.
    pub approx_impact_speed_sq: f32,
    pub terrain: i32
}

impl TerrainHit {
    /// Snapshots are assumed to be `1 / send_rate_hz` seconds apart.
    #[inline]
    fn between(retired: &Snapshot, head: &Snapshot, terrain: i32, send_rate_hz: f32) -> Self {
        let speed = (head.position - retired.position) * send_rate_hz;
        Self{
            position: head.position,
            approx_impact_speed_sq: speed.length_squared(),
            terrain
        }
    }
}

#[derive(Default, Debug)]
pub struct Advance {
    /// New transform, `None` if the entity holds its pose.
    pub pose: Option<Transform>,
    pub hits: Vec<TerrainHit>,
    /// Playback ran dry during this tick.
    pub starved: bool,
    /// Segment with a non positive duration reached the driver.
    pub invariant_violated: bool
}

/// Bounded history of snapshots for one entity plus its playback state.
///
/// The buffer waits until `target_fill` snapshots are queued before
/// playback starts and goes back to buffering whenever only one
/// snapshot is left. While buffering the entity holds its last pose.
#[derive(Component)]
pub struct SnapshotBuffer<M: MotionModel> {
    ring: RingBuffer<Snapshot>,
    target_fill: usize,
    max_time_gap_ms: Option<i32>,
    gap_catch_up_ms: i32,
    buffering: bool,
    clock: PlaybackClock,
    velocity: Vec3,
    pending_hits: Vec<TerrainHit>,
    send_rate_hz: f32,
    phantom: PhantomData<M>
}

impl<M: MotionModel> SnapshotBuffer<M> {
    pub fn with_seed(seed: Snapshot, config: &InterpolationConfig<M>)
    -> anyhow::Result<Self> {
        config.validate()?;
        seed.validate()?;

        let mut ring = RingBuffer::with_capacity(config.capacity);
        ring.push_back(seed);

        Ok(Self{
            ring,
            target_fill: config.target_fill,
            max_time_gap_ms: M::SHRINKS_LONG_GAPS.then_some(config.max_time_gap_ms),
            gap_catch_up_ms: config.gap_catch_up_ms,
            buffering: true,
            clock: PlaybackClock::default(),
            velocity: Vec3::ZERO,
            pending_hits: Vec::new(),
            send_rate_hz: config.assumed_send_rate_hz,
            phantom: PhantomData::<M>
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    #[inline]
    pub fn target_fill(&self) -> usize {
        self.target_fill
    }

    /// Interpolated velocity of the last driver tick.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    #[inline]
    pub fn front(&self) -> Option<&Snapshot> {
        self.ring.front()
    }

    #[inline]
    pub fn back(&self) -> Option<&Snapshot> {
        self.ring.back()
    }

    #[inline]
    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn timestamps(&self) -> Vec<i32> {
        self.ring.iter()
        .map(|s| s.timestamp)
        .collect()
    }

    /// Queues a snapshot. Errors for stale or malformed snapshots, in
    /// which case the buffer is left untouched.
    pub fn add_point(&mut self, snapshot: Snapshot) -> anyhow::Result<()> {
        snapshot.validate()?;

        let Some(tail) = self.ring.back() else {
            bail!("buffer has no seed snapshot");
        };
        if snapshot.timestamp <= tail.timestamp {
            bail!(
                "timestamp: {} is not newer than latest: {}",
                snapshot.timestamp,
                tail.timestamp
            );
        }

        if let Some(evicted) = self.ring.push_back(snapshot) {
            warn!(
                "snapshot buffer overflow, evicted timestamp: {}",
                evicted.timestamp
            );
            if let Some(hit) = self.promote_head(&evicted) {
                self.pending_hits.push(hit);
            }
        }
        self.shrink_head_gap();

        if self.buffering && self.ring.len() == 2 {
            self.clock.restart(0);
        }

        self.buffering = self.ring.len() < self.target_fill;
        Ok(())
    }

    /// Pops the head and returns the hit of the snapshot that took its place.
    #[inline]
    fn retire_head(&mut self) -> Option<TerrainHit> {
        let retired = self.ring.pop_front()?;
        self.promote_head(&retired)
    }

    /// Tags fire once, when their snapshot becomes the head.
    fn promote_head(&mut self, retired: &Snapshot) -> Option<TerrainHit> {
        let send_rate_hz = self.send_rate_hz;
        let head = self.ring.get_mut(0)?;
        let terrain = head.terrain.take()?;
        Some(TerrainHit::between(retired, head, terrain, send_rate_hz))
    }

    /// A head segment longer than `max_time_gap_ms` is a stall, the head
    /// is pulled forward so it plays back as a short catch up instead of
    /// one long spline. Only the head segment is touched, segments further
    /// back are shrunk when they reach the head.
    fn shrink_head_gap(&mut self) {
        let Some(max_gap) = self.max_time_gap_ms else {
            return;
        };
        let Some(next) = self.ring.get(1).map(|s| s.timestamp) else {
            return;
        };
        let catch_up = self.gap_catch_up_ms;
        let Some(head) = self.ring.get_mut(0) else {
            return;
        };

        let gap = next - head.timestamp;
        if gap > max_gap {
            debug!("shrinking stall of {gap}ms before timestamp: {next}");
            head.timestamp = next - catch_up;
        }
    }

    #[inline]
    fn segment_ms(&self) -> Option<i32> {
        let from = self.ring.get(0)?;
        let to = self.ring.get(1)?;
        Some(to.timestamp - from.timestamp)
    }

    #[inline]
    fn head_pose(&self) -> Option<Transform> {
        self.ring.front()
        .map(|s| Transform::from_translation(s.position).with_rotation(s.orientation))
    }

    /// Runs one driver tick for this entity.
    ///
    /// `delta` is the simulation tick length and `rendered` the position
    /// currently written to the entity transform.
    pub fn advance(&mut self, delta: Duration, rendered: Vec3) -> Advance {
        let mut advance = Advance{
            hits: std::mem::take(&mut self.pending_hits),
            ..default()
        };

        if self.ring.len() <= 1 {
            advance.starved = !self.buffering;
            self.buffering = true;
            return advance;
        }

        if self.buffering {
            return advance;
        }

        let Some(mut segment) = self.segment_ms() else {
            return advance;
        };
        if segment <= 0 {
            debug_assert!(segment > 0, "non increasing timestamps reached the driver");
            error!("segment duration: {segment}ms, holding pose");
            advance.invariant_violated = true;
            return advance;
        }

        self.clock.advance(delta);
        let mut elapsed = self.clock.elapsed_ms();

        while elapsed >= segment && self.ring.len() > 1 {
            if let Some(hit) = self.retire_head() {
                advance.hits.push(hit);
            }
            self.shrink_head_gap();

            let carryover = elapsed - segment;
            self.clock.restart(carryover);
            elapsed = carryover;
            advance.pose = self.head_pose();

            if self.ring.len() == 1 {
                debug!("playback starved, waiting for {} snapshots", self.target_fill);
                self.buffering = true;
                advance.starved = true;
                break;
            }

            match self.segment_ms() {
                Some(s) if s > 0 => segment = s,
                _ => {
                    debug_assert!(false, "non increasing timestamps reached the driver");
                    error!("invalid segment after retirement, holding pose");
                    advance.invariant_violated = true;
                    return advance;
                }
            }
        }

        if self.buffering {
            return advance;
        }

        let (Some(from), Some(to)) = (self.ring.get(0), self.ring.get(1)) else {
            return advance;
        };

        let t = elapsed as f32 / segment as f32;
        let segment_secs = segment as f32 / 1000.0;
        let position = M::blend_position(from, to, t, segment_secs);
        let rotation = M::blend_orientation(from, to, t);
        self.velocity = M::blend_velocity(from, to, t, segment_secs, FrameMotion{
            previous: rendered,
            current: position,
            tick_secs: delta.as_secs_f32()
        });

        advance.pose = Some(Transform::from_translation(position).with_rotation(rotation));
        advance
    }
}
