use bevy::prelude::*;
use crate::snapshot::Snapshot;

/// Rendered movement over the current simulation tick.
#[derive(Clone, Copy, Debug)]
pub struct FrameMotion {
    pub previous: Vec3,
    pub current: Vec3,
    pub tick_secs: f32
}

/// Blend step of the interpolation driver. Buffering and timing are
/// shared, implementors only decide how a segment is sampled.
pub trait MotionModel: Send + Sync + 'static {
    /// Whether a long stall before a snapshot is shrunk on arrival.
    const SHRINKS_LONG_GAPS: bool;

    fn blend_position(
        from: &Snapshot,
        to: &Snapshot,
        t: f32,
        segment_secs: f32
    ) -> Vec3;

    fn blend_velocity(
        from: &Snapshot,
        to: &Snapshot,
        t: f32,
        segment_secs: f32,
        motion: FrameMotion
    ) -> Vec3;

    #[inline]
    fn blend_orientation(from: &Snapshot, to: &Snapshot, t: f32) -> Quat {
        from.orientation.slerp(to.orientation, t)
    }
}

/// Straight line between positions, velocity by finite difference of
/// the rendered positions.
#[derive(Default, Clone, Copy, Debug)]
pub struct Linear;

impl MotionModel for Linear {
    const SHRINKS_LONG_GAPS: bool = false;

    #[inline]
    fn blend_position(from: &Snapshot, to: &Snapshot, t: f32, _: f32) -> Vec3 {
        from.position.lerp(to.position, t)
    }

    #[inline]
    fn blend_velocity(
        _: &Snapshot,
        _: &Snapshot,
        _: f32,
        _: f32,
        motion: FrameMotion
    ) -> Vec3 {
        if motion.tick_secs <= 0.0 {
            return Vec3::ZERO;
        }
        (motion.current - motion.previous) / motion.tick_secs
    }
}

/// Two point cubic Hermite spline over position and velocity.
/// Velocity is the analytic derivative of the same curve.
#[derive(Default, Clone, Copy, Debug)]
pub struct Hermite;

impl MotionModel for Hermite {
    const SHRINKS_LONG_GAPS: bool = true;

    fn blend_position(
        from: &Snapshot,
        to: &Snapshot,
        t: f32,
        segment_secs: f32
    ) -> Vec3 {
        let t2 = t * t;
        let t3 = t2 * t;

        (2.0 * t3 - 3.0 * t2 + 1.0) * from.position
        + (t3 - 2.0 * t2 + t) * segment_secs * from.velocity
        + (-2.0 * t3 + 3.0 * t2) * to.position
        + (t3 - t2) * segment_secs * to.velocity
    }

    fn blend_velocity(
        from: &Snapshot,
        to: &Snapshot,
        t: f32,
        segment_secs: f32,
        _: FrameMotion
    ) -> Vec3 {
        debug_assert!(segment_secs > 0.0);
        let t2 = t * t;

        ((6.0 * t2 - 6.0 * t) * from.position
        + (3.0 * t2 - 4.0 * t + 1.0) * segment_secs * from.velocity
        + (-6.0 * t2 + 6.0 * t) * to.position
        + (3.0 * t2 - 2.0 * t) * segment_secs * to.velocity)
        / segment_secs
    }
}
