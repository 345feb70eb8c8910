use std::time::Duration;
use bevy::prelude::*;
use bevy_replicon_interpolation::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Resource, Default)]
struct Contacts(Vec<TerrainContact>);

fn collect_contacts(mut reader: EventReader<TerrainContact>, mut contacts: ResMut<Contacts>) {
    contacts.0.extend(reader.read().copied());
}

fn app_with<M: MotionModel>(config: InterpolationConfig<M>) -> App {
    let mut app = App::new();
    app.insert_resource(Time::<()>::default())
    .insert_resource(config)
    .init_resource::<Contacts>()
    .add_plugins(InterpolationPlugin::<M>::default())
    .add_systems(Update, collect_contacts.after(InterpolationSet::Interpolate));
    app
}

fn spawn<M: MotionModel>(app: &mut App, id: u32, seed: Snapshot) -> Entity {
    let bundle = {
        let config = app.world().resource::<InterpolationConfig<M>>();
        NetworkInterpolationBundle::new(id, seed, config).unwrap()
    };
    app.world_mut().spawn(bundle).id()
}

fn send(app: &mut App, id: u32, snapshot: Snapshot) {
    app.world_mut().send_event(NetworkSnapshot{ id, snapshot });
}

fn tick(app: &mut App, ms: u64) {
    app.world_mut()
    .resource_mut::<Time>()
    .advance_by(Duration::from_millis(ms));
    app.update();
}

fn translation(app: &App, e: Entity) -> Vec3 {
    app.world().get::<Transform>(e).unwrap().translation
}

fn along_x(ts: i32) -> Snapshot {
    Snapshot::at(Vec3::X * ts as f32, ts)
}

#[test]
fn playback_waits_for_target_fill() {
    let mut app = app_with(InterpolationConfig::<Linear>::default());
    let e = spawn::<Linear>(&mut app, 1, along_x(0));

    for ts in [50, 100, 150] {
        send(&mut app, 1, along_x(ts));
    }
    for _ in 0..5 {
        tick(&mut app, 16);
        assert_eq!(translation(&app, e), Vec3::ZERO);
    }

    send(&mut app, 1, along_x(200));
    tick(&mut app, 25);
    assert!((translation(&app, e).x - 25.0).abs() < 1e-3);

    tick(&mut app, 25);
    assert_eq!(translation(&app, e), Vec3::X * 50.0);
    let buffer = app.world().get::<SnapshotBuffer<Linear>>(e).unwrap();
    assert_eq!(buffer.timestamps(), vec![50, 100, 150, 200]);
}

#[test]
fn linear_playback_stays_between_snapshots() {
    let mut app = app_with(InterpolationConfig::<Linear>::default());
    let e = spawn::<Linear>(&mut app, 1, along_x(0));
    for ts in [40, 80, 120, 160, 200, 240] {
        send(&mut app, 1, along_x(ts));
    }

    let mut last = 0.0;
    for _ in 0..10 {
        tick(&mut app, 16);
        let x = translation(&app, e).x;
        let buffer = app.world().get::<SnapshotBuffer<Linear>>(e).unwrap();
        let from = buffer.front().unwrap().position.x;
        assert!(x >= from && x < from + 40.0);
        assert!(x >= last);
        last = x;
    }

    let buffer = app.world().get::<SnapshotBuffer<Linear>>(e).unwrap();
    assert!((buffer.velocity().x - 1000.0).abs() < 1.0);
}

#[test]
fn starvation_freezes_pose() {
    let mut app = app_with(InterpolationConfig::<Linear>{
        target_fill: 3,
        ..default()
    });
    let e = spawn::<Linear>(&mut app, 1, along_x(0));
    send(&mut app, 1, along_x(50));
    send(&mut app, 1, along_x(100));

    for _ in 0..13 {
        tick(&mut app, 16);
    }
    assert_eq!(translation(&app, e), Vec3::X * 100.0);

    let buffer = app.world().get::<SnapshotBuffer<Linear>>(e).unwrap();
    assert!(buffer.is_buffering());
    assert_eq!(buffer.len(), 1);
    assert_eq!(app.world().resource::<InterpolationStats<Linear>>().starvations, 1);

    // a single late snapshot does not restart playback
    send(&mut app, 1, along_x(150));
    for _ in 0..5 {
        tick(&mut app, 16);
        assert_eq!(translation(&app, e), Vec3::X * 100.0);
    }

    send(&mut app, 1, along_x(200));
    tick(&mut app, 16);
    assert!(translation(&app, e).x > 100.0);
}

#[test]
fn terrain_tag_fires_once() {
    let mut app = app_with(InterpolationConfig::<Linear>{
        target_fill: 3,
        ..default()
    });
    let e = spawn::<Linear>(&mut app, 9, along_x(0));
    send(&mut app, 9, along_x(50));
    send(&mut app, 9, along_x(100).with_terrain(3));
    send(&mut app, 9, along_x(150));
    send(&mut app, 9, along_x(200));

    for _ in 0..20 {
        tick(&mut app, 16);
    }

    let contacts = &app.world().resource::<Contacts>().0;
    assert_eq!(contacts.len(), 1);
    let contact = contacts[0];
    assert_eq!(contact.terrain, 3);
    assert_eq!(contact.entity, e);
    assert_eq!(contact.network_id, Some(9));
    assert_eq!(contact.position, Vec3::X * 100.0);
    // 50 units between 20hz snapshots
    assert_eq!(contact.approx_impact_speed_sq, 1000.0 * 1000.0);
    assert_eq!(app.world().resource::<InterpolationStats<Linear>>().terrain_contacts, 1);
}

#[test]
fn stale_snapshots_are_discarded() {
    let mut app = app_with(InterpolationConfig::<Linear>::default());
    let e = spawn::<Linear>(&mut app, 1, along_x(100));
    send(&mut app, 1, along_x(80));
    send(&mut app, 1, along_x(150));
    send(&mut app, 1, along_x(150));
    tick(&mut app, 16);

    let buffer = app.world().get::<SnapshotBuffer<Linear>>(e).unwrap();
    assert_eq!(buffer.timestamps(), vec![100, 150]);

    let stats = app.world().resource::<InterpolationStats<Linear>>();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.discarded, 2);
}

#[test]
fn malformed_snapshots_are_discarded() {
    let mut app = app_with(InterpolationConfig::<Hermite>::default());
    let e = spawn::<Hermite>(&mut app, 1, along_x(0));
    send(&mut app, 1, Snapshot::at(Vec3::splat(f32::NAN), 50));
    tick(&mut app, 16);

    assert_eq!(app.world().get::<SnapshotBuffer<Hermite>>(e).unwrap().len(), 1);
    assert_eq!(app.world().resource::<InterpolationStats<Hermite>>().discarded, 1);
}

#[test]
fn hermite_velocity_is_continuous_at_boundaries() {
    let mut app = app_with(InterpolationConfig::<Hermite>{
        target_fill: 3,
        ..default()
    });
    let moving = |ts: i32, speed: f32| Snapshot::new(
        Vec3::X * ts as f32 / 10.0,
        Vec3::X * speed,
        Quat::IDENTITY,
        ts
    );
    let e = spawn::<Hermite>(&mut app, 1, moving(0, 100.0));
    send(&mut app, 1, moving(50, 80.0));
    send(&mut app, 1, moving(100, 120.0));
    send(&mut app, 1, moving(150, 100.0));

    tick(&mut app, 25);
    tick(&mut app, 25);

    let buffer = app.world().get::<SnapshotBuffer<Hermite>>(e).unwrap();
    assert_eq!(buffer.front().unwrap().timestamp, 50);
    assert!(buffer.velocity().abs_diff_eq(Vec3::X * 80.0, 1e-2));
    assert!(translation(&app, e).abs_diff_eq(Vec3::X * 5.0, 1e-4));
}

#[test]
fn hermite_stall_after_starvation_is_shrunk() {
    let mut app = app_with(InterpolationConfig::<Hermite>{
        target_fill: 3,
        ..default()
    });
    let e = spawn::<Hermite>(&mut app, 1, along_x(0));
    send(&mut app, 1, along_x(50));
    send(&mut app, 1, along_x(100));
    for _ in 0..7 {
        tick(&mut app, 16);
    }
    assert_eq!(translation(&app, e), Vec3::X * 100.0);
    assert_eq!(app.world().resource::<InterpolationStats<Hermite>>().starvations, 1);

    send(&mut app, 1, along_x(1050));
    send(&mut app, 1, along_x(1100));
    tick(&mut app, 16);

    // the 950ms stall played back as a 10ms catch up
    let buffer = app.world().get::<SnapshotBuffer<Hermite>>(e).unwrap();
    assert_eq!(buffer.timestamps(), vec![1050, 1100]);
    let x = translation(&app, e).x;
    assert!((1050.0..1100.0).contains(&x));
}

#[test]
fn duplicate_network_ids_route_to_one_buffer() {
    let mut app = app_with(InterpolationConfig::<Linear>::default());
    let a = spawn::<Linear>(&mut app, 4, along_x(0));
    let b = spawn::<Linear>(&mut app, 4, along_x(0));
    send(&mut app, 4, along_x(50));
    tick(&mut app, 16);

    let len = |e: Entity| app.world().get::<SnapshotBuffer<Linear>>(e).unwrap().len();
    assert_eq!(len(a) + len(b), 3);
    assert_eq!(app.world().resource::<InterpolationStats<Linear>>().accepted, 1);
}

#[test]
fn shuffled_arrivals_keep_timestamps_increasing() {
    let mut rng = StdRng::seed_from_u64(42);
    let config = InterpolationConfig::<Linear>{
        capacity: 6,
        target_fill: 3,
        ..default()
    };

    for _ in 0..50 {
        let mut timestamps = (1..40).map(|i| i * 10).collect::<Vec<i32>>();
        timestamps.extend_from_slice(&[50, 50, 120, 300]);
        timestamps.shuffle(&mut rng);

        let mut buffer = SnapshotBuffer::with_seed(along_x(0), &config).unwrap();
        for ts in timestamps {
            let before = buffer.timestamps();
            match buffer.add_point(along_x(ts)) {
                Ok(()) => assert_eq!(buffer.back().unwrap().timestamp, ts),
                Err(_) => assert_eq!(buffer.timestamps(), before)
            }

            let after = buffer.timestamps();
            assert!(after.len() <= config.capacity);
            assert!(after.windows(2).all(|w| w[0] < w[1]));

            if ts % 30 == 0 {
                buffer.advance(Duration::from_millis(16), Vec3::ZERO);
            }
        }
    }
}
