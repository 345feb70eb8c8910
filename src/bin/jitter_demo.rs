use std::time::Duration;
use bevy::{
    app::ScheduleRunnerPlugin,
    log::LogPlugin,
    prelude::*
};
use bevy_replicon_interpolation::dev::*;

fn main() {
    App::new()
    .add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
            Duration::from_secs_f32(DEV_TICK_DELTA)
        )),
        LogPlugin{
            level: LOG_LEVEL,
            ..default()
        }
    ))
    .add_plugins(LossyLinkPlugin)
    .run();
}
