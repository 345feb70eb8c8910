use bevy::prelude::*;
use bevy_replicon::prelude::*;
use crate::prelude::*;

/// Carries `NetworkSnapshot` and `NetworkDespawn` over replicon.
///
/// The server sends them with `ToClients`, clients receive them as
/// plain events which `InterpolationPlugin` routes to the buffers.
/// Add after the replicon plugins.
pub struct SnapshotReplicationPlugin;

impl Plugin for SnapshotReplicationPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<RepliconServer>()
        && !app.world().contains_resource::<RepliconClient>() {
            panic!("could not find replicon server nor client");
        }

        // late snapshots are useless, a lost despawn leaks an entity
        app.add_server_event::<NetworkSnapshot>(ChannelKind::Unreliable)
        .add_server_event::<NetworkDespawn>(ChannelKind::Ordered);

        if app.world().contains_resource::<RepliconClient>() {
            app.configure_sets(PreUpdate,
                InterpolationSet::Receive.after(ClientSet::Receive)
            );
        }
    }
}
