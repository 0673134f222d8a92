use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::config::LocationSeed;
use crate::core::state::AppState;
use crate::stores::record_store::RecordStore;
use crate::wal::wal::WalOperation;

// this runs at boot time
pub fn apply_wal_operations(state: &AppState, operations: Vec<WalOperation>) {
    for op in operations {
        state.store.apply(op);
    }
}

/// Create configured locations that do not exist yet. Existing locations
/// keep their replayed secret, types and machines.
pub fn seed_locations(state: &AppState) -> Result<usize> {
    let mut created = 0;

    for seed in &state.config.locations {
        if let Some(existing) = state.store.location_by_name(&seed.name) {
            debug!(location_id = existing.id, name = %seed.name, "Location already present, not seeding");
            continue;
        }

        seed_location(&state.store, seed).with_context(|| format!("Failed to seed location '{}'", seed.name))?;
        created += 1;
    }

    Ok(created)
}

fn seed_location(store: &RecordStore, seed: &LocationSeed) -> Result<()> {
    let location = store.add_location(&seed.name, &seed.secret)?;

    for user_type in &seed.types {
        store.add_type(location.id, &user_type.name, user_type.level)?;
    }

    for machine in &seed.machines {
        store.add_machine(location.id, machine)?;
    }

    info!(
        location_id = location.id,
        name = %location.name,
        types = seed.types.len(),
        machines = seed.machines.len(),
        "Location seeded"
    );

    Ok(())
}
