//! Process-wide PIO instance registry.
//!
//! The host may run several PIO blocks side by side, addressed by a numeric
//! instance id. Blocks are fully disjoint; the registry owns each one
//! exclusively and hands out access per call. Misuse (double init, unknown
//! id) is logged and answered with safe defaults, never a panic.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error};
use once_cell::sync::Lazy;

use crate::host::HostGpio;
use crate::pio::PioBlock;

#[derive(Debug, thiserror::Error)]
#[error("no PIO instance with id {0}")]
pub struct UnknownInstance(pub i32);

static REGISTRY: Lazy<Mutex<HashMap<i32, PioBlock<HostGpio>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<i32, PioBlock<HostGpio>>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_block<R>(
    id: i32,
    access: impl FnOnce(&mut PioBlock<HostGpio>) -> R,
) -> Result<R, UnknownInstance> {
    registry()
        .get_mut(&id)
        .map(access)
        .ok_or(UnknownInstance(id))
}

/// Create block `id` with reset registers and state machines.
pub fn initialize(id: i32) {
    crate::host::install_logger();
    match registry().entry(id) {
        Entry::Occupied(_) => error!("PIO{id}: already initialized"),
        Entry::Vacant(slot) => {
            slot.insert(PioBlock::new(HostGpio));
            debug!("PIO{id}: created emulator instance");
        }
    }
}

/// Destroy block `id`.
pub fn deinitialize(id: i32) {
    if registry().remove(&id).is_none() {
        error!("{}", UnknownInstance(id));
    } else {
        debug!("PIO{id}: destroyed emulator instance");
    }
}

/// Destroy and recreate block `id`, losing all of its state.
pub fn reset(id: i32) {
    let mut map = registry();
    map.remove(&id);
    map.insert(id, PioBlock::new(HostGpio));
    debug!("PIO{id}: reset emulator instance");
}

/// Advance block `id` by up to `cycles` cycles; reports cycles performed.
pub fn execute(id: i32, cycles: u32) -> u32 {
    with_block(id, |block| block.execute(cycles)).unwrap_or_else(|err| {
        error!("{err}");
        0
    })
}

pub fn read_memory(id: i32, address: u32) -> u32 {
    with_block(id, |block| block.read(address)).unwrap_or_else(|err| {
        error!("{err}");
        0
    })
}

pub fn write_memory(id: i32, address: u32, value: u32) {
    if let Err(err) = with_block(id, |block| block.write(address, value)) {
        error!("{err}");
    }
}
