//! Machine registry for front-end discovery.
//!
//! Each tester variant self-registers via [`inventory::submit!`] with a
//! [`MachineEntry`] holding its CLI name, a one-line description and a
//! factory function, so the front-end needs no central list.

use sftester_core::core::machine::Machine;

use crate::pmod_sf3::BoardConfig;

/// Describes one selectable tester variant.
pub struct MachineEntry {
    /// CLI name used to select this machine (e.g., "sf3-rtl").
    pub name: &'static str,
    pub description: &'static str,
    /// Factory: build the machine for a board configuration.
    pub create: fn(&BoardConfig) -> Box<dyn Machine>,
}

impl MachineEntry {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        create: fn(&BoardConfig) -> Box<dyn Machine>,
    ) -> Self {
        Self {
            name,
            description,
            create,
        }
    }
}

inventory::collect!(MachineEntry);

/// Return all registered machines, sorted by name.
pub fn all() -> Vec<&'static MachineEntry> {
    let mut entries: Vec<_> = inventory::iter::<MachineEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up a machine by its CLI name.
pub fn find(name: &str) -> Option<&'static MachineEntry> {
    inventory::iter::<MachineEntry>
        .into_iter()
        .find(|e| e.name == name)
}
