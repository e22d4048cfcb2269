// id.rs — Stable integer identifiers for engine objects
//
// Pins and logical threads are addressed by dense ids allocated in
// declaration order, so a pin id doubles as its column index in every
// vector snapshot.

use serde::Serialize;

/// Identifier for a declared pin (its column in the vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PinId(pub u32);

impl PinId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier for a logical thread within one `ThreadSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ThreadId(pub u32);

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (declaration) order, ensuring deterministic assignment.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_pin: u32,
    next_thread: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_pin(&mut self) -> PinId {
        let id = PinId(self.next_pin);
        self.next_pin += 1;
        id
    }

    pub fn alloc_thread(&mut self) -> ThreadId {
        let id = ThreadId(self.next_thread);
        self.next_thread += 1;
        id
    }
}
