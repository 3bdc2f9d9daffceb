//! World-mode policy and the deferred-stream sharing bus (§4.4 "Mode
//! policy", Design Note "Deferred stream sharing via mode key").
//!
//! The source looks up sharing peers dynamically by world/key at each
//! tick; we replace that with an explicit bus object keyed by an interned
//! string identifier. `EventSystem`s register with the bus at construction
//! and discover peers by identity — the bus itself is a dependency the host
//! constructs once and hands to every `EventSystem::new` call that should
//! participate, never an ambient/global singleton.

use crate::plain::PlainData;
use crate::sync::{Arc, Mutex};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Which other `EventSystem` instances may see this one's deferred streams
/// (§3 "EventSystem", §4.4 "Mode policy").
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WorldMode {
    /// Visibility confined to this `EventSystem` instance.
    Default,
    /// Shared with every other `EventSystem` flagged `Active` for the same
    /// world. The spec leaves "the active world" as an external, ambient
    /// Unity-ECS concept; ported here as an explicit, caller-supplied world
    /// identifier rather than a global "currently active world" lookup
    /// (DESIGN.md Open Question).
    Active(Arc<str>),
    /// Shared with every other `EventSystem` constructed with an equal key.
    Custom(Arc<str>),
}

impl WorldMode {
    fn bus_key(&self) -> BusKey {
        match self {
            WorldMode::Default => BusKey::Isolated,
            WorldMode::Active(world) => BusKey::Shared(format!("__active__{world}").into()),
            WorldMode::Custom(key) => BusKey::Shared(key.clone()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum BusKey {
    /// `Default` mode never shares — every instance gets its own private bus.
    Isolated,
    Shared(Arc<str>),
}

struct Bus {
    /// Deferred streams left over from the previous tick, per event type,
    /// type-erased behind `Any` since a bus may be shared by `EventSystem`s
    /// tracking many different event types.
    deferred: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Bus {
    fn new() -> Self {
        Self {
            deferred: Mutex::new(HashMap::new()),
        }
    }
}

/// Keyed registry of deferred-stream buses. Construct exactly one and pass
/// it to every `EventSystem::new` call that should be able to see each
/// other's deferred streams; `EventSystem`s constructed against different
/// registries (or against isolated `Default`-mode buses) never share
/// anything.
pub struct ModeBusRegistry {
    buses: Mutex<HashMap<BusKey, Arc<Bus>>>,
    isolated_counter: crate::sync::AtomicUsize,
}

impl Default for ModeBusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeBusRegistry {
    pub fn new() -> Self {
        Self {
            buses: Mutex::new(HashMap::new()),
            isolated_counter: crate::sync::AtomicUsize::new(0),
        }
    }

    pub(crate) fn bus_for(&self, mode: &WorldMode) -> Arc<Bus> {
        match mode.bus_key() {
            BusKey::Isolated => {
                // Each `Default`-mode EventSystem gets a private bus keyed
                // by a unique counter value, so it never collides with
                // another isolated instance's deferred streams.
                let id = self
                    .isolated_counter
                    .fetch_add(1, crate::sync::Ordering::Relaxed);
                let key = BusKey::Shared(format!("__isolated__{id}").into());
                self.buses.lock().entry(key).or_insert_with(|| Arc::new(Bus::new())).clone()
            }
            key @ BusKey::Shared(_) => {
                self.buses.lock().entry(key).or_insert_with(|| Arc::new(Bus::new())).clone()
            }
        }
    }
}

impl Bus {
    pub(crate) fn take_deferred<T: PlainData>(
        &self,
        event_type: TypeId,
    ) -> Vec<crate::stream::AnyStream<T>> {
        let mut deferred = self.deferred.lock();
        match deferred.remove(&event_type) {
            Some(boxed) => *boxed
                .downcast::<Vec<crate::stream::AnyStream<T>>>()
                .expect("TypeId key guarantees the stored Vec matches T"),
            None => Vec::new(),
        }
    }

    pub(crate) fn push_deferred<T: PlainData>(
        &self,
        event_type: TypeId,
        mut streams: Vec<crate::stream::AnyStream<T>>,
    ) {
        if streams.is_empty() {
            return;
        }
        let mut deferred = self.deferred.lock();
        let entry = deferred
            .entry(event_type)
            .or_insert_with(|| Box::new(Vec::<crate::stream::AnyStream<T>>::new()));
        let existing = entry
            .downcast_mut::<Vec<crate::stream::AnyStream<T>>>()
            .expect("TypeId key guarantees the stored Vec matches T");
        existing.append(&mut streams);
    }

    /// Peeks the number of streams currently deferred for `T`, without
    /// removing them. Used by `EventRegistry::reader_count`/`has_readers`,
    /// which must report on cross-tick state without consuming it.
    pub(crate) fn deferred_count<T: PlainData>(&self, event_type: TypeId) -> usize {
        let deferred = self.deferred.lock();
        match deferred.get(&event_type) {
            Some(boxed) => boxed
                .downcast_ref::<Vec<crate::stream::AnyStream<T>>>()
                .expect("TypeId key guarantees the stored Vec matches T")
                .len(),
            None => 0,
        }
    }
}

pub(crate) use Bus as ModeBus;
