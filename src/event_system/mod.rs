//! The public coordinator (§3 "EventSystem", §6 "External Interfaces"): one
//! `EventSystem` per host scheduler instance, holding a block pool, a world
//! mode, and one [`registry::EventRegistry`] per event type it has ever been
//! asked about.

mod mode;
mod registry;

pub use mode::{ModeBusRegistry, WorldMode};

use crate::block_pool::BlockPool;
use crate::error::Result;
use crate::handle::TaskHandle;
use crate::plain::PlainData;
use crate::stream::{IndexWriter, Reader, ThreadWriter};
use crate::sync::{Arc, Mutex};
use mode::{ModeBus, ModeBusRegistry};
use registry::EventRegistry;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Object-safe façade over `EventRegistry<E>` so `EventSystem::update` can
/// sweep every registered event type without knowing any of their concrete
/// `E`s. `as_any_mut` recovers the concrete type for the typed accessors.
trait AnyRegistry: Any + Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn update(&mut self, bus: &ModeBus, event_type: TypeId) -> (usize, usize);
}

impl<E: PlainData> AnyRegistry for EventRegistry<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn update(&mut self, bus: &ModeBus, event_type: TypeId) -> (usize, usize) {
        EventRegistry::update(self, bus, event_type)
    }
}

/// The coordinator a host constructs once per scheduler instance (§3).
/// Holds the block pool every stream it creates allocates from, the world
/// mode governing cross-instance deferred-stream visibility, and a
/// `TypeId`-keyed table of per-event-type rendezvous state.
pub struct EventSystem {
    registries: Mutex<HashMap<TypeId, Box<dyn AnyRegistry>>>,
    pool: Arc<BlockPool>,
    mode: WorldMode,
    bus: Arc<ModeBus>,
}

impl EventSystem {
    /// Constructs a system backed by `pool`, participating in `mode`'s
    /// sharing group via `bus_registry`. Two `EventSystem`s built against the
    /// same `bus_registry` with equal `Custom`/`Active` keys see each other's
    /// deferred streams; `Default` mode never shares, regardless of registry.
    pub fn new(pool: Arc<BlockPool>, mode: WorldMode, bus_registry: &ModeBusRegistry) -> Self {
        let bus = bus_registry.bus_for(&mode);
        Self {
            registries: Mutex::new(HashMap::new()),
            pool,
            mode,
            bus,
        }
    }

    pub fn mode(&self) -> &WorldMode {
        &self.mode
    }

    pub fn pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }

    fn with_registry<E: PlainData, R>(&self, f: impl FnOnce(&mut EventRegistry<E>) -> R) -> R {
        let mut registries = self.registries.lock();
        let entry = registries
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(EventRegistry::<E>::new()) as Box<dyn AnyRegistry>);
        let registry = entry
            .as_any_mut()
            .downcast_mut::<EventRegistry<E>>()
            .expect("TypeId key guarantees the stored registry matches E");
        f(registry)
    }

    /// `create_writer::<E>()` (§6): a thread-indexed writer, one partition
    /// per thread up to `max_threads`.
    pub fn create_writer<E: PlainData>(&self, max_threads: usize) -> Result<ThreadWriter<E>> {
        self.with_registry::<E, _>(|registry| registry.create_writer(&self.pool, max_threads))
    }

    /// `create_writer::<E>(P)` (§6): a caller-indexed writer with a fixed
    /// partition count, independent of thread layout.
    pub fn create_indexed_writer<E: PlainData>(&self, partition_count: usize) -> Result<IndexWriter<E>> {
        self.with_registry::<E, _>(|registry| registry.create_indexed_writer(&self.pool, partition_count))
    }

    /// `add_producer_handle::<E>(h)` (§6).
    pub fn add_producer_handle<E: PlainData>(&self, handle: Arc<dyn TaskHandle>) -> Result<()> {
        self.with_registry::<E, _>(|registry| registry.add_producer_handle(handle))
    }

    /// `acquire_readers::<E>(dep)` (§6): returns a handle dominating `dep`
    /// and every producer published since the last acquire, plus one reader
    /// per stream currently visible to this event type.
    pub fn acquire_readers<E: PlainData>(
        &self,
        dep: Arc<dyn TaskHandle>,
    ) -> Result<(Arc<dyn TaskHandle>, Vec<Reader<E>>)> {
        let bus = self.bus.clone();
        let event_type = TypeId::of::<E>();
        self.with_registry::<E, _>(|registry| registry.acquire_readers(dep, &bus, event_type))
    }

    /// `add_consumer_handle::<E>(h)` (§6).
    pub fn add_consumer_handle<E: PlainData>(&self, handle: Arc<dyn TaskHandle>) -> Result<()> {
        self.with_registry::<E, _>(|registry| registry.add_consumer_handle(handle))
    }

    /// `has_readers::<E>()` (§6).
    pub fn has_readers<E: PlainData>(&self) -> bool {
        let bus = self.bus.clone();
        let event_type = TypeId::of::<E>();
        self.with_registry::<E, _>(|registry| registry.has_readers(&bus, event_type))
    }

    /// `reader_count::<E>()` (§6).
    pub fn reader_count<E: PlainData>(&self) -> usize {
        let bus = self.bus.clone();
        let event_type = TypeId::of::<E>();
        self.with_registry::<E, _>(|registry| registry.reader_count(&bus, event_type))
    }

    /// Runs the end-of-tick protocol (§4.4) across every event type this
    /// system has ever been asked about.
    pub fn update(&self) {
        let mut registries = self.registries.lock();
        for (event_type, registry) in registries.iter_mut() {
            let (disposed, deferred) = registry.update(&self.bus, *event_type);
            tracing::debug!(?event_type, disposed, deferred, "event registry tick update");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_pool::BlockPoolConfig;
    use crate::handle::{NullHandle, StaticThreadContext};
    use crate::stream::StreamReader;

    #[test]
    fn default_mode_systems_never_share_deferred_streams() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let bus_registry = ModeBusRegistry::new();
        let a = EventSystem::new(pool.clone(), WorldMode::Default, &bus_registry);
        let b = EventSystem::new(pool, WorldMode::Default, &bus_registry);

        let writer = a.create_writer::<u32>(1).unwrap();
        writer.write(&StaticThreadContext(0), 5).unwrap();
        a.add_producer_handle::<u32>(Arc::new(NullHandle)).unwrap();
        a.update();

        assert!(a.has_readers::<u32>());
        assert!(!b.has_readers::<u32>());
    }

    #[test]
    fn custom_mode_systems_share_deferred_streams_across_ticks() {
        let pool = Arc::new(BlockPool::new(BlockPoolConfig::default()));
        let bus_registry = ModeBusRegistry::new();
        let key: Arc<str> = Arc::from("physics");
        let a = EventSystem::new(pool.clone(), WorldMode::Custom(key.clone()), &bus_registry);
        let b = EventSystem::new(pool, WorldMode::Custom(key), &bus_registry);

        let writer = a.create_writer::<u32>(1).unwrap();
        writer.write(&StaticThreadContext(0), 9).unwrap();
        a.add_producer_handle::<u32>(Arc::new(NullHandle)).unwrap();
        a.update();

        assert!(b.has_readers::<u32>());
        let (handle, mut readers) = b.acquire_readers::<u32>(Arc::new(NullHandle)).unwrap();
        handle.wait();
        assert_eq!(readers.len(), 1);
        assert_eq!(readers[0].begin_partition(0).unwrap(), 1);
        assert_eq!(readers[0].read().unwrap(), 9u32);
        readers[0].end_partition().unwrap();
        b.add_consumer_handle::<u32>(Arc::new(NullHandle)).unwrap();
        b.update();
    }
}
