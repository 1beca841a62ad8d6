//! The resource cache ("media group")

use crate::resource::{Resource, ResourceKind};
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use xengine_core::{Clock, EngineError, MonotonicClock, Result};
use xengine_gpu::GpuBackend;

new_key_type! {
    /// Generation-checked slot of a cache entry
    pub struct ResourceKey;
}

type DestroyFn = fn(Rc<dyn Any>, &mut ResourceCache, &mut dyn GpuBackend);

enum EntryState {
    /// Placeholder while the loader runs
    Loading,
    Ready { value: Rc<dyn Any>, destroy: DestroyFn },
}

struct Entry {
    kind: ResourceKind,
    filename: String,
    state: EntryState,
    refcount: u32,
    /// When the refcount last dropped to zero
    zero_time: Option<f64>,
}

/// A counted reference to a cached resource.
///
/// Handles are not `Clone`: use [`ResourceCache::retain`] for another
/// reference and return every handle with [`ResourceCache::release`].
#[must_use = "handles must be returned with ResourceCache::release"]
pub struct Handle<T: Resource> {
    key: ResourceKey,
    value: Rc<T>,
}

impl<T: Resource> Handle<T> {
    pub fn key(&self) -> ResourceKey {
        self.key
    }

    /// True if both handles refer to the same cached instance
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.value, &b.value)
    }
}

impl<T: Resource> Deref for Handle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Resource> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({:?})", T::KIND, self.key)
    }
}

/// Counters reported by [`ResourceCache::stats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resources currently loaded
    pub resident: usize,
    /// Loaded resources with a zero refcount, waiting for a sweep
    pub unreferenced: usize,
    pub loads: usize,
    pub evictions: usize,
}

/// What a loader sees while it runs
pub struct LoadContext<'a> {
    cache: &'a mut ResourceCache,
    gpu: &'a mut dyn GpuBackend,
    filename: &'a str,
    path: PathBuf,
}

impl LoadContext<'_> {
    /// The cache-relative filename being loaded
    pub fn filename(&self) -> &str {
        self.filename
    }

    /// The resolved path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| self.load_error(e))
    }

    pub fn read_to_string(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| self.load_error(e))
    }

    pub fn gpu(&mut self) -> &mut dyn GpuBackend {
        &mut *self.gpu
    }

    /// Acquire a nested resource from the same cache
    pub fn acquire<U: Resource>(&mut self, filename: &str) -> Result<Handle<U>> {
        self.cache.acquire(filename, &mut *self.gpu)
    }

    /// Return a nested handle, e.g. when a later step of the load fails
    pub fn release<U: Resource>(&mut self, handle: Handle<U>) {
        self.cache.release(handle);
    }

    fn load_error(&self, err: impl fmt::Display) -> EngineError {
        EngineError::AssetLoad {
            path: self.filename.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Loads each `(kind, filename)` at most once and keeps it until swept
pub struct ResourceCache {
    root: PathBuf,
    clock: Box<dyn Clock>,
    entries: SlotMap<ResourceKey, Entry>,
    index: HashMap<(ResourceKind, String), ResourceKey>,
    loads: usize,
    evictions: usize,
}

impl ResourceCache {
    /// A cache resolving filenames relative to `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_clock(root, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock<P: AsRef<Path>>(root: P, clock: Box<dyn Clock>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            clock,
            entries: SlotMap::with_key(),
            index: HashMap::new(),
            loads: 0,
            evictions: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a handle to `filename`, loading it on first use.
    ///
    /// Acquiring a key whose loader is still running (a loader asking for
    /// itself, directly or through a cycle) fails with `RecursiveLoad`.
    pub fn acquire<T: Resource>(
        &mut self,
        filename: &str,
        gpu: &mut dyn GpuBackend,
    ) -> Result<Handle<T>> {
        let lookup = (T::KIND, filename.to_string());

        if let Some(&key) = self.index.get(&lookup) {
            if let Some(entry) = self.entries.get_mut(key) {
                let EntryState::Ready { value, .. } = &entry.state else {
                    return Err(EngineError::RecursiveLoad(filename.to_string()));
                };
                let value = value.clone().downcast::<T>().map_err(|_| EngineError::AssetLoad {
                    path: filename.to_string(),
                    reason: format!("cached entry is not a {}", T::KIND),
                })?;
                entry.refcount += 1;
                entry.zero_time = None;
                return Ok(Handle { key, value });
            }
        }

        let key = self.entries.insert(Entry {
            kind: T::KIND,
            filename: filename.to_string(),
            state: EntryState::Loading,
            refcount: 0,
            zero_time: None,
        });
        self.index.insert(lookup.clone(), key);

        let path = self.root.join(filename);
        let loaded = {
            let mut ctx = LoadContext {
                cache: self,
                gpu,
                filename,
                path,
            };
            T::load(&mut ctx)
        };

        match loaded {
            Ok(resource) => {
                let value = Rc::new(resource);
                let erased: Rc<dyn Any> = value.clone();
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.state = EntryState::Ready {
                        value: erased,
                        destroy: destroy_entry::<T>,
                    };
                    entry.refcount = 1;
                }
                self.loads += 1;
                log::info!("Loaded {} '{}'", T::KIND, filename);
                Ok(Handle { key, value })
            }
            Err(err) => {
                self.entries.remove(key);
                self.index.remove(&lookup);
                log::warn!("Failed to load {} '{}': {}", T::KIND, filename, err);
                Err(err.into_asset_load(filename))
            }
        }
    }

    /// Another reference to the resource behind `handle`
    pub fn retain<T: Resource>(&mut self, handle: &Handle<T>) -> Handle<T> {
        match self.entries.get_mut(handle.key) {
            Some(entry) => {
                entry.refcount += 1;
                entry.zero_time = None;
            }
            None => log::warn!("retain of a {} handle this cache does not own", T::KIND),
        }
        Handle {
            key: handle.key,
            value: handle.value.clone(),
        }
    }

    /// Return a handle. At refcount zero the resource stays loaded until a sweep.
    pub fn release<T: Resource>(&mut self, handle: Handle<T>) {
        let now = self.clock.now();
        let Some(entry) = self.entries.get_mut(handle.key) else {
            log::warn!("release of a {} handle this cache does not own", T::KIND);
            return;
        };
        if entry.refcount == 0 {
            log::warn!("{} '{}' released more often than acquired", entry.kind, entry.filename);
            return;
        }
        entry.refcount -= 1;
        if entry.refcount == 0 {
            entry.zero_time = Some(now);
            log::debug!("{} '{}' is now unreferenced", entry.kind, entry.filename);
        }
    }

    /// Free every unreferenced resource regardless of age
    pub fn sweep_now(&mut self, gpu: &mut dyn GpuBackend) -> usize {
        self.sweep(None, gpu)
    }

    /// Free unreferenced resources that have been unreferenced for at least `max_age`
    pub fn sweep_older_than(&mut self, max_age: Duration, gpu: &mut dyn GpuBackend) -> usize {
        self.sweep(Some(max_age.as_secs_f64()), gpu)
    }

    fn sweep(&mut self, max_age: Option<f64>, gpu: &mut dyn GpuBackend) -> usize {
        let mut freed = 0;
        // Unloading may release nested resources, which can then be swept too
        loop {
            let now = self.clock.now();
            let dead: Vec<ResourceKey> = self
                .entries
                .iter()
                .filter(|(_, e)| {
                    e.refcount == 0
                        && match (e.zero_time, max_age) {
                            (Some(_), None) => true,
                            (Some(t), Some(age)) => now - t >= age,
                            (None, _) => false,
                        }
                })
                .map(|(key, _)| key)
                .collect();

            if dead.is_empty() {
                break;
            }
            for key in dead {
                freed += self.evict(key, gpu) as usize;
            }
        }
        if freed > 0 {
            log::debug!("Swept {} unreferenced resources", freed);
        }
        freed
    }

    fn evict(&mut self, key: ResourceKey, gpu: &mut dyn GpuBackend) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.index.remove(&(entry.kind, entry.filename.clone()));
        self.evictions += 1;
        log::debug!("Evicting {} '{}'", entry.kind, entry.filename);
        if let EntryState::Ready { value, destroy } = entry.state {
            destroy(value, self, gpu);
        }
        true
    }

    /// Unload everything, referenced or not. For session teardown.
    pub fn clear(&mut self, gpu: &mut dyn GpuBackend) {
        let referenced = self.entries.values().filter(|e| e.refcount > 0).count();
        if referenced > 0 {
            log::warn!("Clearing cache with {} resources still referenced", referenced);
        }
        while let Some(key) = self.entries.keys().next() {
            self.evict(key, gpu);
        }
    }

    pub fn refcount(&self, kind: ResourceKind, filename: &str) -> Option<u32> {
        let key = self.index.get(&(kind, filename.to_string()))?;
        self.entries.get(*key).map(|e| e.refcount)
    }

    pub fn contains(&self, kind: ResourceKind, filename: &str) -> bool {
        self.index.contains_key(&(kind, filename.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.entries.len(),
            unreferenced: self.entries.values().filter(|e| e.refcount == 0).count(),
            loads: self.loads,
            evictions: self.evictions,
        }
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!(
                "Resource cache at {} dropped with {} resources still loaded",
                self.root.display(),
                self.entries.len()
            );
        }
    }
}

fn destroy_entry<T: Resource>(value: Rc<dyn Any>, cache: &mut ResourceCache, gpu: &mut dyn GpuBackend) {
    let Ok(typed) = value.downcast::<T>() else {
        return;
    };
    match Rc::try_unwrap(typed) {
        Ok(resource) => resource.unload(cache, gpu),
        Err(_) => log::warn!("{} still borrowed outside the cache; GPU objects leaked", T::KIND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xengine_core::ManualClock;
    use xengine_gpu::RecordingBackend;

    /// Text file whose first line may name another `Note` to load
    struct Note {
        text: String,
        linked: Option<Handle<Note>>,
    }

    impl Resource for Note {
        const KIND: ResourceKind = "note";

        fn load(ctx: &mut LoadContext<'_>) -> Result<Self> {
            let text = ctx.read_to_string()?;
            let linked = match text.lines().next().and_then(|l| l.strip_prefix("link ")) {
                Some(other) => Some(ctx.acquire::<Note>(other.trim())?),
                None => None,
            };
            Ok(Note { text, linked })
        }

        fn unload(self, cache: &mut ResourceCache, _gpu: &mut dyn GpuBackend) {
            if let Some(linked) = self.linked {
                cache.release(linked);
            }
        }
    }

    struct Fixture {
        dir: PathBuf,
        clock: ManualClock,
        cache: ResourceCache,
        gpu: RecordingBackend,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = std::env::temp_dir().join(format!("xengine-asset-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            for (name, text) in files {
                std::fs::write(dir.join(name), text).unwrap();
            }
            let clock = ManualClock::new(100.0);
            let cache = ResourceCache::with_clock(&dir, Box::new(clock.clone()));
            Self {
                dir,
                clock,
                cache,
                gpu: RecordingBackend::new(),
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.cache.clear(&mut self.gpu);
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    #[test]
    fn test_acquire_loads_once_and_counts() {
        let mut f = Fixture::new(&[("a.txt", "hello")]);
        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap());
        }
        assert_eq!(f.cache.stats().loads, 1);
        assert_eq!(f.cache.refcount("note", "a.txt"), Some(4));
        assert!(Handle::ptr_eq(&handles[0], &handles[3]));
        assert_eq!(handles[0].text, "hello");

        for h in handles {
            f.cache.release(h);
        }
        assert_eq!(f.cache.refcount("note", "a.txt"), Some(0));
        assert!(f.cache.contains("note", "a.txt"));
    }

    #[test]
    fn test_sweep_older_than_respects_age() {
        let mut f = Fixture::new(&[("a.txt", "hello")]);
        let h = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        f.cache.release(h);

        f.clock.advance(29.0);
        assert_eq!(f.cache.sweep_older_than(Duration::from_secs(30), &mut f.gpu), 0);
        assert!(f.cache.contains("note", "a.txt"));

        f.clock.advance(1.0);
        assert_eq!(f.cache.sweep_older_than(Duration::from_secs(30), &mut f.gpu), 1);
        assert!(!f.cache.contains("note", "a.txt"));
    }

    #[test]
    fn test_sweep_now_ignores_age_but_not_refcount() {
        let mut f = Fixture::new(&[("a.txt", "a"), ("b.txt", "b")]);
        let a = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        let b = f.cache.acquire::<Note>("b.txt", &mut f.gpu).unwrap();
        f.cache.release(a);

        assert_eq!(f.cache.sweep_now(&mut f.gpu), 1);
        assert!(!f.cache.contains("note", "a.txt"));
        assert!(f.cache.contains("note", "b.txt"));
        f.cache.release(b);
    }

    #[test]
    fn test_reacquire_cancels_pending_eviction() {
        let mut f = Fixture::new(&[("a.txt", "a")]);
        let h = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        f.cache.release(h);
        f.clock.advance(60.0);

        let h = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        assert_eq!(f.cache.sweep_older_than(Duration::from_secs(30), &mut f.gpu), 0);
        assert_eq!(f.cache.stats().loads, 1);
        f.cache.release(h);
    }

    #[test]
    fn test_retain_adds_reference() {
        let mut f = Fixture::new(&[("a.txt", "a")]);
        let h = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        let h2 = f.cache.retain(&h);
        assert_eq!(f.cache.refcount("note", "a.txt"), Some(2));
        f.cache.release(h);
        f.cache.release(h2);
        assert_eq!(f.cache.stats().unreferenced, 1);
    }

    #[test]
    fn test_missing_file_leaves_no_entry() {
        let mut f = Fixture::new(&[]);
        let err = f.cache.acquire::<Note>("missing.txt", &mut f.gpu).unwrap_err();
        assert!(matches!(err, EngineError::AssetLoad { ref path, .. } if path == "missing.txt"));
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_nested_loads_and_cascading_sweep() {
        let mut f = Fixture::new(&[("a.txt", "link b.txt\nbody"), ("b.txt", "leaf")]);
        let a = f.cache.acquire::<Note>("a.txt", &mut f.gpu).unwrap();
        assert_eq!(a.linked.as_ref().unwrap().text, "leaf");
        assert_eq!(f.cache.refcount("note", "b.txt"), Some(1));

        f.cache.release(a);
        assert_eq!(f.cache.sweep_now(&mut f.gpu), 2);
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_self_reference_is_recursive_load() {
        let mut f = Fixture::new(&[("loop.txt", "link loop.txt")]);
        let err = f.cache.acquire::<Note>("loop.txt", &mut f.gpu).unwrap_err();
        assert!(matches!(err, EngineError::RecursiveLoad(ref name) if name == "loop.txt"));
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_cycle_is_recursive_load_and_cleans_up() {
        let mut f = Fixture::new(&[("x.txt", "link y.txt"), ("y.txt", "link x.txt")]);
        let err = f.cache.acquire::<Note>("x.txt", &mut f.gpu).unwrap_err();
        assert!(matches!(err, EngineError::RecursiveLoad(_)));
        assert!(f.cache.is_empty());
    }
}
