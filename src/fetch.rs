//! Entity-scoped fetch cells.
//!
//! A [`FetchCell`] is the async state of one secondary fetch:
//! `Idle -> Loading -> Success(V) | Failed(reason)`. Every transition into
//! `Loading` is stamped with a generation drawn from the owning registry's
//! clock; a resolution only lands if it carries the cell's current generation.
//! The clock never rewinds, not even on `clear()`, so a ticket issued before a
//! reset can never match a cell created after it.
//!
//! Nothing here performs I/O. Callers hand the returned [`FetchTicket`] to
//! whatever executes the request and pass it back on completion.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

pub type Generation = u64;

// ═══════════════════════════════════════════════════════════
// FetchState / FetchCell
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<V> {
    Idle,
    Loading,
    Success(V),
    Failed(String),
}

impl<V> FetchState<V> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success(_) => "success",
            Self::Failed(_) => "failed",
        }
    }
}

/// Monotonic source of generations shared by every cell of a registry.
#[derive(Debug, Default)]
pub struct GenerationClock {
    last: Generation,
}

impl GenerationClock {
    pub fn tick(&mut self) -> Generation {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> Generation {
        self.last
    }
}

/// Async state of one keyed fetch.
#[derive(Debug, Clone)]
pub struct FetchCell<V> {
    state: FetchState<V>,
    generation: Generation,
}

impl<V> Default for FetchCell<V> {
    fn default() -> Self {
        Self {
            state: FetchState::Idle,
            generation: 0,
        }
    }
}

impl<V> FetchCell<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state. Never triggers work.
    pub fn peek(&self) -> &FetchState<V> {
        &self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Start loading unless already loading or loaded.
    pub fn trigger(&mut self, clock: &mut GenerationClock) -> Option<Generation> {
        match self.state {
            FetchState::Loading | FetchState::Success(_) => None,
            FetchState::Idle | FetchState::Failed(_) => Some(self.start(clock)),
        }
    }

    /// Reload after a failure. Any other state is rejected.
    pub fn retry(&mut self, clock: &mut GenerationClock) -> Result<Generation, FetchState<()>> {
        match &self.state {
            FetchState::Failed(_) => Ok(self.start(clock)),
            FetchState::Idle => Err(FetchState::Idle),
            FetchState::Loading => Err(FetchState::Loading),
            FetchState::Success(_) => Err(FetchState::Success(())),
        }
    }

    /// Apply an outcome. Returns false (and changes nothing) when the
    /// generation is stale or the cell is not loading.
    pub fn resolve(&mut self, generation: Generation, outcome: Result<V, String>) -> bool {
        if !self.state.is_loading() || generation != self.generation {
            return false;
        }
        self.state = match outcome {
            Ok(value) => FetchState::Success(value),
            Err(reason) => FetchState::Failed(reason),
        };
        true
    }

    fn start(&mut self, clock: &mut GenerationClock) -> Generation {
        self.generation = clock.tick();
        self.state = FetchState::Loading;
        self.generation
    }
}

// ═══════════════════════════════════════════════════════════
// FetchRegistry
// ═══════════════════════════════════════════════════════════

/// Handle for one in-flight fetch: the key and the generation it was
/// issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket<K> {
    pub key: K,
    pub generation: Generation,
}

/// One [`FetchCell`] per key, plus the generation clock they share.
#[derive(Debug)]
pub struct FetchRegistry<K, V> {
    cells: HashMap<K, FetchCell<V>>,
    clock: GenerationClock,
}

impl<K, V> Default for FetchRegistry<K, V> {
    fn default() -> Self {
        Self {
            cells: HashMap::new(),
            clock: GenerationClock::default(),
        }
    }
}

impl<K, V> FetchRegistry<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the cell for `key`, starting a fetch only if the cell is new.
    ///
    /// An existing cell is reused whatever its state: a loading cell is not
    /// duplicated and a settled one is served from cache.
    pub fn open(&mut self, key: K) -> Option<FetchTicket<K>> {
        let cell = match self.cells.entry(key.clone()) {
            Entry::Occupied(entry) if !matches!(entry.get().peek(), FetchState::Idle) => {
                return None;
            }
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(FetchCell::new()),
        };
        cell.trigger(&mut self.clock)
            .map(|generation| FetchTicket { key, generation })
    }

    /// Reissue a failed fetch.
    pub fn retry(&mut self, key: &K) -> Result<FetchTicket<K>, FetchError> {
        let cell = self
            .cells
            .get_mut(key)
            .ok_or_else(|| FetchError::NoCell(key.to_string()))?;
        let generation = cell.retry(&mut self.clock).map_err(|state| FetchError::NotFailed {
            key: key.to_string(),
            state: state.label(),
        })?;
        Ok(FetchTicket {
            key: key.clone(),
            generation,
        })
    }

    /// Replace the cell for `key` with a fresh loading one.
    ///
    /// Works in any state, including absent. Whatever the old cell had in
    /// flight is superseded.
    pub fn invalidate(&mut self, key: K) -> FetchTicket<K> {
        let mut cell = FetchCell::new();
        let generation = cell.start(&mut self.clock);
        self.cells.insert(key.clone(), cell);
        FetchTicket { key, generation }
    }

    /// Apply the outcome of a ticket. False when the ticket is stale.
    pub fn resolve(&mut self, ticket: &FetchTicket<K>, outcome: Result<V, String>) -> bool {
        self.cells
            .get_mut(&ticket.key)
            .is_some_and(|cell| cell.resolve(ticket.generation, outcome))
    }

    pub fn peek(&self, key: &K) -> Option<&FetchState<V>> {
        self.cells.get(key).map(FetchCell::peek)
    }

    pub fn cell(&self, key: &K) -> Option<&FetchCell<V>> {
        self.cells.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cells.contains_key(key)
    }

    /// Drop every cell. The clock keeps counting.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Drop one cell. Its in-flight result, if any, will be discarded.
    pub fn remove(&mut self, key: &K) -> Option<FetchCell<V>> {
        self.cells.remove(key)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn loading_count(&self) -> usize {
        self.cells.values().filter(|c| c.peek().is_loading()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &FetchCell<V>)> {
        self.cells.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("No fetch has been started for {0}")]
    NoCell(String),
    #[error("Cannot retry {key}: fetch is {state}, not failed")]
    NotFailed { key: String, state: &'static str },
}
