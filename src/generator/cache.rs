//! Method records and the compilation session that caches them.

use std::{
    fmt,
    sync::{Arc, OnceLock, RwLock},
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{bir::MethodActor, cir::CirGraph, generator::EventLog, Error, Result};

/// Which cache newly created method records are placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Bootstrapping: records go to the host cache.
    #[default]
    Host,
    /// Compiling for the running image: records go to the target cache.
    Target,
}

/// The generated code of one method.
///
/// Created once per method identity and filled in exactly once, after the last
/// pipeline stage completed. From then on the graph is immutable and shared.
pub struct MethodRecord {
    actor: MethodActor,
    graph: OnceLock<Arc<CirGraph>>,
}

impl MethodRecord {
    fn new(actor: MethodActor) -> Self {
        Self {
            actor,
            graph: OnceLock::new(),
        }
    }

    /// The method identity.
    #[must_use]
    pub fn actor(&self) -> &MethodActor {
        &self.actor
    }

    /// Returns `true` once the pipeline finished for this method.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.graph.get().is_some()
    }

    /// The finished graph, `None` while generation is still running.
    #[must_use]
    pub fn graph(&self) -> Option<&Arc<CirGraph>> {
        self.graph.get()
    }

    /// Marks the record generated. Later calls are ignored.
    pub(crate) fn complete(&self, graph: CirGraph) -> bool {
        self.graph.set(Arc::new(graph)).is_ok()
    }
}

impl fmt::Debug for MethodRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRecord")
            .field("actor", &self.actor.to_string())
            .field("generated", &self.is_generated())
            .finish()
    }
}

type MethodCache = DashMap<MethodActor, Arc<MethodRecord>>;

/// Shared state of one compilation run.
///
/// Holds the host and target method caches, the current [`Phase`] and the event log
/// every stage reports to. All methods take `&self`; a session is shared between the
/// threads compiling methods in parallel.
///
/// # Thread Safety
///
/// Record creation is atomic per method identity: of several threads asking for the
/// same method, exactly one receives `created == true`.
#[derive(Debug, Default)]
pub struct CompilationSession {
    host: MethodCache,
    target: MethodCache,
    phase: RwLock<Phase>,
    events: EventLog,
}

impl CompilationSession {
    /// Creates an empty session in the host phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session in the given phase.
    #[must_use]
    pub fn with_phase(phase: Phase) -> Self {
        Self {
            phase: RwLock::new(phase),
            ..Self::default()
        }
    }

    /// The current phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the phase lock was poisoned.
    pub fn phase(&self) -> Result<Phase> {
        self.phase.read().map(|phase| *phase).map_err(|_| Error::LockError)
    }

    /// Switches the phase for records created from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the phase lock was poisoned.
    pub fn set_phase(&self, phase: Phase) -> Result<()> {
        let mut current = self.phase.write().map_err(|_| Error::LockError)?;
        *current = phase;
        Ok(())
    }

    /// Events recorded by every method compiled in this session.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Looks `actor` up in the host cache, then in the target cache.
    #[must_use]
    pub fn lookup(&self, actor: &MethodActor) -> Option<Arc<MethodRecord>> {
        self.host
            .get(actor)
            .or_else(|| self.target.get(actor))
            .map(|record| Arc::clone(record.value()))
    }

    /// Returns the record for `actor`, creating it in the current phase's cache if no
    /// cache holds one yet.
    ///
    /// The flag is `true` for the caller that created the record; that caller is
    /// responsible for generating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the phase lock was poisoned.
    pub fn create_method(&self, actor: MethodActor) -> Result<(Arc<MethodRecord>, bool)> {
        // Held until the record is inserted so the phase cannot change in between.
        let phase = self.phase.read().map_err(|_| Error::LockError)?;
        if let Some(record) = self.lookup(&actor) {
            return Ok((record, false));
        }
        let cache = match *phase {
            Phase::Host => &self.host,
            Phase::Target => &self.target,
        };
        Ok(match cache.entry(actor) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let record = Arc::new(MethodRecord::new(entry.key().clone()));
                entry.insert(Arc::clone(&record));
                (record, true)
            }
        })
    }

    /// Evicts the record for `actor` from both caches.
    pub fn remove(&self, actor: &MethodActor) -> Option<Arc<MethodRecord>> {
        let host = self.host.remove(actor).map(|(_, record)| record);
        let target = self.target.remove(actor).map(|(_, record)| record);
        host.or(target)
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.len() + self.target.len()
    }

    /// Returns `true` if no record is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::bir::Kind;

    fn actor(name: &str) -> MethodActor {
        MethodActor::new("T", name, vec![Kind::Int], Kind::Int)
    }

    #[test]
    fn test_created_once() {
        let session = CompilationSession::new();
        let (first, created) = session.create_method(actor("f")).expect("created");
        assert!(created);
        let (second, created) = session.create_method(actor("f")).expect("found");
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.len(), 1);
        assert!(!first.is_generated());
    }

    #[test]
    fn test_concurrent_creation() {
        let session = CompilationSession::new();
        let winners: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| session.create_method(actor("g")).expect("created").1))
                .collect();
            handles
                .into_iter()
                .map(|handle| usize::from(handle.join().expect("thread panicked")))
                .sum()
        });
        assert_eq!(winners, 1);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_host_shadows_target() {
        let session = CompilationSession::with_phase(Phase::Target);
        let (target, _) = session.create_method(actor("h")).expect("created");
        session.set_phase(Phase::Host).expect("phase");
        let (found, created) = session.create_method(actor("h")).expect("found");
        assert!(!created);
        assert!(Arc::ptr_eq(&target, &found));

        assert!(session.remove(&actor("h")).is_some());
        assert!(session.is_empty());
        assert!(session.lookup(&actor("h")).is_none());
    }

    #[test]
    fn test_creation_races_phase_switch() {
        for round in 0..32 {
            let session = CompilationSession::new();
            let name = format!("r{round}");
            let winners: usize = thread::scope(|scope| {
                let switcher = scope.spawn(|| {
                    for phase in [Phase::Target, Phase::Host].into_iter().cycle().take(64) {
                        session.set_phase(phase).expect("phase");
                    }
                });
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| session.create_method(actor(&name)).expect("created").1))
                    .collect();
                switcher.join().expect("switcher panicked");
                handles
                    .into_iter()
                    .map(|handle| usize::from(handle.join().expect("thread panicked")))
                    .sum()
            });
            assert_eq!(winners, 1);
            assert_eq!(session.len(), 1);
        }
    }
}
