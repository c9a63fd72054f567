//! Per-thread runtime pool.
//!
//! Embedded interpreters are not safe to share between threads, so every
//! thread that applies a transformer gets its own runtime with its own
//! compiled copy of the scripts. Runtimes live in a thread-local list keyed
//! by pool id; the steady-state path takes no locks.
//!
//! The first call on a new thread pays the compilation cost. The thread that
//! configures the transformer compiles eagerly so that script errors surface
//! from `configure`.
//!
//! A dropped pool removes its runtime on the dropping thread at once; other
//! threads release theirs on their next lookup for any pool. Runtimes still
//! held when a thread exits are dropped with it, except those reporting
//! [`ScriptRuntime::drop_on_thread_exit`] as false, which are leaked.

use crate::stats::TransformStats;
use sf_error::{CompilationError, Result, SfError};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::debug;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static LOCAL_RUNTIMES: RefCell<LocalRuntimes> = const { RefCell::new(LocalRuntimes::new()) };
}

/// The calling thread's runtimes, one per live pool.
struct LocalRuntimes {
    entries: Vec<LocalEntry>,
}

impl LocalRuntimes {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Removes entries whose pool has been dropped on another thread.
    ///
    /// The removed entries are returned so the caller can drop them after
    /// releasing the thread-local borrow.
    fn prune(&mut self) -> Vec<LocalEntry> {
        if self.entries.iter().all(|entry| entry.owner.strong_count() > 0) {
            return Vec::new();
        }
        let (live, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.owner.strong_count() > 0);
        self.entries = live;
        stale
    }
}

impl Drop for LocalRuntimes {
    // Only runs while the thread exits. Interpreter thread-locals may already
    // be destroyed at that point, so runtimes that depend on them are leaked.
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            let droppable = entry
                .instance
                .try_borrow()
                .is_ok_and(|instance| instance.runtime.drop_on_thread_exit());
            if !droppable {
                std::mem::forget(entry.instance);
            }
        }
    }
}

/// A thread's runtime for one pool.
struct LocalEntry {
    pool_id: u64,

    /// Dead once the owning pool is dropped; used to prune stale entries.
    owner: Weak<()>,

    instance: Rc<RefCell<CompiledInstance>>,
}

/// One runtime plus the handles compiled into it.
pub(crate) struct CompiledInstance {
    pub(crate) runtime: Box<dyn ScriptRuntime>,
    pub(crate) key: Option<KeyFunctionHandle>,
    pub(crate) value: Option<ValueFunctionHandle>,
}

/// Script sources every thread compiles from.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptSources {
    pub(crate) key: Option<String>,
    pub(crate) value: Option<String>,
}

pub(crate) struct RuntimePool {
    id: u64,
    owner: Arc<()>,
    engine: Arc<dyn ScriptEngine>,
    sources: ScriptSources,
    stats: Arc<TransformStats>,
}

impl std::fmt::Debug for RuntimePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimePool")
            .field("id", &self.id)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl RuntimePool {
    /// Creates the pool and compiles the calling thread's runtime.
    pub(crate) fn new(
        engine: Arc<dyn ScriptEngine>,
        sources: ScriptSources,
        stats: Arc<TransformStats>,
    ) -> std::result::Result<Self, CompilationError> {
        let pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            owner: Arc::new(()),
            engine,
            sources,
            stats,
        };
        let instance = pool.compile()?;
        pool.install(Rc::new(RefCell::new(instance)));
        Ok(pool)
    }

    /// Runs `f` against this thread's runtime, compiling one first if the
    /// thread has none yet.
    pub(crate) fn with_instance<R>(
        &self,
        f: impl FnOnce(&mut CompiledInstance) -> Result<R>,
    ) -> Result<R> {
        let instance = match self.local_instance() {
            Some(instance) => instance,
            None => {
                let instance = Rc::new(RefCell::new(self.compile()?));
                self.install(Rc::clone(&instance));
                instance
            }
        };

        let mut guard = instance.try_borrow_mut().map_err(|_| {
            SfError::IllegalState("transformer re-entered on the same thread".to_string())
        })?;
        f(&mut guard)
    }

    fn local_instance(&self) -> Option<Rc<RefCell<CompiledInstance>>> {
        let (instance, _stale) = LOCAL_RUNTIMES.with(|entries| {
            let mut local = entries.borrow_mut();
            let stale = local.prune();
            let instance = local
                .entries
                .iter()
                .find(|entry| entry.pool_id == self.id)
                .map(|entry| Rc::clone(&entry.instance));
            (instance, stale)
        });
        instance
    }

    fn install(&self, instance: Rc<RefCell<CompiledInstance>>) {
        let _stale = LOCAL_RUNTIMES.with(|entries| {
            let mut local = entries.borrow_mut();
            let stale = local.prune();
            local.entries.push(LocalEntry {
                pool_id: self.id,
                owner: Arc::downgrade(&self.owner),
                instance,
            });
            stale
        });
    }

    fn compile(&self) -> std::result::Result<CompiledInstance, CompilationError> {
        let started = Instant::now();
        let mut runtime = self.engine.create_runtime()?;
        let key = self
            .sources
            .key
            .as_deref()
            .map(|source| runtime.compile_key_function(source))
            .transpose()?;
        let value = self
            .sources
            .value
            .as_deref()
            .map(|source| runtime.compile_value_function(source))
            .transpose()?;

        let elapsed = started.elapsed();
        self.stats.record_runtime(elapsed);
        debug!(
            engine = self.engine.name(),
            pool = self.id,
            thread = ?std::thread::current().id(),
            elapsed_us = elapsed.as_micros() as u64,
            "Compiled script runtime for thread"
        );

        Ok(CompiledInstance {
            runtime,
            key,
            value,
        })
    }
}

impl Drop for RuntimePool {
    fn drop(&mut self) {
        // Entries on other threads are pruned by their next lookup, or when
        // those threads exit.
        let _ = LOCAL_RUNTIMES.try_with(|entries| {
            if let Ok(mut local) = entries.try_borrow_mut() {
                local.entries.retain(|entry| entry.pool_id != self.id);
            }
        });
    }
}

#[cfg(test)]
pub(crate) fn local_runtime_count() -> usize {
    LOCAL_RUNTIMES.with(|entries| entries.borrow().entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RhaiEngine;
    use sf_error::InvokeError;
    use sf_types::{Map, Value};
    use std::sync::atomic::AtomicUsize;

    /// Engine whose runtimes count their drops.
    struct CountingEngine {
        drop_on_thread_exit: bool,
        dropped: Arc<AtomicUsize>,
    }

    struct CountingRuntime {
        drop_on_thread_exit: bool,
        dropped: Arc<AtomicUsize>,
    }

    impl Drop for CountingRuntime {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ScriptEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn create_runtime(&self) -> std::result::Result<Box<dyn ScriptRuntime>, CompilationError> {
            Ok(Box::new(CountingRuntime {
                drop_on_thread_exit: self.drop_on_thread_exit,
                dropped: Arc::clone(&self.dropped),
            }))
        }
    }

    impl ScriptRuntime for CountingRuntime {
        fn compile_key_function(
            &mut self,
            _source: &str,
        ) -> std::result::Result<KeyFunctionHandle, CompilationError> {
            Ok(KeyFunctionHandle::new(0))
        }

        fn compile_value_function(
            &mut self,
            _source: &str,
        ) -> std::result::Result<ValueFunctionHandle, CompilationError> {
            Ok(ValueFunctionHandle::new(0))
        }

        fn invoke_key(
            &mut self,
            _handle: KeyFunctionHandle,
            key: &Value,
        ) -> std::result::Result<Value, InvokeError> {
            Ok(key.clone())
        }

        fn invoke_value(
            &mut self,
            _handle: ValueFunctionHandle,
            value: &Map,
        ) -> std::result::Result<Map, InvokeError> {
            Ok(value.clone())
        }

        fn drop_on_thread_exit(&self) -> bool {
            self.drop_on_thread_exit
        }
    }

    /// Uses a counting pool on a thread that then exits, returning how many
    /// runtimes were dropped with that thread.
    fn dropped_at_thread_exit(drop_on_thread_exit: bool) -> usize {
        let dropped = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(
            RuntimePool::new(
                Arc::new(CountingEngine {
                    drop_on_thread_exit,
                    dropped: Arc::clone(&dropped),
                }),
                ScriptSources {
                    key: Some("key".to_string()),
                    value: None,
                },
                Arc::new(TransformStats::new()),
            )
            .unwrap(),
        );

        // A plain join also waits for the thread's thread-local destructors.
        let worker_pool = Arc::clone(&pool);
        std::thread::spawn(move || assert_eq!(invoke(&worker_pool, "k"), Value::from("k")))
            .join()
            .unwrap();
        let at_exit = dropped.load(Ordering::SeqCst);

        drop(pool);
        assert_eq!(dropped.load(Ordering::SeqCst), at_exit + 1);
        at_exit
    }

    fn pool(key: &str) -> RuntimePool {
        RuntimePool::new(
            Arc::new(RhaiEngine),
            ScriptSources {
                key: Some(key.to_string()),
                value: None,
            },
            Arc::new(TransformStats::new()),
        )
        .unwrap()
    }

    fn invoke(pool: &RuntimePool, key: &str) -> Value {
        pool.with_instance(|instance| {
            let handle = instance.key.unwrap();
            Ok(instance.runtime.invoke_key(handle, &Value::from(key)).unwrap())
        })
        .unwrap()
    }

    #[test]
    fn test_compiles_eagerly_on_configuring_thread() {
        let stats = Arc::new(TransformStats::new());
        let _pool = RuntimePool::new(
            Arc::new(RhaiEngine),
            ScriptSources::default(),
            Arc::clone(&stats),
        )
        .unwrap();
        assert_eq!(stats.runtimes_created(), 1);
    }

    #[test]
    fn test_one_runtime_per_thread() {
        let pool = pool(r#"fn keyTransform(k) { k + "!" }"#);
        assert_eq!(invoke(&pool, "a"), Value::from("a!"));
        assert_eq!(invoke(&pool, "b"), Value::from("b!"));
        assert_eq!(pool.stats.runtimes_created(), 1);

        std::thread::scope(|s| {
            s.spawn(|| assert_eq!(invoke(&pool, "c"), Value::from("c!")));
        });
        assert_eq!(pool.stats.runtimes_created(), 2);
    }

    #[test]
    fn test_pools_are_isolated() {
        let first = pool(r#"fn keyTransform(k) { k + "1" }"#);
        let second = pool(r#"fn keyTransform(k) { k + "2" }"#);
        assert_eq!(invoke(&first, "x"), Value::from("x1"));
        assert_eq!(invoke(&second, "x"), Value::from("x2"));
    }

    #[test]
    fn test_drop_releases_local_runtime() {
        let before = local_runtime_count();
        let pool = pool(r#"fn keyTransform(k) { k }"#);
        assert_eq!(local_runtime_count(), before + 1);
        drop(pool);
        assert_eq!(local_runtime_count(), before);
    }

    #[test]
    fn test_runtimes_of_pools_dropped_elsewhere_are_released() {
        let dropped = Arc::new(pool(r#"fn keyTransform(k) { k + "1" }"#));
        let kept = Arc::new(pool(r#"fn keyTransform(k) { k + "2" }"#));
        let barrier = std::sync::Barrier::new(2);

        std::thread::scope(|s| {
            let worker_dropped = Arc::clone(&dropped);
            let worker_kept = Arc::clone(&kept);
            let barrier = &barrier;
            s.spawn(move || {
                assert_eq!(invoke(&worker_dropped, "x"), Value::from("x1"));
                assert_eq!(invoke(&worker_kept, "x"), Value::from("x2"));
                assert_eq!(local_runtime_count(), 2);
                drop(worker_dropped);

                barrier.wait();
                barrier.wait();

                assert_eq!(local_runtime_count(), 2);
                assert_eq!(invoke(&worker_kept, "y"), Value::from("y2"));
                assert_eq!(local_runtime_count(), 1);
            });

            barrier.wait();
            drop(dropped);
            barrier.wait();
        });
    }

    #[test]
    fn test_thread_exit_drops_runtimes() {
        assert_eq!(dropped_at_thread_exit(true), 1);
    }

    #[test]
    fn test_thread_exit_leaks_thread_bound_runtimes() {
        assert_eq!(dropped_at_thread_exit(false), 0);
    }

    #[test]
    fn test_reentry_is_rejected() {
        let pool = pool(r#"fn keyTransform(k) { k }"#);
        let err = pool
            .with_instance(|_| pool.with_instance(|_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, SfError::IllegalState(_)));
    }
}
