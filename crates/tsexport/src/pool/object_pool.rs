use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::config::WhenExhausted;
use crate::error::{ExportError, StorageError};
use crate::pool::factory::PooledObjectFactory;

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on objects in existence, borrowed plus idle.
    pub max_total: usize,
    /// Returned objects beyond this many idle ones are destroyed.
    pub max_idle: usize,
    pub when_exhausted: WhenExhausted,
    /// Bound on a blocking borrow; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: crate::config::DEFAULT_MAX_TOTAL,
            max_idle: crate::config::DEFAULT_MAX_TOTAL,
            when_exhausted: WhenExhausted::Block,
            max_wait: None,
            test_on_borrow: true,
            test_on_return: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub num_active: usize,
    pub num_idle: usize,
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
    pub returned: u64,
}

struct PoolState<T> {
    idle: VecDeque<T>,
    /// Borrowed objects plus slots reserved for objects being created or
    /// destroyed outside the lock.
    num_active: usize,
    closed: bool,
    created: u64,
    destroyed: u64,
    borrowed: u64,
    returned: u64,
}

struct PoolShared<F: PooledObjectFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Object>>,
    available: Condvar,
}

enum Candidate<T> {
    Idle(T),
    Create,
}

/// Bounded pool that creates, validates, recycles and destroys objects
/// through a [`PooledObjectFactory`].
///
/// At most `max_total` objects exist at any time. `borrow` is the admission
/// point: once every object is in use it either blocks or fails, per
/// [`WhenExhausted`]. Bookkeeping is guarded by the pool's own lock, which is
/// never held while a factory hook runs.
pub struct ObjectPool<F: PooledObjectFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: PooledObjectFactory> Clone for ObjectPool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: PooledObjectFactory> ObjectPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                factory,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    num_active: 0,
                    closed: false,
                    created: 0,
                    destroyed: 0,
                    borrowed: 0,
                    returned: 0,
                }),
                available: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Hands out an idle object or creates a new one. The object goes back
    /// to the pool when the returned guard is dropped.
    pub fn borrow(&self) -> Result<Pooled<F>, ExportError> {
        let shared = &self.shared;
        let started = Instant::now();
        let deadline = shared.config.max_wait.map(|wait| started + wait);

        loop {
            let candidate = self.reserve(started, deadline)?;

            let (object, fresh) = match candidate {
                Candidate::Idle(object) => (object, false),
                Candidate::Create => match shared.factory.make_object() {
                    Ok(object) => {
                        shared.state.lock().created += 1;
                        (object, true)
                    }
                    Err(e) => {
                        shared.release_slot();
                        return Err(e);
                    }
                },
            };

            if let Err(e) = shared.factory.activate_object(&object) {
                warn!("Failed to activate pooled object: {e}");
                shared.destroy(object);
                if fresh {
                    return Err(e);
                }
                continue;
            }

            if shared.config.test_on_borrow && !shared.factory.validate_object(&object) {
                shared.destroy(object);
                if fresh {
                    return Err(ExportError::Storage(StorageError::Unavailable {
                        context: "newly created pooled object failed validation".to_string(),
                    }));
                }
                continue;
            }

            shared.state.lock().borrowed += 1;
            return Ok(Pooled {
                object: Some(object),
                shared: Arc::clone(shared),
            });
        }
    }

    /// Claims either an idle object or a free slot, waiting per the
    /// exhaustion policy.
    fn reserve(
        &self,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<Candidate<F::Object>, ExportError> {
        let shared = &self.shared;
        let max_total = shared.config.max_total;
        let mut state = shared.state.lock();
        let mut timed_out = false;

        loop {
            if state.closed {
                return Err(ExportError::PoolClosed);
            }
            if let Some(object) = state.idle.pop_back() {
                state.num_active += 1;
                return Ok(Candidate::Idle(object));
            }
            if state.num_active + state.idle.len() < max_total {
                state.num_active += 1;
                return Ok(Candidate::Create);
            }

            match shared.config.when_exhausted {
                WhenExhausted::Fail => return Err(ExportError::PoolExhausted { max_total }),
                WhenExhausted::Block if timed_out => {
                    return Err(ExportError::PoolTimeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                WhenExhausted::Block => match deadline {
                    Some(deadline) => {
                        timed_out = shared.available.wait_until(&mut state, deadline).timed_out();
                    }
                    None => shared.available.wait(&mut state),
                },
            }
        }
    }

    /// Destroys every idle object and refuses further borrows. Objects still
    /// borrowed are destroyed as they come back. Idempotent.
    pub fn close(&self) {
        let idle = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.num_active += state.idle.len();
            std::mem::take(&mut state.idle)
        };
        self.shared.available.notify_all();
        debug!("Closing pool with {} idle objects", idle.len());

        for object in idle {
            self.shared.destroy(object);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn num_active(&self) -> usize {
        self.shared.state.lock().num_active
    }

    pub fn num_idle(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            num_active: state.num_active,
            num_idle: state.idle.len(),
            created: state.created,
            destroyed: state.destroyed,
            borrowed: state.borrowed,
            returned: state.returned,
        }
    }
}

impl<F: PooledObjectFactory> PoolShared<F> {
    fn give_back(&self, object: F::Object) {
        let keep = match self.factory.passivate_object(&object) {
            Ok(()) => !self.config.test_on_return || self.factory.validate_object(&object),
            Err(e) => {
                warn!("Failed to passivate pooled object: {e}");
                false
            }
        };

        {
            let mut state = self.state.lock();
            state.returned += 1;
            if keep && !state.closed && state.idle.len() < self.config.max_idle {
                state.num_active -= 1;
                state.idle.push_back(object);
                drop(state);
                self.available.notify_one();
                return;
            }
        }

        self.destroy(object);
    }

    /// Destroys an object whose slot is still counted as active, then frees
    /// the slot. The slot stays taken until the destroy hook has finished, so
    /// retiring objects never push the total above `max_total`.
    fn destroy(&self, object: F::Object) {
        self.factory.destroy_object(object);
        {
            let mut state = self.state.lock();
            state.destroyed += 1;
            state.num_active -= 1;
        }
        self.available.notify_one();
    }

    fn release_slot(&self) {
        self.state.lock().num_active -= 1;
        self.available.notify_one();
    }
}

/// Scoped borrow of a pooled object. Dropping the guard returns the object
/// on every exit path.
pub struct Pooled<F: PooledObjectFactory> {
    object: Option<F::Object>,
    shared: Arc<PoolShared<F>>,
}

impl<F: PooledObjectFactory> Pooled<F> {
    /// Destroys the object instead of returning it.
    pub fn invalidate(mut self) {
        if let Some(object) = self.object.take() {
            self.shared.destroy(object);
        }
    }
}

impl<F: PooledObjectFactory> Deref for Pooled<F> {
    type Target = F::Object;

    fn deref(&self) -> &F::Object {
        match &self.object {
            Some(object) => object,
            None => unreachable!("pooled object is only taken on drop or invalidate"),
        }
    }
}

impl<F: PooledObjectFactory> std::fmt::Debug for Pooled<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("held", &self.object.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: PooledObjectFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.shared.give_back(object);
        }
    }
}
