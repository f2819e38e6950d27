use crate::{engine::Engine, errors::ErrorCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Handle ID type - safer than raw pointers
pub type HandleId = u64;

/// Process-wide table of engines opened through the C ABI.
struct HandleRegistry {
    handles: Mutex<HashMap<HandleId, Arc<Engine>>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1), // 0 is never handed out
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HandleId, Arc<Engine>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, engine: Engine) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, Arc::new(engine));
        id
    }

    fn get(&self, id: HandleId) -> Result<Arc<Engine>, ErrorCode> {
        if id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        self.lock().get(&id).cloned().ok_or(ErrorCode::InvalidHandle)
    }

    fn unregister(&self, id: HandleId) -> Result<(), ErrorCode> {
        if id == 0 {
            return Err(ErrorCode::InvalidHandle);
        }
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ErrorCode::InvalidHandle)
    }
}

static REGISTRY: OnceLock<HandleRegistry> = OnceLock::new();

fn get_registry() -> &'static HandleRegistry {
    REGISTRY.get_or_init(HandleRegistry::new)
}

pub fn register_handle(engine: Engine) -> HandleId {
    get_registry().register(engine)
}

/// Run `f` against the engine behind `id`. The table lock is released
/// before `f` runs, so long calls on one handle do not block the others.
pub fn with_handle<T, F>(id: HandleId, f: F) -> Result<T, ErrorCode>
where
    F: FnOnce(&Engine) -> T,
{
    let engine = get_registry().get(id)?;
    Ok(f(&engine))
}

/// Drop the registry's reference; in-flight calls keep theirs.
pub fn unregister_handle(id: HandleId) -> Result<(), ErrorCode> {
    get_registry().unregister(id)
}
