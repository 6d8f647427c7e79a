use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::base::Base;
use crate::error::{AdError, Result};

use super::recorder::Recorder;
use super::TapeId;

pub(crate) type SharedRecorder<B> = Rc<RefCell<Recorder<B>>>;

thread_local! {
    /// Recording tapes of this thread, one per base type.
    static ACTIVE: RefCell<HashMap<TypeId, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

static NEXT_TAPE_ID: AtomicU32 = AtomicU32::new(1);

/// Identities of every tape currently recording, on any thread.
fn live_tapes() -> &'static Mutex<HashSet<TapeId>> {
    static LIVE: OnceLock<Mutex<HashSet<TapeId>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

pub(crate) fn allocate_id() -> TapeId {
    TapeId(NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed))
}

/// True while the tape `id` is recording on some thread.
pub(crate) fn is_live(id: TapeId) -> bool {
    live_tapes()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&id)
}

/// The recorder of the tape over `B` that is recording on this thread.
#[inline]
pub(crate) fn active<B: Base>() -> Option<SharedRecorder<B>> {
    let any = ACTIVE.with(|map| map.borrow().get(&TypeId::of::<B>()).cloned())?;
    any.downcast::<RefCell<Recorder<B>>>().ok()
}

pub(crate) fn active_id<B: Base>() -> Option<TapeId> {
    active::<B>().map(|rec| rec.borrow().id)
}

/// Make `recorder` the active tape for `B` on this thread.
pub(crate) fn install<B: Base>(recorder: SharedRecorder<B>) -> Result<()> {
    let id = recorder.borrow().id;
    ACTIVE.with(|map| {
        let mut map = map.borrow_mut();
        if let Some(existing) = map.get(&TypeId::of::<B>()) {
            let active = Rc::clone(existing)
                .downcast::<RefCell<Recorder<B>>>()
                .map(|rec| rec.borrow().id)
                .map_err(|_| AdError::internal(0, "tape registry holds a recorder of the wrong type"))?;
            return Err(AdError::AlreadyRecording { active });
        }
        map.insert(TypeId::of::<B>(), recorder as Rc<dyn Any>);
        Ok(())
    })?;
    live_tapes()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id);
    Ok(())
}

/// Deactivate the tape `id` over `B`. Values bound to it freeze from here on.
pub(crate) fn uninstall<B: Base>(id: TapeId) {
    ACTIVE.with(|map| {
        let mut map = map.borrow_mut();
        let matches = map
            .get(&TypeId::of::<B>())
            .and_then(|any| Rc::clone(any).downcast::<RefCell<Recorder<B>>>().ok())
            .is_some_and(|rec| rec.borrow().id == id);
        if matches {
            map.remove(&TypeId::of::<B>());
        }
    });
    live_tapes()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
}
