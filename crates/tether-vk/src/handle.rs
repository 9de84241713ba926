// SPDX-License-Identifier: CEPL-1.0
//! Ownership of native handles.
//!
//! A handle is a raw value tagged with a [`Destroy`] kind plus a link to
//! the parent it was created from. [`Owned`] is the single destroying
//! owner; [`Shared`] wraps an `Owned` in an `Arc` so several subsystems
//! can keep it alive.
//!
//! The parent link is a field of the handle. `Drop::drop` of a struct runs
//! before its fields are dropped, so a child's destroy call is always issued
//! while the parent link (and therefore the parent) is still alive. Links
//! come in four shapes:
//!
//! | link | meaning |
//! |------|---------|
//! | [`Root`] | no parent |
//! | `Shared<P>` or a tuple of them | shared ownership of the parent(s) |
//! | `&'a P` | borrowed, the borrow checker proves the parent outlives the child |
//! | `Arc<P>` | shared ownership of an exclusive parent |
use std::{fmt, sync::Arc};

use crate::result::{Error, Result};

/// Capability tag binding a raw handle type to its destroy call.
pub trait Destroy: 'static {
    /// The native value, or the dispatch object carrying it.
    type Raw: fmt::Debug;
    /// The handle type this kind is created from and destroyed through.
    type Parent: Liveness;
    const NAME: &'static str;

    /// # Safety
    /// `raw` must have been created from `parent`, nothing created from
    /// `raw` may still be alive, and this must be the only destroy call
    /// issued for `raw`.
    unsafe fn destroy(parent: &Self::Parent, raw: &Self::Raw);
}

/// Whether a handle currently owns a native object.
pub trait Liveness {
    fn is_live(&self) -> bool;
}

/// A stored reference to a parent handle.
pub trait ParentRef {
    type Target: Liveness + ?Sized;
    fn target(&self) -> &Self::Target;
}

/// Parent of top-level objects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Root;

impl Liveness for Root {
    fn is_live(&self) -> bool {
        true
    }
}

impl ParentRef for Root {
    type Target = Root;
    fn target(&self) -> &Root {
        self
    }
}

impl<T: Liveness + ?Sized> ParentRef for &T {
    type Target = T;
    fn target(&self) -> &T {
        self
    }
}

impl<T: Liveness + ?Sized> ParentRef for Arc<T> {
    type Target = T;
    fn target(&self) -> &T {
        self
    }
}

impl<A: Liveness, B: Liveness> Liveness for (A, B) {
    fn is_live(&self) -> bool {
        self.0.is_live() && self.1.is_live()
    }
}

impl<A: Liveness, B: Liveness> ParentRef for (A, B) {
    type Target = Self;
    fn target(&self) -> &Self {
        self
    }
}

/// Exclusive owner of one native handle.
///
/// States are `owned` and `empty`; [`release`](Self::release) moves from
/// the first to the second exactly once and dropping releases.
pub struct Owned<K: Destroy, L: ParentRef<Target = K::Parent> = <K as Destroy>::Parent> {
    raw: Option<K::Raw>,
    parent: L,
}

impl<K: Destroy<Parent = Root>> Owned<K, Root> {
    /// Create a top-level handle.
    pub fn acquire(create: impl FnOnce() -> Result<K::Raw>) -> Result<Self> {
        let raw = create()?;
        tracing::debug!(kind = K::NAME, "created {raw:?}");
        Ok(Self {
            raw: Some(raw),
            parent: Root,
        })
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Owned<K, L> {
    /// Create a handle from `parent`.
    ///
    /// Fails with [`Error::ParentNotInitialized`] without calling `create`
    /// when the parent is empty.
    pub fn with_parent(parent: L, create: impl FnOnce(&K::Parent) -> Result<K::Raw>) -> Result<Self> {
        if !parent.target().is_live() {
            return Err(Error::ParentNotInitialized { what: K::NAME });
        }
        let raw = create(parent.target())?;
        tracing::debug!(kind = K::NAME, "created {raw:?}");
        Ok(Self {
            raw: Some(raw),
            parent,
        })
    }

    /// Destroy the native object if still owned. Idempotent.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            tracing::trace!(kind = K::NAME, "destroying {raw:?}");
            // SAFETY: `raw` was created through this parent link, which is
            // held until after this call. Children keep either a borrow of
            // this handle or a strong reference to it, so none can be alive
            // while `&mut self` is. Taking `raw` out makes this the only
            // destroy call for it.
            unsafe { K::destroy(self.parent.target(), &raw) };
        }
    }

    /// Move ownership out, leaving `self` empty but still linked.
    pub fn take(&mut self) -> Self
    where
        L: Clone,
    {
        Self {
            raw: self.raw.take(),
            parent: self.parent.clone(),
        }
    }

    pub fn raw(&self) -> Option<&K::Raw> {
        self.raw.as_ref()
    }

    pub fn try_raw(&self) -> Result<&K::Raw> {
        self.raw.as_ref().ok_or(Error::Empty { what: K::NAME })
    }

    pub fn parent(&self) -> &K::Parent {
        self.parent.target()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }
}

impl<K, L> Owned<K, L>
where
    K: Destroy,
    K::Raw: Copy + Default,
    L: ParentRef<Target = K::Parent>,
{
    /// The raw handle for passing into native calls; null when empty.
    pub fn handle(&self) -> K::Raw {
        self.raw.unwrap_or_default()
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Drop for Owned<K, L> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Liveness for Owned<K, L> {
    fn is_live(&self) -> bool {
        self.raw.is_some()
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> fmt::Debug for Owned<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Reference-counted owner. The destroy call fires when the last clone
/// is released or dropped.
pub struct Shared<K: Destroy, L: ParentRef<Target = K::Parent> = <K as Destroy>::Parent> {
    inner: Option<Arc<Owned<K, L>>>,
}

impl<K: Destroy<Parent = Root>> Shared<K, Root> {
    pub fn acquire(create: impl FnOnce() -> Result<K::Raw>) -> Result<Self> {
        Owned::acquire(create).map(Self::from)
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Shared<K, L> {
    pub fn with_parent(parent: L, create: impl FnOnce(&K::Parent) -> Result<K::Raw>) -> Result<Self> {
        Owned::with_parent(parent, create).map(Self::from)
    }

    /// Drop this reference. Idempotent; other clones are unaffected.
    pub fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            tracing::trace!(
                kind = K::NAME,
                remaining = Arc::strong_count(&inner) - 1,
                "releasing shared reference"
            );
        }
    }

    pub fn raw(&self) -> Option<&K::Raw> {
        self.inner.as_deref().and_then(Owned::raw)
    }

    pub fn try_raw(&self) -> Result<&K::Raw> {
        self.raw().ok_or(Error::Empty { what: K::NAME })
    }

    pub fn parent(&self) -> Option<&K::Parent> {
        self.inner.as_deref().map(Owned::parent)
    }

    /// Number of live references sharing the native object, 0 when empty.
    pub fn owners(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_none()
    }
}

impl<K, L> Shared<K, L>
where
    K: Destroy,
    K::Raw: Copy + Default,
    L: ParentRef<Target = K::Parent>,
{
    pub fn handle(&self) -> K::Raw {
        self.raw().copied().unwrap_or_default()
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> From<Owned<K, L>> for Shared<K, L> {
    fn from(owned: Owned<K, L>) -> Self {
        Self {
            inner: Some(Arc::new(owned)),
        }
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Clone for Shared<K, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> Liveness for Shared<K, L> {
    fn is_live(&self) -> bool {
        !self.is_empty()
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> ParentRef for Shared<K, L> {
    type Target = Self;
    fn target(&self) -> &Self {
        self
    }
}

impl<K: Destroy, L: ParentRef<Target = K::Parent>> fmt::Debug for Shared<K, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("kind", &K::NAME)
            .field("raw", &self.raw())
            .field("owners", &self.owners())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::{self, Handle};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug)]
    struct Tracked {
        id: u32,
        log: Log,
    }

    impl Tracked {
        fn new(id: u32, log: &Log) -> Self {
            Self {
                id,
                log: Arc::clone(log),
            }
        }

        fn record(&self, kind: &str) {
            self.log.lock().unwrap().push(format!("{kind} {}", self.id));
        }
    }

    struct Top;
    impl Destroy for Top {
        type Raw = Tracked;
        type Parent = Root;
        const NAME: &'static str = "top";
        unsafe fn destroy(_: &Root, raw: &Tracked) {
            raw.record("top");
        }
    }

    struct Mid;
    impl Destroy for Mid {
        type Raw = Tracked;
        type Parent = Shared<Top>;
        const NAME: &'static str = "mid";
        unsafe fn destroy(parent: &Shared<Top>, raw: &Tracked) {
            assert!(parent.is_live(), "parent destroyed before child");
            raw.record("mid");
        }
    }

    struct Leaf;
    impl Destroy for Leaf {
        type Raw = Tracked;
        type Parent = Owned<Mid>;
        const NAME: &'static str = "leaf";
        unsafe fn destroy(parent: &Owned<Mid>, raw: &Tracked) {
            assert!(parent.is_live(), "parent destroyed before child");
            raw.record("leaf");
        }
    }

    static SEMAPHORES_DESTROYED: AtomicUsize = AtomicUsize::new(0);

    struct Plain;
    impl Destroy for Plain {
        type Raw = vk::Semaphore;
        type Parent = Root;
        const NAME: &'static str = "plain";
        unsafe fn destroy(_: &Root, _: &vk::Semaphore) {
            SEMAPHORES_DESTROYED.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn release_is_idempotent() {
        let log = log();
        let mut top = Owned::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
        top.release();
        top.release();
        drop(top);
        assert_eq!(entries(&log), ["top 1"]);
    }

    #[test]
    fn moved_from_handle_issues_no_destroy() {
        let log = log();
        let mut source = Owned::<Top>::acquire(|| Ok(Tracked::new(7, &log))).unwrap();
        let target = source.take();
        assert!(source.is_empty());
        drop(source);
        assert!(entries(&log).is_empty());
        drop(target);
        assert_eq!(entries(&log), ["top 7"]);
    }

    #[test]
    fn failed_create_leaves_nothing_to_destroy() {
        let err = Owned::<Top>::acquire(|| {
            Err(Error::Native {
                what: "create",
                code: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            })
        })
        .unwrap_err();
        assert_eq!(err.code(), Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
    }

    #[test]
    fn shared_destroys_once_after_last_clone() {
        let log = log();
        let first = Shared::<Top>::acquire(|| Ok(Tracked::new(3, &log))).unwrap();
        let mut clones: Vec<_> = (0..5).map(|_| first.clone()).collect();
        let derived = clones[2].clone();
        assert_eq!(first.owners(), 7);

        drop(first);
        for clone in &mut clones {
            clone.release();
            clone.release();
        }
        assert!(entries(&log).is_empty());
        assert!(clones.iter().all(|c| c.owners() == 0));

        drop(derived);
        assert_eq!(entries(&log), ["top 3"]);
    }

    #[test]
    fn shared_counts_across_threads() {
        let log = log();
        let top = Shared::<Top>::acquire(|| Ok(Tracked::new(9, &log))).unwrap();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let mine = top.clone();
                std::thread::spawn(move || {
                    let again = mine.clone();
                    drop(mine);
                    again.is_live()
                })
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }
        assert!(entries(&log).is_empty());
        drop(top);
        assert_eq!(entries(&log), ["top 9"]);
    }

    #[test]
    fn dependent_destroyed_before_parent_whatever_the_scope_order() {
        let log = log();
        let top = Shared::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
        let mid = Owned::<Mid>::with_parent(top.clone(), |_| Ok(Tracked::new(2, &log))).unwrap();

        // The caller's own reference goes first; the child keeps the parent alive.
        drop(top);
        assert!(entries(&log).is_empty());
        drop(mid);
        assert_eq!(entries(&log), ["mid 2", "top 1"]);
    }

    #[test]
    fn borrowed_chain_unwinds_in_reverse() {
        let log = log();
        {
            let top = Shared::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
            let mid = Owned::<Mid>::with_parent(top.clone(), |_| Ok(Tracked::new(2, &log))).unwrap();
            let _leaves: Vec<Owned<Leaf, &Owned<Mid>>> = (10..13)
                .map(|id| Owned::with_parent(&mid, |_| Ok(Tracked::new(id, &log))).unwrap())
                .collect();
        }
        assert_eq!(
            entries(&log),
            ["leaf 10", "leaf 11", "leaf 12", "mid 2", "top 1"]
        );
    }

    #[test]
    fn arc_parent_link_outlives_every_other_owner() {
        let log = log();
        let top = Shared::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
        let mid = Arc::new(
            Owned::<Mid>::with_parent(top.clone(), |_| Ok(Tracked::new(2, &log))).unwrap(),
        );
        let leaf: Owned<Leaf, Arc<Owned<Mid>>> =
            Owned::with_parent(Arc::clone(&mid), |_| Ok(Tracked::new(3, &log))).unwrap();
        drop(mid);
        drop(top);
        assert!(entries(&log).is_empty());
        drop(leaf);
        assert_eq!(entries(&log), ["leaf 3", "mid 2", "top 1"]);
    }

    #[test]
    fn empty_parent_fails_without_native_call() {
        let log = log();
        let mut top = Shared::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
        top.release();

        let mut called = false;
        let err = Owned::<Mid>::with_parent(top.clone(), |_| {
            called = true;
            Ok(Tracked::new(2, &log))
        })
        .unwrap_err();

        assert!(!called);
        assert!(matches!(err, Error::ParentNotInitialized { what: "mid" }));
    }

    #[test]
    fn emptied_exclusive_parent_rejects_children() {
        let log = log();
        let top = Shared::<Top>::acquire(|| Ok(Tracked::new(1, &log))).unwrap();
        let mut mid = Owned::<Mid>::with_parent(top, |_| Ok(Tracked::new(2, &log))).unwrap();
        mid.release();
        let err = Owned::<Leaf, &Owned<Mid>>::with_parent(&mid, |_| Ok(Tracked::new(3, &log)))
            .unwrap_err();
        assert!(matches!(err, Error::ParentNotInitialized { what: "leaf" }));
        assert_eq!(entries(&log), ["mid 2"]);
    }

    #[test]
    fn raw_handle_is_null_once_released() {
        let before = SEMAPHORES_DESTROYED.load(Ordering::SeqCst);
        let mut sem = Owned::<Plain>::acquire(|| Ok(vk::Semaphore::from_raw(0x42))).unwrap();
        assert_eq!(sem.handle().as_raw(), 0x42);
        sem.release();
        assert_eq!(sem.handle(), vk::Semaphore::null());
        assert!(matches!(sem.try_raw(), Err(Error::Empty { what: "plain" })));
        drop(sem);
        assert_eq!(SEMAPHORES_DESTROYED.load(Ordering::SeqCst), before + 1);
    }
}
