//! C4: small-buffer-optimized callable container.
//!
//! `Callable<R>` stores any `FnMut() -> R` inline when it fits in 32 bytes
//! aligned to 16, falling back to one heap allocation otherwise. Dispatch
//! goes through a small table of function pointers selected once at
//! construction and carried by value inside the `Callable` (the table is
//! three `Copy` pointers plus a couple of flags, cheaper to store directly
//! than to chase a `&'static` reference to it).
//!
//! Closures that need no drop glue at all (no captures, or only `Copy`
//! captures with nothing to deallocate) skip the drop call entirely —
//! the "trivial" fast path the original takes via a second vtable.

use crate::error::{CallablePanic, EmptyCallable, NotCopyable};
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::panic::{self, AssertUnwindSafe};

const INLINE_SIZE: usize = 32;
const INLINE_ALIGN: usize = 16;

#[repr(align(16))]
struct Storage([MaybeUninit<u8>; INLINE_SIZE]);

impl Storage {
    fn empty() -> Self {
        Self([MaybeUninit::uninit(); INLINE_SIZE])
    }
}

const fn is_inline<F>() -> bool {
    mem::size_of::<F>() <= INLINE_SIZE && mem::align_of::<F>() <= INLINE_ALIGN
}

unsafe fn data_ptr<F>(storage: *mut Storage) -> *mut F {
    if is_inline::<F>() {
        storage.cast::<F>()
    } else {
        // SAFETY: the heap path always writes a valid `*mut F` into the
        // first pointer-sized bytes of storage.
        unsafe { *storage.cast::<*mut F>() }
    }
}

unsafe fn data_ptr_const<F>(storage: *const Storage) -> *const F {
    if is_inline::<F>() {
        storage.cast::<F>()
    } else {
        unsafe { *storage.cast::<*const F>() }
    }
}

unsafe fn drop_storage<F>(storage: *mut Storage) {
    unsafe {
        if is_inline::<F>() {
            storage.cast::<F>().drop_in_place();
        } else {
            drop(Box::from_raw(*storage.cast::<*mut F>()));
        }
    }
}

unsafe fn clone_storage<F: Clone>(dst: *mut Storage, src: *const Storage) {
    unsafe {
        let cloned = (*data_ptr_const::<F>(src)).clone();
        if is_inline::<F>() {
            dst.cast::<F>().write(cloned);
        } else {
            dst.cast::<*mut F>().write(Box::into_raw(Box::new(cloned)));
        }
    }
}

unsafe fn invoke_storage<F: FnMut() -> R, R>(storage: *mut Storage) -> R {
    unsafe { (*data_ptr::<F>(storage))() }
}

type CloneFn = unsafe fn(*mut Storage, *const Storage);
type DropFn = unsafe fn(*mut Storage);
type InvokeFn<R> = unsafe fn(*mut Storage) -> R;

/// Per-concrete-closure dispatch table. Copy, so it lives inline in
/// `Callable` rather than behind a pointer — there is no dynamic dispatch
/// cost beyond the function-pointer calls themselves.
///
/// There is no "move" entry: moving a `Callable` is an ordinary Rust move
/// of its fields (storage bytes included), so the original's manual move
/// constructor has no counterpart here.
struct VTable<R> {
    drop: Option<DropFn>,
    clone: Option<CloneFn>,
    invoke: InvokeFn<R>,
}

impl<R> Clone for VTable<R> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<R> Copy for VTable<R> {}

fn make_vtable<F, R>() -> VTable<R>
where
    F: FnMut() -> R + Send + 'static,
{
    // Skip the drop call entirely for captures with no drop glue stored
    // inline: there is nothing to run and nothing to free.
    let drop = if is_inline::<F>() && !mem::needs_drop::<F>() { None } else { Some(drop_storage::<F> as DropFn) };

    VTable { drop, clone: detect_clone_support::<F, R>(), invoke: invoke_storage::<F, R> }
}

// Autoref specialization: `SpecificClone` is implemented for `&Wrap<F>` only
// when `F: Clone`; `GenericClone` is a blanket impl for `Wrap<F>`. Calling
// through `(&wrap).clone_support()` resolves to the bounded impl first when
// it applies, falling back to the unconditional one otherwise. This is how
// `try_clone` can exist on every `Callable<R>` while only actually working
// for closures that happen to implement `Clone`.
struct Wrap<F>(PhantomData<F>);

trait SpecificClone<R> {
    fn clone_support(&self) -> Option<CloneFn>;
}

trait GenericClone<R> {
    fn clone_support(&self) -> Option<CloneFn>;
}

impl<F: Clone, R> SpecificClone<R> for &Wrap<F> {
    fn clone_support(&self) -> Option<CloneFn> {
        Some(clone_storage::<F>)
    }
}

impl<F, R> GenericClone<R> for Wrap<F> {
    fn clone_support(&self) -> Option<CloneFn> {
        None
    }
}

fn detect_clone_support<F, R>() -> Option<CloneFn> {
    (&Wrap::<F>(PhantomData)).clone_support()
}

/// An inline-or-boxed, always-movable, conditionally-cloneable
/// `FnMut() -> R`.
///
/// Matches the task contract the rest of the crate needs: move, call with
/// no arguments, destroy. Defaults to `R = ()`, the pool's task type.
pub struct Callable<R = ()> {
    storage: Storage,
    vtable: Option<VTable<R>>,
}

impl<R> Callable<R> {
    /// Creates an empty callable.
    #[must_use]
    pub const fn new() -> Self {
        Self { storage: Storage([MaybeUninit::uninit(); INLINE_SIZE]), vtable: None }
    }

    /// Wraps `f`, storing it inline when it fits and falling back to one
    /// heap allocation otherwise.
    ///
    /// `F` must be `Send`: a `Callable` may be handed to a pool worker
    /// running on a different thread than the one that built it.
    #[must_use]
    pub fn from_callable<F>(f: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
    {
        let mut storage = Storage::empty();
        if is_inline::<F>() {
            unsafe {
                std::ptr::from_mut(&mut storage).cast::<F>().write(f);
            }
        } else {
            let boxed = Box::into_raw(Box::new(f));
            unsafe {
                std::ptr::from_mut(&mut storage).cast::<*mut F>().write(boxed);
            }
        }

        Self { storage, vtable: Some(make_vtable::<F, R>()) }
    }

    /// True if this callable currently holds no closure.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vtable.is_none()
    }

    /// Invokes the stored closure.
    ///
    /// # Panics
    ///
    /// Panics if this callable is empty (an `EmptyCallable`-shaped
    /// precondition violation — a programmer error, not a recoverable
    /// runtime condition). Propagates any panic the closure itself raises.
    pub fn invoke(&mut self) -> R {
        let vtable = self.vtable.as_ref().unwrap_or_else(|| panic!("{EmptyCallable}"));
        unsafe { (vtable.invoke)(&mut self.storage) }
    }

    /// Invokes the stored closure, catching any panic it raises instead of
    /// propagating it.
    ///
    /// # Panics
    ///
    /// Panics if this callable is empty, matching `invoke`'s precondition.
    ///
    /// # Errors
    ///
    /// Returns `Err(CallablePanic)` if the closure panics.
    pub fn try_invoke(&mut self) -> Result<R, CallablePanic>
    where
        R: 'static,
    {
        let vtable = self.vtable.as_ref().unwrap_or_else(|| panic!("{EmptyCallable}"));
        let invoke = vtable.invoke;
        let storage = &mut self.storage;
        panic::catch_unwind(AssertUnwindSafe(|| unsafe { invoke(storage) })).map_err(|_| CallablePanic)
    }

    /// Clones this callable if the stored closure supports it.
    ///
    /// # Errors
    ///
    /// Returns `Err(NotCopyable)` if this is empty or the stored closure
    /// type was never `Clone`.
    pub fn try_clone(&self) -> Result<Self, NotCopyable> {
        let vtable = self.vtable.ok_or(NotCopyable)?;
        let clone_fn = vtable.clone.ok_or(NotCopyable)?;
        let mut storage = Storage::empty();
        unsafe {
            clone_fn(&mut storage, &self.storage);
        }
        Ok(Self { storage, vtable: Some(vtable) })
    }

    /// Swaps the closures (or emptiness) held by two callables.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<R> Default for Callable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for Callable<R> {
    fn drop(&mut self) {
        if let Some(vtable) = self.vtable {
            if let Some(drop_fn) = vtable.drop {
                unsafe {
                    drop_fn(&mut self.storage);
                }
            }
        }
    }
}

// Sound because `from_callable` requires `F: Send`: whatever is actually
// sitting in `storage` was already safe to move to another thread before it
// went in.
unsafe impl<R> Send for Callable<R> {}
