//! `GcRef`: a GC-managed pointer to a heap object.
//!
//! Grounded on raya-core's `gc/ptr.rs` `GcPtr<T>`, but monomorphic: every
//! heap object is a [`crate::object::GcObject`] variant, so there is one
//! concrete pointee type rather than a generic `T`. This sidesteps the
//! "can't determine exact layout without a type registry" limitation the
//! teacher's `Heap::free` left as a stub (raya-core's `gc/heap.rs`) — a
//! single concrete type is always enough information to reconstruct and
//! drop the allocation.

use super::header::GcHeader;
use super::heap::GcBox;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// A non-owning pointer to a GC-managed [`GcBox`].
///
/// Values of this type are freely copyable; ownership lives in the heap's
/// intrusive allocation list (see [`super::heap::Heap`]), not in any
/// `GcRef`. A `GcRef` is only valid as long as the collector has not swept
/// the object it points to, which is exactly the property that rooting
/// (spec §3 "Global state", [`super::roots::RootSet`]) exists to guarantee.
#[derive(Clone, Copy)]
pub struct GcRef(pub(crate) NonNull<GcBox>);

impl GcRef {
    /// # Safety
    /// `ptr` must point at a live `GcBox` owned by a `Heap`.
    pub(crate) unsafe fn new(ptr: NonNull<GcBox>) -> Self {
        GcRef(ptr)
    }

    /// Reconstructs a `GcRef` from an address previously obtained from
    /// [`GcRef::addr`], as happens when unpacking a [`crate::value::Value`].
    ///
    /// # Safety
    /// `addr` must be the address of a `GcBox` that is still live.
    pub(crate) unsafe fn from_addr(addr: usize) -> Self {
        GcRef(NonNull::new_unchecked(addr as *mut GcBox))
    }

    #[inline]
    pub(crate) fn header(&self) -> &GcHeader {
        unsafe { &self.0.as_ref().header }
    }

    #[inline]
    pub fn object(&self) -> &crate::object::GcObject {
        unsafe { &self.0.as_ref().object }
    }

    /// # Safety
    /// The caller must ensure no other live reference observes the
    /// mutation concurrently; single-threaded cooperative execution (spec
    /// §5) makes this the caller's responsibility to sequence, not the
    /// type system's.
    #[allow(clippy::mut_from_ref)]
    pub fn object_mut(&self) -> &mut crate::object::GcObject {
        unsafe { &mut (*self.0.as_ptr()).object }
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    pub(crate) fn mark(&self, color: super::header::Color) {
        self.header().set_color(color);
    }
}

impl PartialEq for GcRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for GcRef {}

impl Hash for GcRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({:#x})", self.addr())
    }
}
