//! Per-object GC metadata (component E, tri-color bookkeeping).
//!
//! Every heap object is a `GcBox` (see [`super::heap`]): a `GcHeader`
//! immediately followed by the object's [`super::super::object::GcObject`]
//! payload, mirroring the header-then-payload layout the teacher crate uses
//! for its `GcPtr<T>` (raya-core's `gc/ptr.rs`).

use std::cell::Cell;
use std::ptr::NonNull;

/// Tri-color mark used by the incremental collector.
///
/// `White` objects are candidates for collection at the end of a cycle;
/// `Gray` objects are known-reachable but not yet scanned for the
/// references they hold; `Black` objects are reachable and fully scanned.
/// Two white "shades" (current/other) would be needed for a generational
/// collector; this design sticks to the classical single-shade scheme
/// since the spec's GC is non-generational (spec §2 component E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Gray,
    Black,
}

pub struct GcHeader {
    pub(crate) color: Cell<Color>,
    /// Intrusive singly-linked list of every live allocation, used by the
    /// sweep phase to walk the heap without a separate index structure.
    pub(crate) next: Cell<Option<NonNull<super::heap::GcBox>>>,
    /// `true` for tables/userdata registered as weak; consulted by the
    /// collector's weak-table sweep pass (spec §9, weak tables).
    pub(crate) is_weak: Cell<bool>,
}

impl GcHeader {
    pub fn new() -> Self {
        GcHeader {
            color: Cell::new(Color::White),
            next: Cell::new(None),
            is_weak: Cell::new(false),
        }
    }

    #[inline]
    pub fn color(&self) -> Color {
        self.color.get()
    }

    #[inline]
    pub fn set_color(&self, c: Color) {
        self.color.set(c);
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        !matches!(self.color.get(), Color::White)
    }
}

impl Default for GcHeader {
    fn default() -> Self {
        Self::new()
    }
}
