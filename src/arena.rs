// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A fixed-size, LIFO-only [`Allocator`] used to host task frames without touching the
//! global allocator on every spawn.

use core::alloc::{AllocError, Allocator, Layout};
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;

/// A contiguous byte region with a descending top pointer.
///
/// Allocations must be released in strict LIFO order. The arena is heap-allocated by
/// [`StackArena::create`] and destroys itself the moment its top pointer returns to the
/// initial (empty) position — i.e. when the last outstanding allocation is released.
/// Because of this self-destroying contract, a `StackArena` must never be placed on the
/// stack or embedded by value in another structure; only [`ArenaHandle`], which forwards
/// through a raw pointer, is meant to be held by callers.
pub struct StackArena {
    base: NonNull<u8>,
    capacity: usize,
    top: Cell<usize>,
    /// The `top` value recorded immediately before each outstanding allocation, in
    /// allocation order. `try_allocate` rounds the requested offset down to satisfy
    /// alignment, which can eat more than `layout.size()` bytes of the arena; `release`
    /// needs the exact pre-rounding value to give that padding back, not just
    /// `offset + layout.size()`.
    marks: RefCell<Vec<usize>>,
    layout: Layout,
}

/// A `Copy` handle to a heap-allocated [`StackArena`].
///
/// `ArenaHandle` is itself an [`Allocator`]: it simply forwards to the arena it points at.
/// This mirrors the original `AllocatorPtr = Allocator*` pointer-semantics design, but
/// without the separate trailer-pointer bookkeeping C++ needed — the handle itself is the
/// "which allocator produced this" metadata.
#[derive(Clone, Copy)]
pub struct ArenaHandle(NonNull<StackArena>);

// Safety: a `StackArena` is only ever used by one task chain bound to one executor thread
// at a time; `ArenaHandle` does not claim otherwise, it just needs to be `Send`/`Sync` to
// travel with (and be shared by) a spawned task's closures as they cross onto its executor's
// worker thread. Both marker impls rely on the same single-poller discipline the rest of this
// crate's task machinery assumes; nothing here ever calls `allocate`/`deallocate` from two
// threads at once.
unsafe impl Send for ArenaHandle {}
unsafe impl Sync for ArenaHandle {}

impl StackArena {
    /// Allocate a fresh `size`-byte arena on the heap and return a handle to it.
    ///
    /// # Panics
    ///
    /// Panics if `size` overflows a [`Layout`], or if the backing allocation itself fails.
    #[must_use]
    pub fn create(size: usize) -> ArenaHandle {
        let layout = Layout::array::<u8>(size).expect("arena size overflows a Layout");
        // Safety: `layout` has non-zero size unless `size == 0`, handled by `dangling`
        // below; `std::alloc::alloc` is the matching deallocator used in `drop`.
        let base = if size == 0 {
            NonNull::dangling()
        } else {
            let raw = unsafe { std::alloc::alloc(layout) };
            NonNull::new(raw).expect("global allocator exhausted while creating StackArena")
        };

        let arena = Box::new(StackArena {
            base,
            capacity: size,
            top: Cell::new(size),
            marks: RefCell::new(Vec::new()),
            layout,
        });

        ArenaHandle(NonNull::from(Box::leak(arena)))
    }

    fn try_allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let top = self.top.get();
        let aligned_top = top.checked_sub(layout.size()).ok_or(AllocError)?;
        let aligned_top = aligned_top & !(layout.align() - 1);

        // underflow: the rounded-down offset fell below the arena's base.
        if aligned_top > top {
            return Err(AllocError);
        }

        self.marks.borrow_mut().push(top);
        self.top.set(aligned_top);

        // Safety: `aligned_top <= capacity` was just checked, so this stays within the
        // backing allocation.
        let ptr = unsafe { self.base.add(aligned_top) };
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    /// # Safety
    ///
    /// `ptr` must be exactly the current top of the arena (the most recently allocated,
    /// not-yet-deallocated block) and `layout` must match the layout it was allocated
    /// with. Violating LIFO order is a programmer error.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: caller guarantees `ptr` lies within this arena's backing allocation.
        let offset = unsafe { ptr.as_ptr().offset_from(self.base.as_ptr()) };
        let offset = usize::try_from(offset).expect("deallocate: pointer precedes arena base");
        debug_assert_eq!(
            offset,
            self.top.get(),
            "StackArena::deallocate called out of LIFO order"
        );

        let previous_top = self
            .marks
            .borrow_mut()
            .pop()
            .expect("StackArena::deallocate called with no outstanding allocation");
        debug_assert!(
            previous_top - offset >= layout.size(),
            "StackArena::deallocate layout does not match the tracked allocation span"
        );
        self.top.set(previous_top);
    }

    fn is_empty(&self) -> bool {
        self.top.get() == self.capacity
    }
}

// Safety: `allocate`/`deallocate` never hand out memory outside `[base, base+capacity)`,
// and `deallocate` only accepts the current top per the LIFO contract documented above.
unsafe impl Allocator for StackArena {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        self.try_allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: forwarded from the caller's contract on this method.
        unsafe {
            self.release(ptr, layout);
        }
    }
}

impl Drop for StackArena {
    fn drop(&mut self) {
        if self.capacity != 0 {
            // Safety: `base`/`layout` describe exactly the allocation made in `create`.
            unsafe {
                std::alloc::dealloc(self.base.as_ptr(), self.layout);
            }
        }
    }
}

// === impl ArenaHandle ===

impl ArenaHandle {
    fn arena(&self) -> &StackArena {
        // Safety: the pointee is kept alive by the self-destroy discipline documented on
        // `StackArena`: as long as any allocation from it is outstanding, `is_empty()` is
        // false and the arena has not been dropped.
        unsafe { self.0.as_ref() }
    }
}

// Safety: see `StackArena`'s `unsafe impl Allocator` above; this is a thin forwarding
// wrapper with identical guarantees.
unsafe impl Allocator for ArenaHandle {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        self.arena().allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let arena_ptr = self.0;
        // Safety: forwarded from the caller's contract on this method.
        unsafe {
            arena_ptr.as_ref().deallocate(ptr, layout);
        }

        // Safety: `arena_ptr` was produced by `Box::leak` in `create` and is never
        // dereferenced again once the arena reports empty.
        if unsafe { arena_ptr.as_ref() }.is_empty() {
            drop(unsafe { Box::from_raw(arena_ptr.as_ptr()) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_capacity_succeeds_one_more_fails() {
        let handle = StackArena::create(16);
        let layout = Layout::from_size_align(16, 1).unwrap();
        let a = handle.allocate(layout).unwrap();
        unsafe { handle.deallocate(a.cast(), layout) };

        let handle = StackArena::create(16);
        let too_big = Layout::from_size_align(17, 1).unwrap();
        assert!(handle.allocate(too_big).is_err());
    }

    #[test]
    fn half_plus_half_succeeds() {
        let handle = StackArena::create(16);
        let layout = Layout::from_size_align(8, 1).unwrap();
        let a = handle.allocate(layout).unwrap();
        let b = handle.allocate(layout).unwrap();
        // LIFO: release in reverse order.
        unsafe { handle.deallocate(b.cast(), layout) };
        unsafe { handle.deallocate(a.cast(), layout) };
    }

    #[test]
    fn respects_alignment() {
        let handle = StackArena::create(64);
        let layout = Layout::from_size_align(3, 1).unwrap();
        let first = handle.allocate(layout).unwrap();

        let aligned = Layout::from_size_align(8, 8).unwrap();
        let ptr = handle.allocate(aligned).unwrap();
        assert_eq!(ptr.as_ptr().cast::<u8>() as usize % 8, 0);

        // LIFO: release in reverse order, exercising the padding-aware restore below.
        unsafe { handle.deallocate(ptr.cast(), aligned) };
        unsafe { handle.deallocate(first.cast(), layout) };
    }

    /// A misaligned `top` eating padding on allocation must still give that padding back on
    /// release, or the arena's top never returns to full capacity and it leaks forever.
    #[test]
    fn top_returns_to_full_capacity_after_misaligned_release() {
        let handle = StackArena::create(15);
        let arena = handle.arena();
        let layout = Layout::from_size_align(8, 8).unwrap();

        let ptr = arena.allocate(layout).unwrap();
        unsafe { arena.deallocate(ptr.cast(), layout) };

        assert!(arena.is_empty());
    }
}
