//! Façade - the public entry point layered over the two engines.
//!
//! `FacadeCore` is the raw, pointer-only heart of this module: it owns no
//! lifetime and performs no borrow-checking of its own, which sidesteps the
//! self-referential-struct problem an owning allocator would otherwise run
//! into (the same reason `Vec<T>` is built on a raw `ptr`/`len`/`cap` triple
//! rather than a borrowed slice). [`Facade`] and [`OwnedFacade`] are the
//! safe faces put on top of it: the former borrows a caller-supplied
//! buffer for a bounded lifetime, the latter owns a heap allocation for as
//! long as it exists and frees it on `Drop`.
//!
//! Dispatch between the two engines is a tagged enum, not a table of
//! function pointers - a closed, two-variant sum type is simpler to read
//! and just as fast once inlined.

use crate::buddy::BuddyEngine;
use crate::error::{AllocError, Result};
use crate::region::RegionCursor;
use crate::segregated::SegregatedEngine;
use crate::stats::Stats;
use std::alloc::{alloc, dealloc, Layout};
use std::marker::PhantomData;

pub(crate) const FACADE_ALIGN: usize = 16;

/// Which engine a given region is using. Chosen once at `create` time and
/// fixed for the region's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    SegregatedFreelist,
    Buddy,
}

enum EngineState {
    Segregated(SegregatedEngine),
    Buddy(BuddyEngine),
}

impl EngineState {
    fn alloc(&mut self, requested: usize) -> Option<(usize, usize)> {
        match self {
            EngineState::Segregated(engine) => engine.alloc(requested),
            EngineState::Buddy(engine) => engine.alloc(requested),
        }
    }

    fn free(&mut self, ptr: usize) -> Option<(usize, usize)> {
        match self {
            EngineState::Segregated(engine) => engine.free(ptr),
            EngineState::Buddy(engine) => engine.free(ptr),
        }
    }
}

/// Control block carved off the front of every region: the chosen engine's
/// own state plus the stats this façade reports.
struct ControlBlock {
    engine: EngineState,
    stats: Stats,
}

/// The pointer-only core shared by [`Facade`] and [`OwnedFacade`]. Neither
/// `Send` nor `Sync`: every field here is a raw pointer, which makes both
/// impls fall out automatically and matches this crate's single-threaded
/// design.
pub(crate) struct FacadeCore {
    control: *mut ControlBlock,
}

impl FacadeCore {
    fn create(algorithm: Algorithm, base: usize, len: usize) -> Result<Self> {
        let mut region = RegionCursor::new(base, len);
        let control_addr = region
            .reserve(
                std::mem::size_of::<ControlBlock>(),
                std::mem::align_of::<ControlBlock>(),
            )
            .ok_or(AllocError::RegionTooSmall)?;

        let (engine, heap_size) = match algorithm {
            Algorithm::SegregatedFreelist => {
                let (engine, heap_size) = SegregatedEngine::init(&mut region)?;
                (EngineState::Segregated(engine), heap_size)
            }
            Algorithm::Buddy => {
                let (engine, heap_size) = BuddyEngine::init(&mut region)?;
                (EngineState::Buddy(engine), heap_size)
            }
        };

        let control = control_addr as *mut ControlBlock;
        unsafe {
            control.write(ControlBlock {
                engine,
                stats: Stats {
                    heap_size,
                    ..Default::default()
                },
            });
        }
        Ok(Self { control })
    }

    fn control(&self) -> &ControlBlock {
        unsafe { &*self.control }
    }

    fn control_mut(&mut self) -> &mut ControlBlock {
        unsafe { &mut *self.control }
    }

    /// A `size == 0` request returns null without incrementing
    /// `failed_allocations`: it was never a search failure, just a
    /// degenerate request.
    fn alloc(&mut self, size: usize) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }
        let control = self.control_mut();
        match control.engine.alloc(size) {
            Some((addr, committed)) => {
                control.stats.record_alloc(committed as u64, size as u64);
                Some(addr as *mut u8)
            }
            None => {
                control.stats.record_failed();
                None
            }
        }
    }

    fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let control = self.control_mut();
        if let Some((committed, requested)) = control.engine.free(ptr as usize) {
            control.stats.record_free(committed as u64, requested as u64);
        }
    }

    /// Allocates a fresh block of `new_size` bytes and frees the old one.
    /// No payload bytes are copied: neither engine exposes a committed-size
    /// lookup at the façade level, so a copy-preserving realloc would need
    /// to reach into engine-specific headers. Callers that need the old
    /// contents must save them before calling.
    fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> Option<*mut u8> {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return None;
        }
        let new_ptr = self.alloc(new_size)?;
        self.free(ptr);
        Some(new_ptr)
    }

    fn get_stats(&self) -> Stats {
        self.control().stats
    }

    fn reset_stats(&mut self) {
        self.control_mut().stats.reset();
    }
}

/// A façade borrowing a caller-owned buffer for its lifetime. The buffer
/// must outlive the `Facade`; the `PhantomData` here is what makes the
/// borrow checker enforce that even though `FacadeCore` itself holds only
/// raw pointers.
pub struct Facade<'a> {
    core: FacadeCore,
    algorithm: Algorithm,
    _region: PhantomData<&'a mut [u8]>,
}

impl<'a> Facade<'a> {
    /// Builds a façade over `region`, carving its control block and chosen
    /// engine's state out of the front of the buffer. Returns `None` if
    /// `region` is too small to hold the control block, the engine's own
    /// state, and a minimum-sized heap.
    pub fn create(algorithm: Algorithm, region: &'a mut [u8]) -> Option<Self> {
        let base = region.as_mut_ptr() as usize;
        let core = FacadeCore::create(algorithm, base, region.len()).ok()?;
        Some(Self {
            core,
            algorithm,
            _region: PhantomData,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Allocates at least `size` bytes, returning `None` on failure (region
    /// exhausted, request larger than the engine can ever satisfy, or
    /// `size == 0`).
    pub fn alloc(&mut self, size: usize) -> Option<*mut u8> {
        self.core.alloc(size)
    }

    /// Frees a pointer previously returned by `alloc`/`realloc` on this same
    /// façade. A null pointer is a no-op; a pointer this façade doesn't
    /// recognize is logged and ignored rather than causing undefined
    /// behavior.
    pub fn free(&mut self, ptr: *mut u8) {
        self.core.free(ptr)
    }

    /// Allocates a new block of `new_size` bytes and frees the old one.
    /// `ptr == null` behaves like `alloc`; `new_size == 0` behaves like
    /// `free` and returns `None`. Payload bytes are **not** preserved; see
    /// this module's documentation for why.
    pub fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> Option<*mut u8> {
        self.core.realloc(ptr, new_size)
    }

    pub fn get_stats(&self) -> Stats {
        self.core.get_stats()
    }

    pub fn reset_stats(&mut self) {
        self.core.reset_stats()
    }
}

/// A façade that owns its backing memory, obtained from the platform
/// allocator at construction and released on `Drop`.
pub struct OwnedFacade {
    core: FacadeCore,
    algorithm: Algorithm,
    buffer: *mut u8,
    layout: Layout,
}

impl OwnedFacade {
    /// Requests `size` bytes (plus this crate's own bookkeeping overhead)
    /// from the platform allocator and builds a façade over it.
    pub fn create_with_platform_backing(algorithm: Algorithm, size: usize) -> Option<Self> {
        let total = size.checked_add(FACADE_ALIGN)?;
        let layout = Layout::from_size_align(total, FACADE_ALIGN).ok()?;
        let buffer = unsafe { alloc(layout) };
        if buffer.is_null() {
            return None;
        }

        let core = match FacadeCore::create(algorithm, buffer as usize, total) {
            Ok(core) => core,
            Err(_) => {
                unsafe {
                    dealloc(buffer, layout);
                }
                return None;
            }
        };

        Some(Self {
            core,
            algorithm,
            buffer,
            layout,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn alloc(&mut self, size: usize) -> Option<*mut u8> {
        self.core.alloc(size)
    }

    pub fn free(&mut self, ptr: *mut u8) {
        self.core.free(ptr)
    }

    pub fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> Option<*mut u8> {
        self.core.realloc(ptr, new_size)
    }

    pub fn get_stats(&self) -> Stats {
        self.core.get_stats()
    }

    pub fn reset_stats(&mut self) {
        self.core.reset_stats()
    }
}

impl Drop for OwnedFacade {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.buffer, self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_region_rejected_for_both_algorithms() {
        let mut buf = [0u8; 8];
        assert!(Facade::create(Algorithm::SegregatedFreelist, &mut buf).is_none());
        let mut buf = [0u8; 8];
        assert!(Facade::create(Algorithm::Buddy, &mut buf).is_none());
    }

    #[test]
    fn sequential_alloc_free_round_trip() {
        let mut buf = vec![0u8; 1 << 16];
        let mut facade = Facade::create(Algorithm::SegregatedFreelist, &mut buf).unwrap();
        let ptr = facade.alloc(64).unwrap();
        facade.free(ptr);
        let stats = facade.get_stats();
        assert_eq!(stats.current_allocated, 0);
        assert_eq!(stats.total_allocations, 1);
        assert_eq!(stats.total_frees, 1);
    }

    #[test]
    fn realloc_grows_into_a_fresh_block() {
        let mut buf = vec![0u8; 1 << 16];
        let mut facade = Facade::create(Algorithm::Buddy, &mut buf).unwrap();
        let ptr = facade.alloc(16).unwrap();
        let bigger = facade.realloc(ptr, 200).unwrap();
        assert_ne!(ptr, bigger, "realloc always moves, it never grows in place");
        assert_eq!(facade.get_stats().total_frees, 1, "the old block must be freed");
    }

    #[test]
    fn realloc_null_behaves_like_alloc() {
        let mut buf = vec![0u8; 1 << 16];
        let mut facade = Facade::create(Algorithm::SegregatedFreelist, &mut buf).unwrap();
        let ptr = facade.realloc(std::ptr::null_mut(), 100).unwrap();
        assert!(!ptr.is_null());
        assert_eq!(facade.get_stats().total_allocations, 1);
    }

    #[test]
    fn realloc_to_zero_frees_and_returns_none() {
        let mut buf = vec![0u8; 1 << 16];
        let mut facade = Facade::create(Algorithm::SegregatedFreelist, &mut buf).unwrap();
        let ptr = facade.alloc(32).unwrap();
        assert!(facade.realloc(ptr, 0).is_none());
        assert_eq!(facade.get_stats().current_allocated, 0);
    }

    #[test]
    fn owned_facade_frees_its_buffer_on_drop() {
        let mut facade = OwnedFacade::create_with_platform_backing(Algorithm::Buddy, 1 << 16).unwrap();
        let ptr = facade.alloc(32).unwrap();
        facade.free(ptr);
        drop(facade);
    }

    #[test]
    fn reset_stats_clears_counters_but_not_heap_size() {
        let mut buf = vec![0u8; 1 << 16];
        let mut facade = Facade::create(Algorithm::SegregatedFreelist, &mut buf).unwrap();
        let ptr = facade.alloc(16).unwrap();
        facade.free(ptr);
        let heap_size = facade.get_stats().heap_size;
        facade.reset_stats();
        let stats = facade.get_stats();
        assert_eq!(stats.total_allocations, 0);
        assert_eq!(stats.heap_size, heap_size);
    }
}
