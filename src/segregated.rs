//! Segregated Free-List Engine
//!
//! Eight fixed size classes plus one "large remainder" list for requests
//! above the largest class. Each class is a singly linked free list
//! threaded directly through free block payloads; there is no coalescing,
//! by design - a freed block always returns to the free list of the class
//! (or large list) it was carved for.

use crate::align::align_up;
use crate::error::{AllocError, Result};
use crate::region::RegionCursor;
use crate::sentinel;
use static_assertions::const_assert;

pub(crate) const SIZE_CLASSES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];
pub(crate) const SEG_ALIGN: usize = 8;
const SEG_MAGIC: u32 = 0xDEAD_BEEF;

/// Sits immediately before every block this engine hands out, whether the
/// block came from a size class or the large-remainder list. `magic` is
/// deliberately the last field: it is the first thing a one-byte-too-far
/// write into the previous allocation will clobber, which is exactly the
/// corruption `free` is meant to catch. `_pad` exists so the header's own
/// size is a multiple of `SEG_ALIGN`, keeping every returned payload
/// pointer 8-byte aligned as long as the block it sits in is.
#[repr(C)]
struct SegHeader {
    size: u32,      // committed size: usable bytes following the header
    requested: u32, // bytes the caller actually asked for
    _pad: u32,
    magic: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<SegHeader>();
const_assert!(HEADER_SIZE % SEG_ALIGN == 0);

/// Overlaid at the start of a free block, where a header would otherwise
/// go; must fit within the smallest whole block this engine ever carves
/// (a class-0 block's header plus its class-0 payload).
#[repr(C)]
struct FreeNode {
    next: usize, // sentinel::NONE terminates
    size: usize, // only meaningful on the large list
}

const_assert!(std::mem::size_of::<FreeNode>() <= HEADER_SIZE + SIZE_CLASSES[0]);

/// Lives at the front of the engine's sub-region; everything after it is
/// the heap area the class and large free lists draw from.
#[repr(C)]
struct SegControl {
    class_heads: [Option<usize>; 8],
    large_head: Option<usize>,
    heap_base: usize,
    heap_end: usize,
}

pub(crate) struct SegregatedEngine {
    control: *mut SegControl,
}

impl SegregatedEngine {
    /// Carves a `SegControl` off `region`, then treats the remainder as the
    /// heap area. Returns the engine plus how many usable heap bytes it has,
    /// for `Stats::heap_size`.
    pub(crate) fn init(region: &mut RegionCursor) -> Result<(Self, u64)> {
        let control_addr = region
            .reserve(
                std::mem::size_of::<SegControl>(),
                std::mem::align_of::<SegControl>(),
            )
            .ok_or(AllocError::RegionTooSmall)?;

        if region.len() < SIZE_CLASSES[0] {
            return Err(AllocError::RegionTooSmall);
        }

        let heap_base = align_up(region.base(), SEG_ALIGN);
        let heap_end = region.base() + region.len();
        if heap_end <= heap_base {
            return Err(AllocError::RegionTooSmall);
        }

        let control = control_addr as *mut SegControl;
        unsafe {
            control.write(SegControl {
                class_heads: [None; 8],
                large_head: None,
                heap_base,
                heap_end,
            });
        }

        let mut engine = Self { control };
        let heap_len = heap_end - heap_base;
        unsafe {
            engine.push_large(heap_base, heap_len);
        }
        Ok((engine, heap_len as u64))
    }

    fn control(&self) -> &SegControl {
        unsafe { &*self.control }
    }

    fn control_mut(&mut self) -> &mut SegControl {
        unsafe { &mut *self.control }
    }

    fn class_for(size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&class_size| size <= class_size)
    }

    pub(crate) fn alloc(&mut self, requested: usize) -> Option<(usize, usize)> {
        if requested == 0 {
            return None;
        }

        if let Some(class) = Self::class_for(requested) {
            let class_size = SIZE_CLASSES[class];
            // class_for already guarantees this, but a class-sized block
            // only ever carves out class_size bytes for the payload -
            // asserting it here catches any future change to class_for
            // that could let an oversized request slip through silently.
            debug_assert!(requested <= class_size);
            let total = HEADER_SIZE + class_size;
            let block = if let Some(addr) = self.pop_class(class) {
                addr
            } else {
                self.take_large(total)?
            };
            self.write_header(block, class_size, requested);
            // committed is the whole physical block (header + class payload),
            // matching the heap bytes actually consumed for it.
            return Some((block + HEADER_SIZE, total));
        }

        let total = align_up(HEADER_SIZE + requested, SEG_ALIGN);
        let block = self.take_large(total)?;
        let usable = self.read_header_size(block);
        self.write_header(block, usable, requested);
        Some((block + HEADER_SIZE, HEADER_SIZE + usable))
    }

    pub(crate) fn free(&mut self, ptr: usize) -> Option<(usize, usize)> {
        let block = ptr.checked_sub(HEADER_SIZE)?;
        let (size, requested, magic) = unsafe {
            let header = &*(block as *const SegHeader);
            (header.size as usize, header.requested as usize, header.magic)
        };
        if magic != SEG_MAGIC {
            log::error!("segregated free: bad magic at {:#x}, pointer not ours or corrupted", block);
            return None;
        }

        match SIZE_CLASSES.iter().position(|&class_size| class_size == size) {
            Some(class) => unsafe {
                self.push_class(class, block);
            },
            None => unsafe {
                self.push_large(block, HEADER_SIZE + size);
            },
        }
        // committed mirrors alloc's convention: the whole physical block,
        // header included, not just the usable payload recorded in `size`.
        Some((HEADER_SIZE + size, requested))
    }

    fn write_header(&mut self, block: usize, size: usize, requested: usize) {
        debug_assert!(size <= u32::MAX as usize && requested <= u32::MAX as usize);
        unsafe {
            (block as *mut SegHeader).write(SegHeader {
                size: size as u32,
                requested: requested as u32,
                _pad: 0,
                magic: SEG_MAGIC,
            });
        }
    }

    fn read_header_size(&self, block: usize) -> usize {
        unsafe { (*(block as *const SegHeader)).size as usize }
    }

    fn pop_class(&mut self, class: usize) -> Option<usize> {
        let control = self.control_mut();
        let head = control.class_heads[class]?;
        let next = unsafe { (*(head as *const FreeNode)).next };
        control.class_heads[class] = sentinel::opt_from_raw(next);
        Some(head)
    }

    unsafe fn push_class(&mut self, class: usize, addr: usize) {
        let control = self.control_mut();
        let next = sentinel::raw_from_opt(control.class_heads[class]);
        (addr as *mut FreeNode).write(FreeNode { next, size: 0 });
        control.class_heads[class] = Some(addr);
    }

    unsafe fn push_large(&mut self, addr: usize, size: usize) {
        let control = self.control_mut();
        let next = sentinel::raw_from_opt(control.large_head);
        (addr as *mut FreeNode).write(FreeNode { next, size });
        control.large_head = Some(addr);
    }

    /// First-fit search of the large-remainder list for a block of at least
    /// `needed` bytes. Splits off the remainder back onto the list when the
    /// found block is bigger than required by more than one header's worth.
    fn take_large(&mut self, needed: usize) -> Option<usize> {
        let mut prev: Option<usize> = None;
        let mut current = self.control().large_head;

        while let Some(addr) = current {
            let (size, next) = unsafe {
                let node = &*(addr as *const FreeNode);
                (node.size, node.next)
            };

            if size >= needed {
                self.unlink_large(prev, next);
                self.split_large(addr, size, needed);
                return Some(addr);
            }

            prev = Some(addr);
            current = sentinel::opt_from_raw(next);
        }
        None
    }

    fn unlink_large(&mut self, prev: Option<usize>, next: usize) {
        let control = self.control_mut();
        match prev {
            Some(prev_addr) => unsafe {
                (*(prev_addr as *mut FreeNode)).next = next;
            },
            None => {
                control.large_head = sentinel::opt_from_raw(next);
            }
        }
    }

    /// If `size` exceeds `needed` by enough to host another header plus at
    /// least a minimum class block, carve the remainder back onto the large
    /// list; otherwise the whole block is handed out as-is (internal
    /// fragmentation, never coalesced back). Writes a provisional header on
    /// the taken block so the large-allocation path in `alloc` can read back
    /// the real committed size.
    fn split_large(&mut self, addr: usize, size: usize, needed: usize) {
        let remainder = size - needed;
        let min_split = HEADER_SIZE + SIZE_CLASSES[0];
        if remainder >= min_split {
            let new_addr = addr + needed;
            unsafe {
                self.push_large(new_addr, remainder);
            }
            self.write_header(addr, needed - HEADER_SIZE, 0);
        } else {
            self.write_header(addr, size - HEADER_SIZE, 0);
        }
    }
}
