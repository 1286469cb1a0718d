//! Free-list node pointers, sentinel-encoded
//!
//! Free-list *nodes* are overlaid directly on free-block payload bytes, so
//! their size is load-bearing (a node must fit in the smallest block the
//! owning engine manages). `Option<usize>` has no guaranteed niche, so nodes
//! use a raw `usize` with `NONE` standing in for "no successor" instead -
//! the same trick the buddy allocators in this codebase's lineage use with
//! `u64::MAX`. Control-struct free-list *heads* aren't size-constrained and
//! use `Option<usize>` as usual; these two helpers convert between the two
//! representations at that boundary.

pub(crate) const NONE: usize = usize::MAX;

#[inline]
pub(crate) fn opt_from_raw(raw: usize) -> Option<usize> {
    if raw == NONE {
        None
    } else {
        Some(raw)
    }
}

#[inline]
pub(crate) fn raw_from_opt(opt: Option<usize>) -> usize {
    opt.unwrap_or(NONE)
}
