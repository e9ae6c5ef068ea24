//! Optimistic batched claiming over an ordered external sequence.
//!
//! The sequence is owned by someone else (the code cache, in practice) and is
//! only reachable through a "next after X" relation. Workers share a single
//! cursor that records the last element handed out. To claim work, a worker
//! walks forward from the cursor by up to `K` elements and then tries to move
//! the cursor to the end of its walk with one compare-and-swap. If another
//! worker moved the cursor first, the walked batch is thrown away and the walk
//! starts again from the new position.
//!
//! # Invariants
//!
//! - The cursor only moves forward along the sequence and never rolls back.
//! - The sequence does not change while the cursor is in use, so a cursor
//!   value never repeats and the compare-and-swap cannot suffer from ABA.
//! - Once the cursor reaches the exhausted state it stays there.

use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;

use crossbeam::utils::CachePadded;

use super::sync::AtomicUsize;

/// A stable handle into an append-only arena.
///
/// Handles are stored in the cursor as `index + 1`, which leaves `0` free to
/// encode "no more elements".
pub trait ArenaHandle: Copy + Eq {
    /// Position of this handle in its arena.
    fn index(self) -> usize;

    /// Rebuild a handle from an arena position.
    fn from_index(index: usize) -> Self;
}

/// An ordered sequence that can be walked forward one element at a time.
pub trait LinkedSequence<H: ArenaHandle> {
    /// The element following `handle`, or `None` if `handle` is the last one.
    fn next_after(&self, handle: H) -> Option<H>;
}

const EXHAUSTED: usize = 0;

#[inline]
fn encode<H: ArenaHandle>(handle: Option<H>) -> usize {
    handle.map_or(EXHAUSTED, |h| h.index() + 1)
}

#[inline]
fn decode<H: ArenaHandle>(raw: usize) -> Option<H> {
    raw.checked_sub(1).map(H::from_index)
}

/// Shared cursor for batched claiming. One per cleaning pass.
#[derive(Debug)]
pub struct BatchCursor<H> {
    last_claimed: CachePadded<AtomicUsize>,
    _handle: PhantomData<fn() -> H>,
}

impl<H: ArenaHandle> BatchCursor<H> {
    /// Create a cursor positioned at `start`.
    ///
    /// `start` itself is treated as already handed out: the first claim
    /// returns the elements *after* it. Passing `None` creates an exhausted
    /// cursor.
    #[must_use]
    pub fn new(start: Option<H>) -> Self {
        Self {
            last_claimed: CachePadded::new(AtomicUsize::new(encode(start))),
            _handle: PhantomData,
        }
    }

    /// Claim the next batch of at most `max` elements into `out`.
    ///
    /// `out` is cleared first. On return it holds a run of consecutive
    /// elements that no other caller of this cursor will ever receive. An
    /// empty `out` means the sequence is used up.
    ///
    /// Returns how many compare-and-swap attempts were lost to other workers
    /// before this claim went through.
    pub fn claim_batch_into<S>(&self, sequence: &S, max: NonZeroUsize, out: &mut Vec<H>) -> usize
    where
        S: LinkedSequence<H> + ?Sized,
    {
        let mut lost_races = 0;

        loop {
            out.clear();

            let observed = self.last_claimed.load(Ordering::Acquire);
            let Some(mut current) = decode::<H>(observed) else {
                return lost_races;
            };

            let mut end = observed;
            for _ in 0..max.get() {
                match sequence.next_after(current) {
                    Some(next) => {
                        out.push(next);
                        current = next;
                        end = encode(Some(next));
                    }
                    None => {
                        end = EXHAUSTED;
                        break;
                    }
                }
            }

            if self
                .last_claimed
                .compare_exchange(observed, end, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return lost_races;
            }

            lost_races += 1;
        }
    }

    /// Claim the next batch of at most `max` elements.
    ///
    /// Convenience wrapper around [`claim_batch_into`](Self::claim_batch_into)
    /// for callers that don't reuse a buffer.
    #[must_use]
    pub fn claim_batch<S>(&self, sequence: &S, max: NonZeroUsize) -> Vec<H>
    where
        S: LinkedSequence<H> + ?Sized,
    {
        let mut batch = Vec::with_capacity(max.get());
        self.claim_batch_into(sequence, max, &mut batch);
        batch
    }

    /// Whether every element has been handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.last_claimed.load(Ordering::Acquire) == EXHAUSTED
    }
}
