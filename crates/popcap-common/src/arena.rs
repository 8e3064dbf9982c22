//! Block-chained bump arena.
//!
//! All metadata parsed from an archive (entry names, mostly) lives for exactly
//! one extraction run, so it is carved out of a [`BlockArena`] instead of being
//! heap-allocated per entry. Allocations are never freed individually; every
//! block is released together when the arena is dropped.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

/// Default size of a freshly allocated block.
///
/// Sized for 64 entries at the worst-case 328 bytes of metadata each.
pub const DEFAULT_BLOCK_SIZE: usize = 328 * 64;

/// A single fixed-capacity block.
///
/// The backing memory never moves or grows once allocated, which is what keeps
/// previously returned references valid when the block list itself reallocates.
struct Block {
    ptr: NonNull<u8>,
    capacity: usize,
    used: Cell<usize>,
}

impl Block {
    /// Allocate a zeroed block, aborting the process if the allocator fails.
    fn new(capacity: usize) -> Self {
        let layout = Self::layout(capacity);

        // SAFETY: `layout` has a non-zero size (capacity is clamped to >= 1).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Self {
            ptr,
            capacity,
            used: Cell::new(0),
        }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::array::<u8>(capacity.max(1)) {
            Ok(layout) => layout,
            // A request this large can never be satisfied.
            Err(_) => std::process::abort(),
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Reserve `size` bytes from the front of the free region.
    ///
    /// Caller guarantees `size <= self.remaining()`.
    #[inline]
    fn bump(&self, size: usize) -> NonNull<u8> {
        let offset = self.used.get();
        debug_assert!(size <= self.capacity - offset);
        self.used.set(offset + size);

        // SAFETY: offset + size <= capacity, so the pointer stays in bounds.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated in `Block::new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.capacity)) }
    }
}

/// A bump arena made of a chain of independently allocated blocks.
///
/// Requests are served first-fit, searching from the most recently added
/// block backwards. When nothing fits, a new block of
/// `max(size, block_size)` bytes is added. Blocks are never resized, merged or
/// partially freed, so every slice handed out stays valid for the lifetime of
/// the arena.
///
/// Memory exhaustion is not reported as an error: the process aborts through
/// [`std::alloc::handle_alloc_error`].
///
/// # Example
///
/// ```
/// use popcap_common::BlockArena;
///
/// let arena = BlockArena::new();
/// let a = arena.alloc_str("images\\logo.png");
/// let b = arena.alloc_str("sounds\\click.ogg");
///
/// assert_eq!(a, "images\\logo.png");
/// assert_eq!(b, "sounds\\click.ogg");
/// assert_eq!(arena.block_count(), 1);
/// ```
pub struct BlockArena {
    blocks: RefCell<Vec<Block>>,
    block_size: usize,
}

impl BlockArena {
    /// Create an empty arena using [`DEFAULT_BLOCK_SIZE`].
    ///
    /// No memory is allocated until the first request.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create an empty arena with a custom default block size.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            blocks: RefCell::new(Vec::new()),
            block_size: block_size.max(1),
        }
    }

    /// Allocate `size` zeroed bytes.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_zeroed(&self, size: usize) -> &mut [u8] {
        if size == 0 {
            return &mut [];
        }

        let ptr = self.allocate(size);

        // SAFETY: the region is in bounds of a live block, was zeroed at block
        // creation and has never been handed out before, so this is the only
        // reference to it. Blocks outlive `&self`.
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), size) }
    }

    /// Copy a byte slice into the arena.
    pub fn alloc_bytes(&self, src: &[u8]) -> &[u8] {
        let dst = self.alloc_zeroed(src.len());
        dst.copy_from_slice(src);
        dst
    }

    /// Copy a string into the arena.
    pub fn alloc_str(&self, src: &str) -> &str {
        let bytes = self.alloc_bytes(src.as_bytes());

        // SAFETY: the bytes were copied verbatim from a valid `&str`.
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }

    /// Number of blocks currently owned by the arena.
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Total bytes handed out so far.
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.borrow().iter().map(|b| b.used.get()).sum()
    }

    /// Total capacity of all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.borrow().iter().map(|b| b.capacity).sum()
    }

    fn allocate(&self, size: usize) -> NonNull<u8> {
        let mut blocks = self.blocks.borrow_mut();

        if let Some(block) = blocks.iter().rev().find(|b| b.remaining() >= size) {
            return block.bump(size);
        }

        let block = Block::new(size.max(self.block_size));
        let ptr = block.bump(size);
        blocks.push(block);
        ptr
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlockArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockArena")
            .field("blocks", &self.block_count())
            .field("allocated", &self.allocated_bytes())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_arena_has_no_blocks() {
        let arena = BlockArena::new();
        assert_eq!(arena.block_count(), 0);
        assert_eq!(arena.capacity(), 0);
        drop(arena);
    }

    #[test]
    fn test_zero_sized_allocation() {
        let arena = BlockArena::new();
        assert_eq!(arena.alloc_str(""), "");
        assert!(arena.alloc_zeroed(0).is_empty());
        assert_eq!(arena.block_count(), 0);
    }

    #[test]
    fn test_allocations_share_a_block() {
        let arena = BlockArena::with_block_size(64);
        let a = arena.alloc_str("first");
        let b = arena.alloc_str("second");

        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.allocated_bytes(), 11);
        assert_eq!(arena.capacity(), 64);
    }

    #[test]
    fn test_oversized_request_gets_own_block() {
        let arena = BlockArena::with_block_size(8);
        let big = arena.alloc_bytes(&[0xAB; 100]);

        assert_eq!(big.len(), 100);
        assert!(big.iter().all(|&b| b == 0xAB));
        assert_eq!(arena.block_count(), 1);
        assert_eq!(arena.capacity(), 100);
    }

    #[test]
    fn test_first_fit_reuses_older_block() {
        let arena = BlockArena::with_block_size(16);

        let a = arena.alloc_bytes(&[1; 10]); // block 0: 10/16
        let b = arena.alloc_bytes(&[2; 20]); // block 1: 20/20
        assert_eq!(arena.block_count(), 2);

        let c = arena.alloc_bytes(&[3; 4]); // fits in block 0
        assert_eq!(arena.block_count(), 2);

        let d = arena.alloc_bytes(&[4; 8]); // block 0 has 2 left, new block
        assert_eq!(arena.block_count(), 3);
        assert_eq!(arena.allocated_bytes(), 42);

        assert_eq!(a, &[1; 10]);
        assert_eq!(b, &[2; 20]);
        assert_eq!(c, &[3; 4]);
        assert_eq!(d, &[4; 8]);
    }

    #[test]
    fn test_references_survive_growth() {
        let arena = BlockArena::with_block_size(32);
        let names: Vec<&str> = (0..500)
            .map(|i| arena.alloc_str(&format!("data\\file_{i:04}.bin")))
            .collect();

        assert!(arena.block_count() > 1);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(*name, format!("data\\file_{i:04}.bin"));
        }
    }

    #[test]
    fn test_alloc_zeroed_is_writable() {
        let arena = BlockArena::new();
        let buf = arena.alloc_zeroed(4);
        assert_eq!(buf, &[0, 0, 0, 0]);

        buf.copy_from_slice(b"abcd");
        let other = arena.alloc_str("efgh");

        assert_eq!(buf, b"abcd");
        assert_eq!(other, "efgh");
    }
}
