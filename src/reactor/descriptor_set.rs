//! Fixed-capacity descriptor sets used to build `select(2)` calls.
//!
//! Two encodings exist in the wild and both are provided here behind the
//! [`DescriptorSet`] trait:
//!
//! - [`BitmaskSet`]: the POSIX `fd_set`, one bit per descriptor number up to
//!   `FD_SETSIZE`. Membership is O(1) and the value can be handed to the
//!   kernel as-is.
//! - [`CompactSet`]: a count-prefixed array of descriptor values, the layout
//!   used by platforms whose `fd_set` lists sockets explicitly. Membership is
//!   O(count) with a much smaller capacity.
//!
//! [`NativeSet`] names the encoding the current target's `select` expects.
//! Adding a descriptor that does not fit (negative, beyond the bitmask, or
//! into a full compact array) is a silent no-op: the set is left unchanged
//! and `contains` keeps returning `false` for it.

use libc::fd_set;
use std::fmt;
use std::mem;
use std::os::unix::io::RawFd;

/// Capability contract shared by every descriptor-set encoding.
pub trait DescriptorSet: Clone + Default + fmt::Debug {
    /// Maximum number of members (compact) or highest descriptor + 1 (bitmask).
    const CAPACITY: usize;

    /// Removes every member.
    fn zero(&mut self);

    /// Adds `file_descriptor`; a no-op when it does not fit.
    fn add(&mut self, file_descriptor: RawFd);

    fn remove(&mut self, file_descriptor: RawFd);

    fn contains(&self, file_descriptor: RawFd) -> bool;

    /// Number of members.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in ascending order (bitmask) or insertion order (compact).
    fn descriptors(&self) -> Vec<RawFd>;

    /// Builds a set from `descriptors`, dropping any that do not fit.
    fn from_descriptors(descriptors: impl IntoIterator<Item = RawFd>) -> Self {
        let mut set = Self::default();
        for file_descriptor in descriptors {
            set.add(file_descriptor);
        }
        set
    }
}

/// The encoding used by `select(2)` on this target.
pub type NativeSet = BitmaskSet;

// ============================================================================
// Bitmask encoding
// ============================================================================

/// Bits in one addressing word. The bitmask is always addressed as `u32`
/// words; [`word_address`] maps those onto the native word layout.
const WORD_BITS: usize = 32;

const WORD_COUNT: usize = mem::size_of::<fd_set>() / mem::size_of::<u32>();

/// Width of the integer type the kernel uses for `fd_set` words.
#[cfg(target_vendor = "apple")]
const NATIVE_WORD_BYTES: usize = mem::size_of::<i32>();
#[cfg(not(target_vendor = "apple"))]
const NATIVE_WORD_BYTES: usize = mem::size_of::<libc::c_ulong>();

/// Maps a descriptor number onto `(u32 word index, bit mask)`.
///
/// The kernel tests bit `fd % N` of native word `fd / N`, where `N` is the
/// native word width. When native words are wider than 32 bits on a
/// big-endian target, the 32-bit halves of each native word are stored most
/// significant first, so the half holding the low bits comes last.
pub(crate) fn word_address(
    file_descriptor: usize,
    native_word_bytes: usize,
    big_endian: bool,
) -> (usize, u32) {
    let mut index = file_descriptor / WORD_BITS;

    let words_per_native = (native_word_bytes / mem::size_of::<u32>()).max(1);
    if big_endian && words_per_native > 1 {
        let native_index = index / words_per_native;
        let sub_index = index % words_per_native;
        index = native_index * words_per_native + (words_per_native - 1 - sub_index);
    }

    let mask = 1u32 << (file_descriptor % WORD_BITS);
    (index, mask)
}

/// `fd_set` bitmask, layout-compatible with the kernel's `select(2)`.
#[derive(Clone, Copy)]
pub struct BitmaskSet {
    raw: fd_set,
}

impl BitmaskSet {
    pub fn new() -> Self {
        Self {
            raw: unsafe { mem::zeroed() },
        }
    }

    fn address(file_descriptor: RawFd) -> Option<(usize, u32)> {
        if file_descriptor < 0 || file_descriptor as usize >= Self::CAPACITY {
            return None;
        }

        Some(word_address(
            file_descriptor as usize,
            NATIVE_WORD_BYTES,
            cfg!(target_endian = "big"),
        ))
    }

    fn words(&self) -> &[u32; WORD_COUNT] {
        // fd_set is a plain array of integers whose size is a multiple of 4.
        unsafe { &*(&self.raw as *const fd_set as *const [u32; WORD_COUNT]) }
    }

    fn words_mut(&mut self) -> &mut [u32; WORD_COUNT] {
        unsafe { &mut *(&mut self.raw as *mut fd_set as *mut [u32; WORD_COUNT]) }
    }

    pub(crate) fn as_raw_mut(&mut self) -> *mut fd_set {
        &mut self.raw
    }

    pub(crate) fn as_raw(&self) -> *const fd_set {
        &self.raw
    }
}

impl Default for BitmaskSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BitmaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.descriptors()).finish()
    }
}

impl DescriptorSet for BitmaskSet {
    const CAPACITY: usize = WORD_COUNT * WORD_BITS;

    fn zero(&mut self) {
        self.words_mut().fill(0);
    }

    fn add(&mut self, file_descriptor: RawFd) {
        if let Some((index, mask)) = Self::address(file_descriptor) {
            self.words_mut()[index] |= mask;
        }
    }

    fn remove(&mut self, file_descriptor: RawFd) {
        if let Some((index, mask)) = Self::address(file_descriptor) {
            self.words_mut()[index] &= !mask;
        }
    }

    fn contains(&self, file_descriptor: RawFd) -> bool {
        Self::address(file_descriptor)
            .is_some_and(|(index, mask)| self.words()[index] & mask != 0)
    }

    fn len(&self) -> usize {
        self.words()
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    fn descriptors(&self) -> Vec<RawFd> {
        (0..Self::CAPACITY as RawFd)
            .filter(|&file_descriptor| self.contains(file_descriptor))
            .collect()
    }
}

// ============================================================================
// Compact encoding
// ============================================================================

/// Capacity of the count-prefixed encoding (`FD_SETSIZE` on list-based platforms).
pub const COMPACT_CAPACITY: usize = 64;

/// Count-prefixed array of descriptor values.
#[derive(Clone, Copy)]
pub struct CompactSet {
    count: usize,
    descriptors: [RawFd; COMPACT_CAPACITY],
}

impl CompactSet {
    pub fn new() -> Self {
        Self {
            count: 0,
            descriptors: [0; COMPACT_CAPACITY],
        }
    }

    fn position(&self, file_descriptor: RawFd) -> Option<usize> {
        self.descriptors[..self.count]
            .iter()
            .position(|&member| member == file_descriptor)
    }
}

impl Default for CompactSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompactSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(&self.descriptors[..self.count])
            .finish()
    }
}

impl DescriptorSet for CompactSet {
    const CAPACITY: usize = COMPACT_CAPACITY;

    fn zero(&mut self) {
        self.descriptors.fill(0);
        self.count = 0;
    }

    fn add(&mut self, file_descriptor: RawFd) {
        if file_descriptor < 0 || self.position(file_descriptor).is_some() {
            return;
        }

        if self.count < COMPACT_CAPACITY {
            self.descriptors[self.count] = file_descriptor;
            self.count += 1;
        }
    }

    fn remove(&mut self, file_descriptor: RawFd) {
        if let Some(index) = self.position(file_descriptor) {
            self.descriptors.copy_within(index + 1..self.count, index);
            self.count -= 1;
            self.descriptors[self.count] = 0;
        }
    }

    fn contains(&self, file_descriptor: RawFd) -> bool {
        self.position(file_descriptor).is_some()
    }

    fn len(&self) -> usize {
        self.count
    }

    fn descriptors(&self) -> Vec<RawFd> {
        self.descriptors[..self.count].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_addressing_is_linear() {
        assert_eq!(word_address(0, 8, false), (0, 1));
        assert_eq!(word_address(31, 8, false), (0, 1 << 31));
        assert_eq!(word_address(32, 8, false), (1, 1));
        assert_eq!(word_address(70, 8, false), (2, 1 << 6));
    }

    #[test]
    fn big_endian_swaps_halves_of_wide_words() {
        // Bits 0..32 of the first 64-bit word live in its second u32 half.
        assert_eq!(word_address(0, 8, true), (1, 1));
        assert_eq!(word_address(32, 8, true), (0, 1));
        assert_eq!(word_address(64, 8, true), (3, 1));
        assert_eq!(word_address(100, 8, true), (2, 1 << 4));
    }

    #[test]
    fn big_endian_with_narrow_words_is_linear() {
        assert_eq!(word_address(0, 4, true), (0, 1));
        assert_eq!(word_address(33, 4, true), (1, 1 << 1));
    }

    #[test]
    fn bitmask_matches_kernel_macros() {
        let mut set = BitmaskSet::new();
        for file_descriptor in [0, 1, 31, 32, 63, 64, 500, 1023] {
            set.add(file_descriptor);
            assert!(unsafe { libc::FD_ISSET(file_descriptor, set.as_raw()) });
        }

        let mut raw: fd_set = unsafe { mem::zeroed() };
        unsafe { libc::FD_SET(77, &mut raw) };
        let from_kernel = BitmaskSet { raw };
        assert!(from_kernel.contains(77));
        assert_eq!(from_kernel.len(), 1);
    }
}
