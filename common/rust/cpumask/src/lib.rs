//! CPU affinity masks.
//!
//! The kernel speaks about a set of CPU cores in three ways:
//!
//! - a core list, like `[10, 30]` or `"10,30"`, `"0-3,8"`;
//! - a bitmap string of exactly `N` characters where the leftmost one stands
//!   for the highest-numbered core and the rightmost one for core 0;
//! - a hex mask, the same bitmap written in base 16, zero-padded to `N / 4`
//!   digits and grouped as `"40,00000002"`.
//!
//! This crate contains [`CpuMask`], an arbitrary-width bitmask, and the
//! conversions between these representations. `N` is the total number of
//! cores on the machine and must be passed to every operation that pads.

use core::{
    fmt::{self, Display, Formatter},
    ops::ControlFlow,
};

use thiserror::Error;

const WORD_BITS: usize = u64::BITS as usize;
const NIBBLE_BITS: usize = 4;

/// Number of leading hex digits that form the first group of a hex mask.
const HEAD_GROUP_DIGITS: usize = 2;

/// Upper bound of core indices accepted in a core list, the kernel's
/// largest `NR_CPUS`.
pub const MAX_CORES: usize = 8192;

/// Mask or bitmap string does not belong to the expected alphabet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("empty mask")]
    Empty,
    #[error("invalid hex digit {digit:?} in mask {mask:?}")]
    InvalidHexDigit { mask: String, digit: char },
    #[error("invalid character {ch:?} in bitmap {bitmap:?}")]
    InvalidBitmapChar { bitmap: String, ch: char },
    #[error("invalid core list {list:?}")]
    InvalidList { list: String },
}

/// Set of CPU cores.
///
/// Bit `i` of the mask stands for core `i`. The mask grows on demand, so it
/// is able to hold any kernel mask regardless of the machine width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CpuMask {
    // Little-endian words, without trailing zero words.
    words: Vec<u64>,
}

impl CpuMask {
    /// Constructs an empty mask.
    #[inline]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Constructs a mask from the given cores.
    ///
    /// Only cores below `core_count` are considered, the rest are silently
    /// ignored.
    pub fn from_cores<I>(cores: I, core_count: usize) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut mask = Self::new();
        for core in cores {
            if core < core_count {
                mask.insert(core);
            }
        }

        mask
    }

    /// Parses a hex mask.
    ///
    /// Commas are group separators and are skipped. Every other character
    /// must be a hex digit.
    pub fn from_hex(hex: &str) -> Result<Self, FormatError> {
        let mut mask = Self::new();
        let mut digits = 0;

        for (pos, ch) in hex.chars().filter(|&ch| ch != ',').rev().enumerate() {
            let nibble = ch.to_digit(16).ok_or_else(|| FormatError::InvalidHexDigit {
                mask: hex.to_owned(),
                digit: ch,
            })?;

            if nibble != 0 {
                let bit = pos * NIBBLE_BITS;
                *mask.word_mut(bit / WORD_BITS) |= (nibble as u64) << (bit % WORD_BITS);
            }
            digits += 1;
        }

        if digits == 0 {
            return Err(FormatError::Empty);
        }

        Ok(mask)
    }

    /// Parses a bitmap string, rightmost character being core 0.
    pub fn from_bitmap(bitmap: &str) -> Result<Self, FormatError> {
        let mut mask = Self::new();

        for (core, ch) in bitmap.chars().rev().enumerate() {
            match ch {
                '1' => mask.insert(core),
                '0' => {}
                ch => {
                    return Err(FormatError::InvalidBitmapChar {
                        bitmap: bitmap.to_owned(),
                        ch,
                    });
                }
            }
        }

        Ok(mask)
    }

    /// Adds a core into the mask.
    #[inline]
    pub fn insert(&mut self, core: usize) {
        *self.word_mut(core / WORD_BITS) |= 1 << (core % WORD_BITS);
    }

    /// Checks whether the given core is in the mask.
    #[inline]
    pub fn contains(&self, core: usize) -> bool {
        match self.words.get(core / WORD_BITS) {
            Some(word) => word & (1 << (core % WORD_BITS)) != 0,
            None => false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the number of cores in the mask.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns the number of significant bits, i.e. the highest core plus one.
    pub fn bit_len(&self) -> usize {
        match self.words.last() {
            Some(word) => (self.words.len() - 1) * WORD_BITS + (WORD_BITS - word.leading_zeros() as usize),
            None => 0,
        }
    }

    /// Returns cores in the mask in ascending order.
    pub fn cores(&self) -> Vec<usize> {
        let mut cores = Vec::with_capacity(self.len());
        let _: ControlFlow<()> = self.traverse(|core| {
            cores.push(core);
            ControlFlow::Continue(())
        });

        cores
    }

    /// Traverses all cores in the mask in ascending order and calls the given
    /// function for each of them.
    ///
    /// Returns [`ControlFlow::Break`] immediately if the provided function
    /// returns [`ControlFlow::Break`].
    pub fn traverse<F, B>(&self, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(usize) -> ControlFlow<B>,
    {
        for (idx, &word) in self.words.iter().enumerate() {
            let base = idx * WORD_BITS;
            traverse_bits(word, |bit| f(base + bit))?;
        }

        ControlFlow::Continue(())
    }

    /// Renders the mask as a bitmap string of `core_count` characters.
    ///
    /// The string is never truncated: a mask that carries cores at or above
    /// `core_count` produces a longer bitmap.
    pub fn to_bitmap(&self, core_count: usize) -> String {
        let width = core_count.max(self.bit_len());

        (0..width)
            .rev()
            .map(|core| if self.contains(core) { '1' } else { '0' })
            .collect()
    }

    /// Renders the mask as a grouped hex mask for a machine with `core_count`
    /// cores.
    ///
    /// The mask is zero-padded to `ceil(core_count / 4)` digits, then a comma
    /// is placed after the first two digits.
    pub fn to_hex(&self, core_count: usize) -> String {
        let width = core_count
            .div_ceil(NIBBLE_BITS)
            .max(self.bit_len().div_ceil(NIBBLE_BITS));

        let mut hex = String::with_capacity(width + 1);
        for pos in (0..width).rev() {
            if hex.len() == HEAD_GROUP_DIGITS && width > HEAD_GROUP_DIGITS {
                hex.push(',');
            }

            let nibble = self.nibble(pos);
            hex.push(char::from_digit(nibble, 16).unwrap_or('0'));
        }

        hex
    }

    fn nibble(&self, pos: usize) -> u32 {
        let bit = pos * NIBBLE_BITS;
        match self.words.get(bit / WORD_BITS) {
            Some(word) => ((word >> (bit % WORD_BITS)) & 0xf) as u32,
            None => 0,
        }
    }

    // Callers only OR non-zero bits in, so a freshly grown word never stays
    // zero.
    fn word_mut(&mut self, idx: usize) -> &mut u64 {
        if self.words.len() <= idx {
            self.words.resize(idx + 1, 0);
        }

        &mut self.words[idx]
    }
}

impl From<u64> for CpuMask {
    fn from(word: u64) -> Self {
        let words = if word == 0 { Vec::new() } else { vec![word] };
        Self { words }
    }
}

impl FromIterator<usize> for CpuMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::new();
        for core in iter {
            mask.insert(core);
        }

        mask
    }
}

impl Display for CpuMask {
    /// Formats the mask as a kernel core list, e.g. `0-3,8`.
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for core in self.cores() {
            match ranges.last_mut() {
                Some((_, hi)) if *hi + 1 == core => *hi = core,
                _ => ranges.push((core, core)),
            }
        }

        for (idx, (lo, hi)) in ranges.into_iter().enumerate() {
            if idx > 0 {
                write!(fmt, ",")?;
            }
            if lo == hi {
                write!(fmt, "{lo}")?;
            } else {
                write!(fmt, "{lo}-{hi}")?;
            }
        }

        Ok(())
    }
}

/// Traverses all bits in the given word and calls the given function for each
/// bit.
///
/// Iteration is performed from the least significant bit to the most
/// significant one.
#[inline]
pub fn traverse_bits<F, B>(mut word: u64, mut f: F) -> ControlFlow<B>
where
    F: FnMut(usize) -> ControlFlow<B>,
{
    while word > 0 {
        let r = word.trailing_zeros() as usize;
        // Clears the lowest set bit, compiles into a single `blsr`.
        word &= word - 1;

        f(r)?;
    }

    ControlFlow::Continue(())
}

/// Renders the given cores as a bitmap string of `core_count` characters.
///
/// Cores at or above `core_count` are ignored.
pub fn cores_to_bitmap(cores: &[usize], core_count: usize) -> String {
    CpuMask::from_cores(cores.iter().copied(), core_count).to_bitmap(core_count)
}

/// Converts a bitmap string into a grouped hex mask.
///
/// The bitmap length is the core count.
pub fn bitmap_to_hex(bitmap: &str) -> Result<String, FormatError> {
    let mask = CpuMask::from_bitmap(bitmap)?;
    Ok(mask.to_hex(bitmap.chars().count()))
}

/// Converts the given cores into a grouped hex mask.
pub fn cores_to_hex(cores: &[usize], core_count: usize) -> String {
    CpuMask::from_cores(cores.iter().copied(), core_count).to_hex(core_count)
}

/// Parses a hex mask into its numeric value.
pub fn hex_to_value(hex: &str) -> Result<CpuMask, FormatError> {
    CpuMask::from_hex(hex)
}

/// Renders a numeric mask value as a zero-padded bitmap string.
pub fn value_to_bitmap(value: &CpuMask, core_count: usize) -> String {
    value.to_bitmap(core_count)
}

/// Decodes a bitmap string into an ascending core list.
pub fn bitmap_to_cores(bitmap: &str) -> Result<Vec<usize>, FormatError> {
    Ok(CpuMask::from_bitmap(bitmap)?.cores())
}

/// Decodes a hex mask into an ascending core list.
pub fn hex_to_cores(hex: &str, core_count: usize) -> Result<Vec<usize>, FormatError> {
    let value = hex_to_value(hex)?;
    let bitmap = value_to_bitmap(&value, core_count);
    bitmap_to_cores(&bitmap)
}

/// Parses the kernel core list format: `"3"`, `"0,6"`, `"0-2,6-8"`.
///
/// The result is sorted and deduplicated. An empty string is an empty list.
/// Cores at or above [`MAX_CORES`] are rejected.
pub fn parse_list(list: &str) -> Result<Vec<usize>, FormatError> {
    let err = || FormatError::InvalidList { list: list.to_owned() };
    let parse_core = |v: &str| match v.trim().parse::<usize>() {
        Ok(core) if core < MAX_CORES => Ok(core),
        _ => Err(err()),
    };

    let mut mask = CpuMask::new();
    for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_core(lo)?, parse_core(hi)?);
                if lo > hi {
                    return Err(err());
                }
                (lo..=hi).for_each(|core| mask.insert(core));
            }
            None => mask.insert(parse_core(part)?),
        }
    }

    Ok(mask.cores())
}
