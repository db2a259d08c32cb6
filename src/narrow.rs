//! Grow-only buffers indexed by the narrowest unsigned integer type that
//! fits a given bound, used for the presort index (width fits `n_samples`)
//! and the sample-status vector (width fits the largest possible layer
//! node-count). An enum over the four unsigned widths keeps call sites
//! working in plain `usize` while the backing storage stays as small as the
//! spec requires.

/// A column of unsigned integers stored at the narrowest width that fits the
/// values it holds.
#[derive(Debug, Clone)]
pub enum NarrowColumn {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

fn width_for(max_value: usize) -> &'static str {
    if max_value <= u8::MAX as usize {
        "u8"
    } else if max_value <= u16::MAX as usize {
        "u16"
    } else if max_value <= u32::MAX as usize {
        "u32"
    } else {
        "u64"
    }
}

impl NarrowColumn {
    /// Allocate a zero-filled column wide enough to hold values up to
    /// `max_value` (inclusive), with `len` elements.
    pub fn zeroed(len: usize, max_value: usize) -> Self {
        match width_for(max_value) {
            "u8" => NarrowColumn::U8(vec![0u8; len]),
            "u16" => NarrowColumn::U16(vec![0u16; len]),
            "u32" => NarrowColumn::U32(vec![0u32; len]),
            _ => NarrowColumn::U64(vec![0u64; len]),
        }
    }

    /// Build a column from a `usize` sequence, picking the narrowest width
    /// that fits the maximum element (or 0 if empty).
    pub fn from_usize_iter(values: impl ExactSizeIterator<Item = usize> + Clone) -> Self {
        let max_value = values.clone().max().unwrap_or(0);
        match width_for(max_value) {
            "u8" => NarrowColumn::U8(values.map(|v| v as u8).collect()),
            "u16" => NarrowColumn::U16(values.map(|v| v as u16).collect()),
            "u32" => NarrowColumn::U32(values.map(|v| v as u32).collect()),
            _ => NarrowColumn::U64(values.map(|v| v as u64).collect()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            NarrowColumn::U8(v) => v.len(),
            NarrowColumn::U16(v) => v.len(),
            NarrowColumn::U32(v) => v.len(),
            NarrowColumn::U64(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> usize {
        match self {
            NarrowColumn::U8(v) => v[i] as usize,
            NarrowColumn::U16(v) => v[i] as usize,
            NarrowColumn::U32(v) => v[i] as usize,
            NarrowColumn::U64(v) => v[i] as usize,
        }
    }

    #[inline]
    pub fn set(&mut self, i: usize, value: usize) {
        match self {
            NarrowColumn::U8(v) => v[i] = value as u8,
            NarrowColumn::U16(v) => v[i] = value as u16,
            NarrowColumn::U32(v) => v[i] = value as u32,
            NarrowColumn::U64(v) => v[i] = value as u64,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}
