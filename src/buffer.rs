//! A growable glyph sequence with a cached set digest.

use crate::GlyphId;
use crate::bloom::Bloom;

/// An owned, growable sequence of glyph IDs.
///
/// This is the working buffer the substitution engine rewrites in place.
/// It keeps a lazily computed [`Bloom`] digest of its contents;
/// any mutation invalidates the digest.
#[derive(Clone)]
pub struct GlyphBuffer {
    glyphs: Vec<GlyphId>,
    bloom: Bloom,
    bloom_valid: bool,
}

impl GlyphBuffer {
    /// Creates an empty buffer.
    #[inline]
    pub fn new() -> Self {
        GlyphBuffer::with_capacity(0)
    }

    /// Creates an empty buffer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        GlyphBuffer {
            glyphs: Vec::with_capacity(capacity),
            bloom: Bloom::EMPTY,
            bloom_valid: true,
        }
    }

    /// Creates a buffer holding a copy of `glyphs`.
    pub fn from_glyphs(glyphs: &[GlyphId]) -> Self {
        let mut buffer = GlyphBuffer::with_capacity(glyphs.len());
        buffer.append(glyphs);
        buffer
    }

    /// Returns the number of glyphs.
    #[inline]
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Checks that the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Returns the glyph at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<GlyphId> {
        self.glyphs.get(index).copied()
    }

    /// Returns the contents as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[GlyphId] {
        &self.glyphs
    }

    /// Consumes the buffer, returning its contents.
    #[inline]
    pub fn into_vec(self) -> Vec<GlyphId> {
        self.glyphs
    }

    // Reserves up to 1.3x the requested length, so that repeated
    // one-glyph growth stays amortized.
    fn grow_to(&mut self, new_len: usize) {
        if new_len > self.glyphs.capacity() {
            let target = new_len + new_len / 3;
            self.glyphs.reserve_exact(target - self.glyphs.len());
        }
    }

    /// Replaces the glyph at `index`.
    ///
    /// `index` must be `< len`.
    pub(crate) fn replace(&mut self, index: usize, glyph: GlyphId) {
        debug_assert!(index < self.glyphs.len());
        self.bloom_valid = false;
        self.glyphs[index] = glyph;
    }

    /// Writes `glyphs` starting at `index`, growing the buffer when the
    /// write extends past the current length.
    ///
    /// `index` must be `<= len`.
    pub(crate) fn write_at(&mut self, index: usize, glyphs: &[GlyphId]) {
        debug_assert!(index <= self.glyphs.len());
        self.bloom_valid = false;
        let end = index + glyphs.len();
        if end > self.glyphs.len() {
            self.grow_to(end);
            self.glyphs.resize(end, GlyphId(0));
        }
        self.glyphs[index..end].copy_from_slice(glyphs);
    }

    /// Appends `glyphs` at the end.
    pub(crate) fn append(&mut self, glyphs: &[GlyphId]) {
        self.write_at(self.glyphs.len(), glyphs);
    }

    /// Moves the tail `[src..len]` so that it starts at `dst`,
    /// growing or shrinking the buffer accordingly.
    ///
    /// The two regions may overlap. `src` must be `<= len`.
    pub(crate) fn move_tail(&mut self, src: usize, dst: usize) {
        debug_assert!(src <= self.glyphs.len());
        self.bloom_valid = false;
        let len = self.glyphs.len();
        let new_len = dst + (len - src);
        if new_len > len {
            self.grow_to(new_len);
            self.glyphs.resize(new_len, GlyphId(0));
            self.glyphs.copy_within(src..len, dst);
        } else {
            self.glyphs.copy_within(src..len, dst);
            self.glyphs.truncate(new_len);
        }
    }

    /// Shortens the buffer by `count` glyphs.
    ///
    /// `count` must be `<= len`.
    pub(crate) fn shrink(&mut self, count: usize) {
        debug_assert!(count <= self.glyphs.len());
        self.bloom_valid = false;
        let new_len = self.glyphs.len() - count;
        self.glyphs.truncate(new_len);
    }

    /// Returns the digest of the buffer's contents, computing it on
    /// first use after a mutation.
    pub fn bloom(&mut self) -> Bloom {
        if !self.bloom_valid {
            let mut bloom = Bloom::EMPTY;
            for &glyph in &self.glyphs {
                bloom = bloom.with_glyph(glyph);
                // Nothing left to learn once every probe succeeds.
                if bloom.is_full() {
                    break;
                }
            }
            self.bloom = bloom;
            self.bloom_valid = true;
        }

        self.bloom
    }
}

impl Default for GlyphBuffer {
    fn default() -> Self {
        GlyphBuffer::new()
    }
}

impl PartialEq for GlyphBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.glyphs == other.glyphs
    }
}

impl Eq for GlyphBuffer {}

impl core::fmt::Debug for GlyphBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_list().entries(self.glyphs.iter().map(|g| g.0)).finish()
    }
}
