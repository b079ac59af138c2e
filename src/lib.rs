/*!
A library for applying OpenType GSUB substitutions to glyph sequences.

Given a font's raw [GSUB](https://docs.microsoft.com/en-us/typography/opentype/spec/gsub)
table and a glyph sequence produced by an upstream character-to-glyph
mapper, this crate rewrites the sequence according to a selected
script, language and list of typographic features: ligatures (`liga`,
`calt`), fractions (`frac`), stylistic sets (`ss01`–`ss20`) and so on.

It is not a shaper: there is no bidi, no positioning (GPOS) and no
cluster tracking. It is the right tool when glyphs map 1:1 to
characters up front and only substitution is wanted, e.g. for
monospaced programming fonts.

## Usage

```no_run
use gsub_engine::{ChainBuilder, GlyphId, Tag};

let gsub_data = Vec::new(); // table bytes from your font loader
let builder = ChainBuilder::new(&gsub_data);
let mut chain = builder.build(None, None, &[Tag::from_bytes(b"calt")])?;
let output = chain.apply(&[GlyphId(29), GlyphId(29)]);
# Ok::<(), gsub_engine::ChainError>(())
```

## Supported lookups

- Single, multiple, ligature and reverse-chaining-single substitution.
- Contextual and chained-contextual substitution, all three formats,
  including nested lookups.
- Extension subtables.
- Alternate substitution is deliberately a no-op: picking an alternate
  is a user decision, which a batch transformer cannot make.

Lookup flags (and mark filtering sets) are ignored.

## Performance

Each lookup and subtable carries a lazily computed three-lane
[`Bloom`] digest of the glyphs that can trigger it; sequences carry a
digest of their contents. Lookups whose digest is disjoint from the
sequence's are skipped without touching the sequence.

## Error handling

Chain construction validates the table header and the script and
language selection, reported via [`ChainError`]. Past that point the
engine never fails: malformed subtables are skipped (with a warning
via the `log` crate when the default `logging` feature is enabled)
and the sequence passes through unchanged.

## Safety

- The library must not panic. Any panic is considered a bug.
- The library forbids unsafe code.
- A [`Chain`] is not usable from multiple threads at once; build one
  chain per thread. Chains share the table bytes.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(missing_copy_implementations)]
#![warn(missing_debug_implementations)]

macro_rules! try_opt_or {
    ($value:expr, $ret:expr) => {
        match $value {
            Some(v) => v,
            None => return $ret,
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! warn {
    ($($arg:tt)+) => (
        log::log!(log::Level::Warn, $($arg)+)
    )
}

#[cfg(not(feature = "logging"))]
macro_rules! warn {
    ($($arg:tt)+) => () // do nothing
}

mod bloom;
mod buffer;
mod cache;
mod chain;
mod gsub;
mod layout;
mod parser;

pub use bloom::Bloom;
pub use buffer::GlyphBuffer;
pub use chain::{required_feature, Chain, ChainBuilder};

use parser::{FromData, SafeStream};


/// A type-safe wrapper for glyph ID.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Default)]
pub struct GlyphId(pub u16);

impl FromData for GlyphId {
    #[inline]
    fn parse(data: &[u8]) -> Self {
        let mut s = SafeStream::new(data);
        GlyphId(s.read())
    }
}


/// A four-byte tag, comparable byte-wise.
///
/// Identifies scripts (`latn`), languages (`ENG `) and features
/// (`calt`, `liga`) throughout OpenType.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq)]
pub struct Tag(pub u32);

impl Tag {
    /// Creates a `Tag` from its bytes.
    #[inline]
    pub const fn from_bytes(bytes: &[u8; 4]) -> Self {
        Tag(((bytes[0] as u32) << 24)
            | ((bytes[1] as u32) << 16)
            | ((bytes[2] as u32) << 8)
            | (bytes[3] as u32))
    }

    /// Returns the tag's bytes.
    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        [
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ]
    }
}

impl FromData for Tag {
    #[inline]
    fn parse(data: &[u8]) -> Self {
        Tag(u32::parse(data))
    }
}

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let bytes = self.to_bytes();
        for &byte in &bytes {
            if byte.is_ascii() && !byte.is_ascii_control() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\{:02x}", byte)?;
            }
        }

        Ok(())
    }
}

impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Tag({})", self)
    }
}


/// The feature tag that selects the script's required feature.
///
/// Fonts can declare one feature as required for a script and
/// language; it has an index but no tag of its own. Put this
/// placeholder in the feature list where the required feature should
/// be enabled. [`required_feature`] reports the underlying tag.
pub const REQUIRED_FEATURE: Tag = Tag::from_bytes(b" RQD");


/// A chain construction failure.
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ChainError {
    /// The table is truncated or structurally invalid.
    #[error("malformed GSUB table")]
    MalformedTable,
    /// The requested script is absent, and so is every fallback.
    #[error("script not found")]
    ScriptNotFound,
    /// The requested language system is absent.
    #[error("language system not found")]
    LanguageNotFound,
}
