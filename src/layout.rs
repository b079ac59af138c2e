//! Navigation over the GSUB layout forest: scripts, language systems,
//! features, lookups, coverage and glyph classes.
//!
//! Every type here is a cheap view into the table bytes; nothing is
//! decoded ahead of time.

use crate::{GlyphId, Tag};
use crate::bloom::Bloom;
use crate::parser::*;

/// A tag plus a 16-bit offset, as used by script, language-system and
/// feature records.
#[derive(Clone, Copy, Debug)]
pub struct TagRecord {
    pub tag: Tag,
    pub offset: Offset16,
}

impl FromData for TagRecord {
    const SIZE: usize = 6;

    #[inline]
    fn parse(data: &[u8]) -> Self {
        let mut s = SafeStream::new(data);
        TagRecord {
            tag: s.read(),
            offset: s.read(),
        }
    }
}


/// The GSUB table header with its three list tables resolved.
#[derive(Clone, Copy)]
pub struct SubstitutionTable<'a> {
    pub scripts: ScriptList<'a>,
    pub features: FeatureList<'a>,
    pub lookups: LookupList<'a>,
}

impl<'a> SubstitutionTable<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        let version: u32 = s.read()?;
        // Minor version 1 only appends a feature-variations offset,
        // which we do not use.
        if !(version == 0x00010000 || version == 0x00010001) {
            return None;
        }

        let script_list_offset: Offset16 = s.read()?;
        let feature_list_offset: Offset16 = s.read()?;
        let lookup_list_offset: Offset16 = s.read()?;

        Some(SubstitutionTable {
            scripts: ScriptList::parse(data.get(script_list_offset.to_usize()..)?)?,
            features: FeatureList::parse(data.get(feature_list_offset.to_usize()..)?)?,
            lookups: LookupList::parse(data.get(lookup_list_offset.to_usize()..)?)?,
        })
    }
}


#[derive(Clone, Copy)]
pub struct ScriptList<'a> {
    data: &'a [u8], // From the beginning of the ScriptList.
    records: LazyArray16<'a, TagRecord>,
}

impl<'a> ScriptList<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let records = Stream::new(data).read_array16()?;
        Some(ScriptList { data, records })
    }

    pub fn get(&self, tag: Tag) -> Option<Script<'a>> {
        let record = self.records.into_iter().find(|r| r.tag == tag)?;
        Script::parse(self.data.get(record.offset.to_usize()..)?)
    }
}


#[derive(Clone, Copy)]
pub struct Script<'a> {
    data: &'a [u8], // From the beginning of the ScriptTable.
    default_lang_sys_offset: Option<Offset16>,
    records: LazyArray16<'a, TagRecord>,
}

impl<'a> Script<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        let default_lang_sys_offset: Option<Offset16> = s.read()?;
        let records = s.read_array16()?;
        Some(Script {
            data,
            default_lang_sys_offset,
            records,
        })
    }

    pub fn default_lang_sys(&self) -> Option<LangSys<'a>> {
        let data = self.data.get(self.default_lang_sys_offset?.to_usize()..)?;
        LangSys::parse(data)
    }

    pub fn lang_sys(&self, tag: Tag) -> Option<LangSys<'a>> {
        let record = self.records.into_iter().find(|r| r.tag == tag)?;
        LangSys::parse(self.data.get(record.offset.to_usize()..)?)
    }
}


#[derive(Clone, Copy)]
pub struct LangSys<'a> {
    pub required_feature_index: Option<u16>,
    pub feature_indices: LazyArray16<'a, u16>,
}

impl<'a> LangSys<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        s.skip::<u16>(); // lookupOrder (reserved)

        let required_feature_index = match s.read::<u16>()? {
            0xFFFF => None, // no required feature
            n => Some(n),
        };

        Some(LangSys {
            required_feature_index,
            feature_indices: s.read_array16()?,
        })
    }
}


#[derive(Clone, Copy)]
pub struct FeatureList<'a> {
    data: &'a [u8], // From the beginning of the FeatureList.
    records: LazyArray16<'a, TagRecord>,
}

impl<'a> FeatureList<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let records = Stream::new(data).read_array16()?;
        Some(FeatureList { data, records })
    }

    pub fn get(&self, index: u16) -> Option<(Tag, Feature<'a>)> {
        let record = self.records.get(index)?;
        let data = self.data.get(record.offset.to_usize()..)?;
        let mut s = Stream::new(data);
        s.skip::<Offset16>(); // featureParams
        Some((record.tag, Feature { lookup_indices: s.read_array16()? }))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Feature<'a> {
    pub lookup_indices: LazyArray16<'a, u16>,
}


#[derive(Clone, Copy)]
pub struct LookupList<'a> {
    data: &'a [u8], // From the beginning of the LookupList.
    offsets: LazyArray16<'a, Offset16>,
}

impl<'a> LookupList<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        let offsets = Stream::new(data).read_array16()?;
        Some(LookupList { data, offsets })
    }

    #[inline]
    pub fn len(&self) -> u16 {
        self.offsets.len()
    }

    pub fn get(&self, index: u16) -> Option<Lookup<'a>> {
        let offset = self.offsets.get(index)?;
        Lookup::parse(self.data.get(offset.to_usize()..)?)
    }
}


#[derive(Clone, Copy)]
pub struct Lookup<'a> {
    pub kind: u16,
    pub subtables: Offsets16<'a>,
    data: &'a [u8], // From the beginning of the LookupTable.
}

impl<'a> Lookup<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let mut s = Stream::new(data);
        let kind: u16 = s.read()?;
        s.skip::<u16>(); // lookupFlag
        let subtables = s.read_offsets16(data)?;
        Some(Lookup { kind, subtables, data })
    }

    /// A memoization key, unique per lookup for the table's lifetime.
    #[inline]
    pub fn cache_key(&self) -> usize {
        self.data.as_ptr() as usize
    }
}


#[derive(Clone, Copy, Debug)]
struct RangeRecord {
    start: GlyphId,
    end: GlyphId,
    start_coverage_index: u16,
}

impl FromData for RangeRecord {
    const SIZE: usize = 6;

    #[inline]
    fn parse(data: &[u8]) -> Self {
        let mut s = SafeStream::new(data);
        RangeRecord {
            start: s.read(),
            end: s.read(),
            start_coverage_index: s.read(),
        }
    }
}


/// A [Coverage Table](https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table).
#[derive(Clone, Copy, Debug)]
pub struct Coverage<'a> {
    data: &'a [u8],
}

impl<'a> Coverage<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Coverage { data }
    }

    /// Returns the coverage index of `glyph`, if covered.
    pub fn index_of(&self, glyph: GlyphId) -> Option<u16> {
        let mut s = Stream::new(self.data);
        let format: u16 = s.read()?;
        match format {
            1 => {
                let glyphs = s.read_array16::<GlyphId>()?;
                glyphs.binary_search(&glyph).map(|(index, _)| index)
            }
            2 => {
                let records = s.read_array16::<RangeRecord>()?;
                records.into_iter()
                    .find(|r| r.start <= glyph && glyph <= r.end)
                    .map(|r| r.start_coverage_index.wrapping_add(glyph.0 - r.start.0))
            }
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, glyph: GlyphId) -> bool {
        self.index_of(glyph).is_some()
    }

    /// Returns a digest covering at least every covered glyph.
    ///
    /// Malformed tables produce the universal digest, which only costs
    /// performance.
    pub fn bloom(&self) -> Bloom {
        let mut s = Stream::new(self.data);
        let format: u16 = try_opt_or!(s.read(), Bloom::FULL);
        match format {
            1 => {
                let glyphs = try_opt_or!(s.read_array16::<GlyphId>(), Bloom::FULL);
                let mut bloom = Bloom::EMPTY;
                for glyph in glyphs {
                    bloom = bloom.with_glyph(glyph);
                    if bloom.is_full() {
                        break;
                    }
                }
                bloom
            }
            2 => {
                let records = try_opt_or!(s.read_array16::<RangeRecord>(), Bloom::FULL);
                let mut bloom = Bloom::EMPTY;
                for record in records {
                    if record.start > record.end {
                        return Bloom::FULL;
                    }
                    bloom = bloom.union(Bloom::of_range(record.start, record.end));
                    if bloom.is_full() {
                        break;
                    }
                }
                bloom
            }
            _ => {
                warn!("unknown coverage format {}", format);
                Bloom::FULL
            }
        }
    }
}


#[derive(Clone, Copy, Debug)]
struct ClassRangeRecord {
    start: GlyphId,
    end: GlyphId,
    class: u16,
}

impl FromData for ClassRangeRecord {
    const SIZE: usize = 6;

    #[inline]
    fn parse(data: &[u8]) -> Self {
        let mut s = SafeStream::new(data);
        ClassRangeRecord {
            start: s.read(),
            end: s.read(),
            class: s.read(),
        }
    }
}


/// A [Class Definition Table](https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#class-definition-table).
#[derive(Clone, Copy, Debug)]
pub struct ClassDef<'a> {
    data: &'a [u8],
}

impl<'a> ClassDef<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        ClassDef { data }
    }

    /// Any glyph not covered by the table belongs to class 0.
    pub fn get(&self, glyph: GlyphId) -> u16 {
        self.get_impl(glyph).unwrap_or(0)
    }

    fn get_impl(&self, glyph: GlyphId) -> Option<u16> {
        let mut s = Stream::new(self.data);
        let format: u16 = s.read()?;
        match format {
            1 => {
                let start: GlyphId = s.read()?;

                // Prevent underflow.
                if glyph < start {
                    return None;
                }

                let classes = s.read_array16::<u16>()?;
                classes.get(glyph.0 - start.0)
            }
            2 => {
                let records = s.read_array16::<ClassRangeRecord>()?;
                records.into_iter()
                    .find(|r| r.start <= glyph && glyph <= r.end)
                    .map(|r| r.class)
            }
            _ => None,
        }
    }
}
