//! Compiling a script, language and feature selection into an ordered
//! lookup chain, and driving the engine over it.

use crate::{ChainError, GlyphId, Tag, REQUIRED_FEATURE};
use crate::bloom::Bloom;
use crate::buffer::GlyphBuffer;
use crate::cache::OffsetMap;
use crate::gsub;
use crate::layout::{
    Feature, LangSys, Lookup, LookupList, Script, ScriptList, SubstitutionTable,
};

const DEFAULT_SCRIPT: Tag = Tag::from_bytes(b"DFLT");
const DEFAULT_LANGUAGE: Tag = Tag::from_bytes(b"dflt");
const LATIN_SCRIPT: Tag = Tag::from_bytes(b"latn");

/// Builds substitution chains from a raw GSUB table.
///
/// The table bytes are borrowed and shared, read-only, by every chain
/// built from this builder.
#[derive(Clone, Copy)]
pub struct ChainBuilder<'a> {
    data: &'a [u8],
}

impl<'a> ChainBuilder<'a> {
    /// Creates a builder over raw GSUB table data.
    pub fn new(gsub_data: &'a [u8]) -> Self {
        ChainBuilder { data: gsub_data }
    }

    /// Builds a chain for the given selection.
    ///
    /// `script` and `language` default to the font's defaults when
    /// `None`. `features` lists the feature tags to enable, in any
    /// order; tags the font does not implement are ignored. Use
    /// [`REQUIRED_FEATURE`] to enable the script's required feature.
    ///
    /// An empty feature list is valid and produces a no-op chain.
    pub fn build(
        &self,
        script: Option<Tag>,
        language: Option<Tag>,
        features: &[Tag],
    ) -> Result<Chain<'a>, ChainError> {
        let table = SubstitutionTable::parse(self.data).ok_or(ChainError::MalformedTable)?;
        let script_table = resolve_script(&table.scripts, script)?;
        let lang_sys = resolve_lang_sys(&script_table, language)?;

        let mut enabled = vec![false; usize::from(table.lookups.len())];
        for &tag in features {
            if tag == REQUIRED_FEATURE {
                if let Some(index) = lang_sys.required_feature_index {
                    match table.features.get(index) {
                        Some((_, feature)) => enable_lookups(&feature, &mut enabled),
                        None => warn!("unable to obtain required feature #{}", index),
                    }
                }
                continue;
            }

            // The language system lists its features by index; the
            // first record with a matching tag wins.
            for feature_index in lang_sys.feature_indices {
                match table.features.get(feature_index) {
                    Some((feature_tag, feature)) => {
                        if feature_tag == tag {
                            enable_lookups(&feature, &mut enabled);
                            break;
                        }
                    }
                    None => warn!("unable to obtain feature #{}", feature_index),
                }
            }
        }

        // Lookups apply in LookupList order, not in feature order, and
        // each lookup at most once however many features named it.
        let mut lookups = Vec::new();
        for index in 0..table.lookups.len() {
            if !enabled[usize::from(index)] {
                continue;
            }
            match table.lookups.get(index) {
                Some(lookup) => lookups.push(lookup),
                None => warn!("unable to obtain lookup #{}", index),
            }
        }

        Ok(Chain {
            lookup_list: table.lookups,
            lookups,
            lookup_blooms: OffsetMap::new(),
            subtable_blooms: OffsetMap::new(),
        })
    }
}

impl core::fmt::Debug for ChainBuilder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "ChainBuilder()")
    }
}

fn enable_lookups(feature: &Feature, enabled: &mut [bool]) {
    for lookup_index in feature.lookup_indices {
        match enabled.get_mut(usize::from(lookup_index)) {
            Some(slot) => *slot = true,
            None => warn!("feature references missing lookup #{}", lookup_index),
        }
    }
}

fn resolve_script<'a>(scripts: &ScriptList<'a>, tag: Option<Tag>) -> Result<Script<'a>, ChainError> {
    let script = match tag {
        Some(tag) => scripts.get(tag),
        // The uppercase tag is the specified one, but fonts use both.
        // `latn` is the fallback of last resort.
        None => scripts
            .get(DEFAULT_SCRIPT)
            .or_else(|| scripts.get(DEFAULT_LANGUAGE))
            .or_else(|| scripts.get(LATIN_SCRIPT)),
    };

    script.ok_or(ChainError::ScriptNotFound)
}

fn resolve_lang_sys<'a>(script: &Script<'a>, tag: Option<Tag>) -> Result<LangSys<'a>, ChainError> {
    let wants_default = tag.map_or(true, |t| t == DEFAULT_SCRIPT || t == DEFAULT_LANGUAGE);
    if wants_default {
        if let Some(lang_sys) = script.default_lang_sys() {
            return Ok(lang_sys);
        }
    }

    match tag {
        // `dflt` and `DFLT` should never appear as language tags, but
        // some fonts use them anyway.
        None => script
            .lang_sys(DEFAULT_LANGUAGE)
            .or_else(|| script.lang_sys(DEFAULT_SCRIPT))
            .ok_or(ChainError::LanguageNotFound),
        Some(tag) => script.lang_sys(tag).ok_or(ChainError::LanguageNotFound),
    }
}

#[derive(Clone)]
struct LookupBlooms {
    aggregate: Bloom,
    subtables: Vec<Bloom>,
}

/// A prepared, ordered list of lookups for one script, language and
/// feature selection.
///
/// Built by [`ChainBuilder::build`]; applied with [`Chain::apply`].
pub struct Chain<'a> {
    lookup_list: LookupList<'a>,
    lookups: Vec<Lookup<'a>>,
    lookup_blooms: OffsetMap<LookupBlooms>,
    subtable_blooms: OffsetMap<Bloom>,
}

impl<'a> Chain<'a> {
    /// Returns the number of lookups the chain applies.
    #[inline]
    pub fn lookup_count(&self) -> usize {
        self.lookups.len()
    }

    /// Applies the chain to a glyph sequence, returning the rewritten
    /// sequence.
    ///
    /// Takes `&mut self` because digests are memoized on first use.
    /// Build one chain per thread to substitute in parallel; chains
    /// share the underlying table bytes.
    pub fn apply(&mut self, glyphs: &[GlyphId]) -> Vec<GlyphId> {
        let mut buffer = GlyphBuffer::from_glyphs(glyphs);
        self.apply_to(&mut buffer);
        buffer.into_vec()
    }

    /// Applies the chain to a buffer in place.
    pub fn apply_to(&mut self, buffer: &mut GlyphBuffer) {
        for i in 0..self.lookups.len() {
            let lookup = self.lookups[i];
            let blooms = self.blooms(&lookup);
            gsub::apply_lookup(
                &self.lookup_list,
                &lookup,
                blooms.aggregate,
                &blooms.subtables,
                buffer,
            );
        }
    }

    fn blooms(&mut self, lookup: &Lookup<'a>) -> LookupBlooms {
        if let Some(blooms) = self.lookup_blooms.get(lookup.cache_key()) {
            return blooms.clone();
        }

        let mut aggregate = Bloom::EMPTY;
        let mut subtables = Vec::new();
        for subtable in lookup.subtables {
            let key = subtable.as_ptr() as usize;
            let bloom = match self.subtable_blooms.get(key) {
                Some(&bloom) => bloom,
                None => {
                    let bloom = gsub::subtable_bloom(subtable, lookup.kind);
                    self.subtable_blooms.insert(key, bloom);
                    bloom
                }
            };
            aggregate = aggregate.union(bloom);
            subtables.push(bloom);
        }

        let blooms = LookupBlooms { aggregate, subtables };
        self.lookup_blooms.insert(lookup.cache_key(), blooms.clone());
        blooms
    }
}

impl core::fmt::Debug for Chain<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Chain({} lookups)", self.lookups.len())
    }
}

/// Returns the tag of the required feature for a script and language
/// selection, if the font declares one.
///
/// Useful for deciding where to place [`REQUIRED_FEATURE`] in the
/// feature list passed to [`ChainBuilder::build`].
pub fn required_feature(gsub_data: &[u8], script: Option<Tag>, language: Option<Tag>) -> Option<Tag> {
    let table = SubstitutionTable::parse(gsub_data)?;
    let script_table = resolve_script(&table.scripts, script).ok()?;
    let lang_sys = resolve_lang_sys(&script_table, language).ok()?;
    let index = lang_sys.required_feature_index?;
    table.features.get(index).map(|(tag, _)| tag)
}
