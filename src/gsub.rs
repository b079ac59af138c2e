//! The substitution engine: applies a lookup to a glyph buffer,
//! rewriting it in place.

use crate::GlyphId;
use crate::bloom::Bloom;
use crate::buffer::GlyphBuffer;
use crate::layout::{ClassDef, Coverage, Lookup, LookupList};
use crate::parser::*;

pub const SINGLE: u16 = 1;
pub const MULTIPLE: u16 = 2;
pub const ALTERNATE: u16 = 3;
pub const LIGATURE: u16 = 4;
pub const CONTEXT: u16 = 5;
pub const CHAINED_CONTEXT: u16 = 6;
pub const EXTENSION: u16 = 7;
pub const REVERSE_CHAIN_SINGLE: u16 = 8;

// Matches HarfBuzz's nesting limit. Real fonts stay in single digits.
const MAX_NESTING_LEVEL: u8 = 64;

#[derive(Clone, Copy, Debug)]
struct SequenceLookupRecord {
    sequence_index: u16,
    lookup_list_index: u16,
}

impl FromData for SequenceLookupRecord {
    const SIZE: usize = 4;

    #[inline]
    fn parse(data: &[u8]) -> Self {
        let mut s = SafeStream::new(data);
        SequenceLookupRecord {
            sequence_index: s.read(),
            lookup_list_index: s.read(),
        }
    }
}

#[inline]
fn read_coverage<'a>(base: &'a [u8], offset: Offset16) -> Option<Coverage<'a>> {
    Some(Coverage::new(base.get(offset.to_usize()..)?))
}

// Extension lookups behave as the type they wrap, including the
// walk direction of reverse-chaining subtables.
fn effective_kind(lookup: &Lookup) -> u16 {
    if lookup.kind != EXTENSION {
        return lookup.kind;
    }

    for subtable in lookup.subtables {
        let mut s = Stream::new(subtable);
        s.skip::<u16>(); // substFormat
        if let Some(kind) = s.read::<u16>() {
            return kind;
        }
    }

    lookup.kind
}

/// Applies `lookup` across the whole buffer.
///
/// `aggregate` and `subtable_blooms` are the memoized digests of the
/// lookup and of each of its subtables, in subtable order.
pub fn apply_lookup(
    lookups: &LookupList,
    lookup: &Lookup,
    aggregate: Bloom,
    subtable_blooms: &[Bloom],
    buffer: &mut GlyphBuffer,
) {
    // Cheapest exit: no glyph of the buffer can start any subtable.
    if !aggregate.may_intersect(buffer.bloom()) {
        return;
    }

    if effective_kind(lookup) == REVERSE_CHAIN_SINGLE {
        let mut index = buffer.len();
        while index > 0 {
            index -= 1;
            if let Some(glyph) = buffer.get(index) {
                if aggregate.contains(Bloom::of_glyph(glyph)) {
                    apply_at(lookups, lookup, Some(subtable_blooms), buffer, index, 0);
                }
            }
        }
    } else {
        let mut index = 0;
        while index < buffer.len() {
            let glyph = match buffer.get(index) {
                Some(glyph) => glyph,
                None => break,
            };

            if aggregate.contains(Bloom::of_glyph(glyph)) {
                if let Some(next) = apply_at(lookups, lookup, Some(subtable_blooms), buffer, index, 0) {
                    index = next;
                    continue;
                }
            }

            index += 1;
        }
    }
}

/// Tries the lookup's subtables at a single position.
///
/// Returns the next position to examine when a subtable applied.
/// Only the first applicable subtable fires.
///
/// `subtable_blooms` is `None` for nested invocations, which skip the
/// per-subtable filter.
pub fn apply_at(
    lookups: &LookupList,
    lookup: &Lookup,
    subtable_blooms: Option<&[Bloom]>,
    buffer: &mut GlyphBuffer,
    index: usize,
    depth: u8,
) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let glyph_bloom = Bloom::of_glyph(glyph);

    // Both iterations skip NULL offsets, so the indexes line up with
    // the memoized digest array.
    for (i, subtable) in lookup.subtables.into_iter().enumerate() {
        if let Some(blooms) = subtable_blooms {
            if let Some(bloom) = blooms.get(i) {
                if !bloom.contains(glyph_bloom) {
                    continue;
                }
            }
        }

        if let Some(next) = apply_subtable(lookups, subtable, lookup.kind, buffer, index, depth) {
            return Some(next);
        }
    }

    None
}

fn apply_subtable(
    lookups: &LookupList,
    data: &[u8],
    kind: u16,
    buffer: &mut GlyphBuffer,
    index: usize,
    depth: u8,
) -> Option<usize> {
    match kind {
        SINGLE => apply_single(data, buffer, index),
        MULTIPLE => apply_multiple(data, buffer, index),
        // User selection among alternates is meaningless in a batch
        // transformer, so alternate subtables never apply.
        ALTERNATE => None,
        LIGATURE => apply_ligature(data, buffer, index),
        CONTEXT => apply_context(lookups, data, buffer, index, depth),
        CHAINED_CONTEXT => apply_chained_context(lookups, data, buffer, index, depth),
        EXTENSION => apply_extension(lookups, data, buffer, index, depth),
        REVERSE_CHAIN_SINGLE => apply_reverse_chain(data, buffer, index),
        _ => None,
    }
}

fn apply_single(data: &[u8], buffer: &mut GlyphBuffer, index: usize) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    let coverage_offset: Offset16 = s.read()?;
    let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;

    match format {
        1 => {
            let delta: i16 = s.read()?;
            buffer.replace(index, GlyphId(glyph.0.wrapping_add(delta as u16)));
            Some(index + 1)
        }
        2 => {
            let substitutes = s.read_array16::<GlyphId>()?;
            let substitute = substitutes.get(coverage_index)?;
            buffer.replace(index, substitute);
            Some(index + 1)
        }
        _ => None,
    }
}

fn apply_multiple(data: &[u8], buffer: &mut GlyphBuffer, index: usize) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    if format != 1 {
        return None;
    }

    let coverage_offset: Offset16 = s.read()?;
    let sequences = s.read_offsets16(data)?;
    let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;
    let sequence = sequences.slice(coverage_index)?;
    let substitutes = Stream::new(sequence).read_array16::<GlyphId>()?;

    let count = usize::from(substitutes.len());
    if count == 0 {
        // A zero-length sequence deletes the glyph; the next position
        // to examine is the one that slid into `index`.
        buffer.move_tail(index + 1, index);
        return Some(index);
    }

    buffer.move_tail(index + 1, index + count);
    for i in 0..substitutes.len() {
        buffer.replace(index + usize::from(i), substitutes.at(i));
    }

    Some(index + count)
}

fn apply_ligature(data: &[u8], buffer: &mut GlyphBuffer, index: usize) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    if format != 1 {
        return None;
    }

    let coverage_offset: Offset16 = s.read()?;
    let sets = s.read_offsets16(data)?;
    let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;
    let set = sets.slice(coverage_index)?;
    let ligatures = Stream::new(set).read_offsets16(set)?;

    // The first ligature whose components follow the anchor wins.
    for ligature in ligatures {
        let mut ls = Stream::new(ligature);
        let ligature_glyph: GlyphId = ls.read()?;
        let component_count: u16 = ls.read()?;
        if component_count == 0 {
            continue;
        }

        // The anchor glyph is implicit, so one less component is stored.
        let components = ls.read_array::<GlyphId>(component_count - 1)?;
        if index + usize::from(component_count) > buffer.len() {
            continue;
        }

        if !match_forward(buffer, index + 1, components) {
            continue;
        }

        buffer.replace(index, ligature_glyph);
        buffer.move_tail(index + usize::from(component_count), index + 1);
        return Some(index + 1);
    }

    None
}

fn apply_extension(
    lookups: &LookupList,
    data: &[u8],
    buffer: &mut GlyphBuffer,
    index: usize,
    depth: u8,
) -> Option<usize> {
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    if format != 1 {
        return None;
    }

    let kind: u16 = s.read()?;
    if kind == EXTENSION {
        // An extension must not wrap another extension.
        warn!("recursive extension subtable skipped");
        return None;
    }

    let offset: Offset32 = s.read()?;
    let subtable = data.get(offset.to_usize()..)?;
    apply_subtable(lookups, subtable, kind, buffer, index, depth)
}

fn apply_context(
    lookups: &LookupList,
    data: &[u8],
    buffer: &mut GlyphBuffer,
    index: usize,
    depth: u8,
) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    match format {
        1 => {
            let coverage_offset: Offset16 = s.read()?;
            let rule_sets = s.read_offsets16(data)?;
            let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;
            let set = rule_sets.slice(coverage_index)?;
            let rules = Stream::new(set).read_offsets16(set)?;

            for rule in rules {
                let mut rs = Stream::new(rule);
                let glyph_count: u16 = rs.read()?;
                let record_count: u16 = rs.read()?;
                if glyph_count == 0 {
                    continue;
                }

                let input = rs.read_array::<GlyphId>(glyph_count - 1)?;
                let records = rs.read_array::<SequenceLookupRecord>(record_count)?;

                if index + usize::from(glyph_count) > buffer.len() {
                    continue;
                }
                if !match_forward(buffer, index + 1, input) {
                    continue;
                }

                return apply_sequence_rule(
                    lookups, records, buffer, index, usize::from(glyph_count), depth,
                );
            }

            None
        }
        2 => {
            let coverage_offset: Offset16 = s.read()?;
            let class_def_offset: Offset16 = s.read()?;
            let rule_sets = s.read_offsets16(data)?;

            read_coverage(data, coverage_offset)?.index_of(glyph)?;

            let classes = ClassDef::new(data.get(class_def_offset.to_usize()..)?);
            let set = rule_sets.slice(classes.get(glyph))?;
            let rules = Stream::new(set).read_offsets16(set)?;

            for rule in rules {
                let mut rs = Stream::new(rule);
                let glyph_count: u16 = rs.read()?;
                let record_count: u16 = rs.read()?;
                if glyph_count == 0 {
                    continue;
                }

                let input = rs.read_array::<u16>(glyph_count - 1)?;
                let records = rs.read_array::<SequenceLookupRecord>(record_count)?;

                if index + usize::from(glyph_count) > buffer.len() {
                    continue;
                }
                if !match_classes_forward(buffer, index + 1, &classes, input) {
                    continue;
                }

                return apply_sequence_rule(
                    lookups, records, buffer, index, usize::from(glyph_count), depth,
                );
            }

            None
        }
        3 => {
            let glyph_count: u16 = s.read()?;
            let record_count: u16 = s.read()?;
            let coverage_offsets = s.read_array::<Offset16>(glyph_count)?;
            let records = s.read_array::<SequenceLookupRecord>(record_count)?;

            if glyph_count == 0 {
                return None;
            }
            if index + usize::from(glyph_count) > buffer.len() {
                return None;
            }
            if !match_coverages_forward(buffer, index, data, coverage_offsets) {
                return None;
            }

            apply_sequence_rule(lookups, records, buffer, index, usize::from(glyph_count), depth)
        }
        _ => None,
    }
}

fn apply_chained_context(
    lookups: &LookupList,
    data: &[u8],
    buffer: &mut GlyphBuffer,
    index: usize,
    depth: u8,
) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    match format {
        1 => {
            let coverage_offset: Offset16 = s.read()?;
            let rule_sets = s.read_offsets16(data)?;
            let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;
            let set = rule_sets.slice(coverage_index)?;
            let rules = Stream::new(set).read_offsets16(set)?;

            for rule in rules {
                let mut rs = Stream::new(rule);
                let backtrack = rs.read_array16::<GlyphId>()?;
                let input_count: u16 = rs.read()?;
                if input_count == 0 {
                    continue;
                }

                // The anchor glyph is counted but not stored.
                let input = rs.read_array::<GlyphId>(input_count - 1)?;
                let lookahead = rs.read_array16::<GlyphId>()?;
                let records = rs.read_array16::<SequenceLookupRecord>()?;

                if index + usize::from(input_count) + usize::from(lookahead.len()) > buffer.len() {
                    continue;
                }
                if usize::from(backtrack.len()) > index {
                    continue;
                }
                if !match_forward(buffer, index + 1, input) {
                    continue;
                }
                if !match_backward(buffer, index, backtrack) {
                    continue;
                }
                if !match_forward(buffer, index + usize::from(input_count), lookahead) {
                    continue;
                }

                return apply_sequence_rule(
                    lookups, records, buffer, index, usize::from(input_count), depth,
                );
            }

            None
        }
        2 => {
            let coverage_offset: Offset16 = s.read()?;
            let backtrack_def_offset: Offset16 = s.read()?;
            let input_def_offset: Offset16 = s.read()?;
            let lookahead_def_offset: Offset16 = s.read()?;
            let rule_sets = s.read_offsets16(data)?;

            read_coverage(data, coverage_offset)?.index_of(glyph)?;

            let backtrack_classes = ClassDef::new(data.get(backtrack_def_offset.to_usize()..)?);
            let input_classes = ClassDef::new(data.get(input_def_offset.to_usize()..)?);
            let lookahead_classes = ClassDef::new(data.get(lookahead_def_offset.to_usize()..)?);

            let set = rule_sets.slice(input_classes.get(glyph))?;
            let rules = Stream::new(set).read_offsets16(set)?;

            for rule in rules {
                let mut rs = Stream::new(rule);
                let backtrack = rs.read_array16::<u16>()?;
                let input_count: u16 = rs.read()?;
                if input_count == 0 {
                    continue;
                }

                let input = rs.read_array::<u16>(input_count - 1)?;
                let lookahead = rs.read_array16::<u16>()?;
                let records = rs.read_array16::<SequenceLookupRecord>()?;

                if index + usize::from(input_count) + usize::from(lookahead.len()) > buffer.len() {
                    continue;
                }
                if usize::from(backtrack.len()) > index {
                    continue;
                }
                if !match_classes_forward(buffer, index + 1, &input_classes, input) {
                    continue;
                }
                if !match_classes_backward(buffer, index, &backtrack_classes, backtrack) {
                    continue;
                }
                if !match_classes_forward(
                    buffer, index + usize::from(input_count), &lookahead_classes, lookahead,
                ) {
                    continue;
                }

                return apply_sequence_rule(
                    lookups, records, buffer, index, usize::from(input_count), depth,
                );
            }

            None
        }
        3 => {
            let backtrack_offsets = s.read_array16::<Offset16>()?;
            let input_offsets = s.read_array16::<Offset16>()?;
            let lookahead_offsets = s.read_array16::<Offset16>()?;
            let records = s.read_array16::<SequenceLookupRecord>()?;

            let input_count = usize::from(input_offsets.len());
            if index + input_count + usize::from(lookahead_offsets.len()) > buffer.len() {
                return None;
            }
            if usize::from(backtrack_offsets.len()) > index {
                return None;
            }
            if !match_coverages_forward(buffer, index, data, input_offsets) {
                return None;
            }
            if !match_coverages_backward(buffer, index, data, backtrack_offsets) {
                return None;
            }
            if !match_coverages_forward(buffer, index + input_count, data, lookahead_offsets) {
                return None;
            }

            if input_count == 0 {
                return Some(index + 1);
            }

            apply_sequence_rule(lookups, records, buffer, index, input_count, depth)
        }
        _ => None,
    }
}

fn apply_reverse_chain(data: &[u8], buffer: &mut GlyphBuffer, index: usize) -> Option<usize> {
    let glyph = buffer.get(index)?;
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    if format != 1 {
        return None;
    }

    let coverage_offset: Offset16 = s.read()?;
    let backtrack_offsets = s.read_array16::<Offset16>()?;
    let lookahead_offsets = s.read_array16::<Offset16>()?;
    let substitutes = s.read_array16::<GlyphId>()?;

    let coverage_index = read_coverage(data, coverage_offset)?.index_of(glyph)?;

    if usize::from(backtrack_offsets.len()) > index {
        return None;
    }
    if index + 1 + usize::from(lookahead_offsets.len()) > buffer.len() {
        return None;
    }
    if !match_coverages_backward(buffer, index, data, backtrack_offsets) {
        return None;
    }
    if !match_coverages_forward(buffer, index + 1, data, lookahead_offsets) {
        return None;
    }

    let substitute = substitutes.get(coverage_index)?;
    buffer.replace(index, substitute);
    Some(index + 1)
}

/// Runs a matched rule's nested lookups over the input span.
fn apply_sequence_rule(
    lookups: &LookupList,
    records: LazyArray16<SequenceLookupRecord>,
    buffer: &mut GlyphBuffer,
    index: usize,
    input_count: usize,
    depth: u8,
) -> Option<usize> {
    if depth >= MAX_NESTING_LEVEL {
        warn!("substitution nesting too deep");
        return None;
    }

    let mut scratch = GlyphBuffer::from_glyphs(buffer.as_slice().get(index..index + input_count)?);
    for record in records {
        let lookup = match lookups.get(record.lookup_list_index) {
            Some(lookup) => lookup,
            None => {
                warn!("sequence rule references missing lookup #{}", record.lookup_list_index);
                continue;
            }
        };

        // Nested lookups run at a single position and re-derive what
        // they need; the per-subtable digests are skipped.
        apply_at(
            lookups,
            &lookup,
            None,
            &mut scratch,
            usize::from(record.sequence_index),
            depth + 1,
        );
    }

    // Splice the rewritten span back in. The tail moves first so the
    // buffer is at its final length before the overwrite.
    buffer.move_tail(index + input_count, index + scratch.len());
    buffer.write_at(index, scratch.as_slice());
    Some(index + scratch.len())
}

fn match_forward(buffer: &GlyphBuffer, start: usize, glyphs: LazyArray16<GlyphId>) -> bool {
    for (i, glyph) in glyphs.into_iter().enumerate() {
        if buffer.get(start + i) != Some(glyph) {
            return false;
        }
    }

    true
}

// Backtrack arrays are stored in reverse reading order: entry 0 is the
// glyph immediately before the anchor. The caller has checked that
// `glyphs.len() <= before`.
fn match_backward(buffer: &GlyphBuffer, before: usize, glyphs: LazyArray16<GlyphId>) -> bool {
    for (i, glyph) in glyphs.into_iter().enumerate() {
        if buffer.get(before - 1 - i) != Some(glyph) {
            return false;
        }
    }

    true
}

fn match_classes_forward(
    buffer: &GlyphBuffer,
    start: usize,
    classes: &ClassDef,
    expected: LazyArray16<u16>,
) -> bool {
    for (i, class) in expected.into_iter().enumerate() {
        match buffer.get(start + i) {
            Some(glyph) if classes.get(glyph) == class => {}
            _ => return false,
        }
    }

    true
}

fn match_classes_backward(
    buffer: &GlyphBuffer,
    before: usize,
    classes: &ClassDef,
    expected: LazyArray16<u16>,
) -> bool {
    for (i, class) in expected.into_iter().enumerate() {
        match buffer.get(before - 1 - i) {
            Some(glyph) if classes.get(glyph) == class => {}
            _ => return false,
        }
    }

    true
}

fn match_coverages_forward(
    buffer: &GlyphBuffer,
    start: usize,
    base: &[u8],
    offsets: LazyArray16<Offset16>,
) -> bool {
    for (i, offset) in offsets.into_iter().enumerate() {
        let covered = read_coverage(base, offset)
            .and_then(|coverage| buffer.get(start + i).map(|glyph| coverage.contains(glyph)));
        if covered != Some(true) {
            return false;
        }
    }

    true
}

fn match_coverages_backward(
    buffer: &GlyphBuffer,
    before: usize,
    base: &[u8],
    offsets: LazyArray16<Offset16>,
) -> bool {
    for (i, offset) in offsets.into_iter().enumerate() {
        let covered = read_coverage(base, offset)
            .and_then(|coverage| buffer.get(before - 1 - i).map(|glyph| coverage.contains(glyph)));
        if covered != Some(true) {
            return false;
        }
    }

    true
}

/// Derives the digest of every glyph that could anchor a subtable.
///
/// Unreadable subtables produce the universal digest: the filter then
/// always passes, which is sound.
pub fn subtable_bloom(data: &[u8], kind: u16) -> Bloom {
    match subtable_bloom_impl(data, kind, 0) {
        Some(bloom) => bloom,
        None => {
            warn!("assuming a universal digest for an unreadable subtable");
            Bloom::FULL
        }
    }
}

fn subtable_bloom_impl(data: &[u8], kind: u16, depth: u8) -> Option<Bloom> {
    let mut s = Stream::new(data);
    let format: u16 = s.read()?;
    match kind {
        // Alternate subtables never fire, so nothing can anchor them.
        ALTERNATE => Some(Bloom::EMPTY),
        SINGLE if format == 1 || format == 2 => {
            let coverage_offset: Offset16 = s.read()?;
            Some(read_coverage(data, coverage_offset)?.bloom())
        }
        MULTIPLE | LIGATURE | REVERSE_CHAIN_SINGLE if format == 1 => {
            let coverage_offset: Offset16 = s.read()?;
            Some(read_coverage(data, coverage_offset)?.bloom())
        }
        CONTEXT | CHAINED_CONTEXT if format == 1 || format == 2 => {
            let coverage_offset: Offset16 = s.read()?;
            Some(read_coverage(data, coverage_offset)?.bloom())
        }
        CONTEXT if format == 3 => {
            let glyph_count: u16 = s.read()?;
            s.skip::<u16>(); // seqLookupCount
            let coverage_offsets = s.read_array::<Offset16>(glyph_count)?;
            union_of_coverages(data, coverage_offsets)
        }
        CHAINED_CONTEXT if format == 3 => {
            let _backtrack = s.read_array16::<Offset16>()?;
            let input_offsets = s.read_array16::<Offset16>()?;
            union_of_coverages(data, input_offsets)
        }
        EXTENSION if format == 1 => {
            let wrapped_kind: u16 = s.read()?;
            if wrapped_kind == EXTENSION || depth > 0 {
                return None;
            }
            let offset: Offset32 = s.read()?;
            subtable_bloom_impl(data.get(offset.to_usize()..)?, wrapped_kind, depth + 1)
        }
        _ => None,
    }
}

fn union_of_coverages(base: &[u8], offsets: LazyArray16<Offset16>) -> Option<Bloom> {
    // An empty input sequence can anchor on anything.
    if offsets.len() == 0 {
        return Some(Bloom::FULL);
    }

    let mut bloom = Bloom::EMPTY;
    for offset in offsets {
        bloom = bloom.union(read_coverage(base, offset)?.bloom());
        if bloom.is_full() {
            break;
        }
    }

    Some(bloom)
}
