//! Substitution behavior, lookup type by lookup type.

use pretty_assertions::assert_eq;

use gsub_engine::{ChainBuilder, GlyphBuffer, GlyphId, Tag};

use crate::common::*;

fn shape(data: &[u8], features: &[[u8; 4]], input: &[u16]) -> Vec<u16> {
    let tags: Vec<Tag> = features.iter().map(Tag::from_bytes).collect();
    let mut chain = ChainBuilder::new(data).build(None, None, &tags).unwrap();
    let glyphs: Vec<GlyphId> = input.iter().copied().map(GlyphId).collect();
    chain.apply(&glyphs).into_iter().map(|g| g.0).collect()
}

#[test]
fn single_applies_delta() {
    let data = simple_font(
        &[(*b"ss01", &[0])],
        &[lookup(1, &[single_delta(&[10, 11], 5)])],
    );

    assert_eq!(shape(&data, &[*b"ss01"], &[10, 11, 12]), [15, 16, 12]);
    // Not enabled, not applied.
    assert_eq!(shape(&data, &[], &[10, 11, 12]), [10, 11, 12]);
}

#[test]
fn single_negative_delta() {
    let data = simple_font(
        &[(*b"ss01", &[0])],
        &[lookup(1, &[single_delta(&[10], -3)])],
    );

    assert_eq!(shape(&data, &[*b"ss01"], &[10]), [7]);
}

#[test]
fn single_explicit_substitutes() {
    let data = simple_font(
        &[(*b"ss02", &[0])],
        &[lookup(1, &[single_map(&[10, 12], &[99, 98])])],
    );

    assert_eq!(shape(&data, &[*b"ss02"], &[10, 11, 12]), [99, 11, 98]);
}

#[test]
fn multiple_expands() {
    let data = simple_font(
        &[(*b"ccmp", &[0])],
        &[lookup(2, &[multiple(&[20], &[&[30, 31, 32]])])],
    );

    assert_eq!(shape(&data, &[*b"ccmp"], &[1, 20, 2]), [1, 30, 31, 32, 2]);
}

#[test]
fn multiple_substitutes_are_not_reexpanded() {
    // The cursor lands past the inserted glyphs, so a substitute that
    // is itself covered does not explode.
    let data = simple_font(
        &[(*b"ccmp", &[0])],
        &[lookup(2, &[multiple(&[20], &[&[20, 20]])])],
    );

    assert_eq!(shape(&data, &[*b"ccmp"], &[20]), [20, 20]);
}

#[test]
fn multiple_with_empty_sequence_deletes() {
    let data = simple_font(
        &[(*b"ccmp", &[0])],
        &[lookup(2, &[multiple(&[20], &[&[]])])],
    );

    assert_eq!(shape(&data, &[*b"ccmp"], &[1, 20, 2]), [1, 2]);
    // After a deletion the cursor lands on the glyph that slid in,
    // so runs are deleted wholesale.
    assert!(shape(&data, &[*b"ccmp"], &[20, 20]).is_empty());
    assert_eq!(shape(&data, &[*b"ccmp"], &[20, 3]), [3]);
}

#[test]
fn ligature_replaces_components() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(4, &[ligatures(&[30], &[&[(40, &[31])]])])],
    );

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31]), [40]);
    assert_eq!(shape(&data, &[*b"liga"], &[30, 31, 30, 31]), [40, 40]);
    // The anchor alone is not enough.
    assert_eq!(shape(&data, &[*b"liga"], &[30]), [30]);
    assert_eq!(shape(&data, &[*b"liga"], &[31, 30]), [31, 30]);
}

#[test]
fn ligature_first_match_wins() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(
            4,
            &[ligatures(&[30], &[&[(40, &[31]), (41, &[31, 32])]])],
        )],
    );

    // The two-component ligature shadows the longer one.
    assert_eq!(shape(&data, &[*b"liga"], &[30, 31, 32]), [40, 32]);
}

#[test]
fn ligature_longest_first_ordering() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(
            4,
            &[ligatures(&[30], &[&[(41, &[31, 32]), (40, &[31])]])],
        )],
    );

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31, 32]), [41]);
    assert_eq!(shape(&data, &[*b"liga"], &[30, 31, 33]), [40, 33]);
}

#[test]
fn context_glyph_rules() {
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(5, &[context(&[50], &[&[context_rule(&[51], &[(0, 1)])]])]),
            lookup(1, &[single_map(&[50], &[60])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[50, 51]), [60, 51]);
    // No context, no match.
    assert_eq!(shape(&data, &[*b"calt"], &[50, 52]), [50, 52]);
    // Rule extends past the end of the sequence.
    assert_eq!(shape(&data, &[*b"calt"], &[50]), [50]);
}

#[test]
fn context_class_rules() {
    // 70 is class 1, 71 is class 2.
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                5,
                &[context_classes(
                    &[70],
                    class_ranges(&[(70, 70, 1), (71, 71, 2)]),
                    &[
                        None,
                        Some(vec![context_rule(&[2], &[(0, 1)])]),
                        None,
                    ],
                )],
            ),
            lookup(1, &[single_map(&[70], &[80])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[70, 71]), [80, 71]);
    // Second glyph is class 1, not 2.
    assert_eq!(shape(&data, &[*b"calt"], &[70, 70]), [70, 70]);
}

#[test]
fn context_coverage_rules() {
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                5,
                &[context_coverages(
                    &[coverage(&[90]), coverage(&[91])],
                    &[(0, 1)],
                )],
            ),
            lookup(1, &[single_map(&[90], &[95])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[90, 91]), [95, 91]);
    assert_eq!(shape(&data, &[*b"calt"], &[90, 92]), [90, 92]);
}

#[test]
fn chained_context_glyph_rules() {
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained(
                    &[60],
                    &[&[chained_rule(&[5], &[61], &[7], &[(0, 1)])]],
                )],
            ),
            lookup(1, &[single_map(&[60], &[65])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[5, 60, 61, 7]), [5, 65, 61, 7]);
    // Backtrack is required, so position 0 cannot match.
    assert_eq!(shape(&data, &[*b"calt"], &[60, 61, 7]), [60, 61, 7]);
    // Missing lookahead.
    assert_eq!(shape(&data, &[*b"calt"], &[5, 60, 61]), [5, 60, 61]);
}

#[test]
fn chained_context_class_rules() {
    // Backtrack class 3 = glyph 5; input classes: 60 -> 1, 61 -> 2.
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained_classes(
                    &[60],
                    class_ranges(&[(5, 5, 3)]),
                    class_ranges(&[(60, 60, 1), (61, 61, 2)]),
                    class_ranges(&[(7, 7, 4)]),
                    &[
                        None,
                        Some(vec![chained_rule(&[3], &[2], &[4], &[(0, 1)])]),
                    ],
                )],
            ),
            lookup(1, &[single_map(&[60], &[65])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[5, 60, 61, 7]), [5, 65, 61, 7]);
    // Wrong backtrack class.
    assert_eq!(shape(&data, &[*b"calt"], &[6, 60, 61, 7]), [6, 60, 61, 7]);
}

#[test]
fn chained_backtrack_is_reverse_order() {
    // Backtrack coverages are listed closest-first: entry 0 must match
    // the glyph immediately before the anchor.
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained_coverages(
                    &[coverage(&[2]), coverage(&[1])],
                    &[coverage(&[60])],
                    &[],
                    &[(0, 1)],
                )],
            ),
            lookup(1, &[single_map(&[60], &[66])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[1, 2, 60]), [1, 2, 66]);
    assert_eq!(shape(&data, &[*b"calt"], &[2, 1, 60]), [2, 1, 60]);
}

#[test]
fn chained_coverage_pair_rewrite() {
    // An `==`-style contextual alternate: two glyphs rewritten into a
    // joining pair through two nested single substitutions.
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained_coverages(
                    &[],
                    &[coverage(&[100]), coverage(&[100])],
                    &[],
                    &[(0, 1), (1, 2)],
                )],
            ),
            lookup(1, &[single_map(&[100], &[200])]),
            lookup(1, &[single_map(&[100], &[201])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[100, 100]), [200, 201]);
    // A trailing odd glyph stays put: two were consumed, one remains
    // and has no pair to match with.
    assert_eq!(shape(&data, &[*b"calt"], &[100, 100, 100]), [200, 201, 100]);
    assert_eq!(shape(&data, &[], &[100, 100]), [100, 100]);
}

#[test]
fn two_features_compose() {
    // calt rewrites a [100, 100] pair; frac rewrites [110, 111, 112]
    // into numerator, bar, denominator.
    let data = simple_font(
        &[(*b"calt", &[0]), (*b"frac", &[3])],
        &[
            lookup(
                6,
                &[chained_coverages(
                    &[],
                    &[coverage(&[100]), coverage(&[100])],
                    &[],
                    &[(0, 1), (1, 2)],
                )],
            ),
            lookup(1, &[single_map(&[100], &[200])]),
            lookup(1, &[single_map(&[100], &[201])]),
            lookup(
                6,
                &[chained_coverages(
                    &[],
                    &[coverage(&[110]), coverage(&[111]), coverage(&[112])],
                    &[],
                    &[(0, 4), (1, 5), (2, 6)],
                )],
            ),
            lookup(1, &[single_map(&[110], &[220])]),
            lookup(1, &[single_map(&[111], &[221])]),
            lookup(1, &[single_map(&[112], &[222])]),
        ],
    );

    let input = [100, 100, 110, 111, 112];
    let expected = [200, 201, 220, 221, 222];
    assert_eq!(shape(&data, &[*b"calt", *b"frac"], &input), expected);
    // Feature order does not change the output.
    assert_eq!(shape(&data, &[*b"frac", *b"calt"], &input), expected);
    // One feature alone only rewrites its own span.
    assert_eq!(
        shape(&data, &[*b"frac"], &input),
        [100, 100, 220, 221, 222]
    );
}

#[test]
fn nested_lookup_can_contract() {
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained_coverages(
                    &[],
                    &[coverage(&[20]), coverage(&[21])],
                    &[],
                    &[(0, 1)],
                )],
            ),
            lookup(2, &[multiple(&[20], &[&[]])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[20, 21, 22]), [21, 22]);
}

#[test]
fn nested_lookup_can_expand() {
    let data = simple_font(
        &[(*b"calt", &[0])],
        &[
            lookup(
                6,
                &[chained_coverages(
                    &[],
                    &[coverage(&[20]), coverage(&[21])],
                    &[],
                    &[(0, 1)],
                )],
            ),
            lookup(2, &[multiple(&[20], &[&[90, 91]])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[20, 21]), [90, 91, 21]);
}

#[test]
fn extension_wraps_ligature() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(
            7,
            &[extension(4, ligatures(&[30], &[&[(40, &[31])]]))],
        )],
    );

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31]), [40]);
}

#[test]
fn extension_cannot_wrap_extension() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(
            7,
            &[extension(7, extension(4, ligatures(&[30], &[&[(40, &[31])]])))],
        )],
    );

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31]), [30, 31]);
}

#[test]
fn reverse_chain_walks_right_to_left() {
    // 120 becomes 130 when followed by 121 or 130. Walking from the
    // right, each replacement feeds the one before it.
    let data = simple_font(
        &[(*b"rclt", &[0])],
        &[lookup(
            8,
            &[reverse_chain(
                &[120],
                &[],
                &[coverage(&[121, 130])],
                &[130],
            )],
        )],
    );

    assert_eq!(
        shape(&data, &[*b"rclt"], &[120, 120, 121]),
        [130, 130, 121]
    );
    // Without the trigger nothing matches.
    assert_eq!(shape(&data, &[*b"rclt"], &[120, 120]), [120, 120]);
}

#[test]
fn reverse_chain_checks_backtrack() {
    let data = simple_font(
        &[(*b"rclt", &[0])],
        &[lookup(
            8,
            &[reverse_chain(&[120], &[coverage(&[9])], &[], &[130])],
        )],
    );

    assert_eq!(shape(&data, &[*b"rclt"], &[9, 120]), [9, 130]);
    assert_eq!(shape(&data, &[*b"rclt"], &[120]), [120]);
}

#[test]
fn lookups_apply_in_lookup_order() {
    // Feature order must not matter: lookup 0 feeds lookup 1 whichever
    // feature names which.
    let data = simple_font(
        &[(*b"aaaa", &[1]), (*b"bbbb", &[0])],
        &[
            lookup(1, &[single_map(&[10], &[11])]),
            lookup(1, &[single_map(&[11], &[12])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"aaaa", *b"bbbb"], &[10]), [12]);
    assert_eq!(shape(&data, &[*b"bbbb", *b"aaaa"], &[10]), [12]);
}

#[test]
fn shared_lookup_applies_once() {
    let data = simple_font(
        &[(*b"liga", &[0]), (*b"dlig", &[0])],
        &[lookup(1, &[single_delta(&[10], 1)])],
    );

    assert_eq!(shape(&data, &[*b"liga", *b"dlig"], &[10]), [11]);
}

#[test]
fn empty_input_stays_empty() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(4, &[ligatures(&[30], &[&[(40, &[31])]])])],
    );

    assert!(shape(&data, &[*b"liga"], &[]).is_empty());
}

#[test]
fn ligature_chain_is_idempotent() {
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(4, &[ligatures(&[30], &[&[(40, &[31])]])])],
    );

    let once = shape(&data, &[*b"liga"], &[30, 31, 2, 30, 31]);
    assert_eq!(once, [40, 2, 40]);
    assert_eq!(shape(&data, &[*b"liga"], &once), once);
}

#[test]
fn second_subtable_tried_after_first_misses() {
    let data = simple_font(
        &[(*b"ss01", &[0])],
        &[lookup(
            1,
            &[single_map(&[10], &[99]), single_map(&[20], &[88])],
        )],
    );

    assert_eq!(shape(&data, &[*b"ss01"], &[10, 20]), [99, 88]);
}

#[test]
fn only_first_applicable_subtable_fires() {
    // Both subtables cover 10; the first one wins.
    let data = simple_font(
        &[(*b"ss01", &[0])],
        &[lookup(
            1,
            &[single_map(&[10], &[99]), single_map(&[10], &[88])],
        )],
    );

    assert_eq!(shape(&data, &[*b"ss01"], &[10]), [99]);
}

#[test]
fn alternate_lookup_is_ignored() {
    // An alternate subtable (type 3) never applies; its raw bytes do
    // not matter because the digest of the lookup is empty.
    let data = simple_font(
        &[(*b"aalt", &[0])],
        &[lookup(3, &[coverage(&[10])])],
    );

    assert_eq!(shape(&data, &[*b"aalt"], &[10]), [10]);
}

#[test]
fn malformed_subtable_is_skipped() {
    // A truncated subtable cannot be parsed; the sequence must pass
    // through unchanged instead of aborting the chain.
    let data = simple_font(&[(*b"liga", &[0])], &[lookup(4, &[vec![0x00]])]);

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31]), [30, 31]);
}

#[test]
fn unknown_lookup_type_is_skipped() {
    let data = simple_font(
        &[(*b"zzzz", &[0])],
        &[lookup(9, &[single_map(&[10], &[99])])],
    );

    assert_eq!(shape(&data, &[*b"zzzz"], &[10]), [10]);
}

#[test]
fn unknown_subtable_format_is_skipped() {
    // Ligature substitutions only have format 1.
    let data = simple_font(
        &[(*b"liga", &[0])],
        &[lookup(
            4,
            &[Builder::new().u16(9).child(coverage(&[30])).build()],
        )],
    );

    assert_eq!(shape(&data, &[*b"liga"], &[30, 31]), [30, 31]);
}

#[test]
fn null_subtable_offset_is_skipped() {
    // type 1, no flags, one NULL subtable offset
    let table = Builder::new().u16(1).u16(0).u16(1).u16(0).build();
    let data = simple_font(&[(*b"ss01", &[0])], &[table]);

    assert_eq!(shape(&data, &[*b"ss01"], &[10]), [10]);
}

#[test]
fn malformed_lookup_among_good_ones() {
    // Lookup 0 is garbage; lookup 1 must still run.
    let data = simple_font(
        &[(*b"calt", &[0, 1])],
        &[
            lookup(6, &[vec![0x00, 0x01]]),
            lookup(1, &[single_map(&[10], &[42])]),
        ],
    );

    assert_eq!(shape(&data, &[*b"calt"], &[10]), [42]);
}

#[test]
fn apply_to_rewrites_a_buffer_in_place() {
    let data = simple_font(
        &[(*b"ss01", &[0])],
        &[lookup(1, &[single_delta(&[10], 5)])],
    );
    let mut chain = ChainBuilder::new(&data)
        .build(None, None, &[Tag::from_bytes(b"ss01")])
        .unwrap();

    let mut buffer = GlyphBuffer::from_glyphs(&[GlyphId(10), GlyphId(11)]);
    chain.apply_to(&mut buffer);
    assert_eq!(buffer.into_vec(), [GlyphId(15), GlyphId(11)]);

    // The same chain serves many buffers.
    let mut buffer = GlyphBuffer::from_glyphs(&[GlyphId(10)]);
    chain.apply_to(&mut buffer);
    assert_eq!(buffer.into_vec(), [GlyphId(15)]);
}
