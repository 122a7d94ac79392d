// ByteString property tests (consolidated).
//
// Property 1: quoted round-trip — split_args parses cat_repr's output
//  back to the original byte sequence, for arbitrary bytes.
// Property 2: make_room grows only the spare; length, contents, and
//  the terminator are untouched.
// Property 3: range agrees with a direct index-filter model of
//  inclusive slicing with negative indices.
// Property 4: split/join round-trip for separator-free fields.
// Property 5: ordering agrees with slice ordering.
use proptest::prelude::*;
use rehashmap::{split, split_args, ByteString};

proptest! {
    #[test]
    fn prop_repr_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut quoted = ByteString::empty();
        quoted.cat_repr(&bytes);
        let argv = split_args(quoted.as_bytes()).expect("repr output is always well-formed");
        prop_assert_eq!(argv.len(), 1);
        prop_assert_eq!(argv[0].as_bytes(), &bytes[..]);
    }

    #[test]
    fn prop_make_room_preserves_contents(
        bytes in proptest::collection::vec(any::<u8>(), 0..128),
        add in 0usize..4096
    ) {
        let mut s = ByteString::new(&bytes);
        s.make_room(add);
        prop_assert!(s.avail() >= add);
        prop_assert_eq!(s.len(), bytes.len());
        prop_assert_eq!(s.as_bytes(), &bytes[..]);
    }

    #[test]
    fn prop_range_matches_filter_model(
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
        start in -80isize..80,
        end in -80isize..80
    ) {
        let len = bytes.len() as isize;
        // Negative indices resolve from the end and saturate at the
        // first byte, so an end far below -len still points at byte 0.
        let rs = if start < 0 { (len + start).max(0) } else { start };
        let re = if end < 0 { (len + end).max(0) } else { end };
        let expected: Vec<u8> = bytes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let i = *i as isize;
                rs <= i && i <= re
            })
            .map(|(_, b)| *b)
            .collect();

        let mut s = ByteString::new(&bytes);
        s.range(start, end);
        prop_assert_eq!(s.as_bytes(), &expected[..]);
    }

    #[test]
    fn prop_split_join_round_trips(
        fields in proptest::collection::vec(proptest::collection::vec(97u8..=122, 0..12), 1..12)
    ) {
        let joined: Vec<u8> = fields.join(&b',');
        // An empty input yields an empty vec by contract, so the one
        // shape that joins to nothing (a single empty field) is out.
        prop_assume!(!joined.is_empty());
        let parts = split(&joined, b",");
        prop_assert_eq!(parts.len(), fields.len());
        for (part, field) in parts.iter().zip(&fields) {
            prop_assert_eq!(part.as_bytes(), &field[..]);
        }
    }

    #[test]
    fn prop_ordering_matches_slices(
        a in proptest::collection::vec(any::<u8>(), 0..32),
        b in proptest::collection::vec(any::<u8>(), 0..32)
    ) {
        let sa = ByteString::new(&a);
        let sb = ByteString::new(&b);
        prop_assert_eq!(sa.cmp(&sb), a.cmp(&b));
        prop_assert_eq!(sa == sb, a == b);
    }
}
