// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use photo_refine::db::Rating;
use photo_refine::gallery::parse_source;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    rating: &'a str,
    source_type: &'a str,
    source_key: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    if let Ok(rating) = input.rating.parse::<Rating>() {
        assert_eq!(rating.as_str().parse::<Rating>().ok(), Some(rating));
    }
    if let Ok(source) = parse_source(input.source_type, input.source_key) {
        assert_eq!(parse_source(source.kind().as_str(), &source.key()).ok(), Some(source));
    }
});
