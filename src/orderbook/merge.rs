//! Ladder merge for incremental order book updates.
//!
//! Both inputs are walked once in side order (bids descending, asks
//! ascending). A delta row replaces the existing row at the same price, a
//! zero-size delta row removes it, and the result is cut to [`MAX_DEPTH`].

use std::cmp::Ordering;

use rust_decimal::Decimal;

use super::types::{BookSide, PriceLevel, MAX_DEPTH};

/// Ordering of two prices within one side of the book.
fn side_order(side: BookSide, a: Decimal, b: Decimal) -> Ordering {
    match side {
        BookSide::Bid => b.cmp(&a),
        BookSide::Ask => a.cmp(&b),
    }
}

/// Sort rows into side order, keeping the last row for a repeated price.
fn sort_rows(mut rows: Vec<PriceLevel>, side: BookSide) -> Vec<PriceLevel> {
    // sort_by is stable, so feed order decides between duplicates
    rows.sort_by(|a, b| side_order(side, a.price, b.price));

    let mut sorted: Vec<PriceLevel> = Vec::with_capacity(rows.len());
    for row in rows {
        match sorted.last_mut() {
            Some(last) if last.price == row.price => *last = row,
            _ => sorted.push(row),
        }
    }
    sorted
}

/// Normalize a full snapshot side: sorted, unique prices, no empty rows,
/// at most [`MAX_DEPTH`] rows.
pub fn normalize_side(rows: Vec<PriceLevel>, side: BookSide) -> Vec<PriceLevel> {
    let mut rows = sort_rows(rows, side);
    rows.retain(|l| !l.size.is_zero());
    rows.truncate(MAX_DEPTH);
    rows
}

/// Merge `delta` into an already sorted `existing` side.
///
/// Delta rows may arrive in any order. On equal prices the delta always
/// overwrites the existing size. Truncation happens after deletions so a
/// deleted top row lets a deeper row back into the visible ladder.
pub fn merge_side(
    existing: &[PriceLevel],
    delta: Vec<PriceLevel>,
    side: BookSide,
) -> Vec<PriceLevel> {
    let delta = sort_rows(delta, side);
    let mut merged = Vec::with_capacity(existing.len() + delta.len());

    let mut old = existing.iter().copied().peekable();
    let mut new = delta.into_iter().peekable();

    loop {
        match (old.peek().copied(), new.peek().copied()) {
            (Some(o), Some(n)) => match side_order(side, o.price, n.price) {
                Ordering::Less => {
                    merged.push(o);
                    old.next();
                }
                Ordering::Greater => {
                    if !n.size.is_zero() {
                        merged.push(n);
                    }
                    new.next();
                }
                Ordering::Equal => {
                    if !n.size.is_zero() {
                        merged.push(n);
                    }
                    old.next();
                    new.next();
                }
            },
            (Some(_), None) => {
                merged.extend(old);
                break;
            }
            (None, Some(_)) => {
                merged.extend(new.filter(|l| !l.size.is_zero()));
                break;
            }
            (None, None) => break,
        }
    }

    merged.truncate(MAX_DEPTH);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn rows(raw: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
        raw.iter().map(|&(p, s)| PriceLevel::new(p, s)).collect()
    }

    fn bids() -> Vec<PriceLevel> {
        rows(&[
            (dec!(49017), dec!(0.3089)),
            (dec!(49016), dec!(0.3831)),
            (dec!(49014), dec!(18.35)),
            (dec!(49008), dec!(0.0547)),
            (dec!(49007), dec!(0.139)),
            (dec!(49006), dec!(0.307)),
        ])
    }

    fn asks() -> Vec<PriceLevel> {
        rows(&[
            (dec!(49018), dec!(1.3912)),
            (dec!(49034), dec!(0.2137)),
            (dec!(49036), dec!(0.1836)),
            (dec!(49037), dec!(1.0918)),
            (dec!(49038), dec!(2.0355)),
            (dec!(49040), dec!(0.6653)),
            (dec!(49041), dec!(0.82)),
            (dec!(49042), dec!(36.2009)),
            (dec!(49043), dec!(0.8139)),
        ])
    }

    #[test]
    fn bids_overwrite_and_insert() {
        let delta = rows(&[
            (dec!(49017), dec!(0.3671)),
            (dec!(49008), dec!(0.007)),
            (dec!(48988), dec!(0.848)),
            (dec!(48984), dec!(0.5409)),
            (dec!(48967), dec!(36.2488)),
        ]);

        let merged = merge_side(&bids(), delta, BookSide::Bid);

        assert_eq!(
            merged,
            rows(&[
                (dec!(49017), dec!(0.3671)),
                (dec!(49016), dec!(0.3831)),
                (dec!(49014), dec!(18.35)),
                (dec!(49008), dec!(0.007)),
                (dec!(49007), dec!(0.139)),
                (dec!(49006), dec!(0.307)),
                (dec!(48988), dec!(0.848)),
                (dec!(48984), dec!(0.5409)),
                (dec!(48967), dec!(36.2488)),
            ])
        );
    }

    #[test]
    fn bids_zero_rows_delete_or_noop() {
        // 48955 and 48964 are out of order and absent from the book
        let delta = rows(&[
            (dec!(49017), dec!(0.3671)),
            (dec!(49008), dec!(0.007)),
            (dec!(49006), dec!(0)),
            (dec!(48988), dec!(0.848)),
            (dec!(48984), dec!(0)),
            (dec!(48967), dec!(36.2488)),
            (dec!(48955), dec!(0)),
            (dec!(48964), dec!(0)),
        ]);

        let merged = merge_side(&bids(), delta, BookSide::Bid);

        assert_eq!(
            merged,
            rows(&[
                (dec!(49017), dec!(0.3671)),
                (dec!(49016), dec!(0.3831)),
                (dec!(49014), dec!(18.35)),
                (dec!(49008), dec!(0.007)),
                (dec!(49007), dec!(0.139)),
                (dec!(48988), dec!(0.848)),
                (dec!(48967), dec!(36.2488)),
            ])
        );
    }

    #[test]
    fn bids_without_shared_prices_append() {
        let delta = rows(&[(dec!(49002), dec!(0.82)), (dec!(49000), dec!(0.24))]);

        let merged = merge_side(&bids(), delta, BookSide::Bid);

        let mut expected = bids();
        expected.extend(rows(&[(dec!(49002), dec!(0.82)), (dec!(49000), dec!(0.24))]));
        assert_eq!(merged, expected);
    }

    #[test]
    fn asks_overwrite_and_insert() {
        let delta = rows(&[
            (dec!(49018), dec!(1.8)),
            (dec!(49036), dec!(0.15)),
            (dec!(49041), dec!(0.6189)),
            (dec!(49081), dec!(0.001)),
        ]);

        let merged = merge_side(&asks(), delta, BookSide::Ask);

        assert_eq!(
            merged,
            rows(&[
                (dec!(49018), dec!(1.8)),
                (dec!(49034), dec!(0.2137)),
                (dec!(49036), dec!(0.15)),
                (dec!(49037), dec!(1.0918)),
                (dec!(49038), dec!(2.0355)),
                (dec!(49040), dec!(0.6653)),
                (dec!(49041), dec!(0.6189)),
                (dec!(49042), dec!(36.2009)),
                (dec!(49043), dec!(0.8139)),
                (dec!(49081), dec!(0.001)),
            ])
        );
    }

    #[test]
    fn asks_zero_rows_delete_or_noop() {
        let delta = rows(&[
            (dec!(49018), dec!(1.8)),
            (dec!(49036), dec!(0.15)),
            (dec!(49040), dec!(0)),
            (dec!(49041), dec!(0.6189)),
            (dec!(49081), dec!(0.001)),
            (dec!(49090), dec!(0)),
            (dec!(48991), dec!(0)),
        ]);

        let merged = merge_side(&asks(), delta, BookSide::Ask);

        assert_eq!(
            merged,
            rows(&[
                (dec!(49018), dec!(1.8)),
                (dec!(49034), dec!(0.2137)),
                (dec!(49036), dec!(0.15)),
                (dec!(49037), dec!(1.0918)),
                (dec!(49038), dec!(2.0355)),
                (dec!(49041), dec!(0.6189)),
                (dec!(49042), dec!(36.2009)),
                (dec!(49043), dec!(0.8139)),
                (dec!(49081), dec!(0.001)),
            ])
        );
    }

    #[test]
    fn asks_without_shared_prices_prepend() {
        let delta = rows(&[(dec!(49015), dec!(0.08)), (dec!(49017), dec!(0.001))]);

        let merged = merge_side(&asks(), delta, BookSide::Ask);

        let mut expected = rows(&[(dec!(49015), dec!(0.08)), (dec!(49017), dec!(0.001))]);
        expected.extend(asks());
        assert_eq!(merged, expected);
    }

    #[test]
    fn zero_size_removes_top_bid() {
        let existing = rows(&[(dec!(100), dec!(1)), (dec!(99), dec!(1))]);

        let merged = merge_side(&existing, rows(&[(dec!(100), dec!(0))]), BookSide::Bid);

        assert_eq!(merged, rows(&[(dec!(99), dec!(1))]));
    }

    #[test]
    fn equal_price_overwrites_even_when_smaller() {
        let existing = rows(&[(dec!(100), dec!(5))]);

        let merged = merge_side(&existing, rows(&[(dec!(100), dec!(2))]), BookSide::Ask);

        assert_eq!(merged, rows(&[(dec!(100), dec!(2))]));
    }

    #[test]
    fn last_duplicate_in_delta_wins() {
        let delta = rows(&[(dec!(10), dec!(1)), (dec!(11), dec!(3)), (dec!(10), dec!(4))]);

        let merged = merge_side(&[], delta, BookSide::Ask);

        assert_eq!(merged, rows(&[(dec!(10), dec!(4)), (dec!(11), dec!(3))]));
    }

    #[test]
    fn truncates_after_deleting() {
        let existing: Vec<PriceLevel> = (0..MAX_DEPTH as i64)
            .map(|i| PriceLevel::new(Decimal::from(1000 - i), dec!(1)))
            .collect();
        let delta = rows(&[(dec!(1000), dec!(0)), (dec!(900), dec!(7))]);

        let merged = merge_side(&existing, delta, BookSide::Bid);

        assert_eq!(merged.len(), MAX_DEPTH);
        assert_eq!(merged[0].price, dec!(999));
        assert_eq!(merged[MAX_DEPTH - 1], PriceLevel::new(dec!(900), dec!(7)));
    }

    #[test]
    fn normalize_sorts_and_caps_depth() {
        let raw: Vec<PriceLevel> = (0..60)
            .map(|i| PriceLevel::new(Decimal::from(i), dec!(1)))
            .collect();

        let asks = normalize_side(raw.clone(), BookSide::Ask);
        let bids = normalize_side(raw, BookSide::Bid);

        assert_eq!(asks.len(), MAX_DEPTH);
        assert_eq!(asks[0].price, dec!(0));
        assert_eq!(bids[0].price, dec!(59));
        assert_eq!(bids[MAX_DEPTH - 1].price, dec!(10));
    }

    fn level_strategy() -> impl Strategy<Value = PriceLevel> {
        (1u32..200, 0u32..5).prop_map(|(p, s)| PriceLevel::new(Decimal::from(p), Decimal::from(s)))
    }

    fn side_strategy() -> impl Strategy<Value = BookSide> {
        prop_oneof![Just(BookSide::Bid), Just(BookSide::Ask)]
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(
            side in side_strategy(),
            book in prop::collection::vec(level_strategy(), 0..80),
            delta in prop::collection::vec(level_strategy(), 0..40),
        ) {
            let existing = normalize_side(book, side);
            let once = merge_side(&existing, delta.clone(), side);
            let twice = merge_side(&once, delta, side);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merged_side_is_strictly_ordered(
            side in side_strategy(),
            book in prop::collection::vec(level_strategy(), 0..80),
            delta in prop::collection::vec(level_strategy(), 0..40),
        ) {
            let existing = normalize_side(book, side);
            let merged = merge_side(&existing, delta, side);

            prop_assert!(merged.len() <= MAX_DEPTH);
            prop_assert!(merged.iter().all(|l| !l.size.is_zero()));
            for pair in merged.windows(2) {
                prop_assert!(side.is_better(pair[0].price, pair[1].price));
            }
        }
    }
}
