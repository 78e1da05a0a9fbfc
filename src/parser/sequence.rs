//! Sequence-set grammar: `1,3:7,*,9:*` with `*` standing for the largest
//! value on the resolving side.

use crate::core::message::ContentArray;
use crate::core::Result;
use crate::midb::{SeqRange, SEQ_STAR};

use super::bad;

fn parse_bound(s: &str) -> Option<u32> {
    if s == "*" {
        Some(SEQ_STAR)
    } else {
        s.parse::<u32>().ok().filter(|&v| v > 0 && v != SEQ_STAR)
    }
}

pub fn parse_sequence_set(input: &str) -> Result<Vec<SeqRange>> {
    let mut ranges = Vec::new();
    if input.is_empty() {
        return Err(bad());
    }
    for item in input.split(',') {
        let range = match item.split_once(':') {
            Some((lo, hi)) => SeqRange {
                lo: parse_bound(lo).ok_or_else(bad)?,
                hi: parse_bound(hi).ok_or_else(bad)?,
            },
            None => {
                let value = parse_bound(item).ok_or_else(bad)?;
                SeqRange {
                    lo: value,
                    hi: value,
                }
            }
        };
        ranges.push(range);
    }
    Ok(ranges)
}

/// Resolve `*` against `max` and clamp into `1..=max`. Ranges that fall
/// entirely outside are dropped, so an empty mailbox yields an empty set.
pub fn resolve_ranges(ranges: &[SeqRange], max: u32) -> Vec<SeqRange> {
    let mut out = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (mut lo, mut hi) = (range.lo, range.hi);
        if lo == SEQ_STAR && hi == SEQ_STAR {
            lo = max;
            hi = max;
        } else if lo == SEQ_STAR {
            lo = hi;
            hi = max;
        } else if hi == SEQ_STAR {
            hi = max;
        } else if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        if lo < 1 {
            lo = 1;
        }
        if hi > max {
            hi = max;
        }
        if lo >= 1 && lo <= hi {
            out.push(SeqRange { lo, hi });
        }
    }
    out
}

/// Sequence numbers to UID ranges via the selected view. The result set is
/// a subset of `1..=n_exists` by construction.
pub fn seq_to_uids(ranges: &[SeqRange], view: &ContentArray) -> Vec<SeqRange> {
    let mut uids = Vec::new();
    for range in resolve_ranges(ranges, view.n_exists() as u32) {
        for seq in range.lo..=range.hi {
            if let Some(item) = view.by_seq(seq) {
                uids.push(SeqRange {
                    lo: item.uid,
                    hi: item.uid,
                });
            }
        }
    }
    uids
}

/// Membership test for an unresolved range list; `max_uid` is the meaning
/// of `*`.
pub fn iseq_contains(ranges: &[SeqRange], num: u32, max_uid: u32) -> bool {
    for range in ranges {
        let lo = if range.lo == SEQ_STAR { max_uid } else { range.lo };
        let hi = if range.hi == SEQ_STAR { max_uid } else { range.hi };
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        if lo <= num && num <= hi && num <= max_uid {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{Flags, Mitem};

    #[test]
    fn grammar() {
        let ranges = parse_sequence_set("1,3:7,*,9:*").unwrap();
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[1], SeqRange { lo: 3, hi: 7 });
        assert_eq!(ranges[2], SeqRange { lo: SEQ_STAR, hi: SEQ_STAR });
        assert_eq!(ranges[3], SeqRange { lo: 9, hi: SEQ_STAR });
        assert!(parse_sequence_set("").is_err());
        assert!(parse_sequence_set("a:b").is_err());
        assert!(parse_sequence_set("0").is_err());
        assert!(parse_sequence_set("1,,2").is_err());
    }

    #[test]
    fn star_resolution() {
        let max = 10;
        assert_eq!(
            resolve_ranges(&parse_sequence_set("*:*").unwrap(), max),
            [SeqRange { lo: 10, hi: 10 }]
        );
        assert_eq!(
            resolve_ranges(&parse_sequence_set("*:4").unwrap(), max),
            [SeqRange { lo: 4, hi: 10 }]
        );
        assert_eq!(
            resolve_ranges(&parse_sequence_set("4:*").unwrap(), max),
            [SeqRange { lo: 4, hi: 10 }]
        );
        assert_eq!(
            resolve_ranges(&parse_sequence_set("8:2").unwrap(), max),
            [SeqRange { lo: 2, hi: 8 }]
        );
        // nothing escapes 1..=max
        assert_eq!(
            resolve_ranges(&parse_sequence_set("5:100").unwrap(), max),
            [SeqRange { lo: 5, hi: 10 }]
        );
        // empty mailbox yields the empty set
        assert!(resolve_ranges(&parse_sequence_set("*").unwrap(), 0).is_empty());
        assert!(resolve_ranges(&parse_sequence_set("1:*").unwrap(), 0).is_empty());
    }

    #[test]
    fn uid_lookup() {
        let mut view = ContentArray::default();
        view.ingest(
            vec![
                Mitem { uid: 11, mid: "a".into(), flags: Flags::empty(), id: 0, digest: None },
                Mitem { uid: 14, mid: "b".into(), flags: Flags::empty(), id: 0, digest: None },
                Mitem { uid: 19, mid: "c".into(), flags: Flags::empty(), id: 0, digest: None },
            ],
            true,
        );
        let uids = seq_to_uids(&parse_sequence_set("2:*").unwrap(), &view);
        assert_eq!(
            uids,
            [SeqRange { lo: 14, hi: 14 }, SeqRange { lo: 19, hi: 19 }]
        );
    }

    #[test]
    fn membership() {
        let ranges = parse_sequence_set("2:4,9:*").unwrap();
        assert!(iseq_contains(&ranges, 3, 20));
        assert!(!iseq_contains(&ranges, 5, 20));
        assert!(iseq_contains(&ranges, 12, 20));
        assert!(!iseq_contains(&ranges, 25, 20));
    }
}
