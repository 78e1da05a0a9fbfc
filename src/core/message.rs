//! Message flags and the selected-mailbox view.

use std::collections::HashMap;

use crate::mjson::Digest;

/// Message flag bit set. The IMAP rendering order is fixed: Recent,
/// Answered, Flagged, Deleted, Seen, Draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u32);

impl Flags {
    pub const ANSWERED: Flags = Flags(0x1);
    pub const FLAGGED: Flags = Flags(0x2);
    pub const DELETED: Flags = Flags(0x4);
    pub const SEEN: Flags = Flags(0x8);
    pub const RECENT: Flags = Flags(0x10);
    pub const DRAFT: Flags = Flags(0x20);

    pub fn empty() -> Flags {
        Flags(0)
    }

    pub fn all_permanent() -> Flags {
        Flags::ANSWERED | Flags::FLAGGED | Flags::DELETED | Flags::SEEN | Flags::DRAFT
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// One IMAP flag keyword, e.g. `\Seen`.
    pub fn parse_imap(name: &str) -> Option<Flags> {
        if name.eq_ignore_ascii_case("\\Answered") {
            Some(Flags::ANSWERED)
        } else if name.eq_ignore_ascii_case("\\Flagged") {
            Some(Flags::FLAGGED)
        } else if name.eq_ignore_ascii_case("\\Deleted") {
            Some(Flags::DELETED)
        } else if name.eq_ignore_ascii_case("\\Seen") {
            Some(Flags::SEEN)
        } else if name.eq_ignore_ascii_case("\\Draft") {
            Some(Flags::DRAFT)
        } else if name.eq_ignore_ascii_case("\\Recent") {
            Some(Flags::RECENT)
        } else {
            None
        }
    }

    pub fn to_imap_string(self) -> String {
        let mut out = String::with_capacity(48);
        out.push('(');
        for (bit, name) in [
            (Flags::RECENT, "\\Recent"),
            (Flags::ANSWERED, "\\Answered"),
            (Flags::FLAGGED, "\\Flagged"),
            (Flags::DELETED, "\\Deleted"),
            (Flags::SEEN, "\\Seen"),
            (Flags::DRAFT, "\\Draft"),
        ] {
            if self.contains(bit) {
                if out.len() > 1 {
                    out.push(' ');
                }
                out.push_str(name);
            }
        }
        out.push(')');
        out
    }

    /// The index-service letter form, e.g. `(SAR)`.
    pub fn to_midb_letters(self) -> String {
        let mut out = String::with_capacity(8);
        out.push('(');
        for (bit, letter) in [
            (Flags::SEEN, 'S'),
            (Flags::ANSWERED, 'A'),
            (Flags::FLAGGED, 'F'),
            (Flags::DELETED, 'D'),
            (Flags::DRAFT, 'U'),
            (Flags::RECENT, 'R'),
        ] {
            if self.contains(bit) {
                out.push(letter);
            }
        }
        out.push(')');
        out
    }

    pub fn from_midb_letters(letters: &str) -> Flags {
        let mut flags = Flags::empty();
        for ch in letters.chars() {
            flags.insert(match ch {
                'S' => Flags::SEEN,
                'A' => Flags::ANSWERED,
                'F' => Flags::FLAGGED,
                'D' => Flags::DELETED,
                'U' => Flags::DRAFT,
                'R' => Flags::RECENT,
                _ => continue,
            });
        }
        flags
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// One message as the index service reports it.
#[derive(Debug, Clone, Default)]
pub struct Mitem {
    pub uid: u32,
    pub mid: String,
    pub flags: Flags,
    /// 1-based sequence number within the selected view; 0 until assigned.
    pub id: u32,
    pub digest: Option<Digest>,
}

/// The selected-mailbox view: insertion-ordered items with a UID index.
/// Sequence numbers are dense and 1-based; a UID keeps its sequence number
/// until an expunge removes it.
#[derive(Debug, Default)]
pub struct ContentArray {
    items: Vec<Mitem>,
    by_uid: HashMap<u32, usize>,
    pub n_recent: usize,
    /// 1-based sequence number of the first unseen item, 0 if all seen.
    pub first_unseen: u32,
}

impl ContentArray {
    pub fn n_exists(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Mitem] {
        &self.items
    }

    pub fn max_uid(&self) -> u32 {
        self.items.iter().map(|m| m.uid).max().unwrap_or(0)
    }

    pub fn get_itemx(&self, uid: u32) -> Option<&Mitem> {
        self.by_uid.get(&uid).map(|&pos| &self.items[pos])
    }

    pub fn get_itemx_mut(&mut self, uid: u32) -> Option<&mut Mitem> {
        let pos = *self.by_uid.get(&uid)?;
        Some(&mut self.items[pos])
    }

    pub fn by_seq(&self, seq: u32) -> Option<&Mitem> {
        if seq == 0 {
            return None;
        }
        self.items.get(seq as usize - 1)
    }

    /// Rebuild (SELECT/EXAMINE) or extend (background notify) the view from
    /// a fresh index listing.
    pub fn ingest(&mut self, listing: Vec<Mitem>, fresh_numbers: bool) {
        if fresh_numbers {
            self.items = listing;
            self.by_uid.clear();
            for (pos, item) in self.items.iter_mut().enumerate() {
                item.id = pos as u32 + 1;
                self.by_uid.insert(item.uid, pos);
            }
        } else {
            for mut item in listing {
                if self.by_uid.contains_key(&item.uid) {
                    continue;
                }
                item.id = self.items.len() as u32 + 1;
                self.by_uid.insert(item.uid, self.items.len());
                self.items.push(item);
            }
        }
        self.recount();
    }

    fn recount(&mut self) {
        self.n_recent = self
            .items
            .iter()
            .filter(|m| m.flags.contains(Flags::RECENT))
            .count();
        self.first_unseen = self
            .items
            .iter()
            .position(|m| !m.flags.contains(Flags::SEEN))
            .map(|pos| pos as u32 + 1)
            .unwrap_or(0);
    }

    /// Remove one UID, shifting later sequence numbers down by one. Returns
    /// the removed item's sequence number.
    pub fn remove_uid(&mut self, uid: u32) -> Option<u32> {
        let pos = self.by_uid.remove(&uid)?;
        let seq = self.items[pos].id;
        self.items.remove(pos);
        for (new_pos, item) in self.items.iter_mut().enumerate().skip(pos) {
            item.id = new_pos as u32 + 1;
            self.by_uid.insert(item.uid, new_pos);
        }
        self.recount();
        Some(seq)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.by_uid.clear();
        self.n_recent = 0;
        self.first_unseen = 0;
    }
}
