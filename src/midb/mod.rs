//! The mail index service contract.
//!
//! MIDB is the exclusive persistence API: per-folder UID allocation,
//! UIDVALIDITY, flags, deletion marks and message digests all live there.
//! The server talks to it through this trait; `client::MidbClient` is the
//! TCP implementation, the test suite plugs in an in-memory one.

pub mod client;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::message::{Flags, Mitem};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MidbError {
    #[error("no connection to the midb service")]
    NoServer,
    #[error("read/write error on the midb connection")]
    ReadWrite,
    #[error("midb error {0}")]
    Result(u32),
    #[error("out of memory")]
    OutOfMemory,
    #[error("too many results")]
    TooManyResults,
}

pub type Result<T> = std::result::Result<T, MidbError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub exists: usize,
    pub recent: usize,
    pub unseen: usize,
    pub uidvalidity: u32,
    pub uidnext: u32,
}

/// One `lo:hi` element of a parsed sequence set. `STAR` stands for `*` and
/// is resolved against the receiving side's maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub lo: u32,
    pub hi: u32,
}

pub const SEQ_STAR: u32 = u32::MAX;

impl SeqRange {
    pub fn format(ranges: &[SeqRange]) -> String {
        let mut out = String::new();
        for range in ranges {
            if !out.is_empty() {
                out.push(',');
            }
            let fmt_bound = |v: u32| {
                if v == SEQ_STAR {
                    "*".to_string()
                } else {
                    v.to_string()
                }
            };
            if range.lo == range.hi {
                out.push_str(&fmt_bound(range.lo));
            } else {
                out.push_str(&format!("{}:{}", fmt_bound(range.lo), fmt_bound(range.hi)));
            }
        }
        out
    }
}

#[async_trait]
pub trait MailIndex: Send + Sync + 'static {
    async fn summary_folder(&self, maildir: &Path, folder: &str) -> Result<FolderSummary>;

    async fn enum_folders(&self, maildir: &Path) -> Result<Vec<String>>;

    async fn enum_subscriptions(&self, maildir: &Path) -> Result<Vec<String>>;

    async fn make_folder(&self, maildir: &Path, folder: &str) -> Result<()>;

    async fn remove_folder(&self, maildir: &Path, folder: &str) -> Result<()>;

    async fn rename_folder(&self, maildir: &Path, from: &str, to: &str) -> Result<()>;

    async fn subscribe_folder(&self, maildir: &Path, folder: &str) -> Result<()>;

    async fn unsubscribe_folder(&self, maildir: &Path, folder: &str) -> Result<()>;

    /// UID listing (uid, mid, flags) for a UID range set.
    async fn fetch_simple_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>>;

    /// Like `fetch_simple_uid` but each item carries its digest.
    async fn fetch_detail_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>>;

    /// All messages carrying the deletion mark.
    async fn list_deleted(&self, maildir: &Path, folder: &str) -> Result<Vec<Mitem>>;

    async fn insert_mail(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
        internal_date: i64,
    ) -> Result<()>;

    async fn remove_mail(&self, maildir: &Path, folder: &str, mids: &[String]) -> Result<()>;

    async fn copy_mail(
        &self,
        maildir: &Path,
        src_folder: &str,
        mid: &str,
        dst_folder: &str,
        dst_mid: &str,
    ) -> Result<()>;

    async fn get_uid(&self, maildir: &Path, folder: &str, mid: &str) -> Result<u32>;

    /// Forward SEARCH criteria opaquely; the answer is the space-separated
    /// id list to echo after `* SEARCH`.
    async fn search(
        &self,
        maildir: &Path,
        folder: &str,
        charset: &str,
        args: &[String],
    ) -> Result<String>;

    async fn search_uid(
        &self,
        maildir: &Path,
        folder: &str,
        charset: &str,
        args: &[String],
    ) -> Result<String>;

    async fn set_flags(&self, maildir: &Path, folder: &str, mid: &str, flags: Flags)
        -> Result<()>;

    async fn unset_flags(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
    ) -> Result<()>;

    async fn get_flags(&self, maildir: &Path, folder: &str, mid: &str) -> Result<Flags>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ranges() {
        assert_eq!(
            SeqRange::format(&[
                SeqRange { lo: 1, hi: 1 },
                SeqRange { lo: 3, hi: 7 },
                SeqRange { lo: 9, hi: SEQ_STAR },
            ]),
            "1,3:7,9:*"
        );
        assert_eq!(
            SeqRange::format(&[SeqRange {
                lo: SEQ_STAR,
                hi: SEQ_STAR
            }]),
            "*"
        );
    }
}
