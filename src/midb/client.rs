//! TCP client for the midb service.
//!
//! The wire protocol is line based: one request line, one `TRUE ...` or
//! `FALSE <errcode>` status line, listings as a count followed by that many
//! payload lines. Connections are pooled and reconnected on demand; a
//! connection that errors is dropped rather than returned to the pool.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::Mutex,
    time::timeout,
};
use tracing::debug;

use crate::core::message::{Flags, Mitem};

use super::{FolderSummary, MailIndex, MidbError, Result, SeqRange};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_POOLED: usize = 4;

type Connection = BufReader<TcpStream>;

pub struct MidbClient {
    addr: String,
    pool: Mutex<Vec<Connection>>,
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c == ' ' || c == '"' || c == '\\' || c.is_control())
    {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn parse_status(line: &str) -> Result<&str> {
    if let Some(rest) = line.strip_prefix("TRUE") {
        Ok(rest.trim())
    } else if let Some(rest) = line.strip_prefix("FALSE") {
        Err(MidbError::Result(rest.trim().parse().unwrap_or(0)))
    } else {
        Err(MidbError::ReadWrite)
    }
}

/// `<uid> <mid> <flag-letters> [digest-json]`
fn parse_item(line: &str, with_digest: bool) -> Option<Mitem> {
    let mut fields = line.splitn(if with_digest { 4 } else { 3 }, ' ');
    let uid = fields.next()?.parse().ok()?;
    let mid = fields.next()?.to_string();
    let flags = Flags::from_midb_letters(fields.next()?);
    let digest = if with_digest {
        serde_json::from_str::<serde_json::Value>(fields.next()?)
            .ok()
            .and_then(|v| crate::mjson::Digest::from_value(&v))
    } else {
        None
    };
    Some(Mitem {
        uid,
        mid,
        flags,
        id: 0,
        digest,
    })
}

impl MidbClient {
    pub fn new(addr: impl Into<String>) -> Self {
        MidbClient {
            addr: addr.into(),
            pool: Mutex::new(Vec::new()),
        }
    }

    async fn acquire(&self) -> Result<Connection> {
        if let Some(conn) = self.pool.lock().await.pop() {
            return Ok(conn);
        }
        match timeout(RPC_TIMEOUT, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(BufReader::new(stream)),
            Ok(Err(err)) => {
                debug!("midb connect to {} failed: {}", self.addr, err);
                Err(MidbError::NoServer)
            }
            Err(_) => Err(MidbError::NoServer),
        }
    }

    async fn release(&self, conn: Connection) {
        let mut pool = self.pool.lock().await;
        if pool.len() < MAX_POOLED {
            pool.push(conn);
        }
    }

    /// One request/response round trip. `payload_lines` is Some for listing
    /// verbs whose status line carries the line count.
    async fn transact(&self, line: String, listing: bool) -> Result<(String, Vec<String>)> {
        let mut conn = self.acquire().await?;
        let result = timeout(RPC_TIMEOUT, async {
            conn.get_mut()
                .write_all(line.as_bytes())
                .await
                .map_err(|_| MidbError::ReadWrite)?;
            let mut status = String::new();
            if conn
                .read_line(&mut status)
                .await
                .map_err(|_| MidbError::ReadWrite)?
                == 0
            {
                return Err(MidbError::ReadWrite);
            }
            let rest = parse_status(status.trim_end())?.to_string();
            let mut lines = Vec::new();
            if listing {
                let count: usize = rest.parse().map_err(|_| MidbError::ReadWrite)?;
                if count > 1_000_000 {
                    return Err(MidbError::TooManyResults);
                }
                for _ in 0..count {
                    let mut payload = String::new();
                    if conn
                        .read_line(&mut payload)
                        .await
                        .map_err(|_| MidbError::ReadWrite)?
                        == 0
                    {
                        return Err(MidbError::ReadWrite);
                    }
                    while payload.ends_with('\n') || payload.ends_with('\r') {
                        payload.pop();
                    }
                    lines.push(payload);
                }
            }
            Ok((rest, lines))
        })
        .await
        .unwrap_or(Err(MidbError::ReadWrite));

        match result {
            Ok(ok) => {
                self.release(conn).await;
                Ok(ok)
            }
            // Result errors leave the connection in a sane state.
            Err(MidbError::Result(code)) => {
                self.release(conn).await;
                Err(MidbError::Result(code))
            }
            Err(err) => Err(err),
        }
    }

    fn line(verb: &str, maildir: &Path, args: &[&str]) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(verb);
        out.push(' ');
        out.push_str(&quote_arg(&maildir.to_string_lossy()));
        for arg in args {
            out.push(' ');
            out.push_str(&quote_arg(arg));
        }
        out.push_str("\r\n");
        out
    }

    async fn simple(&self, verb: &str, maildir: &Path, args: &[&str]) -> Result<()> {
        self.transact(Self::line(verb, maildir, args), false)
            .await
            .map(|_| ())
    }

    async fn fetch_items(
        &self,
        verb: &str,
        maildir: &Path,
        args: &[&str],
        with_digest: bool,
    ) -> Result<Vec<Mitem>> {
        let (_, lines) = self.transact(Self::line(verb, maildir, args), true).await?;
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            match parse_item(line, with_digest) {
                Some(item) => items.push(item),
                None => return Err(MidbError::ReadWrite),
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl MailIndex for MidbClient {
    async fn summary_folder(&self, maildir: &Path, folder: &str) -> Result<FolderSummary> {
        let (rest, _) = self
            .transact(Self::line("P-FDDT", maildir, &[folder]), false)
            .await?;
        let mut fields = rest.split_whitespace();
        let mut next = || -> Result<u32> {
            fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or(MidbError::ReadWrite)
        };
        Ok(FolderSummary {
            exists: next()? as usize,
            recent: next()? as usize,
            unseen: next()? as usize,
            uidvalidity: next()?,
            uidnext: next()?,
        })
    }

    async fn enum_folders(&self, maildir: &Path) -> Result<Vec<String>> {
        let (_, lines) = self
            .transact(Self::line("M-ENUM", maildir, &[]), true)
            .await?;
        Ok(lines)
    }

    async fn enum_subscriptions(&self, maildir: &Path) -> Result<Vec<String>> {
        let (_, lines) = self
            .transact(Self::line("M-SUBL", maildir, &[]), true)
            .await?;
        Ok(lines)
    }

    async fn make_folder(&self, maildir: &Path, folder: &str) -> Result<()> {
        self.simple("M-MAKF", maildir, &[folder]).await
    }

    async fn remove_folder(&self, maildir: &Path, folder: &str) -> Result<()> {
        self.simple("M-REMF", maildir, &[folder]).await
    }

    async fn rename_folder(&self, maildir: &Path, from: &str, to: &str) -> Result<()> {
        self.simple("M-RENF", maildir, &[from, to]).await
    }

    async fn subscribe_folder(&self, maildir: &Path, folder: &str) -> Result<()> {
        self.simple("P-SUBF", maildir, &[folder]).await
    }

    async fn unsubscribe_folder(&self, maildir: &Path, folder: &str) -> Result<()> {
        self.simple("P-UNSF", maildir, &[folder]).await
    }

    async fn fetch_simple_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>> {
        self.fetch_items("P-SIMU", maildir, &[folder, &SeqRange::format(ranges)], false)
            .await
    }

    async fn fetch_detail_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>> {
        self.fetch_items("P-DTLU", maildir, &[folder, &SeqRange::format(ranges)], true)
            .await
    }

    async fn list_deleted(&self, maildir: &Path, folder: &str) -> Result<Vec<Mitem>> {
        self.fetch_items("P-DELL", maildir, &[folder], false).await
    }

    async fn insert_mail(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
        internal_date: i64,
    ) -> Result<()> {
        self.simple(
            "M-INST",
            maildir,
            &[
                folder,
                mid,
                &flags.to_midb_letters(),
                &internal_date.to_string(),
            ],
        )
        .await
    }

    async fn remove_mail(&self, maildir: &Path, folder: &str, mids: &[String]) -> Result<()> {
        if mids.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = Vec::with_capacity(mids.len() + 1);
        args.push(folder);
        args.extend(mids.iter().map(String::as_str));
        self.simple("M-DELE", maildir, &args).await
    }

    async fn copy_mail(
        &self,
        maildir: &Path,
        src_folder: &str,
        mid: &str,
        dst_folder: &str,
        dst_mid: &str,
    ) -> Result<()> {
        self.simple("M-COPY", maildir, &[src_folder, mid, dst_folder, dst_mid])
            .await
    }

    async fn get_uid(&self, maildir: &Path, folder: &str, mid: &str) -> Result<u32> {
        let (rest, _) = self
            .transact(Self::line("P-UNID", maildir, &[folder, mid]), false)
            .await?;
        rest.trim().parse().map_err(|_| MidbError::ReadWrite)
    }

    async fn search(
        &self,
        maildir: &Path,
        folder: &str,
        charset: &str,
        args: &[String],
    ) -> Result<String> {
        let mut wire: Vec<&str> = Vec::with_capacity(args.len() + 2);
        wire.push(folder);
        wire.push(charset);
        wire.extend(args.iter().map(String::as_str));
        let (rest, _) = self
            .transact(Self::line("P-SRHL", maildir, &wire), false)
            .await?;
        Ok(rest)
    }

    async fn search_uid(
        &self,
        maildir: &Path,
        folder: &str,
        charset: &str,
        args: &[String],
    ) -> Result<String> {
        let mut wire: Vec<&str> = Vec::with_capacity(args.len() + 2);
        wire.push(folder);
        wire.push(charset);
        wire.extend(args.iter().map(String::as_str));
        let (rest, _) = self
            .transact(Self::line("P-SRHU", maildir, &wire), false)
            .await?;
        Ok(rest)
    }

    async fn set_flags(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
    ) -> Result<()> {
        self.simple("P-SFLG", maildir, &[folder, mid, &flags.to_midb_letters()])
            .await
    }

    async fn unset_flags(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
    ) -> Result<()> {
        self.simple("P-RFLG", maildir, &[folder, mid, &flags.to_midb_letters()])
            .await
    }

    async fn get_flags(&self, maildir: &Path, folder: &str, mid: &str) -> Result<Flags> {
        let (rest, _) = self
            .transact(Self::line("P-GFLG", maildir, &[folder, mid]), false)
            .await?;
        Ok(Flags::from_midb_letters(&rest))
    }
}
