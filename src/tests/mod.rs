pub mod basic;
pub mod copy;
pub mod fetch;
pub mod idle;

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::watch,
};

use crate::{
    core::{
        auth::FileAuth,
        client::Core,
        config::Config,
        hub::NotificationHub,
        listener::spawn_listener,
        message::{Flags, Mitem},
    },
    midb::{FolderSummary, MailIndex, MidbError, SeqRange, SEQ_STAR},
};

// ---------------------------------------------------------------------------
// In-memory index service

#[derive(Debug, Clone)]
struct MemMessage {
    uid: u32,
    mid: String,
    flags: Flags,
    #[allow(dead_code)]
    internal_date: i64,
}

#[derive(Debug)]
struct MemFolder {
    uidvalidity: u32,
    uidnext: u32,
    messages: Vec<MemMessage>,
}

impl MemFolder {
    fn new(uidvalidity: u32) -> Self {
        MemFolder {
            uidvalidity,
            uidnext: 1,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemMailbox {
    folders: HashMap<String, MemFolder>,
    subscriptions: HashSet<String>,
}

/// Stand-in for the midb service holding everything in memory. Digests are
/// produced on demand from the EML files under the caller's maildir, the
/// same bytes the server itself reads.
#[derive(Default)]
pub struct MemIndex {
    mailboxes: Mutex<HashMap<PathBuf, MemMailbox>>,
    copies: AtomicUsize,
    /// Fail the Nth copy_mail call (1-based); 0 disables the injection.
    pub fail_copy_at: AtomicUsize,
}

const SPECIAL: [&str; 5] = ["inbox", "draft", "sent", "trash", "junk"];

impl MemIndex {
    pub fn new() -> Self {
        MemIndex::default()
    }

    /// Make the n-th copy_mail call from now on fail.
    pub fn fail_copy_after(&self, n: usize) {
        self.fail_copy_at
            .store(self.copies.load(Ordering::SeqCst) + n, Ordering::SeqCst);
    }

    fn with_folder<T>(
        &self,
        maildir: &Path,
        folder: &str,
        f: impl FnOnce(&mut MemFolder) -> T,
    ) -> Result<T, MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        if !mailbox.folders.contains_key(folder) {
            if SPECIAL.contains(&folder) {
                let uidvalidity = 10_000 + mailbox.folders.len() as u32;
                mailbox
                    .folders
                    .insert(folder.to_string(), MemFolder::new(uidvalidity));
            } else {
                return Err(MidbError::Result(crate::core::reply::MIDB_E_NO_FOLDER));
            }
        }
        Ok(f(mailbox.folders.get_mut(folder).unwrap()))
    }

    fn resolve(ranges: &[SeqRange], max_uid: u32) -> Vec<(u32, u32)> {
        ranges
            .iter()
            .map(|r| {
                let lo = if r.lo == SEQ_STAR { max_uid } else { r.lo };
                let hi = if r.hi == SEQ_STAR { max_uid } else { r.hi };
                if lo <= hi {
                    (lo, hi)
                } else {
                    (hi, lo)
                }
            })
            .collect()
    }

    fn listing(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
        with_digest: bool,
    ) -> Result<Vec<Mitem>, MidbError> {
        let messages = self.with_folder(maildir, folder, |f| f.messages.clone())?;
        let max_uid = messages.iter().map(|m| m.uid).max().unwrap_or(0);
        let resolved = Self::resolve(ranges, max_uid);
        Ok(messages
            .iter()
            .filter(|m| resolved.iter().any(|&(lo, hi)| lo <= m.uid && m.uid <= hi))
            .map(|m| Mitem {
                uid: m.uid,
                mid: m.mid.clone(),
                flags: m.flags,
                id: 0,
                digest: if with_digest {
                    std::fs::read(maildir.join("eml").join(&m.mid))
                        .ok()
                        .and_then(|raw| crate::mjson::digest_message(&raw, &m.mid))
                } else {
                    None
                },
            })
            .collect())
    }
}

#[async_trait]
impl MailIndex for MemIndex {
    async fn summary_folder(
        &self,
        maildir: &Path,
        folder: &str,
    ) -> Result<FolderSummary, MidbError> {
        self.with_folder(maildir, folder, |f| FolderSummary {
            exists: f.messages.len(),
            recent: f
                .messages
                .iter()
                .filter(|m| m.flags.contains(Flags::RECENT))
                .count(),
            unseen: f
                .messages
                .iter()
                .filter(|m| !m.flags.contains(Flags::SEEN))
                .count(),
            uidvalidity: f.uidvalidity,
            uidnext: f.uidnext,
        })
    }

    async fn enum_folders(&self, maildir: &Path) -> Result<Vec<String>, MidbError> {
        let mailboxes = self.mailboxes.lock();
        Ok(mailboxes
            .get(maildir)
            .map(|mb| {
                let mut folders: Vec<String> = mb
                    .folders
                    .keys()
                    .filter(|k| !SPECIAL.contains(&k.as_str()))
                    .cloned()
                    .collect();
                folders.sort();
                folders
            })
            .unwrap_or_default())
    }

    async fn enum_subscriptions(&self, maildir: &Path) -> Result<Vec<String>, MidbError> {
        let mailboxes = self.mailboxes.lock();
        Ok(mailboxes
            .get(maildir)
            .map(|mb| {
                let mut subs: Vec<String> = mb.subscriptions.iter().cloned().collect();
                subs.sort();
                subs
            })
            .unwrap_or_default())
    }

    async fn make_folder(&self, maildir: &Path, folder: &str) -> Result<(), MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        if mailbox.folders.contains_key(folder) || SPECIAL.contains(&folder) {
            return Err(MidbError::Result(crate::core::reply::MIDB_E_FOLDER_EXISTS));
        }
        let uidvalidity = 20_000 + mailbox.folders.len() as u32;
        mailbox
            .folders
            .insert(folder.to_string(), MemFolder::new(uidvalidity));
        Ok(())
    }

    async fn remove_folder(&self, maildir: &Path, folder: &str) -> Result<(), MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        if mailbox.folders.remove(folder).is_none() {
            return Err(MidbError::Result(crate::core::reply::MIDB_E_NO_FOLDER));
        }
        mailbox.subscriptions.remove(folder);
        Ok(())
    }

    async fn rename_folder(
        &self,
        maildir: &Path,
        from: &str,
        to: &str,
    ) -> Result<(), MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        if mailbox.folders.contains_key(to) {
            return Err(MidbError::Result(crate::core::reply::MIDB_E_FOLDER_EXISTS));
        }
        match mailbox.folders.remove(from) {
            Some(state) => {
                mailbox.folders.insert(to.to_string(), state);
                Ok(())
            }
            None => Err(MidbError::Result(crate::core::reply::MIDB_E_NO_FOLDER)),
        }
    }

    async fn subscribe_folder(&self, maildir: &Path, folder: &str) -> Result<(), MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        mailbox.subscriptions.insert(folder.to_string());
        Ok(())
    }

    async fn unsubscribe_folder(&self, maildir: &Path, folder: &str) -> Result<(), MidbError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(maildir.to_path_buf()).or_default();
        mailbox.subscriptions.remove(folder);
        Ok(())
    }

    async fn fetch_simple_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>, MidbError> {
        self.listing(maildir, folder, ranges, false)
    }

    async fn fetch_detail_uid(
        &self,
        maildir: &Path,
        folder: &str,
        ranges: &[SeqRange],
    ) -> Result<Vec<Mitem>, MidbError> {
        self.listing(maildir, folder, ranges, true)
    }

    async fn list_deleted(&self, maildir: &Path, folder: &str) -> Result<Vec<Mitem>, MidbError> {
        let messages = self.with_folder(maildir, folder, |f| f.messages.clone())?;
        Ok(messages
            .iter()
            .filter(|m| m.flags.contains(Flags::DELETED))
            .map(|m| Mitem {
                uid: m.uid,
                mid: m.mid.clone(),
                flags: m.flags,
                id: 0,
                digest: None,
            })
            .collect())
    }

    async fn insert_mail(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
        internal_date: i64,
    ) -> Result<(), MidbError> {
        self.with_folder(maildir, folder, |f| {
            let uid = f.uidnext;
            f.uidnext += 1;
            let mut flags = flags;
            flags.insert(Flags::RECENT);
            f.messages.push(MemMessage {
                uid,
                mid: mid.to_string(),
                flags,
                internal_date,
            });
        })
    }

    async fn remove_mail(
        &self,
        maildir: &Path,
        folder: &str,
        mids: &[String],
    ) -> Result<(), MidbError> {
        self.with_folder(maildir, folder, |f| {
            f.messages.retain(|m| !mids.contains(&m.mid));
        })
    }

    async fn copy_mail(
        &self,
        maildir: &Path,
        src_folder: &str,
        mid: &str,
        dst_folder: &str,
        dst_mid: &str,
    ) -> Result<(), MidbError> {
        let count = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.fail_copy_at.load(Ordering::SeqCst);
        if fail_at != 0 && count == fail_at {
            return Err(MidbError::Result(crate::core::reply::MIDB_E_DISK_ERROR));
        }
        let source = self
            .with_folder(maildir, src_folder, |f| {
                f.messages.iter().find(|m| m.mid == mid).cloned()
            })?
            .ok_or(MidbError::Result(crate::core::reply::MIDB_E_NO_MESSAGE))?;
        self.with_folder(maildir, dst_folder, |f| {
            let uid = f.uidnext;
            f.uidnext += 1;
            f.messages.push(MemMessage {
                uid,
                mid: dst_mid.to_string(),
                flags: source.flags,
                internal_date: source.internal_date,
            });
        })
    }

    async fn get_uid(&self, maildir: &Path, folder: &str, mid: &str) -> Result<u32, MidbError> {
        self.with_folder(maildir, folder, |f| {
            f.messages.iter().find(|m| m.mid == mid).map(|m| m.uid)
        })?
        .ok_or(MidbError::Result(crate::core::reply::MIDB_E_NO_MESSAGE))
    }

    async fn search(
        &self,
        maildir: &Path,
        folder: &str,
        _charset: &str,
        _args: &[String],
    ) -> Result<String, MidbError> {
        let messages = self.with_folder(maildir, folder, |f| f.messages.len())?;
        Ok((1..=messages)
            .map(|seq| seq.to_string())
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn search_uid(
        &self,
        maildir: &Path,
        folder: &str,
        _charset: &str,
        _args: &[String],
    ) -> Result<String, MidbError> {
        let messages = self.with_folder(maildir, folder, |f| f.messages.clone())?;
        Ok(messages
            .iter()
            .map(|m| m.uid.to_string())
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn set_flags(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
    ) -> Result<(), MidbError> {
        self.with_folder(maildir, folder, |f| {
            for message in f.messages.iter_mut().filter(|m| m.mid == mid) {
                message.flags.insert(flags);
            }
        })
    }

    async fn unset_flags(
        &self,
        maildir: &Path,
        folder: &str,
        mid: &str,
        flags: Flags,
    ) -> Result<(), MidbError> {
        self.with_folder(maildir, folder, |f| {
            for message in f.messages.iter_mut().filter(|m| m.mid == mid) {
                message.flags.remove(flags);
            }
        })
    }

    async fn get_flags(&self, maildir: &Path, folder: &str, mid: &str) -> Result<Flags, MidbError> {
        self.with_folder(maildir, folder, |f| {
            f.messages
                .iter()
                .find(|m| m.mid == mid)
                .map(|m| m.flags)
                .unwrap_or_default()
        })
    }
}

// ---------------------------------------------------------------------------
// Server harness

pub struct TestServer {
    pub addr: SocketAddr,
    pub index: Arc<MemIndex>,
    pub temp_dir: PathBuf,
    shutdown_tx: watch::Sender<bool>,
}

impl TestServer {
    pub async fn start(name: &str, port: u16) -> Self {
        let mut temp_dir = std::env::temp_dir();
        temp_dir.push(format!("gwimap-test-{}-{}", name, std::process::id()));
        if temp_dir.exists() {
            std::fs::remove_dir_all(&temp_dir).unwrap();
        }
        let maildir = temp_dir.join("user");
        std::fs::create_dir_all(maildir.join("eml")).unwrap();
        std::fs::create_dir_all(maildir.join("tmp")).unwrap();

        let index = Arc::new(MemIndex::new());
        let auth = Arc::new(FileAuth::from_str(&format!(
            "user@d:pw:{}:en\nadmin@d:pw2:{}:en:user@d\n",
            maildir.display(),
            maildir.display()
        )));
        let core = Arc::new(Core {
            config: Config {
                host_id: "testhost".to_string(),
                default_lang: "en".to_string(),
                support_tls: false,
                force_tls: false,
                enable_rfc2971_commands: true,
                max_auth_times: 3,
                block_auth_fail: 1,
                tls_acceptor: None,
            },
            store: index.clone(),
            auth,
            hub: NotificationHub::new(),
        });
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        spawn_listener(addr, core, false, shutdown_rx).await;
        TestServer {
            addr,
            index,
            temp_dir,
            shutdown_tx,
        }
    }

    pub fn maildir(&self) -> PathBuf {
        self.temp_dir.join("user")
    }

    pub fn stop(self) {
        self.shutdown_tx.send(true).ok();
        if self.temp_dir.exists() {
            std::fs::remove_dir_all(&self.temp_dir).ok();
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted client

pub struct ImapConnection {
    tag: &'static str,
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Tagged,
    Untagged,
    Continuation,
}

impl ImapConnection {
    pub async fn connect(addr: SocketAddr, tag: &'static str) -> Self {
        let (reader, writer) = tokio::io::split(TcpStream::connect(addr).await.unwrap());
        let mut conn = ImapConnection {
            tag,
            reader: BufReader::new(reader),
            writer,
        };
        // greeting
        conn.read(Type::Untagged).await;
        conn
    }

    pub async fn send(&mut self, text: &str) {
        self.writer.write_all(self.tag.as_bytes()).await.unwrap();
        self.writer.write_all(b" ").await.unwrap();
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    async fn next_line(&mut self) -> String {
        let mut line = String::new();
        match tokio::time::timeout(Duration::from_secs(5), async {
            // Literals are length-prefixed; read them verbatim so binary
            // content cannot confuse the line reader.
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.unwrap() == 0 {
                panic!("connection closed by server");
            }
            if let Some(open) = line.rfind('{') {
                if let Some(len) = line[open + 1..]
                    .strip_suffix("}\r\n")
                    .and_then(|v| v.parse::<usize>().ok())
                {
                    let mut literal = vec![0u8; len];
                    self.reader.read_exact(&mut literal).await.unwrap();
                    line.push_str(&String::from_utf8_lossy(&literal));
                }
            }
            line
        })
        .await
        {
            Ok(result) => line.push_str(&result),
            Err(_) => panic!("timeout waiting for server response"),
        }
        line
    }

    /// Read lines until one starts with the expected terminator; returns
    /// all of them.
    pub async fn read(&mut self, t: Type) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.next_line().await;
            let is_done = match t {
                Type::Tagged => line.starts_with(&format!("{} ", self.tag)),
                Type::Untagged => line.starts_with("* "),
                Type::Continuation => line.starts_with("+ "),
            };
            lines.push(line);
            if is_done {
                return lines;
            }
        }
    }

    pub async fn read_assert(&mut self, t: Type, status: &str) -> Vec<String> {
        let lines = self.read(t).await;
        let expected = match t {
            Type::Tagged => format!("{} {}", self.tag, status),
            Type::Untagged => format!("* {}", status),
            Type::Continuation => "+".to_string(),
        };
        assert!(
            lines.last().unwrap().starts_with(&expected),
            "expected {:?}, got {:?}",
            expected,
            lines
        );
        lines
    }
}

pub trait AssertResult {
    fn assert_contains(&self, text: &str) -> &Self;
    fn assert_not_contains(&self, text: &str) -> &Self;
}

impl AssertResult for Vec<String> {
    fn assert_contains(&self, text: &str) -> &Self {
        if self.iter().any(|line| line.contains(text)) {
            self
        } else {
            panic!("expected {:?} in {:?}", text, self);
        }
    }

    fn assert_not_contains(&self, text: &str) -> &Self {
        if self.iter().any(|line| line.contains(text)) {
            panic!("did not expect {:?} in {:?}", text, self);
        }
        self
    }
}

pub const SAMPLE_MESSAGE: &str = "From: Alice <alice@example.com>\r\n\
    To: Bob <bob@example.com>\r\n\
    Subject: test message\r\n\
    Date: Mon, 6 Feb 2023 10:11:12 +0000\r\n\
    Message-ID: <sample-1@example.com>\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    \r\n\
    hello body line one\r\n\
    line two\r\n";
