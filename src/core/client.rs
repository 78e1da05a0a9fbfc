use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use tokio::{
    io::{AsyncWriteExt, WriteHalf},
    net::TcpStream,
    sync::mpsc,
};
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

use crate::midb::{MailIndex, SeqRange, SEQ_STAR};

use super::{
    auth::{Authenticator, UserMeta},
    config::Config,
    hub::{EventQueue, HubEvent, NotificationHub},
    message::ContentArray,
    receiver::{self, Receiver, Request},
    reply::ReplyCode,
    writer, Command, Reply,
};

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);
static MID_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Process-wide monotone counter used in generated message ids; wraps
/// around.
pub fn next_mid_sequence() -> u32 {
    MID_SEQUENCE
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.wrapping_add(1))
        })
        .unwrap_or(0)
        .wrapping_add(1)
}

pub struct Core {
    pub config: Config,
    pub store: Arc<dyn MailIndex>,
    pub auth: Arc<dyn Authenticator>,
    pub hub: NotificationHub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoAuth,
    /// AUTHENTICATE LOGIN, waiting for the base64 username line.
    Username,
    /// AUTHENTICATE LOGIN, waiting for the base64 password line.
    Password,
    Auth,
    Select,
}

pub struct Selected {
    /// Internal folder name.
    pub folder: String,
    pub read_only: bool,
    pub contents: ContentArray,
    pub last_exists: usize,
    pub last_recent: usize,
}

/// APPEND between the literal header and finalisation: the message octets
/// stream into a framed scratch file under `maildir/tmp/`.
pub struct AppendState {
    pub file: Option<tokio::fs::File>,
    pub path: PathBuf,
    pub mid: String,
    pub remaining: usize,
    pub tag: String,
    /// Set when the begin phase failed; the literal is still consumed and
    /// this reply sent afterwards.
    pub failure: Option<Reply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestResult {
    Continue,
    Close,
    StartTls,
}

enum AppendProgress {
    NeedMore,
    Finished,
}

pub struct Session {
    pub core: Arc<Core>,
    pub receiver: Receiver,
    pub peer_addr: SocketAddr,
    pub is_tls: bool,
    pub writer: mpsc::Sender<writer::Event>,
    pub session_id: u64,
    pub phase: Phase,
    pub auth_failures: u32,
    /// Primary (audit) identity; differs from `user` under impersonation.
    pub login_user: String,
    /// Base64-decoded username collected during AUTHENTICATE LOGIN.
    pub pending_user: String,
    pub user: Option<UserMeta>,
    pub charset: &'static str,
    pub saved_tag: String,
    pub selected: Option<Selected>,
    pub append: Option<AppendState>,
    pub idling: bool,
    line_buf: Vec<u8>,
    events: EventQueue,
    ping_tx: mpsc::UnboundedSender<()>,
    pending_tls: bool,
}

impl Session {
    pub fn new(
        core: Arc<Core>,
        peer_addr: SocketAddr,
        is_tls: bool,
    ) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (ping_tx, ping_rx) = mpsc::unbounded_channel();
        (
            Session {
                core,
                receiver: Receiver::new(),
                peer_addr,
                is_tls,
                writer: writer::spawn_writer(),
                session_id: SESSION_IDS.fetch_add(1, Ordering::Relaxed),
                phase: Phase::NoAuth,
                auth_failures: 0,
                login_user: String::new(),
                pending_user: String::new(),
                user: None,
                charset: "us-ascii",
                saved_tag: String::new(),
                selected: None,
                append: None,
                idling: false,
                line_buf: Vec::new(),
                events: EventQueue::default(),
                ping_tx,
                pending_tls: false,
            },
            ping_rx,
        )
    }

    pub fn is_authed(&self) -> bool {
        matches!(self.phase, Phase::Auth | Phase::Select)
    }

    pub fn user_meta(&self) -> &UserMeta {
        self.user.as_ref().expect("authenticated session")
    }

    pub fn maildir(&self) -> PathBuf {
        self.user_meta().maildir.clone()
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    pub fn hub_endpoint(&self) -> (EventQueue, mpsc::UnboundedSender<()>) {
        (self.events.clone(), self.ping_tx.clone())
    }

    pub async fn set_stream(&mut self, stream_tx: WriteHalf<TcpStream>) -> bool {
        self.writer
            .send(writer::Event::Stream(stream_tx))
            .await
            .is_ok()
    }

    pub async fn set_stream_tls(&mut self, stream_tx: WriteHalf<TlsStream<TcpStream>>) -> bool {
        self.is_tls = true;
        self.writer
            .send(writer::Event::StreamTls(stream_tx))
            .await
            .is_ok()
    }

    pub async fn write_bytes(&mut self, bytes: Vec<u8>) -> Result<(), ()> {
        self.writer
            .send(writer::Event::Bytes(bytes))
            .await
            .map_err(|err| {
                debug!("Failed to queue bytes: {}", err);
            })
    }

    /// Queue response text; a dead writer converts into a closing reply so
    /// `?` unwinds the handler.
    pub async fn emit(&mut self, text: impl Into<Vec<u8>>) -> crate::core::Result<()> {
        self.write_bytes(text.into())
            .await
            .map_err(|_| Reply::done().and_close())
    }

    pub async fn write_fragments(&mut self, fragments: Vec<writer::Fragment>) -> Result<(), ()> {
        self.writer
            .send(writer::Event::Fragments(fragments))
            .await
            .map_err(|err| {
                debug!("Failed to queue fragments: {}", err);
            })
    }

    /// Hub wake-up seen by the connection loop. The queued events are only
    /// echoed right away while idling; otherwise they wait for the next
    /// echo point.
    pub async fn on_hub_ping(&mut self) {
        if self.idling {
            self.echo_modify().await;
        }
    }

    pub async fn ingest(&mut self, bytes: &[u8]) -> IngestResult {
        let mut iter = bytes.iter();
        loop {
            if self.append.is_some() {
                match self.feed_append(&mut iter).await {
                    AppendProgress::NeedMore => return IngestResult::Continue,
                    AppendProgress::Finished => {
                        let state = self.append.take().unwrap();
                        match state.failure {
                            Some(reply) => {
                                if let Some(file) = state.file {
                                    drop(file);
                                }
                                if let Err(err) = std::fs::remove_file(&state.path) {
                                    if err.kind() != std::io::ErrorKind::NotFound {
                                        warn!("remove {}: {}", state.path.display(), err);
                                    }
                                }
                                let tag = state.tag.clone();
                                if self.send_reply(&tag, reply).await {
                                    return IngestResult::Close;
                                }
                            }
                            None => {
                                if self.append_end(state).await {
                                    return IngestResult::Close;
                                }
                            }
                        }
                        continue;
                    }
                }
            }
            if self.idling || matches!(self.phase, Phase::Username | Phase::Password) {
                match self.collect_line(&mut iter) {
                    Some(line) => {
                        if self.handle_raw_line(line).await {
                            return IngestResult::Close;
                        }
                        continue;
                    }
                    None => return IngestResult::Continue,
                }
            }
            match self.receiver.parse(&mut iter) {
                Ok(request) => match self.dispatch(request).await {
                    IngestResult::Continue => (),
                    other => return other,
                },
                Err(receiver::Error::NeedsMoreData) => return IngestResult::Continue,
                Err(receiver::Error::NeedsLiteral { size, sync }) => {
                    if self.receiver.pending_command() == Some(Command::Append) {
                        let request = self.receiver.take_pending();
                        self.append_begin(request, size).await;
                    }
                    if sync
                        && self
                            .write_bytes(b"+ ready for additional command text\r\n".to_vec())
                            .await
                            .is_err()
                    {
                        return IngestResult::Close;
                    }
                }
                Err(receiver::Error::Error { tag, reply }) => {
                    if self.send_reply(&tag, reply).await {
                        return IngestResult::Close;
                    }
                }
            }
        }
    }

    fn collect_line(&mut self, iter: &mut std::slice::Iter<'_, u8>) -> Option<Vec<u8>> {
        for &byte in iter {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line_buf);
                if line.ends_with(b"\r") {
                    line.pop();
                }
                return Some(line);
            }
            if self.line_buf.len() < 4096 {
                self.line_buf.push(byte);
            }
        }
        None
    }

    async fn handle_raw_line(&mut self, line: Vec<u8>) -> bool {
        if self.idling {
            return self.handle_idle_line(&line).await;
        }
        match self.phase {
            Phase::Username => self.handle_username_line(&line).await,
            Phase::Password => self.handle_password_line(&line).await,
            _ => false,
        }
    }

    async fn dispatch(&mut self, request: Request) -> IngestResult {
        let tag = request.tag.clone();
        let result = match request.command {
            Command::Capability => self.handle_capability(request).await,
            Command::Id => self.handle_id(request).await,
            Command::Noop => self.handle_noop(request).await,
            Command::Logout => self.handle_logout(request).await,
            Command::StartTls => self.handle_starttls(request).await,
            Command::Authenticate => self.handle_authenticate(request).await,
            Command::Login => self.handle_login(request).await,
            Command::Select => self.handle_select(request, false).await,
            Command::Examine => self.handle_select(request, true).await,
            Command::Create => self.handle_create(request).await,
            Command::Delete => self.handle_delete(request).await,
            Command::Rename => self.handle_rename(request).await,
            Command::Subscribe => self.handle_subscribe(request, true).await,
            Command::Unsubscribe => self.handle_subscribe(request, false).await,
            Command::List => self.handle_list(request, false).await,
            Command::Xlist => self.handle_list(request, true).await,
            Command::Lsub => self.handle_lsub(request).await,
            Command::Status => self.handle_status(request).await,
            Command::Append => self.handle_append_inline(request).await,
            Command::Idle => self.handle_idle(request).await,
            Command::Check => self.handle_check(request).await,
            Command::Close => self.handle_close(request).await,
            Command::Unselect => self.handle_unselect(request).await,
            Command::Expunge(is_uid) => self.handle_expunge(request, is_uid).await,
            Command::Search(is_uid) => self.handle_search(request, is_uid).await,
            Command::Fetch(is_uid) => self.handle_fetch(request, is_uid).await,
            Command::Store(is_uid) => self.handle_store(request, is_uid).await,
            Command::Copy(is_uid) => self.handle_copy(request, is_uid).await,
        };
        let reply = match result {
            Ok(reply) => reply,
            Err(reply) => reply,
        };
        let close = self.send_reply(&tag, reply).await;
        if close {
            IngestResult::Close
        } else if self.pending_tls {
            self.pending_tls = false;
            IngestResult::StartTls
        } else {
            IngestResult::Continue
        }
    }

    pub fn request_tls_upgrade(&mut self) {
        self.pending_tls = true;
    }

    /// Unpack a reply: pick the tag, decorate TRYCREATE, append the
    /// extended error text, write the line. Returns true when the
    /// connection must close.
    pub async fn send_reply(&mut self, tag: &str, reply: Reply) -> bool {
        let close = reply.close;
        if let Some(code) = reply.code {
            let tag = if reply.use_saved_tag {
                if self.saved_tag.is_empty() {
                    "BUG"
                } else {
                    self.saved_tag.as_str()
                }
            } else if tag.is_empty() {
                "*"
            } else {
                tag
            };
            let text = code.text();
            let extra = reply.extra.as_deref().unwrap_or("");
            let line = if reply.try_create {
                let stripped = text.strip_prefix("NO ").unwrap_or(text);
                format!("{} NO [TRYCREATE] {}{}\r\n", tag, stripped, extra)
            } else {
                format!("{} {}{}\r\n", tag, text, extra)
            };
            if self.write_bytes(line.into_bytes()).await.is_err() {
                return true;
            }
        }
        close
    }

    /// Refresh the selected view from the index service. Fresh numbering on
    /// SELECT/EXAMINE, append-only otherwise.
    pub async fn refresh_view(&mut self, fresh_numbers: bool) -> crate::core::Result<()> {
        let maildir = self.maildir();
        let folder = match &self.selected {
            Some(selected) => selected.folder.clone(),
            None => return Ok(()),
        };
        let listing = self
            .core
            .store
            .fetch_simple_uid(
                &maildir,
                &folder,
                &[SeqRange {
                    lo: 1,
                    hi: SEQ_STAR,
                }],
            )
            .await?;
        if let Some(selected) = &mut self.selected {
            selected.contents.ingest(listing, fresh_numbers);
        }
        Ok(())
    }

    /// Echo point: deliver pending broadcast lines and the latest
    /// EXISTS/RECENT totals before the handler's tagged reply goes out.
    pub async fn echo_modify(&mut self) {
        if self.selected.is_none() {
            self.events.lock().clear();
            return;
        }
        let events: Vec<HubEvent> = self.events.lock().drain(..).collect();
        let mut buf = String::new();
        for event in events {
            match event {
                // Covered by the unconditional totals check below.
                HubEvent::Touch => (),
                HubEvent::Flags { uid } => {
                    let (maildir, folder, mid) = {
                        let selected = self.selected.as_ref().unwrap();
                        match selected.contents.get_itemx(uid) {
                            Some(item) => (
                                self.maildir(),
                                selected.folder.clone(),
                                item.mid.clone(),
                            ),
                            None => continue,
                        }
                    };
                    if let Ok(flags) = self.core.store.get_flags(&maildir, &folder, &mid).await
                    {
                        let selected = self.selected.as_mut().unwrap();
                        if let Some(item) = selected.contents.get_itemx_mut(uid) {
                            item.flags = flags;
                            buf.push_str(&format!(
                                "* {} FETCH (UID {} FLAGS {})\r\n",
                                item.id,
                                uid,
                                flags.to_imap_string()
                            ));
                        }
                    }
                }
                HubEvent::Expunge { uids } => {
                    let selected = self.selected.as_mut().unwrap();
                    let mut seqs: Vec<(u32, u32)> = uids
                        .iter()
                        .filter_map(|&uid| {
                            selected.contents.get_itemx(uid).map(|item| (item.id, uid))
                        })
                        .collect();
                    // Descending order so the peer can apply them directly.
                    seqs.sort_by(|a, b| b.0.cmp(&a.0));
                    for (seq, uid) in seqs {
                        selected.contents.remove_uid(uid);
                        buf.push_str(&format!("* {} EXPUNGE\r\n", seq));
                    }
                    selected.last_exists = selected.contents.n_exists();
                    selected.last_recent = selected.contents.n_recent;
                }
            }
        }
        // Always re-check the totals; a Touch may still be in flight.
        if self.refresh_view(false).await.is_ok() {
            let selected = self.selected.as_mut().unwrap();
            let exists = selected.contents.n_exists();
            let recent = selected.contents.n_recent;
            if exists > selected.last_exists {
                buf.push_str(&format!("* {} EXISTS\r\n", exists));
                selected.last_exists = exists;
            }
            if recent != selected.last_recent {
                buf.push_str(&format!("* {} RECENT\r\n", recent));
                selected.last_recent = recent;
            }
        }
        if !buf.is_empty() {
            let _ = self.write_bytes(buf.into_bytes()).await;
        }
    }

    /// Leave the selected state: deregister from the hub and drop the view.
    pub fn leave_selected(&mut self) {
        if self.selected.take().is_some() {
            self.core.hub.unregister(self.session_id);
        }
        self.events.lock().clear();
        if self.phase == Phase::Select {
            self.phase = Phase::Auth;
        }
    }

    /// Connection teardown: deregister and remove any APPEND scratch file.
    pub fn teardown(&mut self) {
        self.core.hub.unregister(self.session_id);
        if let Some(state) = self.append.take() {
            drop(state.file);
            if let Err(err) = std::fs::remove_file(&state.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("remove {}: {}", state.path.display(), err);
                }
            }
        }
    }

    async fn feed_append(&mut self, iter: &mut std::slice::Iter<'_, u8>) -> AppendProgress {
        let state = self.append.as_mut().unwrap();
        if state.remaining > 0 {
            let avail = iter.as_slice();
            if avail.is_empty() {
                return AppendProgress::NeedMore;
            }
            let take = state.remaining.min(avail.len());
            if let Some(file) = state.file.as_mut() {
                if let Err(err) = file.write_all(&avail[..take]).await {
                    warn!("write {}: {}", state.path.display(), err);
                    state.file = None;
                    if state.failure.is_none() {
                        state.failure = Some(Reply::of(ReplyCode::SaveMessageError));
                    }
                }
            }
            state.remaining -= take;
            iter.nth(take - 1);
            if state.remaining > 0 {
                return AppendProgress::NeedMore;
            }
        }
        // Skip the rest of the command line after the literal.
        loop {
            match iter.next() {
                Some(&b'\n') => return AppendProgress::Finished,
                Some(_) => (),
                None => return AppendProgress::NeedMore,
            }
        }
    }
}
