//! Cross-session notification hub.
//!
//! Every session that has a mailbox selected registers here; state-changing
//! handlers broadcast so that sessions with the same (user, folder)
//! selection emit EXISTS/RECENT, FETCH FLAGS and EXPUNGE lines at their
//! next echo point. Events land in a per-session queue that the session
//! drains synchronously when echoing; the ping channel only wakes the
//! connection loop so an idling session echoes immediately.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Folder contents changed; re-run the view refresh.
    Touch,
    /// Flags of one message changed.
    Flags { uid: u32 },
    /// Messages were expunged.
    Expunge { uids: Vec<u32> },
}

pub type EventQueue = Arc<Mutex<VecDeque<HubEvent>>>;

struct Registration {
    session_id: u64,
    user: String,
    folder: String,
    queue: EventQueue,
    ping: mpsc::UnboundedSender<()>,
}

#[derive(Default)]
pub struct NotificationHub {
    select_list: Mutex<Vec<Registration>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        NotificationHub::default()
    }

    pub fn register(
        &self,
        session_id: u64,
        user: &str,
        folder: &str,
        queue: EventQueue,
        ping: mpsc::UnboundedSender<()>,
    ) {
        let mut list = self.select_list.lock();
        list.retain(|r| r.session_id != session_id);
        list.push(Registration {
            session_id,
            user: user.to_string(),
            folder: folder.to_string(),
            queue,
            ping,
        });
    }

    pub fn unregister(&self, session_id: u64) {
        self.select_list
            .lock()
            .retain(|r| r.session_id != session_id);
    }

    fn send(&self, originator: Option<u64>, user: &str, folder: &str, event: HubEvent) {
        let mut list = self.select_list.lock();
        list.retain(|r| {
            if Some(r.session_id) == originator || r.user != user || r.folder != folder {
                return true;
            }
            r.queue.lock().push_back(event.clone());
            // A closed ping channel means the session is gone.
            r.ping.send(()).is_ok()
        });
    }

    /// Wake every matching session so it refreshes its view.
    pub fn bcast_touch(&self, originator: Option<u64>, user: &str, folder: &str) {
        self.send(originator, user, folder, HubEvent::Touch);
    }

    /// Flag change on one message; the originator already reported to its
    /// own client.
    pub fn bcast_flags(&self, originator: u64, user: &str, folder: &str, uid: u32) {
        self.send(Some(originator), user, folder, HubEvent::Flags { uid });
    }

    /// Expunged UID batch, delivered to all matching sessions including the
    /// originator, which picks its own lines up at the echo point right
    /// before its tagged reply.
    pub fn bcast_expunge(&self, user: &str, folder: &str, uids: Vec<u32>) {
        self.send(None, user, folder, HubEvent::Expunge { uids });
    }
}
