/// Untagged responses for SELECT/EXAMINE, followed by the tagged OK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub exists: usize,
    pub recent: usize,
    /// 1-based sequence number of the first unseen message, 0 when all seen.
    pub first_unseen: u32,
    pub uid_validity: u32,
    pub uid_next: u32,
    pub read_only: bool,
}

impl Response {
    pub fn serialize(&self, tag: &str) -> String {
        let mut buf = String::with_capacity(256);
        buf.push_str(&format!("* {} EXISTS\r\n", self.exists));
        buf.push_str(&format!("* {} RECENT\r\n", self.recent));
        buf.push_str("* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n");
        if self.read_only {
            buf.push_str("* OK [PERMANENTFLAGS ()] no permanent flags permitted\r\n");
        } else {
            buf.push_str(
                "* OK [PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)] limited\r\n",
            );
        }
        if self.first_unseen != 0 {
            buf.push_str(&format!(
                "* OK [UNSEEN {}] message {} is first unseen\r\n",
                self.first_unseen, self.first_unseen
            ));
        }
        buf.push_str(&format!(
            "* OK [UIDVALIDITY {}] UIDs valid\r\n* OK [UIDNEXT {}] predicted next UID\r\n",
            self.uid_validity, self.uid_next
        ));
        buf.push_str(&format!(
            "{} OK [{}] {} completed\r\n",
            tag,
            if self.read_only { "READ-ONLY" } else { "READ-WRITE" },
            if self.read_only { "EXAMINE" } else { "SELECT" },
        ));
        buf
    }
}
