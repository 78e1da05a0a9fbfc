use super::{AssertResult, ImapConnection, TestServer, Type};

#[tokio::test]
async fn login_select_and_folders() {
    let server = TestServer::start("basic", 19143).await;
    let mut imap = ImapConnection::connect(server.addr, "a").await;

    // wrong phase / bad credentials
    imap.send("SELECT INBOX").await;
    imap.read_assert(Type::Tagged, "BAD").await;
    imap.send("LOGIN user@d wrong").await;
    imap.read_assert(Type::Tagged, "NO").await;

    imap.send("CAPABILITY").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("* CAPABILITY IMAP4rev1");

    imap.send("LOGIN user@d pw").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("[CAPABILITY IMAP4rev1");
    lines.assert_contains("Logged in");

    // select the empty inbox
    imap.send("SELECT INBOX").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("* 0 EXISTS");
    lines.assert_contains("* 0 RECENT");
    lines.assert_contains("* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)");
    lines.assert_contains("[PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)]");
    lines.assert_contains("[UIDVALIDITY ");
    lines.assert_contains("[UIDNEXT 1]");
    lines.assert_not_contains("[UNSEEN");
    assert!(lines.last().unwrap().starts_with("a OK [READ-WRITE] SELECT completed"));

    // folder management
    imap.send("CREATE Archive/2023/Jan").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("CREATE Archive").await;
    imap.read_assert(Type::Tagged, "NO").await;
    imap.send("CREATE INBOX").await;
    imap.read_assert(Type::Tagged, "NO").await;
    imap.send("CREATE Bad%Name").await;
    imap.read_assert(Type::Tagged, "NO").await;

    imap.send("LIST \"\" \"Archive/*\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\"Archive/2023\"");
    lines.assert_contains("\"Archive/2023/Jan\"");
    lines.assert_not_contains("\"/\" \"Archive\"");

    imap.send("LIST \"\" \"Archive/%\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\"Archive/2023\"");
    lines.assert_not_contains("\"Archive/2023/Jan\"");

    imap.send("LIST \"\" \"*\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\"INBOX\"");
    lines.assert_contains("\"Drafts\"");
    lines.assert_contains("\"Sent Items\"");
    lines.assert_contains("\"Deleted Items\"");
    lines.assert_contains("\"Junk E-mail\"");
    lines.assert_contains("(\\HasChildren) \"/\" \"Archive\"");
    lines.assert_contains("(\\HasNoChildren) \"/\" \"Archive/2023/Jan\"");

    imap.send("LIST \"\" \"\"").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("* LIST (\\Noselect) \"/\" \"\"");

    imap.send("LIST (SPECIAL-USE) \"\" \"*\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\\Drafts");
    lines.assert_contains("\\Trash");
    lines.assert_not_contains("Archive");

    imap.send("XLIST \"\" \"*\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\\Inbox");
    lines.assert_contains("\\Junk \\Spam");

    // subscriptions
    imap.send("SUBSCRIBE Archive/2023").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("LSUB \"\" \"*\"").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("* LSUB (\\HasChildren) \"/\" \"Archive/2023\"");
    imap.send("UNSUBSCRIBE Archive/2023").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("LSUB \"\" \"*\"").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_not_contains("Archive/2023");

    // status
    imap.send("STATUS Archive (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)")
        .await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("* STATUS \"Archive\" (MESSAGES 0 RECENT 0 UIDNEXT 1");

    // rename / delete guard rails
    imap.send("RENAME INBOX Other").await;
    imap.read_assert(Type::Tagged, "NO").await;
    imap.send("RENAME Archive/2023/Jan Archive/2023/Feb").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("DELETE Archive").await;
    imap.read_assert(Type::Tagged, "NO").await;
    imap.send("DELETE Archive/2023/Feb").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("DELETE Missing").await;
    imap.read_assert(Type::Tagged, "NO")
        .await
        .assert_contains("[NONEXISTENT]");

    // examine is read-only
    imap.send("EXAMINE INBOX").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("[PERMANENTFLAGS ()]");
    assert!(lines.last().unwrap().contains("[READ-ONLY]"));
    imap.send("EXPUNGE").await;
    imap.read_assert(Type::Tagged, "BAD").await;
    imap.send("UNSELECT").await;
    imap.read_assert(Type::Tagged, "OK").await;

    imap.send("ID (\"name\" \"test\")").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("* ID (\"name\" \"gwimap\"");

    imap.send("LOGOUT").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("* BYE logging out");

    server.stop();
}

#[tokio::test]
async fn impersonation() {
    let server = TestServer::start("impersonation", 19144).await;

    // user@d may open admin@d's store
    let mut imap = ImapConnection::connect(server.addr, "i").await;
    imap.send("LOGIN user@d!admin@d pw").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("SELECT INBOX").await;
    imap.read_assert(Type::Tagged, "OK").await;

    // but not the other way around
    let mut imap = ImapConnection::connect(server.addr, "j").await;
    imap.send("LOGIN admin@d!user@d pw2").await;
    imap.read_assert(Type::Tagged, "NO").await;

    server.stop();
}

#[tokio::test]
async fn authenticate_login_flow() {
    let server = TestServer::start("authlogin", 19145).await;
    let mut imap = ImapConnection::connect(server.addr, "c").await;

    imap.send("AUTHENTICATE LOGIN").await;
    let lines = imap.read(Type::Continuation).await;
    assert!(lines.last().unwrap().starts_with("+ VXNlciBOYW1lAA=="));
    imap.send_raw(&base64::encode("user@d")).await;
    let lines = imap.read(Type::Continuation).await;
    assert!(lines.last().unwrap().starts_with("+ UGFzc3dvcmQA"));
    imap.send_raw(&base64::encode("pw")).await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("Logged in");

    server.stop();
}
