use super::{AssertResult, ImapConnection, TestServer, Type, SAMPLE_MESSAGE};

#[tokio::test]
async fn copy_and_rollback() {
    let server = TestServer::start("copy", 19151).await;
    let mut imap = ImapConnection::connect(server.addr, "h").await;
    imap.send("LOGIN user@d pw").await;
    imap.read_assert(Type::Tagged, "OK").await;
    for _ in 0..3 {
        imap.send(&format!(
            "APPEND INBOX {{{}+}}\r\n{}",
            SAMPLE_MESSAGE.len(),
            SAMPLE_MESSAGE
        ))
        .await;
        imap.read_assert(Type::Tagged, "OK").await;
    }
    imap.send("CREATE Archive").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("SELECT INBOX").await;
    imap.read_assert(Type::Tagged, "OK").await;

    // full copy succeeds and reports the uid pairing
    imap.send("COPY 1:3 Archive").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("[COPYUID ");
    lines.assert_contains(" 1,2,3 1,2,3]");
    imap.send("STATUS Archive (MESSAGES)").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("(MESSAGES 3)");

    // a mid-batch failure rolls the destination back
    imap.send("CREATE Staging").await;
    imap.read_assert(Type::Tagged, "OK").await;
    server.index.fail_copy_after(2);
    imap.send("COPY 1:3 Staging").await;
    let lines = imap.read_assert(Type::Tagged, "NO").await;
    assert!(lines.last().unwrap().starts_with("h NO COPY failed"));
    imap.send("STATUS Staging (MESSAGES)").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("(MESSAGES 0)");

    // UID COPY into a missing folder reports the midb error
    imap.send("UID COPY 1 Missing").await;
    imap.read_assert(Type::Tagged, "NO").await;

    server.stop();
}
