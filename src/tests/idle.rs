use super::{AssertResult, ImapConnection, TestServer, Type, SAMPLE_MESSAGE};

#[tokio::test]
async fn idle_wakes_on_new_mail() {
    let server = TestServer::start("idle", 19154).await;
    let mut imap_a = ImapConnection::connect(server.addr, "a").await;
    let mut imap_b = ImapConnection::connect(server.addr, "b").await;
    for imap in [&mut imap_a, &mut imap_b] {
        imap.send("LOGIN user@d pw").await;
        imap.read_assert(Type::Tagged, "OK").await;
        imap.send("SELECT INBOX").await;
        imap.read_assert(Type::Tagged, "OK").await;
    }

    imap_a.send("IDLE").await;
    let lines = imap_a.read(Type::Continuation).await;
    assert!(lines.last().unwrap().starts_with("+ idling"));

    // B appends; A is woken up without issuing a command
    imap_b
        .send(&format!(
            "APPEND INBOX {{{}+}}\r\n{}",
            SAMPLE_MESSAGE.len(),
            SAMPLE_MESSAGE
        ))
        .await;
    imap_b.read_assert(Type::Tagged, "OK").await;

    let lines = imap_a.read(Type::Untagged).await;
    lines.assert_contains("* 1 EXISTS");

    imap_a.send_raw("DONE").await;
    let lines = imap_a.read(Type::Tagged).await;
    assert!(lines.last().unwrap().starts_with("a OK IDLE completed"));

    // a second idle terminated by garbage
    imap_a.send("IDLE").await;
    imap_a.read(Type::Continuation).await;
    imap_a.send_raw("NONSENSE").await;
    let lines = imap_a.read(Type::Tagged).await;
    assert!(lines.last().unwrap().starts_with("a BAD expected DONE"));

    server.stop();
}
