use super::{AssertResult, ImapConnection, TestServer, Type, SAMPLE_MESSAGE};

const NESTED_MESSAGE: &str = "From: outer@example.com\r\n\
    Subject: carrier\r\n\
    MIME-Version: 1.0\r\n\
    Content-Type: multipart/mixed; boundary=OUTER\r\n\
    \r\n\
    --OUTER\r\n\
    Content-Type: text/plain\r\n\
    \r\n\
    see attachment\r\n\
    --OUTER\r\n\
    Content-Type: message/rfc822\r\n\
    \r\n\
    From: inner@example.com\r\n\
    Subject: the inner one\r\n\
    Content-Type: text/plain\r\n\
    \r\n\
    inner body\r\n\
    --OUTER--\r\n";

#[tokio::test]
async fn fetch_attributes_and_sections() {
    let server = TestServer::start("fetch", 19152).await;
    let mut imap = ImapConnection::connect(server.addr, "f").await;
    imap.send("LOGIN user@d pw").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send(&format!(
        "APPEND INBOX {{{}+}}\r\n{}",
        SAMPLE_MESSAGE.len(),
        SAMPLE_MESSAGE
    ))
    .await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("SELECT INBOX").await;
    imap.read_assert(Type::Tagged, "OK").await;

    // metadata attributes
    imap.send("FETCH 1 (FLAGS INTERNALDATE RFC822.SIZE ENVELOPE)")
        .await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains(&format!("RFC822.SIZE {}", SAMPLE_MESSAGE.len()));
    lines.assert_contains("INTERNALDATE \"");
    lines.assert_contains("\"test message\"");
    lines.assert_contains("(\"Alice\" NIL \"alice\" \"example.com\")");

    // macro expansion keeps UID in front
    imap.send("FETCH 1 FAST").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("FETCH (UID 1 FLAGS ");

    // peek does not mark seen
    imap.send("FETCH 1 BODY.PEEK[HEADER.FIELDS (Subject)]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("Subject: test message");
    imap.send("FETCH 1 (FLAGS)").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_not_contains("\\Seen");

    // a body read does mark seen, exactly once
    imap.send("FETCH 1 BODY[TEXT]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("hello body line one");
    imap.send("FETCH 1 (FLAGS)").await;
    imap.read_assert(Type::Tagged, "OK")
        .await
        .assert_contains("\\Seen");

    // whole message and header section
    imap.send("FETCH 1 BODY[]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains(&format!("BODY[] {{{}}}", SAMPLE_MESSAGE.len()));
    lines.assert_contains("From: Alice <alice@example.com>");
    imap.send("FETCH 1 BODY.PEEK[HEADER]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("Message-ID: <sample-1@example.com>");

    // octet windows clamp against the part length
    imap.send("FETCH 1 BODY.PEEK[]<0.5>").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("BODY[]<0> {5}");
    imap.send("FETCH 1 BODY.PEEK[]<999999.5>").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("BODY[]<999999> NIL");

    // structure of a plain message
    imap.send("FETCH 1 (BODYSTRUCTURE)").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\")");

    // RFC822 variants
    imap.send("FETCH 1 RFC822.HEADER").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("RFC822.HEADER {");
    imap.send("FETCH 1 RFC822").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains(&format!("RFC822 {{{}}}", SAMPLE_MESSAGE.len()));

    // bad part addressing yields NIL, not an error
    imap.send("FETCH 1 BODY.PEEK[9]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("BODY[9] NIL");

    server.stop();
}

#[tokio::test]
async fn fetch_nested_rfc822() {
    let server = TestServer::start("fetchnested", 19153).await;
    let mut imap = ImapConnection::connect(server.addr, "n").await;
    imap.send("LOGIN user@d pw").await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send(&format!(
        "APPEND INBOX {{{}+}}\r\n{}",
        NESTED_MESSAGE.len(),
        NESTED_MESSAGE
    ))
    .await;
    imap.read_assert(Type::Tagged, "OK").await;
    imap.send("SELECT INBOX").await;
    imap.read_assert(Type::Tagged, "OK").await;

    // multipart structure names both child parts
    imap.send("FETCH 1 (BODY)").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("\"MESSAGE\" \"RFC822\"");
    lines.assert_contains("\"MIXED\"");

    // the second part is the embedded message
    imap.send("FETCH 1 BODY.PEEK[2]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("inner@example.com");

    // a section into the embedded message resolves against the
    // materialised copy
    imap.send("FETCH 1 BODY.PEEK[2.1]").await;
    let lines = imap.read_assert(Type::Tagged, "OK").await;
    lines.assert_contains("inner body");

    server.stop();
}
