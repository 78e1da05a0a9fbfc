use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, ReadHalf},
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
};
use tokio_rustls::server::TlsStream;
use tracing::debug;

use super::{
    client::{IngestResult, Phase, Session},
    writer,
};

const NON_AUTHENTICATED_TIMEOUT: Duration = Duration::from_secs(60);
const AUTHENTICATED_TIMEOUT: Duration = Duration::from_secs(30 * 60);

enum Turn {
    Read(usize),
    Hub,
    Closed,
    ReadError,
    Timeout,
    Shutdown,
}

fn read_timeout(session: &Session) -> Duration {
    if matches!(
        session.phase,
        Phase::NoAuth | Phase::Username | Phase::Password
    ) {
        NON_AUTHENTICATED_TIMEOUT
    } else {
        AUTHENTICATED_TIMEOUT
    }
}

pub async fn handle_conn(
    stream: TcpStream,
    mut session: Session,
    mut hub_rx: mpsc::UnboundedReceiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0; 4096];
    let (stream_rx, stream_tx) = tokio::io::split(stream);
    let mut stream_rx = Some(stream_rx);

    if !session.set_stream(stream_tx).await {
        return;
    }

    loop {
        let turn = {
            let rx = stream_rx.as_mut().unwrap();
            tokio::select! {
                result = tokio::time::timeout(read_timeout(&session), rx.read(&mut buf)) => {
                    match result {
                        Ok(Ok(0)) => Turn::Closed,
                        Ok(Ok(bytes_read)) => Turn::Read(bytes_read),
                        Ok(Err(_)) => Turn::ReadError,
                        Err(_) => Turn::Timeout,
                    }
                },
                ping = hub_rx.recv() => match ping {
                    Some(()) => Turn::Hub,
                    None => Turn::Closed,
                },
                _ = shutdown_rx.changed() => Turn::Shutdown,
            }
        };
        match turn {
            Turn::Read(bytes_read) => match session.ingest(&buf[..bytes_read]).await {
                IngestResult::Continue => (),
                IngestResult::Close => {
                    debug!("Disconnecting client {}.", session.peer_addr);
                    break;
                }
                IngestResult::StartTls => {
                    debug!("TLS upgrade requested by {}.", session.peer_addr);
                    let (reclaim_tx, reclaim_rx) = oneshot::channel();
                    if session
                        .writer
                        .send(writer::Event::Upgrade(reclaim_tx))
                        .await
                        .is_err()
                    {
                        break;
                    }
                    let stream_tx = match reclaim_rx.await {
                        Ok(writer::Event::Stream(stream_tx)) => stream_tx,
                        _ => break,
                    };
                    let stream = stream_rx.take().unwrap().unsplit(stream_tx);
                    let acceptor = match &session.core.config.tls_acceptor {
                        Some(acceptor) => acceptor.clone(),
                        None => break,
                    };
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            handle_conn_tls(tls_stream, session, hub_rx, shutdown_rx).await;
                            return;
                        }
                        Err(err) => {
                            debug!("Failed to accept TLS connection: {}", err);
                            session.teardown();
                            return;
                        }
                    }
                }
            },
            Turn::Hub => session.on_hub_ping().await,
            Turn::Closed => {
                debug!("IMAP connection closed by {}", session.peer_addr);
                break;
            }
            Turn::ReadError => {
                debug!("IMAP connection lost with {}", session.peer_addr);
                break;
            }
            Turn::Timeout => {
                session
                    .write_bytes(b"* BYE disconnected by autologout\r\n".to_vec())
                    .await
                    .ok();
                debug!("IMAP connection timed out with {}.", session.peer_addr);
                break;
            }
            Turn::Shutdown => {
                debug!(
                    "IMAP connection with peer {} shutting down.",
                    session.peer_addr
                );
                break;
            }
        }
    }
    session.teardown();
}

pub async fn handle_conn_tls(
    stream: TlsStream<TcpStream>,
    mut session: Session,
    mut hub_rx: mpsc::UnboundedReceiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = vec![0; 4096];
    let (mut stream_rx, stream_tx): (ReadHalf<TlsStream<TcpStream>>, _) =
        tokio::io::split(stream);

    if !session.set_stream_tls(stream_tx).await {
        return;
    }

    loop {
        let turn = tokio::select! {
            result = tokio::time::timeout(read_timeout(&session), stream_rx.read(&mut buf)) => {
                match result {
                    Ok(Ok(0)) => Turn::Closed,
                    Ok(Ok(bytes_read)) => Turn::Read(bytes_read),
                    Ok(Err(_)) => Turn::ReadError,
                    Err(_) => Turn::Timeout,
                }
            },
            ping = hub_rx.recv() => match ping {
                Some(()) => Turn::Hub,
                None => Turn::Closed,
            },
            _ = shutdown_rx.changed() => Turn::Shutdown,
        };
        match turn {
            Turn::Read(bytes_read) => match session.ingest(&buf[..bytes_read]).await {
                IngestResult::Continue => (),
                _ => break,
            },
            Turn::Hub => session.on_hub_ping().await,
            Turn::Timeout => {
                session
                    .write_bytes(b"* BYE disconnected by autologout\r\n".to_vec())
                    .await
                    .ok();
                break;
            }
            _ => break,
        }
    }
    session.teardown();
}
