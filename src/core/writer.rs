//! Per-session writer task.
//!
//! Handlers enqueue either raw bytes or file-backed fragments; the writer
//! owns the socket write half and rewrites `Fragment::File` chunks into the
//! announced number of octets streamed straight out of the EML file, so a
//! large body fetch never has to live in memory.

use std::path::PathBuf;

use tokio::{
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, WriteHalf},
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

const IPC_CHANNEL_BUFFER: usize = 128;

#[derive(Debug)]
pub enum Fragment {
    Bytes(Vec<u8>),
    File {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
}

pub enum Event {
    Stream(WriteHalf<TcpStream>),
    StreamTls(WriteHalf<TlsStream<TcpStream>>),
    Bytes(Vec<u8>),
    Fragments(Vec<Fragment>),
    Upgrade(oneshot::Sender<Event>),
}

async fn write_fragments<W: AsyncWrite + Unpin>(
    stream: &mut W,
    fragments: Vec<Fragment>,
) -> std::io::Result<()> {
    for fragment in fragments {
        match fragment {
            Fragment::Bytes(bytes) => stream.write_all(&bytes).await?,
            Fragment::File {
                path,
                offset,
                length,
            } => {
                let mut file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(err) => {
                        // The literal length was already announced; pad so
                        // the client stays in sync.
                        warn!("open {}: {}", path.display(), err);
                        let filler = vec![b' '; length as usize];
                        stream.write_all(&filler).await?;
                        continue;
                    }
                };
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut remaining = length;
                let mut buf = vec![0u8; 64 * 1024];
                while remaining > 0 {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let got = file.read(&mut buf[..want]).await?;
                    if got == 0 {
                        warn!(
                            "short read on {} ({} octets missing)",
                            path.display(),
                            remaining
                        );
                        let filler = vec![b' '; remaining as usize];
                        stream.write_all(&filler).await?;
                        break;
                    }
                    stream.write_all(&buf[..got]).await?;
                    remaining -= got as u64;
                }
            }
        }
    }
    Ok(())
}

pub fn spawn_writer() -> mpsc::Sender<Event> {
    let (tx, mut rx) = mpsc::channel::<Event>(IPC_CHANNEL_BUFFER);
    tokio::spawn(async move {
        let mut stream = match rx.recv().await {
            Some(stream) => stream,
            None => return,
        };
        'outer: loop {
            match stream {
                Event::Stream(mut stream_tx) => {
                    while let Some(event) = rx.recv().await {
                        match event {
                            Event::Bytes(bytes) => {
                                if let Err(err) =
                                    write_fragments(&mut stream_tx, vec![Fragment::Bytes(bytes)])
                                        .await
                                {
                                    debug!("Failed to write to stream: {}", err);
                                    break 'outer;
                                }
                            }
                            Event::Fragments(fragments) => {
                                if let Err(err) =
                                    write_fragments(&mut stream_tx, fragments).await
                                {
                                    debug!("Failed to write to stream: {}", err);
                                    break 'outer;
                                }
                            }
                            Event::Upgrade(channel) => {
                                if channel.send(Event::Stream(stream_tx)).is_err() {
                                    debug!("Failed to send stream.");
                                    break 'outer;
                                }
                                if let Some(stream_) = rx.recv().await {
                                    stream = stream_;
                                    continue 'outer;
                                } else {
                                    break 'outer;
                                }
                            }
                            _ => {
                                stream = event;
                                continue 'outer;
                            }
                        }
                    }
                    break 'outer;
                }
                Event::StreamTls(mut stream_tx) => {
                    while let Some(event) = rx.recv().await {
                        match event {
                            Event::Bytes(bytes) => {
                                if let Err(err) =
                                    write_fragments(&mut stream_tx, vec![Fragment::Bytes(bytes)])
                                        .await
                                {
                                    debug!("Failed to write to stream: {}", err);
                                    break 'outer;
                                }
                            }
                            Event::Fragments(fragments) => {
                                if let Err(err) =
                                    write_fragments(&mut stream_tx, fragments).await
                                {
                                    debug!("Failed to write to stream: {}", err);
                                    break 'outer;
                                }
                            }
                            _ => {
                                stream = event;
                                continue 'outer;
                            }
                        }
                    }
                    break 'outer;
                }
                _ => unreachable!(),
            }
        }
    });
    tx
}
