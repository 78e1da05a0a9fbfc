/*
 * Copyright (c) 2022, the gwimap authors.
 *
 * This file is part of the gwimap server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

use std::{net::SocketAddr, sync::Arc};

use tokio::{io::AsyncWriteExt, net::TcpListener, sync::watch};
use tracing::{debug, error};

use crate::protocol::capability::capability_string;

use super::{
    client::{Core, Session},
    config::failed_to,
    connection::{handle_conn, handle_conn_tls},
};

pub async fn spawn_listener(
    bind_addr: SocketAddr,
    core: Arc<Core>,
    is_tls: bool,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let listener = TcpListener::bind(bind_addr).await.unwrap_or_else(|err| {
        failed_to(&format!("bind to {}: {}", bind_addr, err));
    });

    tokio::spawn(async move {
        let greeting = Arc::new(format!(
            "* OK [CAPABILITY {}] {} gwimap v{} service ready\r\n",
            capability_string(&core.config, is_tls),
            core.config.host_id,
            env!("CARGO_PKG_VERSION")
        ));

        loop {
            tokio::select! {
                stream = listener.accept() => {
                    match stream {
                        Ok((mut stream, _)) => {
                            let shutdown_rx = shutdown_rx.clone();
                            let core = core.clone();
                            let greeting = greeting.clone();

                            tokio::spawn(async move {
                                let peer_addr = match stream.peer_addr() {
                                    Ok(peer_addr) => peer_addr,
                                    Err(_) => return,
                                };

                                if is_tls {
                                    let acceptor = match &core.config.tls_acceptor {
                                        Some(acceptor) => acceptor.clone(),
                                        None => return,
                                    };
                                    let mut stream = match acceptor.accept(stream).await {
                                        Ok(stream) => stream,
                                        Err(err) => {
                                            debug!("Failed to accept TLS connection: {}", err);
                                            return;
                                        }
                                    };
                                    if let Err(err) = stream.write_all(greeting.as_bytes()).await {
                                        debug!("Failed to send greeting to {}: {}", peer_addr, err);
                                        return;
                                    }
                                    let (session, hub_rx) = Session::new(core, peer_addr, true);
                                    handle_conn_tls(stream, session, hub_rx, shutdown_rx).await;
                                } else {
                                    if let Err(err) = stream.write_all(greeting.as_bytes()).await {
                                        debug!("Failed to send greeting to {}: {}", peer_addr, err);
                                        return;
                                    }
                                    let (session, hub_rx) = Session::new(core, peer_addr, false);
                                    handle_conn(stream, session, hub_rx, shutdown_rx).await;
                                }
                            });
                        }
                        Err(err) => {
                            error!("Failed to accept TCP connection: {}", err);
                        }
                    }
                },
                _ = shutdown_rx.changed() => {
                    debug!("IMAP listener shutting down.");
                    break;
                }
            };
        }
    });
}
