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

pub mod commands;
pub mod core;
pub mod midb;
pub mod mjson;
pub mod parser;
pub mod protocol;
#[cfg(test)]
pub mod tests;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::stream::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::watch;
use tracing::{info, Level};

use crate::core::{
    auth::{Authenticator, FileAuth},
    client::Core,
    config::{failed_to, load_config, UnwrapFailure},
    env_settings::EnvSettings,
    hub::NotificationHub,
    listener::spawn_listener,
};
use crate::midb::{client::MidbClient, MailIndex};

const IMAP4_PORT: u16 = 143;
const IMAP4_PORT_TLS: u16 = 993;

pub fn build_core(
    settings: &EnvSettings,
    store: Arc<dyn MailIndex>,
    auth: Arc<dyn Authenticator>,
) -> Core {
    Core {
        config: load_config(settings),
        store,
        auth,
        hub: NotificationHub::new(),
    }
}

pub async fn start_imap_server(settings: EnvSettings) -> std::io::Result<()> {
    // Enable logging
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(settings.parse("log-level").unwrap_or(Level::ERROR))
            .finish(),
    )
    .failed_to("set default subscriber");

    if !settings.contains_key("bind-port") && !settings.contains_key("bind-port-tls") {
        failed_to("start IMAP listener. Please specify 'bind-port' and/or 'bind-port-tls'.");
    }

    let store: Arc<dyn MailIndex> = Arc::new(MidbClient::new(
        settings
            .get("midb-addr")
            .unwrap_or_else(|| "127.0.0.1:5555".to_string()),
    ));
    let auth: Arc<dyn Authenticator> = Arc::new(
        FileAuth::open(
            &settings
                .get("users-path")
                .unwrap_or_else(|| "/etc/gwimap/users".to_string()),
        )
        .failed_to("read the user table"),
    );
    let core = Arc::new(build_core(&settings, store, auth));

    // Start IMAP listeners
    let bind_addr = settings.parse_ipaddr("bind-addr", "0.0.0.0");
    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    for (pos, bind_port) in ["bind-port", "bind-port-tls"].into_iter().enumerate() {
        if let Some(bind_port) = settings.get(bind_port) {
            let is_tls = pos > 0;
            let socket_addr = SocketAddr::from((
                bind_addr,
                bind_port
                    .parse()
                    .unwrap_or(if is_tls { IMAP4_PORT_TLS } else { IMAP4_PORT }),
            ));
            info!(
                "Starting gwimap IMAP4rev1 server at {}{}...",
                socket_addr,
                if is_tls { " (TLS)" } else { "" }
            );
            spawn_listener(socket_addr, core.clone(), is_tls, shutdown_rx.clone()).await;
        }
    }

    // Wait for shutdown signal
    let mut signals = Signals::new([SIGHUP, SIGTERM, SIGINT, SIGQUIT])?;

    while let Some(signal) = signals.next().await {
        match signal {
            SIGHUP => {
                // Reload configuration
            }
            SIGTERM | SIGINT | SIGQUIT => {
                info!("Shutting down gwimap server...");
                shutdown_tx.send(true).ok();
                tokio::time::sleep(Duration::from_secs(1)).await;
                break;
            }
            _ => unreachable!(),
        }
    }

    Ok(())
}
