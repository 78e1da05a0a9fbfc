use gwimap::core::env_settings::EnvSettings;
use gwimap::start_imap_server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    start_imap_server(EnvSettings::new()).await
}
