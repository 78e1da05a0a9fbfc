use std::{fs::File, io::BufReader, sync::Arc};

use rustls::{Certificate, PrivateKey};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};

use super::env_settings::EnvSettings;

pub struct Config {
    pub host_id: String,
    pub default_lang: String,
    pub support_tls: bool,
    pub force_tls: bool,
    pub enable_rfc2971_commands: bool,
    pub max_auth_times: u32,
    pub block_auth_fail: u64,
    pub tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
}

pub fn failed_to(action: &str) -> ! {
    eprintln!("Failed to {}", action);
    std::process::exit(1);
}

pub trait UnwrapFailure<T> {
    fn failed_to(self, action: &str) -> T;
}

impl<T, E: std::fmt::Display> UnwrapFailure<T> for Result<T, E> {
    fn failed_to(self, message: &str) -> T {
        match self {
            Ok(result) => result,
            Err(err) => {
                eprintln!("Failed to {}: {}", message, err);
                std::process::exit(1);
            }
        }
    }
}

pub fn load_config(settings: &EnvSettings) -> Config {
    let support_tls = settings
        .parse::<bool>("support-tls")
        .unwrap_or_else(|| settings.contains_key("cert-path"));
    Config {
        host_id: settings
            .get("host-id")
            .unwrap_or_else(|| "localhost".to_string()),
        default_lang: settings.get("default-lang").unwrap_or_else(|| "en".to_string()),
        support_tls,
        force_tls: settings.parse("force-tls").unwrap_or(false),
        enable_rfc2971_commands: settings.parse("enable-rfc2971-commands").unwrap_or(false),
        max_auth_times: settings.parse("max-auth-times").unwrap_or(10),
        block_auth_fail: settings.parse("block-auth-fail").unwrap_or(60),
        tls_acceptor: if support_tls {
            Some(tokio_rustls::TlsAcceptor::from(Arc::new(load_tls_config(
                settings,
            ))))
        } else {
            None
        },
    }
}

pub fn load_tls_config(settings: &EnvSettings) -> rustls::ServerConfig {
    let (cert_path, key_path) = if let (Some(cert_path), Some(key_path)) =
        (settings.get("cert-path"), settings.get("key-path"))
    {
        (cert_path, key_path)
    } else {
        failed_to("load TLS configuration: missing 'cert-path' and/or 'key-path' parameters.");
    };

    let certificates: Vec<Certificate> = certs(&mut BufReader::new(
        File::open(&cert_path).failed_to("open certificate path"),
    ))
    .failed_to("read certificate file")
    .into_iter()
    .map(Certificate)
    .collect();
    if certificates.is_empty() {
        failed_to(&format!("find any certificates in {}", cert_path));
    }

    let mut private_keys: Vec<PrivateKey> = pkcs8_private_keys(&mut BufReader::new(
        File::open(&key_path).failed_to("open private key path"),
    ))
    .failed_to("read private key file")
    .into_iter()
    .map(PrivateKey)
    .collect();
    if private_keys.is_empty() {
        private_keys = rsa_private_keys(&mut BufReader::new(
            File::open(&key_path).failed_to("open private key path"),
        ))
        .failed_to("read private key file")
        .into_iter()
        .map(PrivateKey)
        .collect();
    }
    if private_keys.is_empty() {
        failed_to(&format!("find any private keys in {}", key_path));
    }

    rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certificates, private_keys.remove(0))
        .failed_to("build TLS configuration")
}

/// Default text charset advertised to the index service for SEARCH, keyed by
/// the user's language.
pub fn default_charset(lang: &str) -> &'static str {
    match lang {
        "zh_CN" => "gbk",
        "zh_TW" => "big5",
        "ja" => "iso-2022-jp",
        _ => "us-ascii",
    }
}
