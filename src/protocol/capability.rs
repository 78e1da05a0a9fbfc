use crate::core::config::Config;

/// The capability list varies with the connection: STARTTLS is offered on
/// plaintext connections when TLS is available, and LOGINDISABLED is
/// advertised while `force-tls` keeps LOGIN locked out.
pub fn capability_string(config: &Config, is_tls: bool) -> String {
    let mut caps = String::from("IMAP4rev1 IDLE UIDPLUS UNSELECT SPECIAL-USE XLIST AUTH=LOGIN");
    if config.enable_rfc2971_commands {
        caps.push_str(" ID");
    }
    if config.support_tls && !is_tls {
        caps.push_str(" STARTTLS");
        if config.force_tls {
            caps.push_str(" LOGINDISABLED");
        }
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(support_tls: bool, force_tls: bool, rfc2971: bool) -> Config {
        Config {
            host_id: "host".to_string(),
            default_lang: "en".to_string(),
            support_tls,
            force_tls,
            enable_rfc2971_commands: rfc2971,
            max_auth_times: 10,
            block_auth_fail: 60,
            tls_acceptor: None,
        }
    }

    #[test]
    fn variants() {
        assert_eq!(
            capability_string(&config(false, false, false), false),
            "IMAP4rev1 IDLE UIDPLUS UNSELECT SPECIAL-USE XLIST AUTH=LOGIN"
        );
        assert!(capability_string(&config(true, false, false), false).ends_with(" STARTTLS"));
        assert!(
            capability_string(&config(true, true, false), false).ends_with(" LOGINDISABLED")
        );
        // after the upgrade the TLS options disappear
        assert!(!capability_string(&config(true, true, false), true).contains("STARTTLS"));
        assert!(capability_string(&config(false, false, true), false).contains(" ID"));
    }
}
