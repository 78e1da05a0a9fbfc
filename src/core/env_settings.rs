use std::{collections::HashMap, net::IpAddr, str::FromStr};

/// Settings gathered from `--key value` command line arguments, falling back
/// to environment variables with the same (upper-snake) name.
#[derive(Debug, Default, Clone)]
pub struct EnvSettings {
    pub args: HashMap<String, String>,
}

impl EnvSettings {
    pub fn new() -> Self {
        let mut args = HashMap::new();
        let mut iter = std::env::args().skip(1);
        while let Some(key) = iter.next() {
            if let Some(key) = key.strip_prefix("--") {
                if let Some(value) = iter.next() {
                    args.insert(key.to_lowercase(), value);
                }
            }
        }
        EnvSettings { args }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.args.get(name) {
            Some(value.to_string())
        } else {
            std::env::var(name.replace('-', "_").to_uppercase()).ok()
        }
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.parse::<T>().ok())
    }

    pub fn parse_ipaddr(&self, name: &str, default: &str) -> IpAddr {
        self.get(name)
            .unwrap_or_else(|| default.to_string())
            .parse()
            .unwrap_or_else(|_| default.parse().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::EnvSettings;
    use std::collections::HashMap;

    #[test]
    fn parse_and_default() {
        let settings = EnvSettings {
            args: HashMap::from_iter([
                ("bind-port".to_string(), "9991".to_string()),
                ("max-auth-times".to_string(), "not a number".to_string()),
            ]),
        };
        assert_eq!(settings.parse::<u16>("bind-port"), Some(9991));
        assert_eq!(settings.parse::<u32>("max-auth-times"), None);
        assert_eq!(
            settings.parse_ipaddr("bind-addr", "127.0.0.1").to_string(),
            "127.0.0.1"
        );
    }
}
