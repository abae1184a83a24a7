//! Process configuration loaded from environment variables at startup,
//! grounded in the reference codebase's `bind_port_from_env`/
//! `bind_addr_from_env` helpers, generalized into one struct with defaults
//! so the whole process reads its settings in one place.

use std::env::var;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_BIND_PORT: &str = "8000";
const DEFAULT_DATASTORE_URL: &str = "http://127.0.0.1:9011";
const DEFAULT_AUTH_URL: &str = "http://127.0.0.1:9004";

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub bind_port: String,
    pub datastore_url: String,
    pub auth_url: String,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            bind_address: var_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            bind_port: var_or("BIND_PORT", DEFAULT_BIND_PORT),
            datastore_url: var_or("DATASTORE_URL", DEFAULT_DATASTORE_URL),
            auth_url: var_or("AUTH_URL", DEFAULT_AUTH_URL),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_unset() {
        let config = Config {
            bind_address: var_or("BIND_ADDRESS_UNSET_IN_TESTS", DEFAULT_BIND_ADDRESS),
            bind_port: var_or("BIND_PORT_UNSET_IN_TESTS", DEFAULT_BIND_PORT),
            datastore_url: var_or("DATASTORE_URL_UNSET_IN_TESTS", DEFAULT_DATASTORE_URL),
            auth_url: var_or("AUTH_URL_UNSET_IN_TESTS", DEFAULT_AUTH_URL),
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.datastore_url, DEFAULT_DATASTORE_URL);
    }
}
