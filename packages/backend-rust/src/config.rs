use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::services::progress::StreakPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub streak_policy: StreakPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let streak_policy = match std::env::var("STREAK_SHIELD_GRACE").ok().as_deref() {
            Some("1") | Some("true") => StreakPolicy::ShieldGrace,
            _ => StreakPolicy::Strict,
        };

        Self {
            host,
            port,
            log_level,
            streak_policy,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
