use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup.
///
/// `CHAT_BIND_ADDR` takes a full socket address and wins over `PORT`,
/// which only overrides the port on `0.0.0.0`.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    /// How long to wait after a disconnect before broadcasting presence,
    /// so rapid reconnects coalesce into one update.
    pub presence_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: PathBuf::from("public"),
            presence_grace: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("CHAT_BIND_ADDR")
            .ok()
            .and_then(|value| value.parse().ok())
            .or_else(|| {
                std::env::var("PORT")
                    .ok()
                    .and_then(|value| value.parse::<u16>().ok())
                    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
            })
            .unwrap_or(defaults.bind_addr);

        let static_dir = std::env::var("CHAT_STATIC_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let presence_grace = std::env::var("CHAT_PRESENCE_GRACE_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.presence_grace);

        Self {
            bind_addr,
            static_dir,
            presence_grace,
        }
    }
}
