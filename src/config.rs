use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub deepinfra_api_key: String,
    pub deepinfra_base_url: String,
    pub daily_request_limit: u32,
    pub endless_chapter_count: u32,
    pub session_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        // No usable default exists for the key; fail at startup instead.
        let deepinfra_api_key = env::var("DEEPINFRA_API_KEY")
            .map_err(|_| anyhow::anyhow!("DEEPINFRA_API_KEY is not set"))?;

        let deepinfra_base_url = env::var("DEEPINFRA_BASE_URL")
            .unwrap_or_else(|_| "https://api.deepinfra.com".to_string());

        let daily_request_limit = env::var("DAILY_REQUEST_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let endless_chapter_count = env::var("ENDLESS_CHAPTER_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let session_ttl = env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(1800));

        Ok(Self {
            listen_addr,
            deepinfra_api_key,
            deepinfra_base_url,
            daily_request_limit,
            endless_chapter_count,
            session_ttl,
        })
    }
}
