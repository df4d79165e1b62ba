//! Network configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// Where to listen and what to advertise
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Address the host listener binds to
    pub bind_addr: IpAddr,
    /// Listener port; 0 lets the OS pick a free one
    pub listen_port: u16,
    /// Address reported to the user when hosting, if auto-detection is wrong
    pub advertise_addr: Option<IpAddr>,
}

impl NetConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.listen_port)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 0,
            advertise_addr: None,
        }
    }
}
