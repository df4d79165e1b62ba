//! Local endpoint selection
//!
//! A listener bound to the unspecified address is not something a peer can
//! dial, so the address advertised in server-started comes from here.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Chooses the address peers should use to reach a local listener
pub trait EndpointSelector: Send {
    /// Turn a bound listener address into one a peer can dial
    fn advertise(&self, bound: SocketAddr) -> SocketAddr;
}

/// Advertises the configured address, else the primary outbound IPv4 address
#[derive(Debug, Clone, Default)]
pub struct LocalEndpoint {
    advertise_addr: Option<IpAddr>,
}

impl LocalEndpoint {
    pub fn new(advertise_addr: Option<IpAddr>) -> Self {
        Self { advertise_addr }
    }
}

impl EndpointSelector for LocalEndpoint {
    fn advertise(&self, bound: SocketAddr) -> SocketAddr {
        let ip = match self.advertise_addr {
            Some(ip) => ip,
            None if !bound.ip().is_unspecified() => bound.ip(),
            None => routable_ipv4().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        };
        SocketAddr::new(ip, bound.port())
    }
}

/// The non-loopback IPv4 address the OS would route outbound traffic from
///
/// Connecting a UDP socket only selects a route; no packet is sent.
fn routable_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        debug!("No routable IPv4 address found");
        return None;
    }
    Some(ip)
}
