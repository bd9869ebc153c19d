use anyhow::{Result, anyhow};
use socket2::{Domain, Protocol, Socket, Type};
use std::time::Duration;

/// Socket with metadata about type (DGRAM replies carry no IP header)
#[derive(Debug)]
pub struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets)
    pub is_dgram: bool,
}

/// Create a raw ICMPv4 socket
pub fn create_raw_icmp_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    Ok(socket)
}

/// Create an unprivileged ICMPv4 socket (SOCK_DGRAM, ping_group_range)
pub fn create_dgram_icmp_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    Ok(socket)
}

/// Create a socket for one echo exchange. Prefers RAW, falls back to DGRAM
/// for unprivileged ICMP.
pub fn create_probe_socket() -> Result<SocketInfo> {
    if let Ok(socket) = create_raw_icmp_socket() {
        return Ok(SocketInfo {
            socket,
            is_dgram: false,
        });
    }
    // DGRAM fallback - don't try RAW again, just error if DGRAM fails
    let socket = create_dgram_icmp_socket()?;
    Ok(SocketInfo {
        socket,
        is_dgram: true,
    })
}

/// Check ICMP socket permissions before any monitor loop starts.
/// Raw sockets usually require elevated privileges; without any working
/// socket type the monitors cannot make progress.
pub fn check_permissions() -> Result<()> {
    if create_raw_icmp_socket().is_ok() {
        return Ok(());
    }

    if create_dgram_icmp_socket().is_ok() {
        eprintln!("Warning: Using unprivileged ICMP sockets.");
        return Ok(());
    }

    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "pingmon".to_string());

    Err(anyhow!(
        "Insufficient permissions for raw sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo pingmon <target>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {}\n\
         \u{2022} Enable unprivileged ICMP: sudo sysctl -w net.ipv4.ping_group_range='0 65534'",
        binary_path
    ))
}
