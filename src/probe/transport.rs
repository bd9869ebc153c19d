use chrono::Utc;
use socket2::SockAddr;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::probe::icmp::{ReplyMatch, build_echo_request, parse_reply};
use crate::probe::socket::create_probe_socket;
use crate::state::{ProbeError, ProbeOutcome};

/// Reply buffer size; echo replies are far smaller than this
const RECV_BUFFER_SIZE: usize = 1500;

/// Floor for the per-read timeout so a nearly-expired deadline still polls
/// the socket once instead of erroring on a zero timeout
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Resolve a target string to an IPv4 address
pub fn resolve_ipv4(target: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        if ip.is_ipv4() {
            return Ok(ip);
        }
        return Err(ProbeError::Resolve(format!(
            "{}: IPv6 targets are not supported",
            target
        )));
    }

    let addrs = format!("{}:0", target)
        .to_socket_addrs()
        .map_err(|e| ProbeError::Resolve(e.to_string()))?;

    addrs
        .map(|s| s.ip())
        .find(|ip| ip.is_ipv4())
        .ok_or_else(|| ProbeError::Resolve(format!("no IPv4 address found for {}", target)))
}

/// One echo exchange: resolve the target, send a single echo request, and
/// block until a matching reply arrives or the deadline passes.
///
/// Never returns a process-level error; every failure mode is classified
/// into the outcome. A timeout or read error is ordinary packet loss
/// (dropped=true); resolution, socket, send, and unexpected-reply failures
/// are recorded with dropped=false. Packets that do not belong to this
/// probe (other processes' traffic on a RAW socket, stale sequences) are
/// skipped until the deadline.
pub fn probe(target: &str, identifier: u16, sequence: u16, timeout: Duration) -> ProbeOutcome {
    let dst = match resolve_ipv4(target) {
        Ok(ip) => ip,
        Err(e) => return ProbeOutcome::failed(Utc::now(), e),
    };

    let info = match create_probe_socket() {
        Ok(info) => info,
        Err(e) => return ProbeOutcome::failed(Utc::now(), ProbeError::Socket(e.to_string())),
    };

    let packet = build_echo_request(identifier, sequence);
    let addr = SockAddr::from(SocketAddr::new(dst, 0));

    // Record the send time immediately before transmission
    let sent_at = Utc::now();
    let start = Instant::now();

    if let Err(e) = info.socket.send_to(&packet, &addr) {
        return ProbeOutcome::failed(sent_at, ProbeError::Send(e.to_string()));
    }

    let deadline = start + timeout;
    let mut buffer = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return ProbeOutcome::dropped(sent_at, ProbeError::Timeout);
        }
        if let Err(e) = info
            .socket
            .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
        {
            return ProbeOutcome::dropped(sent_at, ProbeError::Recv(e.to_string()));
        }

        match info.socket.recv(&mut buffer) {
            Ok(len) => {
                // Safety: recv initialized the first `len` bytes
                let data =
                    unsafe { std::slice::from_raw_parts(buffer.as_ptr() as *const u8, len) };
                match parse_reply(data, identifier, sequence, info.is_dgram) {
                    ReplyMatch::Reply => {
                        let rtt = start.elapsed();
                        // A reply landing past the deadline is a drop, not a
                        // delayed success
                        if rtt > timeout {
                            return ProbeOutcome::dropped(sent_at, ProbeError::Timeout);
                        }
                        return ProbeOutcome::success(sent_at, rtt);
                    }
                    ReplyMatch::Unexpected(desc) => {
                        return ProbeOutcome::failed(
                            sent_at,
                            ProbeError::UnexpectedReply(desc),
                        );
                    }
                    ReplyMatch::NotOurs => continue,
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return ProbeOutcome::dropped(sent_at, ProbeError::Timeout);
            }
            Err(e) => return ProbeOutcome::dropped(sent_at, ProbeError::Recv(e.to_string())),
        }
    }
}
