//! ICMP echo + rx-bytes failover probe (C8, §4.8).
//!
//! Detects a tunnel that silently stopped passing traffic: the interface is
//! still "up" but no bytes are arriving even though echo requests are being
//! sent through it. Runs the blocking `pnet` transport channel on a
//! dedicated blocking thread and polls it with a timeout each second so the
//! async caller can still honor cookie cancellation between sends.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{checksum, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::Packet;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportChannelType::Layer4, TransportProtocol::Ipv4};
use vpn_cookie::Cookie;

use crate::error::{FailoverError, Result};

const MAX_PROBES: u32 = 10;
const PROBE_INTERVAL: Duration = Duration::from_secs(1);
const REPLY_READ_TIMEOUT: Duration = Duration::from_secs(1);
const ICMP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct FailoverConfig {
    pub gateway: IpAddr,
    pub mtu: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverOutcome {
    pub dropped: bool,
}

/// Supplies the interface's received-byte counter. Implemented by the
/// embedder's tunnel-stats hook; mocked in tests via `mockall`.
#[cfg_attr(test, mockall::automock)]
pub trait RxBytesSource: Send + Sync {
    fn rx_bytes(&self) -> u64;
}

/// Enforces "Failover probes are singleton per client" (§5). Held by the
/// orchestrator; `try_start` fails with `AlreadyRunning` if a probe is
/// already in flight.
#[derive(Clone, Default)]
pub struct FailoverGuard {
    running: Arc<AtomicBool>,
}

impl FailoverGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_start(&self) -> Result<FailoverLease> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FailoverError::AlreadyRunning);
        }
        Ok(FailoverLease { running: self.running.clone() })
    }
}

/// RAII lease released when the probe (or its cancellation) finishes.
pub struct FailoverLease {
    running: Arc<AtomicBool>,
}

impl Drop for FailoverLease {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Runs the probe to completion (or until cancelled). Payload size is
/// `mtu - 28` to exercise the same fragmentation boundary a full-size data
/// packet would hit (§4.8).
pub async fn run_probe<R: RxBytesSource + 'static>(config: FailoverConfig, rx_source: Arc<R>, cookie: Option<&Cookie>) -> Result<FailoverOutcome> {
    let payload_len = (config.mtu as usize).saturating_sub(28).max(ICMP_HEADER_LEN);
    let start_rx = rx_source.rx_bytes();
    let mut sent_total: u64 = 0;

    let gateway = config.gateway;
    let replies = Arc::new(std::sync::Mutex::new(Vec::<()>::new()));
    let replies_writer = replies.clone();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_reader = stop.clone();

    // The receive side runs on a blocking thread for the probe's whole
    // lifetime; it pushes a unit into `replies` for every echo reply seen
    // and exits once `stop` is set after the send loop below finishes.
    let receiver_handle = std::thread::spawn(move || -> std::result::Result<(), std::io::Error> {
        let (_sender, mut receiver) = transport_channel(4096, Layer4(Ipv4(IpNextHeaderProtocols::Icmp)))
            .map_err(|e| std::io::Error::new(e.kind(), e.to_string()))?;
        let mut iter = icmp_packet_iter(&mut receiver);
        while !stop_reader.load(Ordering::SeqCst) {
            match iter.next_with_timeout(REPLY_READ_TIMEOUT) {
                Ok(Some((_packet, addr))) if addr == gateway => {
                    replies_writer.lock().unwrap().push(());
                }
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    });

    let result = probe_send_loop(gateway, payload_len, &mut sent_total, rx_source.as_ref(), start_rx, &replies, cookie).await;

    stop.store(true, Ordering::SeqCst);
    let _ = tokio::task::spawn_blocking(move || receiver_handle.join()).await;

    result
}

#[allow(clippy::too_many_arguments)]
async fn probe_send_loop(
    gateway: IpAddr,
    payload_len: usize,
    sent_total: &mut u64,
    rx_source: &dyn RxBytesSource,
    start_rx: u64,
    replies: &std::sync::Mutex<Vec<()>>,
    cookie: Option<&Cookie>,
) -> Result<FailoverOutcome> {
    for seq in 0..MAX_PROBES {
        if let Some(cookie) = cookie {
            if cookie.is_cancelled() {
                return Err(FailoverError::Cancelled);
            }
        }

        send_echo_request(gateway, seq as u16, payload_len)?;
        *sent_total += payload_len as u64;

        let deadline = tokio::time::Instant::now() + PROBE_INTERVAL;
        while tokio::time::Instant::now() < deadline {
            if let Some(cookie) = cookie {
                if cookie.is_cancelled() {
                    return Err(FailoverError::Cancelled);
                }
            }

            let rx_delta = rx_source.rx_bytes().saturating_sub(start_rx);
            if rx_delta > *sent_total {
                tracing::debug!(rx_delta, sent_total = *sent_total, "failover probe observed traffic flowing, tunnel alive");
                return Ok(FailoverOutcome { dropped: false });
            }

            if !replies.lock().unwrap().is_empty() {
                tracing::debug!("failover probe received an echo reply, tunnel alive");
                return Ok(FailoverOutcome { dropped: false });
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    tracing::warn!("failover probe completed without progress, tunnel considered dropped");
    Ok(FailoverOutcome { dropped: true })
}

fn send_echo_request(gateway: IpAddr, sequence: u16, payload_len: usize) -> Result<()> {
    let mut buffer = vec![0u8; ICMP_HEADER_LEN + payload_len];
    let mut packet = MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| FailoverError::Send("buffer too small for echo request".into()))?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_sequence_number(sequence);
    packet.set_identifier(std::process::id() as u16);
    let icmp_checksum = checksum(&IcmpPacket::new(packet.packet()).expect("packet was just built"));
    packet.set_checksum(icmp_checksum);

    let (mut sender, _receiver) =
        transport_channel(4096, Layer4(Ipv4(IpNextHeaderProtocols::Icmp))).map_err(|e| FailoverError::SocketOpen(e.to_string()))?;
    sender
        .send_to(packet, gateway)
        .map_err(|e| FailoverError::Send(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_concurrent_start() {
        let guard = FailoverGuard::new();
        let lease = guard.try_start().unwrap();
        assert!(matches!(guard.try_start(), Err(FailoverError::AlreadyRunning)));
        drop(lease);
        assert!(guard.try_start().is_ok());
    }

    #[test]
    fn payload_len_follows_mtu_minus_28() {
        let config = FailoverConfig {
            gateway: "10.0.0.1".parse().unwrap(),
            mtu: 1420,
        };
        let payload_len = (config.mtu as usize).saturating_sub(28);
        assert_eq!(payload_len, 1392);
    }

    #[test]
    fn mock_rx_source_reports_configured_counter() {
        let mut mock = MockRxBytesSource::new();
        mock.expect_rx_bytes().times(1).return_const(4096u64);
        assert_eq!(mock.rx_bytes(), 4096);
    }
}
