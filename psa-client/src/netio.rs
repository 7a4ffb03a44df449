//! `advance_state` (distilled spec §4.6/§4.6b): races a retransmitter
//! against a receiver for one verified reply. Grounded on `dclient.go`'s
//! `advanceState` (spawns `sendMessage`, blocks in `catchReply`) and
//! `netio.go`'s `sendSocket`/`sendMessage`/`catchReply` for the backoff and
//! reply-matching bodies.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use async_io::Timer;
use futures_lite::future::or;
use rand::Rng;

use psa_net::{MacAddr, RawReceive};
use psa_wire::message::{Message, CLIENT_PORT};
use psa_proto::options::DecodedOptions;
use psa_proto::templates::Template;
use psa_proto::verify::VerifyResult;

#[cfg(feature = "log")]
use log::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(700);
const BACKOFF_CAP: Duration = Duration::from_secs(100);
const UNICAST_RESOLVE_ATTEMPTS: u32 = 5;
const UNICAST_RESOLVE_DEADLINE: Duration = Duration::from_millis(200);

/// What `advance_state` settled on once the race ends.
pub enum Outcome {
    Passed(Message, DecodedOptions),
    Nack,
    Failed,
}

/// Races the retransmitter (which never stops on its own) against the
/// receiver (which gives up at `deadline`). The receiver's own failure
/// modes -- timeout, or being unable to even open a socket -- both resolve
/// no sooner than `deadline`, so a permanent socket error can't make the
/// outer state loop spin hot.
pub async fn advance_state(
    ifindex: u32,
    our_mac: MacAddr,
    deadline: Instant,
    build: impl FnMut() -> Template,
    verify: impl Fn(&Message, &DecodedOptions) -> VerifyResult,
) -> Outcome {
    let recv = receive_loop(ifindex, our_mac, deadline, verify);
    let send = retransmit_loop(ifindex, our_mac, build);
    or(recv, send).await
}

async fn retransmit_loop(ifindex: u32, our_mac: MacAddr, mut build: impl FnMut() -> Template) -> Outcome {
    let first = build();
    let mut sock = match open_send_socket(ifindex, our_mac, first.src, first.dst).await {
        Ok(s) => s,
        Err(_e) => {
            #[cfg(feature = "log")]
            warn!("advance_state: could not open a send socket: {_e}");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    send_frame(&mut sock, &first).await;

    let mut delay = INITIAL_BACKOFF;
    loop {
        Timer::after(delay).await;

        let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 + 1);
        delay = (delay + Duration::from_millis(jitter_ms)).min(BACKOFF_CAP);

        let template = build();
        send_frame(&mut sock, &template).await;
    }
}

async fn send_frame(sock: &mut psa_net_std::RawSocket, template: &Template) {
    let mut buf = [0u8; 1500];
    let encoded = psa_wire::ip_udp_encode(
        &mut buf,
        SocketAddrV4::new(template.src, CLIENT_PORT),
        SocketAddrV4::new(template.dst, psa_wire::message::SERVER_PORT),
        |payload| {
            let enc = template.message.encode();
            payload[..enc.len()].copy_from_slice(&enc);
            Ok(enc.len())
        },
    );
    if let Ok(encoded) = encoded {
        let len = encoded.len();
        let _ = sock.send_default(&buf[..len]).await;
    }
}

/// A broadcast destination gets a broadcast-bound socket outright. A
/// unicast destination (renewing) is ARP-resolved first, up to 5 tries of
/// 200 ms each; a broadcast socket is the fallback if resolution never
/// succeeds.
async fn open_send_socket(
    ifindex: u32,
    our_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) -> io::Result<psa_net_std::RawSocket> {
    if dst_ip == Ipv4Addr::BROADCAST {
        return psa_net_std::get_ip_send_sock(ifindex).await;
    }

    for _ in 0..UNICAST_RESOLVE_ATTEMPTS {
        if let Ok(Some(mac)) =
            psa_proto::arp::probe(ifindex, our_mac, src_ip, dst_ip, UNICAST_RESOLVE_DEADLINE).await
        {
            return psa_net_std::get_unicast_send_sock(ifindex, mac).await;
        }
    }

    psa_net_std::get_ip_send_sock(ifindex).await
}

async fn receive_loop(
    ifindex: u32,
    our_mac: MacAddr,
    deadline: Instant,
    verify: impl Fn(&Message, &DecodedOptions) -> VerifyResult,
) -> Outcome {
    let mut sock = match psa_net_std::get_ip_recv_sock(ifindex).await {
        Ok(s) => s,
        Err(_e) => {
            #[cfg(feature = "log")]
            warn!("advance_state: could not open a receive socket: {_e}");
            Timer::at(deadline).await;
            return Outcome::Failed;
        }
    };

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Outcome::Failed;
        }

        let mut buf = [0u8; 1500];
        let recv_fut = async { RawReceive::receive(&mut sock, &mut buf).await.ok() };
        let timeout_fut = async {
            Timer::after(remaining).await;
            None
        };

        if let Some((n, _src_mac)) = or(recv_fut, timeout_fut).await {
            if let Some(outcome) = decode_and_verify(&buf[..n], our_mac, &verify) {
                return outcome;
            }
        }
    }
}

/// The app-level echo filter (UDP dst port 68, `chaddr` matching our own
/// MAC) that really belongs in a BPF filter on the socket; everything past
/// that is `verify`'s job.
fn decode_and_verify(
    packet: &[u8],
    our_mac: MacAddr,
    verify: &impl Fn(&Message, &DecodedOptions) -> VerifyResult,
) -> Option<Outcome> {
    let (_src, _dst, payload) = psa_wire::ip_udp_decode(
        packet,
        None,
        Some(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, CLIENT_PORT)),
    )
    .ok()??;

    let msg = Message::decode(payload).ok()?;
    if msg.mac() != our_mac {
        return None;
    }

    let opts = DecodedOptions::decode(&msg.options);
    match verify(&msg, &opts) {
        VerifyResult::Pass => Some(Outcome::Passed(msg, opts)),
        VerifyResult::Nack => Some(Outcome::Nack),
        VerifyResult::Fail => None,
    }
}
