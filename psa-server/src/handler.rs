//! The request handler (distilled spec §4.8): dispatches DISCOVER/REQUEST,
//! classifies a REQUEST into INIT-REBOOT/SELECTING/RENEWING/REBINDING, and
//! assembles OFFER/ACK/NAK replies. Grounded on `lib/server/{netio.go,
//! server.go,utils.go,replies/*.go}`.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use psa_net::{MacAddr, RawSend};
use psa_wire::message::{Message, MessageType, Opt, CLIENT_PORT, OP_REPLY, SERVER_PORT};
use psa_proto::options::{server_nak_options, server_reply_options, DecodedOptions};

use crate::config::ServerConfig;
use crate::ipdb::{Duid, Ipdb};
use crate::Error;

#[cfg(feature = "log")]
use log::{debug, warn};

const BROADCAST_MAC: MacAddr = [0xff; 6];
/// How long a just-offered address is reserved before the client either
/// confirms it with a REQUEST or lets it lapse (`netio.go`'s `handleDiscover`).
const DISCOVER_RESERVATION: Duration = Duration::from_secs(15);

/// Owns the address table and configuration for one interface, and turns
/// decoded DHCP messages into IPDB operations and replies.
pub struct Handler {
    ifindex: u32,
    our_mac: MacAddr,
    self_ip: Ipv4Addr,
    ipdb: Ipdb,
    config: ServerConfig,
}

impl Handler {
    /// Builds the IPDB from `config` and gives the server itself a
    /// permanent fake lease on `self_ip`, the way `server.New` does, plus a
    /// permanent entry for every client override that pins a static IP.
    pub fn new(
        ifindex: u32,
        our_mac: MacAddr,
        self_ip: Ipv4Addr,
        config: ServerConfig,
    ) -> Result<Self, Error> {
        let ipdb = Ipdb::new(config.network, config.netmask)?;

        if let Some((begin, end)) = config.dynamic_range {
            ipdb.set_dynamic_range(begin, end)?;
        }
        if config.static_only {
            ipdb.disable_dynamic();
        }

        ipdb.add_permanent_client(self_ip, Duid::from_mac(our_mac))?;
        for client in &config.clients {
            if let Some(ip) = client.ip {
                ipdb.add_permanent_client(ip, Duid::from_mac(client.mac))?;
            }
        }

        Ok(Self {
            ifindex,
            our_mac,
            self_ip,
            ipdb,
            config,
        })
    }

    /// The entry point for every decoded DHCP message received on the
    /// interface; `src`/`dst` are the message's IP-layer envelope.
    pub async fn handle_msg(&self, src: Ipv4Addr, dst: Ipv4Addr, msg: &Message) {
        let opts = DecodedOptions::decode(&msg.options);
        let mac = msg.mac();
        let duid = self.duid_for(mac, opts.client_identifier.as_deref());

        if mac == self.our_mac {
            #[cfg(feature = "log")]
            warn!("received a message with our own hwaddr from {duid}, dropped");
            return;
        }
        if opts.requested_ip == Some(self.self_ip) {
            #[cfg(feature = "log")]
            warn!("{duid} requested our own IP, nice try");
            return;
        }

        match opts.message_type {
            Some(MessageType::Discover) => self.handle_discover(dst, &duid, msg, &opts).await,
            Some(MessageType::Request) => self.handle_request(src, dst, &duid, msg, &opts).await,
            other => {
                #[cfg(feature = "log")]
                debug!("{duid} sent an unhandled message type: {other:?}");
            }
        }
    }

    async fn handle_discover(&self, dst: Ipv4Addr, duid: &Duid, msg: &Message, opts: &DecodedOptions) {
        if dst != Ipv4Addr::BROADCAST {
            #[cfg(feature = "log")]
            warn!("DISCOVER from {duid} was sent to {dst} instead of broadcast, dropped");
            return;
        }
        if opts.server_identifier.is_some() {
            #[cfg(feature = "log")]
            warn!("DISCOVER from {duid} named a server identifier, dropped");
            return;
        }

        // Cede the wire to a faster server half the time.
        if rand::random::<bool>() {
            async_io::Timer::after(Duration::from_millis(50)).await;
        }

        let offer = match self
            .ipdb
            .find_ip(
                self.ifindex,
                self.our_mac,
                self.self_ip,
                msg.mac(),
                opts.requested_ip,
                duid,
            )
            .await
        {
            Ok(ip) => ip,
            Err(_e) => {
                #[cfg(feature = "log")]
                warn!("DISCOVER: no free ip found for {duid}: {_e}");
                return;
            }
        };

        if let Err(_e) = self.ipdb.update_client(offer, duid.clone(), DISCOVER_RESERVATION) {
            #[cfg(feature = "log")]
            warn!("DISCOVER: failed to reserve {offer} for {duid}: {_e}");
            return;
        }

        #[cfg(feature = "log")]
        debug!("DISCOVER: offering {offer} to {duid}");

        let options = self.reply_options(MessageType::Offer, msg.mac());
        let reply = self.build_reply(msg.xid, msg.mac(), offer, options);
        let dst_mac = if msg.broadcast() { BROADCAST_MAC } else { msg.mac() };
        let _ = self.send_reply(dst_mac, offer, &reply).await;
    }

    async fn handle_request(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        duid: &Duid,
        msg: &Message,
        opts: &DecodedOptions,
    ) {
        let broadcast = dst == Ipv4Addr::BROADCAST;

        let desired_ip = if broadcast && opts.server_identifier.is_none() && opts.requested_ip.is_some() {
            opts.requested_ip.unwrap() // INIT-REBOOT
        } else if broadcast && opts.server_identifier == Some(self.self_ip) && opts.requested_ip.is_some() {
            opts.requested_ip.unwrap() // SELECTING
        } else if !broadcast && opts.server_identifier.is_none() && opts.requested_ip.is_none() {
            src // RENEWING
        } else if broadcast && opts.server_identifier.is_none() && opts.requested_ip.is_none() {
            src // REBINDING
        } else {
            #[cfg(feature = "log")]
            warn!("REQUEST from {duid} named a bogus server identifier {:?}, dropped", opts.server_identifier);
            return;
        };

        let lease = match self.ipdb.lookup_by_duid(duid) {
            Ok(ip) => ip,
            Err(_) => {
                #[cfg(feature = "log")]
                warn!("REQUEST: no lease on file for {duid}, sending NAK");
                self.send_nak(msg.xid, msg.mac()).await;
                return;
            }
        };
        if desired_ip != lease {
            #[cfg(feature = "log")]
            warn!("REQUEST: {duid} wanted {desired_ip} but holds {lease}, sending NAK");
            self.send_nak(msg.xid, msg.mac()).await;
            return;
        }

        if !psa_proto::arp::is_free(self.ifindex, self.our_mac, self.self_ip, lease, msg.mac()).await {
            #[cfg(feature = "log")]
            warn!("REQUEST: {lease} failed arp check, sending NAK");
            self.send_nak(msg.xid, msg.mac()).await;
            return;
        }

        if self
            .ipdb
            .update_client(lease, duid.clone(), self.config.lease_duration)
            .is_err()
        {
            // Probably a race condition -- just drop it, no NAK.
            #[cfg(feature = "log")]
            warn!("REQUEST: update_client({lease}, {duid}) raced, dropping silently");
            return;
        }

        #[cfg(feature = "log")]
        debug!("REQUEST: confirmed {lease} for {duid}");

        let options = self.reply_options(MessageType::Ack, msg.mac());
        let reply = self.build_reply(msg.xid, msg.mac(), lease, options);
        let dst_mac = if msg.broadcast() { BROADCAST_MAC } else { msg.mac() };
        let _ = self.send_reply(dst_mac, lease, &reply).await;
    }

    async fn send_nak(&self, xid: u32, client_mac: MacAddr) {
        let options = server_nak_options(self.self_ip);
        let reply = self.build_reply(xid, client_mac, Ipv4Addr::UNSPECIFIED, options);
        // The original always addresses a NAK's IP layer to the broadcast
        // address, but its link layer unicast to the client -- never to
        // the all-ones MAC, unlike OFFER/ACK.
        let _ = self.send_reply(client_mac, Ipv4Addr::BROADCAST, &reply).await;
    }

    fn duid_for(&self, mac: MacAddr, client_identifier: Option<&[u8]>) -> Duid {
        let synthesized = Duid::from_mac(mac);
        if self.ipdb.lookup_by_duid(&synthesized).is_ok() {
            // A static lease already keys off our synthesized duid.
            return synthesized;
        }
        match client_identifier {
            Some(cid) if cid.len() >= 4 => Duid::from_client_identifier(cid.to_vec()),
            _ => synthesized,
        }
    }

    /// Merges the per-client override (if any) for `mac` into the server
    /// defaults, then assembles the reply option list.
    fn reply_options(&self, message_type: MessageType, mac: MacAddr) -> Vec<Opt> {
        let mut router = self.config.router;
        let mut dns = self.config.dns.clone();
        let mut ntp = self.config.ntp.clone();
        let mut hostname = None;

        if let Some(ov) = self.config.override_for(mac) {
            if ov.router.is_some() {
                router = ov.router;
            }
            if !ov.dns.is_empty() {
                dns = ov.dns.clone();
            }
            if !ov.ntp.is_empty() {
                ntp = ov.ntp.clone();
            }
            if ov.hostname.is_some() {
                hostname = ov.hostname.clone();
            }
        }

        server_reply_options(
            message_type,
            self.self_ip,
            self.config.lease_duration,
            self.config.netmask,
            router,
            &dns,
            &ntp,
            self.config.domain.as_deref(),
            hostname.as_deref(),
        )
    }

    fn build_reply(&self, xid: u32, client_mac: MacAddr, yiaddr: Ipv4Addr, options: Vec<Opt>) -> Message {
        let mut m = Message::for_mac(client_mac);
        m.op = OP_REPLY;
        m.xid = xid;
        m.yiaddr = yiaddr;
        m.options = options;
        m
    }

    async fn send_reply(&self, dst_mac: MacAddr, dst_ip: Ipv4Addr, message: &Message) -> Result<(), Error> {
        let mut sock = psa_net_std::get_unicast_send_sock(self.ifindex, dst_mac).await?;

        let mut buf = [0u8; 1500];
        let encoded_len = {
            let encoded = psa_wire::ip_udp_encode(
                &mut buf,
                SocketAddrV4::new(self.self_ip, SERVER_PORT),
                SocketAddrV4::new(dst_ip, CLIENT_PORT),
                |payload| {
                    let enc = message.encode();
                    payload[..enc.len()].copy_from_slice(&enc);
                    Ok(enc.len())
                },
            )?;
            encoded.len()
        };

        sock.send_default(&buf[..encoded_len]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::new(
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            None,
            Duration::from_secs(3600),
            Some("example.invalid".into()),
            Some(Ipv4Addr::new(192, 168, 1, 1)),
            vec![],
            vec![],
            false,
            vec![],
        )
        .unwrap()
    }

    fn handler() -> Handler {
        Handler::new(
            1,
            [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            Ipv4Addr::new(192, 168, 1, 1),
            config(),
        )
        .unwrap()
    }

    #[test]
    fn self_is_preregistered_as_a_permanent_client() {
        let h = handler();
        let duid = Duid::from_mac(h.our_mac);
        assert_eq!(h.ipdb.lookup_by_duid(&duid).unwrap(), h.self_ip);
    }

    #[test]
    fn duid_for_prefers_client_identifier_over_synthesized_duid() {
        let h = handler();
        let mac = [1, 2, 3, 4, 5, 6];
        let duid = h.duid_for(mac, Some(&[9, 9, 9, 9, 9]));
        assert_eq!(duid, Duid::from_client_identifier(vec![9, 9, 9, 9, 9]));
    }

    #[test]
    fn duid_for_falls_back_to_synthesized_duid_without_an_identifier() {
        let h = handler();
        let mac = [1, 2, 3, 4, 5, 6];
        assert_eq!(h.duid_for(mac, None), Duid::from_mac(mac));
    }

    #[test]
    fn reply_options_apply_client_override() {
        let mut cfg = config();
        let mac = [1, 2, 3, 4, 5, 6];
        cfg.clients.push(crate::config::ClientOverride {
            mac,
            ip: None,
            router: Some(Ipv4Addr::new(192, 168, 1, 254)),
            hostname: Some("printer".into()),
            dns: vec![Ipv4Addr::new(8, 8, 8, 8)],
            ntp: vec![],
        });
        let h = Handler::new(1, [0, 0, 0, 0, 0, 1], Ipv4Addr::new(192, 168, 1, 1), cfg).unwrap();
        let opts = h.reply_options(MessageType::Offer, mac);

        let router_opt = opts
            .iter()
            .find(|o| o.code == psa_wire::message::opt::ROUTER)
            .unwrap();
        assert_eq!(router_opt.data, Ipv4Addr::new(192, 168, 1, 254).octets());

        let hostname_opt = opts
            .iter()
            .find(|o| o.code == psa_wire::message::opt::HOST_NAME)
            .unwrap();
        assert_eq!(hostname_opt.data, b"printer");
    }

    #[test]
    fn reply_options_omit_host_name_without_override() {
        let h = handler();
        let opts = h.reply_options(MessageType::Offer, [9, 9, 9, 9, 9, 9]);
        assert!(opts
            .iter()
            .all(|o| o.code != psa_wire::message::opt::HOST_NAME));
    }
}
