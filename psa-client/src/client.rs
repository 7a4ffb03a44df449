//! The `dclient`-equivalent driver: owns the state, the last accepted
//! reply, the bound-phase deadlines, and the rate limiter, and wires the
//! eight per-state bodies into the transition table from distilled spec
//! §4.6. Grounded on `dclient.go`'s `Run`/`ResumeClient`/`buildNetconfig`
//! and `sysstates.go`'s `PurgeInterface`/`ArpCheck`/`Ifconfig`/`panicReset`.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant, SystemTime};

use psa_net::MacAddr;
use psa_proto::options::DecodedOptions;
use psa_proto::{templates, verify};
use psa_wire::message::Message;

use psa_ifconfig::{classful_default_netmask, Applier, IfaceConfig};

use crate::error::Error;
use crate::limiter::RateLimiter;
use crate::netio::{advance_state, Outcome};
use crate::state::{Deadlines, State};

#[cfg(feature = "log")]
use log::{debug, info, warn};

const DISCOVERING_DEADLINE: Duration = Duration::from_secs(600);
const SELECTING_DEADLINE: Duration = Duration::from_secs(60);
const ARP_CHECK_DEADLINE: Duration = Duration::from_millis(200);
const PANIC_RESET_COOLDOWN: Duration = Duration::from_secs(30);
const RESUME_REVALIDATION_WINDOW: Duration = Duration::from_secs(5);
const T1_FRACTION: f64 = 0.5;
const T2_FRACTION: f64 = 0.875;
const MIN_OVERRIDE_RENEWAL: Duration = Duration::from_secs(60);

/// Everything the state machine needs from the outside world: which
/// interface it owns, the collaborators it drives (`Applier`, the
/// callback dispatcher), and whether a downstream default route should
/// be configured at all (the `filterNetconfig` router-suppression hook).
pub struct ClientConfig {
    pub ifindex: u32,
    pub ifname: String,
    pub mac: MacAddr,
    pub configure_router: bool,
    pub applier: Box<dyn Applier + Send + Sync>,
    pub callback: Box<dyn Fn(Option<&IfaceConfig>) + Send + Sync>,
}

/// The eight-state lease machine for one interface.
pub struct Client {
    config: ClientConfig,
    state: State,
    xid: u32,
    last_msg: Message,
    last_opts: DecodedOptions,
    deadlines: Deadlines,
    limiter: RateLimiter,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: State::PurgeInterface,
            xid: 0,
            last_msg: Message::for_mac([0; 6]),
            last_opts: DecodedOptions::default(),
            deadlines: Deadlines::at(SystemTime::UNIX_EPOCH),
            limiter: RateLimiter::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Drives the state machine until the rate limiter is exhausted, which
    /// is the only condition this loop ever returns an error for -- every
    /// other failure mode is folded into a state transition.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            if !self.limiter.take() {
                return Err(Error::RateLimitExhausted);
            }

            self.state = match self.state {
                State::PurgeInterface => self.run_purge_interface().await,
                State::Discovering => self.run_discovering().await,
                State::Selecting => self.run_selecting().await,
                State::ArpCheck => self.run_arp_check().await,
                State::Ifconfig => self.run_ifconfig().await,
                State::Bound => self.run_bound().await,
                State::Renewing => self.run_renewing().await,
                State::Rebinding => self.run_rebinding().await,
            };
        }
    }

    /// The resume-on-link-event wrapper (distilled spec §4.6, "Resume
    /// after link event"): called by the caller's link-up monitor after it
    /// has cancelled whatever `advance_state`/sleep was in flight.
    pub fn resume(&mut self) {
        match self.state {
            State::Bound | State::Renewing | State::Rebinding => {
                self.deadlines = Deadlines::at(SystemTime::now() + RESUME_REVALIDATION_WINDOW);
                self.state = State::Rebinding;
            }
            _ => self.state = State::PurgeInterface,
        }
    }

    async fn run_purge_interface(&mut self) -> State {
        if let Err(_e) = self.config.applier.unconfigure(&self.config.ifname) {
            #[cfg(feature = "log")]
            warn!("PurgeInterface: unconfigure failed, continuing anyway: {_e}");
        }
        (self.config.callback)(None);
        State::Discovering
    }

    async fn run_discovering(&mut self) -> State {
        self.xid = rand::random();
        let xid = self.xid;
        let mac = self.config.mac;
        let start = Instant::now();

        let build = move || templates::discover(xid, mac, elapsed_secs(start));
        let verify = move |msg: &Message, opts: &DecodedOptions| verify::verify_offer(msg, opts, xid, mac);

        let deadline = Instant::now() + DISCOVERING_DEADLINE;
        match advance_state(self.config.ifindex, mac, deadline, build, verify).await {
            Outcome::Passed(msg, opts) => {
                #[cfg(feature = "log")]
                debug!("Discovering: offer accepted from {:?}", opts.server_identifier);
                self.last_msg = msg;
                self.last_opts = opts;
                State::Selecting
            }
            Outcome::Nack | Outcome::Failed => State::Discovering,
        }
    }

    async fn run_selecting(&mut self) -> State {
        let xid = self.xid;
        let mac = self.config.mac;
        let requested_ip = self.last_msg.yiaddr;
        let server_id = self.last_opts.server_identifier.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let start = Instant::now();

        let build = move || templates::request_selecting(xid, mac, elapsed_secs(start), requested_ip, server_id);
        let verify = move |msg: &Message, opts: &DecodedOptions| {
            verify::verify_ack(msg, opts, xid, mac, requested_ip, server_id)
        };

        let deadline = Instant::now() + SELECTING_DEADLINE;
        match advance_state(self.config.ifindex, mac, deadline, build, verify).await {
            Outcome::Passed(msg, opts) => {
                self.last_msg = msg;
                self.last_opts = opts;
                State::ArpCheck
            }
            // A NAK here is just another reason to start over, unlike the
            // bound-phase states where it fast-tracks straight to
            // PurgeInterface.
            Outcome::Nack | Outcome::Failed => State::Discovering,
        }
    }

    async fn run_arp_check(&mut self) -> State {
        let target = self.last_msg.yiaddr;
        let probe = psa_proto::arp::probe(
            self.config.ifindex,
            self.config.mac,
            Ipv4Addr::UNSPECIFIED,
            target,
            ARP_CHECK_DEADLINE,
        )
        .await;

        if let Ok(Some(replier_mac)) = probe {
            if replier_mac != self.config.mac {
                #[cfg(feature = "log")]
                warn!("ArpCheck: {target} is already in use by {replier_mac:02x?}");
                self.panic_reset().await;
                return State::PurgeInterface;
            }
        }

        State::Ifconfig
    }

    async fn run_ifconfig(&mut self) -> State {
        let conf = self.build_netconfig();

        match self.config.applier.apply(&conf) {
            Ok(()) => {
                #[cfg(feature = "log")]
                info!("Ifconfig: applied {} on {}", conf.address, conf.ifname);
                self.compute_deadlines(&conf);
                (self.config.callback)(Some(&conf));
                State::Bound
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                warn!("Ifconfig: apply failed: {_e}");
                self.panic_reset().await;
                State::PurgeInterface
            }
        }
    }

    async fn run_bound(&mut self) -> State {
        tolerant_sleep_until(self.deadlines.t1).await;
        State::Renewing
    }

    async fn run_renewing(&mut self) -> State {
        self.xid = rand::random();
        let xid = self.xid;
        let mac = self.config.mac;
        let client_ip = self.last_msg.yiaddr;
        let server_ip = self.last_opts.server_identifier.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let start = Instant::now();

        let build = move || templates::request_renewing(xid, mac, elapsed_secs(start), client_ip, server_ip);
        let verify = move |msg: &Message, opts: &DecodedOptions| {
            verify::verify_ack(msg, opts, xid, mac, client_ip, server_ip)
        };

        let deadline = instant_from_systemtime(self.deadlines.t2);
        match advance_state(self.config.ifindex, mac, deadline, build, verify).await {
            Outcome::Passed(msg, opts) => {
                self.last_msg = msg;
                self.last_opts = opts;
                State::ArpCheck
            }
            Outcome::Nack => State::PurgeInterface,
            Outcome::Failed => State::Rebinding,
        }
    }

    async fn run_rebinding(&mut self) -> State {
        self.xid = rand::random();
        let xid = self.xid;
        let mac = self.config.mac;
        let client_ip = self.last_msg.yiaddr;
        let start = Instant::now();

        let build = move || templates::request_rebinding(xid, mac, elapsed_secs(start), client_ip);
        let verify =
            move |msg: &Message, opts: &DecodedOptions| verify::verify_rebind_ack(msg, opts, xid, mac, client_ip);

        let deadline = instant_from_systemtime(self.deadlines.tx);
        match advance_state(self.config.ifindex, mac, deadline, build, verify).await {
            Outcome::Passed(msg, opts) => {
                self.last_msg = msg;
                self.last_opts = opts;
                State::ArpCheck
            }
            // Both failure modes give up on the current lease entirely --
            // rebinding was already our last resort before expiry.
            Outcome::Nack | Outcome::Failed => State::PurgeInterface,
        }
    }

    /// Log, best-effort unconfigure, 30 s cooldown. The caller is
    /// responsible for landing back in `PurgeInterface`, which is what
    /// fires the nil-config callback.
    async fn panic_reset(&mut self) {
        #[cfg(feature = "log")]
        warn!("panic_reset: tearing down {} for {PANIC_RESET_COOLDOWN:?}", self.config.ifname);
        let _ = self.config.applier.unconfigure(&self.config.ifname);
        async_io::Timer::after(PANIC_RESET_COOLDOWN).await;
    }

    /// `buildNetconfig` (distilled spec §4.6a): netmask from the option if
    /// present else the classful default, router from the first router
    /// option unless suppressed, everything else copied raw and unclamped
    /// from the last accepted reply.
    fn build_netconfig(&self) -> IfaceConfig {
        let netmask = self
            .last_opts
            .subnet_mask
            .unwrap_or_else(|| classful_default_netmask(self.last_msg.yiaddr));

        let router = self
            .last_opts
            .routers
            .first()
            .copied()
            .filter(|_| self.config.configure_router);

        IfaceConfig {
            ifindex: self.config.ifindex,
            ifname: self.config.ifname.clone(),
            address: self.last_msg.yiaddr,
            netmask,
            router,
            mtu: self.last_opts.interface_mtu,
            dns: self.last_opts.dns.clone(),
            domain_name: self.last_opts.domain_name.clone(),
            lease_duration: self.last_opts.ip_address_lease_duration().unwrap_or_default(),
        }
    }

    /// The `(t1, t2, tx)` computation on entry to `Bound` (distilled spec
    /// §4.6): defaults to 50%/87.5%/100% of the lease, overridden by the
    /// server's renewal/rebind durations only when they're sane relative
    /// to each other and to the lease itself.
    fn compute_deadlines(&mut self, conf: &IfaceConfig) {
        let now = SystemTime::now();
        let lease = conf.lease_duration;

        let mut t1 = now + lease.mul_f64(T1_FRACTION);
        let mut t2 = now + lease.mul_f64(T2_FRACTION);
        let tx = now + lease;

        if let (Some(renewal), Some(rebind)) =
            (self.last_opts.renewal_duration(), self.last_opts.rebind_duration())
        {
            if renewal > MIN_OVERRIDE_RENEWAL && rebind > renewal && rebind < lease {
                t1 = now + renewal;
                t2 = now + rebind;
            }
        }

        self.deadlines = Deadlines { t1, t2, tx };
    }
}

fn elapsed_secs(start: Instant) -> u16 {
    start.elapsed().as_secs().min(u16::MAX as u64) as u16
}

/// Converts a `SystemTime` deadline to an `Instant` the reactor's timers
/// can use; a deadline already in the past collapses to "now".
fn instant_from_systemtime(deadline: SystemTime) -> Instant {
    match deadline.duration_since(SystemTime::now()) {
        Ok(remaining) => Instant::now() + remaining,
        Err(_) => Instant::now(),
    }
}

/// A tolerant absolute-time sleep (distilled spec §4.6, Bound): wakes up
/// at least every 17 s to recompute the remaining time, so a suspend or
/// clock jump that moves wall-clock forward is observed promptly instead
/// of producing an arbitrarily long oversleep.
async fn tolerant_sleep_until(deadline: SystemTime) {
    const MAX_POLL: Duration = Duration::from_secs(17);

    loop {
        let remaining = match deadline.duration_since(SystemTime::now()) {
            Ok(d) => d,
            Err(_) => return,
        };
        if remaining.is_zero() {
            return;
        }
        async_io::Timer::after(remaining.min(MAX_POLL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoopApplier;
    impl Applier for NoopApplier {
        fn apply(&self, _config: &IfaceConfig) -> Result<(), psa_ifconfig::Error> {
            Ok(())
        }
        fn unconfigure(&self, _ifname: &str) -> Result<(), psa_ifconfig::Error> {
            Ok(())
        }
    }

    fn test_client() -> Client {
        Client::new(ClientConfig {
            ifindex: 1,
            ifname: "eth0".into(),
            mac: [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            configure_router: true,
            applier: Box::new(NoopApplier),
            callback: Box::new(|_| {}),
        })
    }

    #[test]
    fn starts_in_purge_interface() {
        assert_eq!(test_client().state(), State::PurgeInterface);
    }

    // Invariant 10: during Bound, t1 < t2 <= tx.
    #[test]
    fn compute_deadlines_defaults_are_monotonic() {
        let mut client = test_client();
        client.last_opts = DecodedOptions::default();
        let conf = IfaceConfig {
            ifindex: 1,
            ifname: "eth0".into(),
            address: Ipv4Addr::new(192, 168, 1, 50),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            router: None,
            mtu: None,
            dns: vec![],
            domain_name: None,
            lease_duration: Duration::from_secs(3600),
        };
        client.compute_deadlines(&conf);
        assert!(client.deadlines.t1 < client.deadlines.t2);
        assert!(client.deadlines.t2 <= client.deadlines.tx);
    }

    #[test]
    fn compute_deadlines_ignores_a_too_short_renewal_override() {
        let mut client = test_client();
        client.last_opts.renewal_duration_secs = Some(30); // under the 60s floor
        client.last_opts.rebind_duration_secs = Some(1800);
        let conf = IfaceConfig {
            ifindex: 1,
            ifname: "eth0".into(),
            address: Ipv4Addr::new(192, 168, 1, 50),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            router: None,
            mtu: None,
            dns: vec![],
            domain_name: None,
            lease_duration: Duration::from_secs(3600),
        };
        let now = SystemTime::now();
        client.compute_deadlines(&conf);
        let default_t1 = now + Duration::from_secs(1800);
        let delta = client
            .deadlines
            .t1
            .duration_since(default_t1)
            .or_else(|_| default_t1.duration_since(client.deadlines.t1))
            .unwrap();
        assert!(delta < Duration::from_secs(2));
    }

    #[test]
    fn compute_deadlines_honors_a_sane_renewal_override() {
        let mut client = test_client();
        client.last_opts.renewal_duration_secs = Some(600);
        client.last_opts.rebind_duration_secs = Some(1200);
        let conf = IfaceConfig {
            ifindex: 1,
            ifname: "eth0".into(),
            address: Ipv4Addr::new(192, 168, 1, 50),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            router: None,
            mtu: None,
            dns: vec![],
            domain_name: None,
            lease_duration: Duration::from_secs(3600),
        };
        let now = SystemTime::now();
        client.compute_deadlines(&conf);
        let expect_t1 = now + Duration::from_secs(600);
        let delta = client
            .deadlines
            .t1
            .duration_since(expect_t1)
            .or_else(|_| expect_t1.duration_since(client.deadlines.t1))
            .unwrap();
        assert!(delta < Duration::from_secs(2));
    }

    #[test]
    fn build_netconfig_suppresses_router_when_not_configuring_routes() {
        let mut client = test_client();
        client.config.configure_router = false;
        client.last_msg.yiaddr = Ipv4Addr::new(192, 168, 1, 50);
        client.last_opts.routers = vec![Ipv4Addr::new(192, 168, 1, 1)];
        let conf = client.build_netconfig();
        assert_eq!(conf.router, None);
    }

    #[test]
    fn build_netconfig_uses_classful_default_netmask_when_absent() {
        let mut client = test_client();
        client.last_msg.yiaddr = Ipv4Addr::new(10, 1, 2, 3);
        client.last_opts.subnet_mask = None;
        let conf = client.build_netconfig();
        assert_eq!(conf.netmask, Ipv4Addr::new(255, 0, 0, 0));
    }

    #[test]
    fn resume_from_bound_forces_rebinding_with_tight_deadlines() {
        let mut client = test_client();
        client.state = State::Bound;
        client.resume();
        assert_eq!(client.state(), State::Rebinding);
        assert_eq!(client.deadlines.t1, client.deadlines.tx);
    }

    #[test]
    fn resume_from_discovering_resets_to_purge_interface() {
        let mut client = test_client();
        client.state = State::Discovering;
        client.resume();
        assert_eq!(client.state(), State::PurgeInterface);
    }

    #[test]
    fn callback_invoked_on_resume_to_purge_interface_path() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let mut client = Client::new(ClientConfig {
            ifindex: 1,
            ifname: "eth0".into(),
            mac: [1, 2, 3, 4, 5, 6],
            configure_router: true,
            applier: Box::new(NoopApplier),
            callback: Box::new(move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        });
        futures_lite::future::block_on(client.run_purge_interface());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
