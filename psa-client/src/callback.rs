//! The script-invocation side of "fire callbacks with the new Ifconfig"
//! (distilled spec §3/§4.6): exports `PSA_DHCPC_*` and runs a configured
//! script, combined stdout/stderr logged. Grounded on
//! `lib/client/callback/callback.go`'s `Cbhandler`.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use psa_ifconfig::{IfaceConfig, PsaDhcpcEnv};

#[cfg(feature = "log")]
use log::warn;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs one script with the `PSA_DHCPC_*` environment on every significant
/// configuration change. A missing or non-executable script, a non-zero
/// exit, or a timeout are all logged and otherwise ignored -- the state
/// machine has already committed to its transition by the time the
/// callback fires.
pub struct ScriptCallback {
    script: PathBuf,
    ifname: String,
}

impl ScriptCallback {
    pub fn new(script: PathBuf, ifname: String) -> Self {
        Self { script, ifname }
    }

    /// `config = None` on unconfigure, `Some` after a successful apply.
    pub fn invoke(&self, config: Option<&IfaceConfig>) {
        let env = match config {
            Some(c) => PsaDhcpcEnv::from_config(&self.ifname, c),
            None => PsaDhcpcEnv::unconfigured(&self.ifname),
        };

        if let Err(_e) = self.run(&env) {
            #[cfg(feature = "log")]
            warn!("callback script {:?} failed to run: {_e}", self.script);
        }
    }

    fn run(&self, env: &PsaDhcpcEnv) -> std::io::Result<()> {
        let mut cmd = Command::new(&self.script);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        for (key, value) in env.to_env_pairs() {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;
        let deadline = Instant::now() + SCRIPT_TIMEOUT;

        loop {
            if let Some(status) = child.try_wait()? {
                let mut out = String::new();
                if let Some(mut stdout) = child.stdout.take() {
                    let _ = stdout.read_to_string(&mut out);
                }
                if let Some(mut stderr) = child.stderr.take() {
                    let _ = stderr.read_to_string(&mut out);
                }
                if !status.success() {
                    #[cfg(feature = "log")]
                    warn!("callback script {:?} exited with {status}: {out}", self.script);
                }
                return Ok(());
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                #[cfg(feature = "log")]
                warn!("callback script {:?} timed out after {SCRIPT_TIMEOUT:?}, killed", self.script);
                return Ok(());
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn invoke_runs_true_without_panicking() {
        let cb = ScriptCallback::new(PathBuf::from("/bin/true"), "eth0".into());
        cb.invoke(None);
    }

    #[test]
    fn invoke_with_config_runs_env_without_panicking() {
        let cb = ScriptCallback::new(PathBuf::from("/bin/true"), "eth0".into());
        let conf = IfaceConfig {
            ifindex: 2,
            ifname: "eth0".into(),
            address: Ipv4Addr::new(192, 168, 1, 50),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            router: Some(Ipv4Addr::new(192, 168, 1, 1)),
            mtu: Some(1500),
            dns: vec![Ipv4Addr::new(8, 8, 8, 8)],
            domain_name: None,
            lease_duration: Duration::from_secs(3600),
        };
        cb.invoke(Some(&conf));
    }
}
