//! The `/etc/resolv.conf` updater (§6): reads the same `PSA_DHCPC_*` record
//! the script sees and rewrites the file via an atomic temp-file + rename.
//! This sits just outside the core's scope but is specified precisely
//! enough (exact regexes, exact permissions) that providing the real
//! implementation is cheaper and more faithful than leaving a stub.

use std::fs;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use crate::PsaDhcpcEnv;

/// Rewrites the system resolver configuration from a [`PsaDhcpcEnv`].
pub trait ResolvConfWriter {
    fn write(&self, env: &PsaDhcpcEnv) -> std::io::Result<()>;
}

/// Writes `/etc/resolv.conf`. A nameserver is only emitted if it matches
/// `^[0-9.]+$`; the search domain only if it matches `^[A-Za-z0-9.-]+$`.
/// The final file is mode 0644.
pub struct LinuxResolvConfWriter {
    path: std::path::PathBuf,
}

impl Default for LinuxResolvConfWriter {
    fn default() -> Self {
        Self {
            path: Path::new("/etc/resolv.conf").to_path_buf(),
        }
    }
}

impl LinuxResolvConfWriter {
    pub fn at(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn is_valid_nameserver(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn is_valid_search_domain(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

impl ResolvConfWriter for LinuxResolvConfWriter {
    fn write(&self, env: &PsaDhcpcEnv) -> std::io::Result<()> {
        let mut body = String::new();

        if let Some(domain) = &env.domain_name {
            if is_valid_search_domain(domain) {
                body.push_str("search ");
                body.push_str(domain);
                body.push('\n');
            }
        }

        for ns in &env.dns_list {
            let ns = ns.to_string();
            if is_valid_nameserver(&ns) {
                body.push_str("nameserver ");
                body.push_str(&ns);
                body.push('\n');
            }
        }

        let tmp_path = self.path.with_extension("psa-tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(body.as_bytes())?;
            tmp.set_permissions(fs::Permissions::from_mode(0o644))?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::os::unix::fs::PermissionsExt as _;

    #[test]
    fn writes_valid_nameservers_and_search_domain() {
        let dir = std::env::temp_dir().join(format!("psa-resolvconf-test-{}", std::process::id()));
        let writer = LinuxResolvConfWriter::at(&dir);

        let env = PsaDhcpcEnv {
            interface: "eth0".into(),
            domain_name: Some("example.com".into()),
            dns_list: vec![Ipv4Addr::new(8, 8, 8, 8)],
            ..Default::default()
        };

        writer.write(&env).unwrap();
        let contents = fs::read_to_string(&dir).unwrap();
        assert!(contents.contains("search example.com"));
        assert!(contents.contains("nameserver 8.8.8.8"));

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);

        fs::remove_file(&dir).ok();
    }

    #[test]
    fn rejects_invalid_entries() {
        assert!(!is_valid_nameserver("not-an-ip"));
        assert!(is_valid_nameserver("192.168.1.1"));
        assert!(!is_valid_search_domain("bad;domain"));
        assert!(is_valid_search_domain("example.com"));
    }
}
