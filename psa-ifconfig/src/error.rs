/// Errors an [`crate::Applier`] or the resolv.conf writer can raise.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Netlink(rtnetlink::Error),
    /// The netlink worker thread is gone (panicked or was dropped).
    WorkerGone,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rtnetlink::Error> for Error {
    fn from(value: rtnetlink::Error) -> Self {
        Self::Netlink(value)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Netlink(e) => write!(f, "netlink error: {e}"),
            Self::WorkerGone => write!(f, "netlink worker thread is no longer running"),
        }
    }
}

impl std::error::Error for Error {}
