use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::Error;

/// Where the device context is opened.
///
/// Mirrors the libiio URI schemes the NH7020 is reachable through, plus `sim:`
/// for the in-process simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `ip:HOST[:PORT]`; a bare host, `host:port` or IP literal is accepted
    /// as well.
    Network(String),
    /// `usb:` or `usb:BUS.DEV.INTF`.
    Usb(Option<String>),
    /// `local:`, for code running on the board itself.
    Local,
    /// `sim:`
    Simulated,
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason| Error::Endpoint {
            endpoint: s.to_string(),
            reason,
        };

        if s.is_empty() {
            return Err(invalid("empty endpoint"));
        }

        match s.split_once(':') {
            None => Ok(Endpoint::Network(s.to_string())),
            Some(("ip", "")) => Err(invalid("missing host")),
            Some(("ip", host)) => Ok(Endpoint::Network(host.to_string())),
            Some(("usb", "")) => Ok(Endpoint::Usb(None)),
            Some(("usb", addr)) => Ok(Endpoint::Usb(Some(addr.to_string()))),
            Some(("local", "")) => Ok(Endpoint::Local),
            Some(("sim", "")) => Ok(Endpoint::Simulated),
            Some(("local" | "sim", _)) => Err(invalid("scheme takes no argument")),
            Some(_) if looks_like_host(s) => Ok(Endpoint::Network(s.to_string())),
            Some(_) => Err(invalid("unsupported scheme")),
        }
    }
}

/// `fe80::1`, `[::1]:30431` or `pluto.local:30431`.
fn looks_like_host(s: &str) -> bool {
    if s.parse::<IpAddr>().is_ok() || s.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Network(host) => write!(f, "ip:{host}"),
            Endpoint::Usb(None) => write!(f, "usb:"),
            Endpoint::Usb(Some(addr)) => write!(f, "usb:{addr}"),
            Endpoint::Local => write!(f, "local:"),
            Endpoint::Simulated => write!(f, "sim:"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        assert_eq!(
            "ip:192.168.2.1".parse::<Endpoint>().unwrap(),
            Endpoint::Network("192.168.2.1".into())
        );
        assert_eq!(
            "pluto.local".parse::<Endpoint>().unwrap(),
            Endpoint::Network("pluto.local".into())
        );
        assert_eq!("usb:".parse::<Endpoint>().unwrap(), Endpoint::Usb(None));
        assert_eq!(
            "usb:1.5.5".parse::<Endpoint>().unwrap(),
            Endpoint::Usb(Some("1.5.5".into()))
        );
        assert_eq!("local:".parse::<Endpoint>().unwrap(), Endpoint::Local);
        assert_eq!(" sim: ".parse::<Endpoint>().unwrap(), Endpoint::Simulated);
    }

    #[test]
    fn test_bare_host_with_colon() {
        for host in ["192.168.2.1:30431", "fe80::1", "[::1]:30431", "pluto.local:30431"] {
            assert_eq!(
                host.parse::<Endpoint>().unwrap(),
                Endpoint::Network(host.into()),
                "{host}"
            );
        }
        assert_eq!(
            "ip:192.168.2.1:30431".parse::<Endpoint>().unwrap(),
            Endpoint::Network("192.168.2.1:30431".into())
        );
    }

    #[test]
    fn test_display_is_libiio_uri() {
        let endpoint: Endpoint = "192.168.2.1".parse().unwrap();
        assert_eq!(endpoint.to_string(), "ip:192.168.2.1");
        assert_eq!(Endpoint::Usb(None).to_string(), "usb:");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        for bad in ["", "ip:", "tcp:1.2.3.4", "sim:fast", "local:x", ":30431"] {
            let err = bad.parse::<Endpoint>().unwrap_err();
            assert!(matches!(err, Error::Endpoint { .. }), "{bad}: {err}");
        }
    }
}
