//! Listener port blocking (spec §6 "Port blocking"): rejects binding to a
//! port on the Fetch Standard's "bad port" list
//! (<https://fetch.spec.whatwg.org/#port-blocking>), the same list
//! browsers use to refuse `fetch()`/`XHR` to those ports.

const BLOCKED_PORTS: &[u16] = &[
    1, 7, 9, 11, 13, 15, 17, 19, 20, 21, 22, 23, 25, 37, 42, 43, 53, 69, 77, 79, 87, 95, 101, 102,
    103, 104, 109, 110, 111, 113, 115, 117, 119, 123, 135, 137, 138, 139, 143, 161, 179, 389, 427,
    465, 512, 513, 514, 515, 526, 530, 531, 532, 540, 548, 554, 556, 563, 587, 601, 636, 989, 990,
    993, 995, 1719, 1720, 1723, 2049, 3659, 4045, 5060, 5061, 6000, 6566, 6665, 6666, 6667, 6668,
    6669, 6697, 10080,
];

pub fn is_blocked(port: u16) -> bool {
    BLOCKED_PORTS.contains(&port)
}

/// Validates a listener address isn't bound to a blocked port, fatal at
/// startup.
pub fn check(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    if is_blocked(addr.port()) {
        anyhow::bail!(
            "refusing to listen on port {}: it is on the browser port-blocking list",
            addr.port()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_blocked_ports_are_rejected() {
        assert!(is_blocked(22));
        assert!(is_blocked(6666));
    }

    #[test]
    fn ordinary_high_ports_are_allowed() {
        assert!(!is_blocked(8080));
        assert!(!is_blocked(3000));
    }
}
