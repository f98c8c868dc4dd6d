use std::collections::BTreeMap;
use std::net::IpAddr;

/// Access decision for an address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAccess {
    /// Connections permitted.
    Allowed,
    /// Connections refused.
    Blocked,
}

/// Inclusive address range with an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    /// First address of the range.
    pub first: IpAddr,
    /// Last address of the range.
    pub last: IpAddr,
    /// Decision applied to the range.
    pub access: IpAccess,
}

impl IpRange {
    fn contains(&self, addr: IpAddr) -> bool {
        match (self.first, self.last, addr) {
            (IpAddr::V4(first), IpAddr::V4(last), IpAddr::V4(addr)) => first <= addr && addr <= last,
            (IpAddr::V6(first), IpAddr::V6(last), IpAddr::V6(addr)) => first <= addr && addr <= last,
            _ => false,
        }
    }
}

/// Ordered set of address rules; later rules override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpFilter {
    rules: Vec<IpRange>,
}

impl IpFilter {
    /// Empty filter allowing everything.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule for `[first, last]`.
    pub fn add_rule(&mut self, first: IpAddr, last: IpAddr, access: IpAccess) {
        self.rules.push(IpRange {
            first,
            last,
            access,
        });
    }

    /// Decision for `addr`.
    #[must_use]
    pub fn access(&self, addr: IpAddr) -> IpAccess {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.contains(addr))
            .map_or(IpAccess::Allowed, |rule| rule.access)
    }

    /// Rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[IpRange] {
        &self.rules
    }
}

/// Assigns peer classes to address ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerClassFilter {
    /// `(first, last, class mask)` entries.
    pub ranges: Vec<(IpAddr, IpAddr, u32)>,
}

/// Socket types a peer class type filter distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SocketKind {
    /// Plain TCP.
    Tcp,
    /// uTP over UDP.
    Utp,
    /// TLS over TCP.
    SslTcp,
    /// TLS over uTP.
    SslUtp,
}

/// Adds or removes peer classes by socket type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerClassTypeFilter {
    /// Class masks added per socket kind.
    pub add: BTreeMap<SocketKind, u32>,
    /// Class masks removed per socket kind.
    pub remove: BTreeMap<SocketKind, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn later_rules_win() {
        let mut filter = IpFilter::new();
        let low = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0));
        let high = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 255));
        let probe = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        filter.add_rule(low, high, IpAccess::Blocked);
        assert_eq!(filter.access(probe), IpAccess::Blocked);
        filter.add_rule(probe, probe, IpAccess::Allowed);
        assert_eq!(filter.access(probe), IpAccess::Allowed);
        assert_eq!(
            filter.access(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))),
            IpAccess::Allowed
        );
    }
}
