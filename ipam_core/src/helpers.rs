//! Bit helpers shared by the trie and the applicators.
//!
//! Every prefix is carried as a left-aligned `u128` key: IPv6 uses all 128
//! bits, IPv4 lives in the upper 32 bits. That way bit `i` (0 = MSB) means the
//! same thing for both families and one trie implementation serves both.

use crate::constants::{V4_BITS, V6_BITS};
use crate::types::AddressFamily;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[inline]
pub fn v4_key(addr: u32) -> u128 {
    (addr as u128) << 96
}

#[inline]
pub fn addr_key(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => v4_key(u32::from(*v4)),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

#[inline]
pub fn key_addr(family: AddressFamily, key: u128) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::from((key >> 96) as u32)),
        AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::from(key)),
    }
}

/// Canonical (network) key and prefix length of `net`.
#[inline]
pub fn net_key(net: &IpNet) -> (u128, u8) {
    let plen = net.prefix_len();
    (canonical(addr_key(&net.addr()), plen), plen)
}

/// Rebuild the network for a left-aligned key. `plen` is always valid for
/// `family` because keys only ever come out of `net_key`.
pub fn key_net(family: AddressFamily, key: u128, plen: u8) -> IpNet {
    match family {
        AddressFamily::Ipv4 => IpNet::V4(
            Ipv4Net::new(Ipv4Addr::from((key >> 96) as u32), plen.min(V4_BITS))
                .unwrap_or_default(),
        ),
        AddressFamily::Ipv6 => IpNet::V6(
            Ipv6Net::new(Ipv6Addr::from(key), plen.min(V6_BITS)).unwrap_or_default(),
        ),
    }
}

/// Host-sized network (/32 or /128) for an address.
pub fn host_net(addr: IpAddr) -> IpNet {
    let bits = match addr {
        IpAddr::V4(_) => V4_BITS,
        IpAddr::V6(_) => V6_BITS,
    };
    IpNet::new(addr, bits).unwrap_or_default()
}

#[inline]
pub fn family_bits(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::Ipv4 => V4_BITS,
        AddressFamily::Ipv6 => V6_BITS,
    }
}

pub fn common_prefix_len(key1: u128, key2: u128, max_len: u8) -> u8 {
    if max_len == 0 {
        return 0;
    }
    let diff = (key1 ^ key2) & mask(max_len);
    if diff == 0 {
        return max_len;
    }
    (diff.leading_zeros() as u8).min(max_len)
}

#[inline]
pub fn get_bit(key: u128, index: u8) -> usize {
    debug_assert!(index <= 127);
    ((key >> (127 - index)) & 1) as usize
}

#[inline]
pub fn mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else if prefix_len >= 128 {
        !0u128
    } else {
        !(!0u128 >> prefix_len)
    }
}

// Canonicalise a key: zero host bits beyond `plen`.
#[inline(always)]
pub fn canonical(key: u128, plen: u8) -> u128 {
    key & mask(plen)
}

/// Key of the upper half when `(key, plen)` is split in two.
#[inline]
pub fn upper_half(key: u128, plen: u8) -> u128 {
    debug_assert!(plen < 128);
    key | (1u128 << (127 - plen))
}

/// Whether `(inner, inner_len)` lies inside `(outer, outer_len)`.
#[inline]
pub fn covers(outer: u128, outer_len: u8, inner: u128, inner_len: u8) -> bool {
    outer_len <= inner_len && canonical(inner, outer_len) == outer
}
