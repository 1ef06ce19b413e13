//! Pool bookkeeping for IPv4 addresses and IPv6 prefixes.
//!
//! Both allocators are pure in-memory bitmaps behind one trait; they know
//! nothing about leases or persistence. `allocate`/`free` are atomic.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, PoisonError};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use tracing::warn;

use crate::error::{Error, Result};

pub trait Allocator: Send + Sync {
    /// Returns a free slot and marks it used. `None` (or an
    /// unspecified-address hint) means any free slot; a specific hint is
    /// honored exactly or fails with `Error::HintUnavailable`.
    fn allocate(&self, hint: Option<IpNet>) -> Result<IpNet>;

    /// Returns a slot to the pool. Freeing a slot that is not allocated is a
    /// logged anomaly, not an error.
    fn free(&self, net: IpNet) -> Result<()>;

    /// Number of slots currently in use.
    fn used(&self) -> usize;
}

/// Word-sparse bitmap. Absent words are all-free, so huge pools (an IPv6
/// /32 subdivided into /64s has 2^32 slots) cost memory proportional to the
/// slots actually touched.
struct Bitmap {
    words: HashMap<u64, u64>,
    capacity: u128,
    used: usize,
}

impl Bitmap {
    fn new(capacity: u128) -> Self {
        Self {
            words: HashMap::new(),
            capacity,
            used: 0,
        }
    }

    fn is_used(&self, slot: u128) -> bool {
        let word = (slot / 64) as u64;
        let bit = (slot % 64) as u32;
        self.words
            .get(&word)
            .is_some_and(|bits| bits & (1u64 << bit) != 0)
    }

    /// Marks a slot used; false if it already was.
    fn set(&mut self, slot: u128) -> bool {
        let word = (slot / 64) as u64;
        let bit = (slot % 64) as u32;
        let bits = self.words.entry(word).or_insert(0);
        if *bits & (1u64 << bit) != 0 {
            return false;
        }
        *bits |= 1u64 << bit;
        self.used += 1;
        true
    }

    /// Clears a slot; false if it was not used.
    fn clear(&mut self, slot: u128) -> bool {
        let word = (slot / 64) as u64;
        let bit = (slot % 64) as u32;
        match self.words.get_mut(&word) {
            Some(bits) if *bits & (1u64 << bit) != 0 => {
                *bits &= !(1u64 << bit);
                if *bits == 0 {
                    self.words.remove(&word);
                }
                self.used -= 1;
                true
            }
            _ => false,
        }
    }

    /// Lowest free slot. Only fully-used words cost scan time.
    fn first_free(&self) -> Option<u128> {
        let mut word: u64 = 0;
        loop {
            let base = word as u128 * 64;
            if base >= self.capacity {
                return None;
            }
            let bits = self.words.get(&word).copied().unwrap_or(0);
            if bits != u64::MAX {
                let bit = (!bits).trailing_zeros() as u128;
                let slot = base + bit;
                if slot >= self.capacity {
                    return None;
                }
                return Some(slot);
            }
            word += 1;
        }
    }
}

/// Allocator over an inclusive IPv4 range `[start, end]`; slots are /32s.
pub struct Ipv4RangeAllocator {
    start: u32,
    end: u32,
    bitmap: Mutex<Bitmap>,
}

impl Ipv4RangeAllocator {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        let start_num = u32::from(start);
        let end_num = u32::from(end);
        if start_num > end_num {
            return Err(Error::InvalidConfig(format!(
                "range start {} is above range end {}",
                start, end
            )));
        }
        let capacity = (end_num - start_num) as u128 + 1;
        Ok(Self {
            start: start_num,
            end: end_num,
            bitmap: Mutex::new(Bitmap::new(capacity)),
        })
    }

    fn slot_of(&self, addr: Ipv4Addr) -> Option<u128> {
        let num = u32::from(addr);
        if num < self.start || num > self.end {
            return None;
        }
        Some((num - self.start) as u128)
    }

    fn net_of(&self, slot: u128) -> IpNet {
        let addr = Ipv4Addr::from(self.start + slot as u32);
        IpNet::V4(Ipv4Net::new(addr, 32).expect("/32 is a valid prefix length"))
    }
}

impl Allocator for Ipv4RangeAllocator {
    fn allocate(&self, hint: Option<IpNet>) -> Result<IpNet> {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        let addr = match hint {
            None => None,
            Some(IpNet::V4(net)) if net.addr().is_unspecified() => None,
            Some(IpNet::V4(net)) => {
                if net.prefix_len() != 32 {
                    return Err(Error::HintUnavailable(IpNet::V4(net)));
                }
                Some(net.addr())
            }
            Some(other) => return Err(Error::HintUnavailable(other)),
        };
        match addr {
            Some(addr) => {
                let slot = self
                    .slot_of(addr)
                    .ok_or_else(|| Error::HintUnavailable(IpNet::V4(Ipv4Net::from(addr))))?;
                if !bitmap.set(slot) {
                    return Err(Error::HintUnavailable(IpNet::V4(Ipv4Net::from(addr))));
                }
                Ok(self.net_of(slot))
            }
            None => {
                let slot = bitmap.first_free().ok_or(Error::PoolExhausted)?;
                bitmap.set(slot);
                Ok(self.net_of(slot))
            }
        }
    }

    fn free(&self, net: IpNet) -> Result<()> {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        let freed = match net {
            IpNet::V4(v4) => self
                .slot_of(v4.addr())
                .map(|slot| bitmap.clear(slot))
                .unwrap_or(false),
            IpNet::V6(_) => false,
        };
        if !freed {
            warn!(net = %net, "freed a slot that was not allocated");
        }
        Ok(())
    }

    fn used(&self) -> usize {
        self.bitmap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .used
    }
}

/// Allocator over the children of length `alloc_len` inside a parent CIDR.
pub struct Ipv6PrefixAllocator {
    parent: Ipv6Net,
    alloc_len: u8,
    bitmap: Mutex<Bitmap>,
}

impl Ipv6PrefixAllocator {
    pub fn new(parent: Ipv6Net, alloc_len: u8) -> Result<Self> {
        if alloc_len > 128 {
            return Err(Error::InvalidConfig(format!(
                "allocation size {} is above 128",
                alloc_len
            )));
        }
        if alloc_len < parent.prefix_len() {
            return Err(Error::InvalidConfig(format!(
                "allocation size {} is wider than the pool prefix /{}",
                alloc_len,
                parent.prefix_len()
            )));
        }
        let depth = alloc_len - parent.prefix_len();
        if depth > 64 {
            return Err(Error::InvalidConfig(format!(
                "pool {} subdivided into /{} blocks has more than 2^64 slots",
                parent, alloc_len
            )));
        }
        let capacity = 1u128 << depth;
        Ok(Self {
            parent: parent.trunc(),
            alloc_len,
            bitmap: Mutex::new(Bitmap::new(capacity)),
        })
    }

    fn slot_of(&self, net: Ipv6Net) -> Option<u128> {
        if net.prefix_len() != self.alloc_len || !self.parent.contains(&net.addr()) {
            return None;
        }
        let base = u128::from(self.parent.network());
        let addr = u128::from(net.addr());
        let host_bits = 128 - self.alloc_len as u32;
        let offset = addr - base;
        // A hint with host bits set does not name a block boundary.
        if host_bits < 128 && offset.trailing_zeros() < host_bits && offset != 0 {
            return None;
        }
        Some(if host_bits >= 128 { 0 } else { offset >> host_bits })
    }

    fn net_of(&self, slot: u128) -> IpNet {
        let host_bits = 128 - self.alloc_len as u32;
        let base = u128::from(self.parent.network());
        let addr = if host_bits >= 128 {
            base
        } else {
            base + (slot << host_bits)
        };
        IpNet::V6(
            Ipv6Net::new(Ipv6Addr::from(addr), self.alloc_len)
                .expect("allocation size was validated against 128"),
        )
    }
}

impl Allocator for Ipv6PrefixAllocator {
    fn allocate(&self, hint: Option<IpNet>) -> Result<IpNet> {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        let specific = match hint {
            None => None,
            Some(IpNet::V6(net)) if net.addr().is_unspecified() => {
                if net.prefix_len() != 0 && net.prefix_len() != self.alloc_len {
                    return Err(Error::HintUnavailable(IpNet::V6(net)));
                }
                None
            }
            Some(IpNet::V6(net)) => Some(net),
            Some(other) => return Err(Error::HintUnavailable(other)),
        };
        match specific {
            Some(net) => {
                let slot = self
                    .slot_of(net)
                    .ok_or(Error::HintUnavailable(IpNet::V6(net)))?;
                if !bitmap.set(slot) {
                    return Err(Error::HintUnavailable(IpNet::V6(net)));
                }
                Ok(self.net_of(slot))
            }
            None => {
                let slot = bitmap.first_free().ok_or(Error::PoolExhausted)?;
                bitmap.set(slot);
                Ok(self.net_of(slot))
            }
        }
    }

    fn free(&self, net: IpNet) -> Result<()> {
        let mut bitmap = self.bitmap.lock().unwrap_or_else(PoisonError::into_inner);
        let freed = match net {
            IpNet::V6(v6) => self
                .slot_of(v6)
                .map(|slot| bitmap.clear(slot))
                .unwrap_or(false),
            IpNet::V4(_) => false,
        };
        if !freed {
            warn!(net = %net, "freed a prefix that was not allocated");
        }
        Ok(())
    }

    fn used(&self) -> usize {
        self.bitmap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_hint(addr: &str) -> Option<IpNet> {
        Some(IpNet::V4(Ipv4Net::new(addr.parse().unwrap(), 32).unwrap()))
    }

    #[test]
    fn test_range_allocates_lowest_first() {
        let allocator = Ipv4RangeAllocator::new(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
        )
        .unwrap();

        let first = allocator.allocate(None).unwrap();
        assert_eq!(first, "10.0.0.10/32".parse::<IpNet>().unwrap());
        let second = allocator.allocate(None).unwrap();
        assert_eq!(second, "10.0.0.11/32".parse::<IpNet>().unwrap());
        assert_eq!(allocator.used(), 2);
    }

    #[test]
    fn test_range_hint_semantics() {
        let allocator = Ipv4RangeAllocator::new(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 20),
        )
        .unwrap();

        let hinted = allocator.allocate(v4_hint("10.0.0.15")).unwrap();
        assert_eq!(hinted, "10.0.0.15/32".parse::<IpNet>().unwrap());

        // Same hint twice: taken.
        assert!(matches!(
            allocator.allocate(v4_hint("10.0.0.15")),
            Err(Error::HintUnavailable(_))
        ));
        // Outside the range.
        assert!(matches!(
            allocator.allocate(v4_hint("10.0.0.99")),
            Err(Error::HintUnavailable(_))
        ));
        // Zero address is an empty hint.
        assert!(allocator.allocate(v4_hint("0.0.0.0")).is_ok());
    }

    #[test]
    fn test_range_exhaustion_and_conservation() {
        let allocator = Ipv4RangeAllocator::new(
            Ipv4Addr::new(192, 168, 0, 1),
            Ipv4Addr::new(192, 168, 0, 3),
        )
        .unwrap();

        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(allocator.allocate(None).unwrap());
        }
        assert!(matches!(allocator.allocate(None), Err(Error::PoolExhausted)));
        assert_eq!(allocator.used(), 3);

        allocator.free(held.pop().unwrap()).unwrap();
        assert_eq!(allocator.used(), 2);
        assert!(allocator.allocate(None).is_ok());
    }

    #[test]
    fn test_free_unknown_is_a_noop() {
        let allocator = Ipv4RangeAllocator::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 5),
        )
        .unwrap();
        allocator
            .free("10.0.0.3/32".parse::<IpNet>().unwrap())
            .unwrap();
        assert_eq!(allocator.used(), 0);
    }

    #[test]
    fn test_prefix_allocates_inside_parent() {
        let parent: Ipv6Net = "2001:db8::/32".parse().unwrap();
        let allocator = Ipv6PrefixAllocator::new(parent, 64).unwrap();

        let IpNet::V6(first) = allocator.allocate(None).unwrap() else {
            panic!("expected a v6 prefix");
        };
        assert_eq!(first.prefix_len(), 64);
        assert!(parent.contains(&first.addr()));

        let second = allocator.allocate(None).unwrap();
        assert_ne!(IpNet::V6(first), second);
    }

    #[test]
    fn test_prefix_hint_round_trips() {
        let parent: Ipv6Net = "2001:db8::/48".parse().unwrap();
        let allocator = Ipv6PrefixAllocator::new(parent, 64).unwrap();

        let hint: IpNet = "2001:db8:0:42::/64".parse().unwrap();
        assert_eq!(allocator.allocate(Some(hint)).unwrap(), hint);
        assert!(matches!(
            allocator.allocate(Some(hint)),
            Err(Error::HintUnavailable(_))
        ));

        allocator.free(hint).unwrap();
        assert_eq!(allocator.allocate(Some(hint)).unwrap(), hint);
    }

    #[test]
    fn test_prefix_hint_length_must_match() {
        let parent: Ipv6Net = "2001:db8::/48".parse().unwrap();
        let allocator = Ipv6PrefixAllocator::new(parent, 64).unwrap();

        let wrong_len: IpNet = "2001:db8:0:42::/56".parse().unwrap();
        assert!(matches!(
            allocator.allocate(Some(wrong_len)),
            Err(Error::HintUnavailable(_))
        ));
    }

    #[test]
    fn test_prefix_pool_validation() {
        let parent: Ipv6Net = "2001:db8::/48".parse().unwrap();
        assert!(Ipv6PrefixAllocator::new(parent, 40).is_err());
        assert!(Ipv6PrefixAllocator::new("::/0".parse().unwrap(), 128).is_err());
    }

    #[test]
    fn test_huge_pool_stays_cheap() {
        // A /32 split into /64s has 2^32 slots; only touched words allocate.
        let parent: Ipv6Net = "2001:db8::/32".parse().unwrap();
        let allocator = Ipv6PrefixAllocator::new(parent, 64).unwrap();
        let far_hint: IpNet = "2001:db8:ffff:fff0::/64".parse().unwrap();
        assert_eq!(allocator.allocate(Some(far_hint)).unwrap(), far_hint);
        assert_eq!(allocator.used(), 1);
    }
}
