//! Fixed-capacity FIFO caches for decoded keys and ECDH shared secrets.
//!
//! Both caches overwrite the oldest slot on insert regardless of use, and an
//! entry is only served while `now - stored_at < ttl`.

use crate::{CACHE_TTL_MS, ECDH_CACHE_SIZE, KEY_CACHE_SIZE};
use nostr::secp256k1::{PublicKey, SecretKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Slot<T> {
    value: T,
    stored_at: u64,
}

/// Ring of `N` optional slots with a write cursor.
struct Ring<T, const N: usize> {
    slots: [Option<Slot<T>>; N],
    next: usize,
}

impl<T, const N: usize> Ring<T, N> {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            next: 0,
        }
    }

    fn find(&self, now: u64, ttl_ms: u64, mut matches: impl FnMut(&T) -> bool) -> Option<&T> {
        self.slots.iter().flatten().find_map(|slot| {
            let fresh = now.saturating_sub(slot.stored_at) < ttl_ms;
            (fresh && matches(&slot.value)).then_some(&slot.value)
        })
    }

    /// Returns the evicted occupant, if any.
    fn insert(&mut self, value: T, now: u64) -> Option<T> {
        let evicted = self.slots[self.next].replace(Slot {
            value,
            stored_at: now,
        });
        self.next = (self.next + 1) % N;
        evicted.map(|slot| slot.value)
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.next = 0;
    }

    fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedKey {
    Private(SecretKey),
    Public(PublicKey),
}

struct KeyEntry {
    key_hex: String,
    key: DecodedKey,
}

/// Decoded private and public keys sharing one slot space.
pub struct KeyCache {
    ring: Ring<KeyEntry, KEY_CACHE_SIZE>,
    ttl_ms: u64,
    stats: CacheStats,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL_MS)
    }

    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            ring: Ring::new(),
            ttl_ms,
            stats: CacheStats::default(),
        }
    }

    pub fn get_private_key(&mut self, key_hex: &str, now: u64) -> Option<SecretKey> {
        let found = self
            .ring
            .find(now, self.ttl_ms, |entry| {
                entry.key_hex == key_hex && matches!(entry.key, DecodedKey::Private(_))
            })
            .and_then(|entry| match entry.key {
                DecodedKey::Private(secret_key) => Some(secret_key),
                DecodedKey::Public(_) => None,
            });
        self.record(found.is_some());
        found
    }

    pub fn get_public_key(&mut self, key_hex: &str, now: u64) -> Option<PublicKey> {
        let found = self
            .ring
            .find(now, self.ttl_ms, |entry| {
                entry.key_hex == key_hex && matches!(entry.key, DecodedKey::Public(_))
            })
            .and_then(|entry| match entry.key {
                DecodedKey::Public(public_key) => Some(public_key),
                DecodedKey::Private(_) => None,
            });
        self.record(found.is_some());
        found
    }

    pub fn store_private_key(&mut self, key_hex: &str, key: SecretKey, now: u64) {
        self.store(key_hex, DecodedKey::Private(key), now);
    }

    pub fn store_public_key(&mut self, key_hex: &str, key: PublicKey, now: u64) {
        self.store(key_hex, DecodedKey::Public(key), now);
    }

    fn store(&mut self, key_hex: &str, key: DecodedKey, now: u64) {
        let entry = KeyEntry {
            key_hex: key_hex.to_string(),
            key,
        };
        // Dropping the evicted entry releases its decoded key.
        drop(self.ring.insert(entry, now));
    }

    fn record(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

struct EcdhEntry {
    private_key_hex: String,
    public_key_hex: String,
    shared_x: [u8; 32],
}

/// ECDH x-coordinates keyed by the (private, public) hex pair.
pub struct EcdhCache {
    ring: Ring<EcdhEntry, ECDH_CACHE_SIZE>,
    ttl_ms: u64,
    stats: CacheStats,
}

impl EcdhCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL_MS)
    }

    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            ring: Ring::new(),
            ttl_ms,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, private_key_hex: &str, public_key_hex: &str, now: u64) -> Option<[u8; 32]> {
        let found = self
            .ring
            .find(now, self.ttl_ms, |entry| {
                entry.private_key_hex == private_key_hex && entry.public_key_hex == public_key_hex
            })
            .map(|entry| entry.shared_x);
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    pub fn store(&mut self, private_key_hex: &str, public_key_hex: &str, shared_x: [u8; 32], now: u64) {
        self.ring.insert(
            EcdhEntry {
                private_key_hex: private_key_hex.to_string(),
                public_key_hex: public_key_hex.to_string(),
                shared_x,
            },
            now,
        );
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl Default for EcdhCache {
    fn default() -> Self {
        Self::new()
    }
}
