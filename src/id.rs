//! Correlation id minting
//!
//! Ids are UUID v4. Random bytes come from the operating system; when that
//! source fails, a seeded pseudo-random generator produces the same UUID
//! shape so event creation never fails.

use rand::rngs::{OsRng, SmallRng};
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::{Builder, Uuid};

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Mint a fresh correlation id
pub(crate) fn mint() -> Uuid {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => Builder::from_random_bytes(bytes).into_uuid(),
        Err(_) => pseudo_random(),
    }
}

/// UUID v4-shaped id from a non-cryptographic generator
pub(crate) fn pseudo_random() -> Uuid {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut rng = SmallRng::seed_from_u64(nanos ^ counter.rotate_left(32));
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Builder::from_random_bytes(bytes).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::{Variant, Version};

    #[test]
    fn test_mint_is_v4() {
        let id = mint();
        assert_eq!(id.get_version(), Some(Version::Random));
        assert_eq!(id.get_variant(), Variant::RFC4122);
    }

    #[test]
    fn test_pseudo_random_shape_and_uniqueness() {
        let ids: HashSet<Uuid> = (0..1000).map(|_| pseudo_random()).collect();
        assert_eq!(ids.len(), 1000);
        for id in ids {
            assert_eq!(id.get_version(), Some(Version::Random));
            assert_eq!(id.get_variant(), Variant::RFC4122);
        }
    }
}
