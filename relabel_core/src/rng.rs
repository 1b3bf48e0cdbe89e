// Splittable random keys.
//
// Every stochastic call receives its own key by value. A key is never handed
// out twice: callers split the key they hold into (carry, use) and keep only
// the carry.
use rand::RngCore;
use rand::SeedableRng;
pub use rand_xoshiro::Xoshiro256StarStar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrngKey(u64);

impl PrngKey {
    pub fn new(seed: u64) -> Self {
        Self(Xoshiro256StarStar::seed_from_u64(seed).next_u64())
    }

    /// Consumes the key and returns two independent children. The right
    /// child is drawn after a `jump()`, so the two come from non-overlapping
    /// substreams of the key's generator.
    pub fn split(self) -> (PrngKey, PrngKey) {
        let mut stream = self.into_rng();
        let left = stream.next_u64();
        stream.jump();
        let right = stream.next_u64();
        (PrngKey(left), PrngKey(right))
    }

    /// Turns the key into a generator; the key is spent afterwards.
    pub fn into_rng(self) -> Xoshiro256StarStar {
        Xoshiro256StarStar::seed_from_u64(self.0)
    }

    /// Seed usable by libraries that take a plain integer.
    pub fn as_seed(&self) -> u64 {
        self.0
    }
}

/// Holds a key and hands out a fresh sub-key on every call, so a policy
/// closure never sees the same randomness twice.
#[derive(Debug, Clone)]
pub struct SuppliedRng {
    key: PrngKey,
}

impl SuppliedRng {
    pub fn new(key: PrngKey) -> Self {
        Self { key }
    }

    pub fn next_key(&mut self) -> PrngKey {
        let (carry, key) = self.key.split();
        self.key = carry;
        key
    }
}

impl Default for SuppliedRng {
    fn default() -> Self {
        Self::new(PrngKey::new(0))
    }
}
