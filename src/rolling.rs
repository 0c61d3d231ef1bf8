/// Adler-style rolling checksum over a fixed-size window.
///
/// Two 16-bit sums packed into a 32-bit value; the window can be slid one
/// byte at a time in O(1) by retiring the oldest byte and admitting the next.
const MOD_ADLER: u32 = 65521;

pub struct RollingChecksum {
    a: u32,
    b: u32,
    window: u32,
}

impl RollingChecksum {
    /// Seed the checksum from a whole block.
    pub fn from_block(block: &[u8]) -> Self {
        // Accumulate in u64 so the modular reduction happens once at the end
        // instead of per byte.
        let mut a: u64 = 1;
        let mut b: u64 = 0;
        for &byte in block {
            a += byte as u64;
            b += a;
        }
        Self {
            a: (a % MOD_ADLER as u64) as u32,
            b: (b % MOD_ADLER as u64) as u32,
            window: block.len() as u32,
        }
    }

    /// Slide the window one byte: retire `outgoing` from the front, admit
    /// `incoming` at the back.
    pub fn roll(&mut self, outgoing: u8, incoming: u8) {
        let out = outgoing as u32;
        let inc = incoming as u32;

        self.a = (self.a + MOD_ADLER - out + inc) % MOD_ADLER;
        self.b = (self.b + MOD_ADLER - 1 + self.a - (out * self.window) % MOD_ADLER) % MOD_ADLER;
    }

    pub fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let data = b"the quick brown fox";
        assert_eq!(
            RollingChecksum::from_block(data).value(),
            RollingChecksum::from_block(data).value()
        );
    }

    #[test]
    fn different_blocks_differ() {
        let left = RollingChecksum::from_block(b"Hello");
        let right = RollingChecksum::from_block(b"World");
        assert_ne!(left.value(), right.value());
    }

    #[test]
    fn roll_matches_fresh_seed() {
        let data = b"ABCDEF";
        let mut rolling = RollingChecksum::from_block(&data[0..4]);
        rolling.roll(data[0], data[4]);
        assert_eq!(
            rolling.value(),
            RollingChecksum::from_block(&data[1..5]).value()
        );

        rolling.roll(data[1], data[5]);
        assert_eq!(
            rolling.value(),
            RollingChecksum::from_block(&data[2..6]).value()
        );
    }
}
