//! Record key minting.
//!
//! Rkeys are ULIDs drawn from a single process-wide monotonic generator, so
//! keys minted within the same millisecond still compare strictly greater
//! than their predecessors. Ties between processes are broken by the storage
//! unique constraint.

use std::sync::Mutex;
use ulid::Generator;

pub struct RkeyMinter {
    generator: Mutex<Generator>,
}

impl RkeyMinter {
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }

    /// Mint the next rkey.
    ///
    /// The monotonic generator can only fail when the random component
    /// overflows within one millisecond; in that case we wait for the clock
    /// to advance and try again.
    pub fn mint(&self) -> String {
        let mut generator = self
            .generator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            match generator.generate() {
                Ok(ulid) => return ulid.to_string(),
                Err(_) => std::thread::sleep(std::time::Duration::from_millis(1)),
            }
        }
    }
}

impl Default for RkeyMinter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rkeys_are_26_chars() {
        let minter = RkeyMinter::new();
        assert_eq!(minter.mint().len(), 26);
    }

    #[test]
    fn rkeys_strictly_increase_within_a_millisecond() {
        let minter = RkeyMinter::new();
        let mut previous = minter.mint();
        // Enough iterations to guarantee same-millisecond collisions.
        for _ in 0..10_000 {
            let next = minter.mint();
            assert!(next > previous, "{next} should sort after {previous}");
            previous = next;
        }
    }
}
