//! Consumer identity generation.
//!
//! Identities look like `consumer-QZK-00417-2026-10-17-1504`: a prefix, three
//! random uppercase letters, a zero-padded random number and, optionally, the
//! local creation minute. The random source is owned by the generator so
//! tests can seed it.

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LETTER_COUNT: usize = 3;
const NUMBER_BOUND: u32 = 1000;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M";

/// Generates consumer identities from an injected random source
#[derive(Debug)]
pub struct ConsumerNameGenerator {
    rng: StdRng,
    with_timestamp: bool,
}

impl ConsumerNameGenerator {
    pub fn new(rng: StdRng, with_timestamp: bool) -> Self {
        Self { rng, with_timestamp }
    }

    /// Deterministic generator for tests and reproducible runs
    pub fn from_seed_u64(seed: u64, with_timestamp: bool) -> Self {
        Self::new(StdRng::seed_from_u64(seed), with_timestamp)
    }

    /// Generator seeded from operating system entropy
    pub fn from_entropy(with_timestamp: bool) -> Self {
        Self::new(StdRng::from_entropy(), with_timestamp)
    }

    /// Generate a name stamped with the current local time
    pub fn generate(&mut self, prefix: &str) -> String {
        self.generate_at(prefix, Local::now())
    }

    /// Generate a name stamped with `now` (when timestamps are enabled)
    pub fn generate_at(&mut self, prefix: &str, now: DateTime<Local>) -> String {
        let letters: String = (0..LETTER_COUNT)
            .map(|_| char::from(b'A' + self.rng.gen_range(0..26u8)))
            .collect();
        let number = self.rng.gen_range(0..NUMBER_BOUND);

        let mut name = format!("{}-{}-{:05}", prefix, letters, number);
        if self.with_timestamp {
            name.push('-');
            name.push_str(&now.format(TIMESTAMP_FORMAT).to_string());
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_same_seed_same_names() {
        let mut a = ConsumerNameGenerator::from_seed_u64(7, false);
        let mut b = ConsumerNameGenerator::from_seed_u64(7, false);
        for _ in 0..5 {
            assert_eq!(a.generate("consumer"), b.generate("consumer"));
        }
    }

    #[test]
    fn test_name_shape_without_timestamp() {
        let mut generator = ConsumerNameGenerator::from_seed_u64(42, false);
        let name = generator.generate("GROUP");
        let parts: Vec<&str> = name.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "GROUP");
        assert_eq!(parts[1].len(), 3);
        assert!(parts[1].chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2].parse::<u32>().unwrap() < 1000);
    }

    #[test]
    fn test_name_with_timestamp_suffix() {
        let mut generator = ConsumerNameGenerator::from_seed_u64(1, true);
        let now = Local.with_ymd_and_hms(2026, 10, 17, 15, 4, 0).unwrap();
        let name = generator.generate_at("consumer", now);
        assert!(name.starts_with("consumer-"));
        assert!(name.ends_with("-2026-10-17-1504"));
    }

    #[test]
    fn test_successive_names_differ() {
        let mut generator = ConsumerNameGenerator::from_seed_u64(99, false);
        let names: std::collections::HashSet<String> =
            (0..20).map(|_| generator.generate("c")).collect();
        assert!(names.len() > 1);
    }
}
