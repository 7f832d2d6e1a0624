use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::IdsExhausted;
use crate::utils::time::current_timestamp_millis;

/// Time-based record identifier
///
/// Persisted as a decimal string, ordered by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(RecordId)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordIdVisitor;

        impl Visitor<'_> for RecordIdVisitor {
            type Value = RecordId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a numeric id as a string or an unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RecordId, E> {
                Ok(RecordId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RecordId, E> {
                u64::try_from(v)
                    .map(RecordId)
                    .map_err(|_| E::custom(format!("negative id: {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RecordId, E> {
                v.parse().map_err(|_| E::custom(format!("invalid id: {:?}", v)))
            }
        }

        deserializer.deserialize_any(RecordIdVisitor)
    }
}

/// Hands out strictly increasing time-based ids
///
/// Two ids requested within the same millisecond are bumped apart.
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> Result<RecordId, IdsExhausted> {
        let now = current_timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = last.checked_add(1).ok_or(IdsExhausted {
                last: RecordId(last),
            })?;
            let candidate = now.max(next);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(RecordId(candidate)),
                Err(actual) => last = actual,
            }
        }
    }

    /// Make sure future ids sort after an id loaded from storage
    pub fn observe(&self, id: RecordId) {
        self.last.fetch_max(id.0, Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let generator = IdGenerator::new();
        let mut previous = generator.next_id().unwrap();
        for _ in 0..1000 {
            let id = generator.next_id().unwrap();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn test_observe_moves_generator_forward() {
        let generator = IdGenerator::new();
        let far_future = RecordId(u64::MAX / 2);
        generator.observe(far_future);
        assert!(generator.next_id().unwrap() > far_future);
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let generator = IdGenerator::new();
        generator.observe(RecordId(u64::MAX - 1));
        assert_eq!(generator.next_id(), Ok(RecordId(u64::MAX)));
        assert_eq!(
            generator.next_id(),
            Err(IdsExhausted {
                last: RecordId(u64::MAX)
            })
        );

        // A failed request does not move the generator
        assert!(generator.next_id().is_err());
    }

    #[test]
    fn test_id_accepts_string_and_number() {
        let from_str: RecordId = serde_json::from_str("\"42\"").unwrap();
        let from_num: RecordId = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, RecordId(42));
        assert_eq!(from_num, RecordId(42));
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"42\"");
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!(serde_json::from_str::<RecordId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<RecordId>("-1").is_err());
    }
}
