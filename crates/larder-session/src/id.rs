//! Session identifier generation.
//!
//! Identifiers are drawn character by character from [`ALPHABET`] using the
//! operating system's CSPRNG. Random bytes at or above [`ACCEPT_LIMIT`] are
//! rejected so that every character is equally likely.

use std::future::Future;

use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::warn;

use crate::error::{Error, Result};

/// Characters that may appear in a session id. All are legal in a cookie value.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest multiple of the alphabet size that fits in a byte.
const ACCEPT_LIMIT: u8 = (256 - 256 % ALPHABET.len()) as u8;

/// Generate a random identifier of `length` characters from the OS entropy source.
pub fn generate_id(length: usize) -> Result<String> {
    generate_id_with(&mut OsRng, length)
}

/// Generate a random identifier using the given fallible RNG.
pub fn generate_id_with<R>(rng: &mut R, length: usize) -> Result<String>
where
    R: TryRngCore + ?Sized,
{
    let mut id = String::with_capacity(length);
    let mut buf = vec![0u8; length.max(8)];

    while id.len() < length {
        rng.try_fill_bytes(&mut buf)
            .map_err(|e| Error::Generation(e.to_string()))?;

        for &byte in &buf {
            if byte >= ACCEPT_LIMIT {
                continue;
            }
            id.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);
            if id.len() == length {
                break;
            }
        }
    }

    Ok(id)
}

/// Generate ids until `claim` accepts one.
///
/// `claim` receives each candidate and returns `Ok(Some(_))` once it has
/// taken ownership of the id, or `Ok(None)` if the id is already in use.
/// Fails with [`Error::ExhaustedIdSpace`] after `max_attempts` collisions.
pub async fn claim_unique_id<T, F, Fut>(
    length: usize,
    max_attempts: usize,
    mut claim: F,
) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=max_attempts {
        let candidate = generate_id(length)?;
        if let Some(claimed) = claim(candidate).await? {
            return Ok(claimed);
        }
        warn!(attempt, length, "Session id collision, retrying");
    }

    Err(Error::ExhaustedIdSpace {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Replays a fixed byte sequence.
    struct ScriptedRng {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl TryRngCore for ScriptedRng {
        type Error = std::convert::Infallible;

        fn try_next_u32(&mut self) -> std::result::Result<u32, Self::Error> {
            let mut buf = [0u8; 4];
            self.try_fill_bytes(&mut buf)?;
            Ok(u32::from_le_bytes(buf))
        }

        fn try_next_u64(&mut self) -> std::result::Result<u64, Self::Error> {
            let mut buf = [0u8; 8];
            self.try_fill_bytes(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }

        fn try_fill_bytes(&mut self, dst: &mut [u8]) -> std::result::Result<(), Self::Error> {
            for slot in dst {
                *slot = self.bytes[self.pos % self.bytes.len()];
                self.pos += 1;
            }
            Ok(())
        }
    }

    struct BrokenRng;

    impl TryRngCore for BrokenRng {
        type Error = std::io::Error;

        fn try_next_u32(&mut self) -> std::result::Result<u32, Self::Error> {
            Err(std::io::Error::other("entropy unavailable"))
        }

        fn try_next_u64(&mut self) -> std::result::Result<u64, Self::Error> {
            Err(std::io::Error::other("entropy unavailable"))
        }

        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> std::result::Result<(), Self::Error> {
            Err(std::io::Error::other("entropy unavailable"))
        }
    }

    #[test]
    fn test_length_and_alphabet() {
        let id = generate_id(48).unwrap();
        assert_eq!(id.len(), 48);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_ids_are_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id(16).unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_rejects_biased_bytes() {
        // 248..=255 would wrap onto the first eight symbols.
        let mut rng = ScriptedRng {
            bytes: vec![255, 248, 61, 62, 250, 0],
            pos: 0,
        };
        let id = generate_id_with(&mut rng, 3).unwrap();
        assert_eq!(id, "z00");
    }

    #[test]
    fn test_entropy_failure() {
        let result = generate_id_with(&mut BrokenRng, 8);
        assert!(matches!(result, Err(Error::Generation(_))));
    }

    #[tokio::test]
    async fn test_claim_retries_then_exhausts() {
        let mut calls = 0;
        let result: Result<String> = claim_unique_id(8, 3, |_id| {
            calls += 1;
            async { Ok(None) }
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::ExhaustedIdSpace { attempts: 3 })
        ));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_claim_returns_first_free_id() {
        let mut calls = 0;
        let id = claim_unique_id(8, 5, |id| {
            calls += 1;
            let free = calls == 2;
            async move { Ok(free.then_some(id)) }
        })
        .await
        .unwrap();
        assert_eq!(id.len(), 8);
        assert_eq!(calls, 2);
    }
}
