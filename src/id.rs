//! Message and queue identifier generation.
//!
//! A message id is 32 characters from `[0-9a-z]`:
//!
//! | chars | content                                              |
//! |-------|------------------------------------------------------|
//! | 11    | microsecond timestamp, never moving backwards        |
//! | 5     | per-process counter                                  |
//! | 16    | digest of the queue uid, the above, and random bits  |
//!
//! The first two parts are fixed-width base-36, so ids generated one after
//! another compare in generation order. The message table breaks
//! `visible_at` ties on the id, which is what makes equally delayed messages
//! come out FIFO.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::{
    distributions::{Alphanumeric, DistString},
    Rng,
};
use sha2::{Digest, Sha256};

/// Length of every message id.
pub const MESSAGE_ID_LEN: usize = 32;

/// Length of every queue uid.
pub const QUEUE_UID_LEN: usize = 32;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const TIME_WIDTH: usize = 11;
const COUNTER_WIDTH: usize = 5;
const SALT_WIDTH: usize = MESSAGE_ID_LEN - TIME_WIDTH - COUNTER_WIDTH;

const COUNTER_MODULUS: u64 = 36u64.pow(COUNTER_WIDTH as u32);

static LAST_MICROS: AtomicU64 = AtomicU64::new(0);
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh message id for a queue with the given uid.
pub fn generate(queue_uid: &str) -> String {
    let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
    let micros = LAST_MICROS.fetch_max(now, Ordering::SeqCst).max(now);
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst) % COUNTER_MODULUS;

    let mut hasher = Sha256::new();
    hasher.update(queue_uid.as_bytes());
    hasher.update(micros.to_be_bytes());
    hasher.update(counter.to_be_bytes());
    hasher.update(rand::thread_rng().gen::<u64>().to_be_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(MESSAGE_ID_LEN);
    push_base36(&mut id, micros, TIME_WIDTH);
    push_base36(&mut id, counter, COUNTER_WIDTH);
    id.extend(
        digest
            .iter()
            .take(SALT_WIDTH)
            .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char),
    );

    id
}

/// Generates a random uid to assign to a newly created queue.
pub fn queue_uid() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), QUEUE_UID_LEN)
}

fn push_base36(out: &mut String, mut value: u64, width: usize) {
    let mut buf = vec![b'0'; width];
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    out.extend(buf.into_iter().map(char::from));
}

#[cfg(test)]
mod tests {
    use crate::validate::{validate, Fields};

    use super::*;

    #[test]
    fn test_id_length_and_alphabet() {
        for _ in 0..100 {
            let id = generate(&queue_uid());
            assert_eq!(id.len(), MESSAGE_ID_LEN);
            assert!(id.bytes().all(|b| ALPHABET.contains(&b)), "bad id {id}");
        }
    }

    #[test]
    fn test_ids_pass_validation() {
        let id = generate(&queue_uid());
        assert!(validate(Fields::builder().id(&id).build()).is_ok());
    }

    #[test]
    fn test_ids_sort_in_generation_order() {
        let uid = queue_uid();
        let ids: Vec<String> = (0..1000).map(|_| generate(&uid)).collect();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_ids_are_unique() {
        let uid = queue_uid();
        let mut ids: Vec<String> = (0..1000).map(|_| generate(&uid)).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_base36_is_fixed_width() {
        let mut out = String::new();
        push_base36(&mut out, 0, 5);
        assert_eq!(out, "00000");

        out.clear();
        push_base36(&mut out, 35, 3);
        assert_eq!(out, "00z");

        out.clear();
        push_base36(&mut out, 36, 3);
        assert_eq!(out, "010");
    }

    #[test]
    fn test_queue_uid() {
        let uid = queue_uid();
        assert_eq!(uid.len(), QUEUE_UID_LEN);
        assert!(uid.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(uid, queue_uid());
    }
}
