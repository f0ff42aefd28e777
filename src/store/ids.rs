//! Context identifier generation

use rand::Rng;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 8;

/// Source of candidate context identifiers
///
/// Collisions are expected and resolved by the store's exclusive create.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Short random lowercase-alphanumeric tokens
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        let mut rng = rand::thread_rng();
        (0..ID_LENGTH)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect()
    }
}
