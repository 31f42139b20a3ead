//! Password generator

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.?";

pub const DEFAULT_PASSWORD_LENGTH: usize = 20;

/// Generate a random password from the OS RNG.
///
/// Every character class in use appears at least once when `length` leaves
/// room for it.
pub fn generate_password(length: usize, include_symbols: bool) -> String {
    let mut classes = vec![LOWERCASE, UPPERCASE, DIGITS];
    if include_symbols {
        classes.push(SYMBOLS);
    }
    let alphabet: Vec<u8> = classes.concat();

    let mut rng = OsRng;
    let mut chars: Vec<u8> = Vec::with_capacity(length);

    if length >= classes.len() {
        for class in &classes {
            if let Some(&c) = class.choose(&mut rng) {
                chars.push(c);
            }
        }
    }
    while chars.len() < length {
        if let Some(&c) = alphabet.choose(&mut rng) {
            chars.push(c);
        }
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}
