// Signup credential generation. The create-user step takes a
// `CredentialGenerator` so tests can supply fixed values.

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

/// Special characters DemoQA accepts reliably in passwords.
pub const SPECIAL_CHARACTERS: &str = "!@#$%&*";
pub const USERNAME_BASE: &str = "testuser";
pub const PASSWORD_LENGTH: usize = 12;
const MIN_PASSWORD_LENGTH: usize = 8;
const SUFFIX_DIGITS: u32 = 5;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";

pub trait CredentialGenerator {
    fn username(&mut self) -> String;
    fn password(&mut self) -> String;
}

/// Random credentials from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomCredentials;

impl CredentialGenerator for RandomCredentials {
    fn username(&mut self) -> String {
        unique_username(&mut rand::rng(), USERNAME_BASE)
    }

    fn password(&mut self) -> String {
        secure_password(&mut rand::rng(), PASSWORD_LENGTH)
    }
}

/// Always hands out the same pair.
#[derive(Debug, Clone)]
pub struct FixedCredentials {
    pub username: String,
    pub password: String,
}

impl CredentialGenerator for FixedCredentials {
    fn username(&mut self) -> String {
        self.username.clone()
    }

    fn password(&mut self) -> String {
        self.password.clone()
    }
}

/// `base` followed by a zero-padded five-digit random suffix.
pub fn unique_username<R: Rng + ?Sized>(rng: &mut R, base: &str) -> String {
    let suffix = rng.random_range(0..10u32.pow(SUFFIX_DIGITS));
    format!("{base}{suffix:0width$}", width = SUFFIX_DIGITS as usize)
}

/// A shuffled password with at least one uppercase letter, lowercase
/// letter, digit and special character. Lengths below 8 are raised to 8.
pub fn secure_password<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let length = length.max(MIN_PASSWORD_LENGTH);
    let classes: [Vec<char>; 4] = [
        UPPER.chars().collect(),
        LOWER.chars().collect(),
        DIGITS.chars().collect(),
        SPECIAL_CHARACTERS.chars().collect(),
    ];
    let alphabet: Vec<char> = classes.iter().flatten().copied().collect();

    let mut chars: Vec<char> = classes
        .iter()
        .filter_map(|class| class.choose(rng).copied())
        .collect();
    while chars.len() < length {
        if let Some(c) = alphabet.choose(rng) {
            chars.push(*c);
        }
    }
    chars.shuffle(rng);
    chars.into_iter().collect()
}
