//! Name generation for canary Deployments
//!
//! Production code uses `RandomNames`, which picks an adjective-noun pair
//! and appends a short random suffix (`gentle-otter-x7k2`). Tests use
//! `FixedNames` to get predictable Deployment names.

use rand::seq::SliceRandom;
use rand::Rng;

/// Trait for producing the random suffix of a canary name
///
/// Injected via `Context`. Collisions are not checked here; a clash
/// surfaces as a create conflict from the gateway.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "admiring", "bold", "brave", "clever", "cool", "dazzling", "eager", "elastic", "epic",
    "festive", "focused", "friendly", "gallant", "gentle", "happy", "hopeful", "jolly", "keen",
    "kind", "lucid", "modest", "nifty", "nimble", "optimistic", "peaceful", "quirky", "relaxed",
    "serene", "sharp", "silly", "stoic", "sunny", "tender", "trusting", "upbeat", "vibrant",
    "wizardly", "youthful", "zealous", "zen",
];

const NOUNS: &[&str] = &[
    "albatross", "badger", "beaver", "bison", "capybara", "crane", "dingo", "dolphin", "eagle",
    "falcon", "ferret", "finch", "gecko", "heron", "ibis", "jackal", "koala", "lemur", "lynx",
    "marmot", "narwhal", "ocelot", "otter", "panda", "pelican", "puffin", "quokka", "raven",
    "salmon", "seal", "sparrow", "tapir", "toucan", "urchin", "vole", "walrus", "wombat", "yak",
    "zebra", "kestrel",
];

/// Normalize a token into a DNS-1123 friendly form
///
/// Lowercases, maps every run of non-alphanumeric characters to a single
/// `-`, and trims leading/trailing separators.
pub fn normalize_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut pending_separator = false;

    for c in token.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 4;

/// Production generator producing tokens like `gentle-otter-x7k2`
///
/// The suffix gives 36^4 variants of every word pair.
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("brave");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        normalize_token(&format!("{}_{}_{}", adjective, noun, suffix))
    }
}

/// Generator returning a preset token (tests)
#[cfg(test)]
pub struct FixedNames(pub String);

#[cfg(test)]
impl NameGenerator for FixedNames {
    fn generate(&self) -> String {
        self.0.clone()
    }
}
