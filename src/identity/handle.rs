//! Fallback display handles for records created without a usable name.

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "sunny", "clever", "brave", "quick", "happy", "bright", "gentle", "lucky", "proud", "calm",
    "eager", "fancy", "jolly", "kind", "merry", "nice", "open", "sharp", "tidy", "witty",
];

const NOUNS: &[&str] = &[
    "dolphin", "badger", "eagle", "tiger", "river", "mountain", "forest", "ocean", "meadow",
    "comet", "apple", "berry", "cloud", "diamond", "engine", "flower", "guitar", "harbor",
    "island", "jacket",
];

/// Two-word handle like `clever_badger`, used as the display name for a new
/// identity whose claims carry neither a display name nor an email. Display
/// names are not unique in the data model, so collisions are acceptable.
pub fn friendly_handle() -> String {
    let mut rng = rand::thread_rng();
    let adj = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{}_{}", adj, noun)
}
