use rand::distributions::Uniform;
use rand::{thread_rng, Rng};

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Lower-cases `name` and collapses every run of characters outside
/// `[a-z0-9]` into a single `-`, without leading or trailing dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// `slugify(name)` plus a random base-36 suffix.
pub fn unique_slug(name: &str) -> String {
    let base = slugify(name);
    let suffix: String = thread_rng()
        .sample_iter(Uniform::from(0..SUFFIX_ALPHABET.len()))
        .take(SUFFIX_LEN)
        .map(|i| SUFFIX_ALPHABET[i] as char)
        .collect();

    if base.is_empty() {
        suffix
    } else {
        format!("{}-{}", base, suffix)
    }
}
