use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of a share-group password. Unsalted: groups are looked up by
/// comparing digests.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?|ftp)://[^\s/$.?#][^\s]*$").expect("valid url regex")
});

static BARE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}(?::\d+)?(?:[/?#]\S*)?$")
        .expect("valid bare url regex")
});

/// Returns `s` as an absolute URL, adding `https://` to a bare
/// `host/path`.
pub fn normalize_url(s: &str) -> Option<String> {
    if URL_RE.is_match(s) {
        Some(s.to_string())
    } else if BARE_URL_RE.is_match(s) {
        Some(format!("https://{}", s))
    } else {
        None
    }
}

pub fn is_url(s: &str) -> bool {
    normalize_url(s).is_some()
}
