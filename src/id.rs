//! Short opaque id generation for change requests, promotion requests, and
//! draft branches.

use rand::distributions::Alphanumeric;
use rand::Rng;

const ID_LEN: usize = 8;

/// Generate an 8-character lowercase alphanumeric id.
///
/// Collisions are the caller's responsibility to detect (e.g. an existing
/// `draft/<id>` branch, or an existing metadata record) and retry.
pub fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .filter(|c| c.is_ascii_alphanumeric())
        .take(ID_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_ids_of_expected_length() {
        let id = generate();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generates_distinct_ids() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
