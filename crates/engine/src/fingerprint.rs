use sha2::{Digest, Sha256};

/// Stable 64-bit fingerprint of a sequence of context parts.
///
/// Each part is length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` differ. The value is identical across processes and
/// platforms, unlike `std::hash`.
pub fn context_fingerprint<I, S>(parts: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    let digest: [u8; 32] = hasher.finalize().into();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}
