//! Name hashing used by the game's lookup tables.

/// Jenkins one-at-a-time hash over the lowercase bytes of `text`
pub fn jenkins_hash(text: &str) -> u32 {
    let mut hash = text.bytes().fold(0u32, |hash, byte| {
        let hash = hash.wrapping_add(byte.to_ascii_lowercase() as u32);
        let hash = hash.wrapping_add(hash << 10);
        hash ^ (hash >> 6)
    });
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// The name without its final extension, used for the short name hash
pub fn short_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}
