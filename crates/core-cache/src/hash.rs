//! Content hashing helpers.
//!
//! All hashes are hex-encoded SHA-256. The input hash is the primary "does
//! the source still match the cache?" key; the content hash keys body-only
//! artifacts so identical bodies share a cache entry regardless of metadata.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes.
pub fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Input hash over the `(content, raw_frontmatter, template)` triple,
/// NUL-separated so field boundaries cannot alias.
pub fn hash_input(content: &str, raw_frontmatter: &str, template: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_frontmatter.as_bytes());
    hasher.update([0u8]);
    hasher.update(template.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the markdown body alone.
pub fn hash_content(content: &str) -> String {
    hash_hex(content.as_bytes())
}

/// Hash of a directory tree: walks in sorted relative-path order and folds
/// `(relative_path, contents)` per file into one SHA stream. Used for
/// template and asset directories where any change invalidates everything.
pub fn hash_dir(dir: &Path) -> io::Result<String> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for rel in &files {
        hasher.update(rel.as_bytes());
        let contents = fs::read(dir.join(rel))?;
        hasher.update(&contents);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// Hash of a pre-computed `(path, content_hash)` asset map, folded in sorted
/// path order.
pub fn hash_asset_map(assets: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = assets.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for (path, content_hash) in sorted {
        hasher.update(path.as_bytes());
        hasher.update(content_hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash over a feed's member slugs: sorted, NUL-joined, then hashed.
/// Order-insensitive by construction; the empty list yields the empty
/// string as a sentinel for "no co-members".
pub fn feed_membership_hash(slugs: &[String]) -> String {
    if slugs.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<&str> = slugs.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    hash_hex(sorted.join("\0").as_bytes())
}

/// First 16 hex characters of a hash, the side-car file key. Collisions
/// imply identical prefixes over 64 bits of digest, in which case writers
/// produce identical content anyway.
pub fn short_key(hash: &str) -> &str {
    &hash[..hash.len().min(16)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_hash_separates_fields() {
        // Moving a byte across the NUL boundary must change the hash.
        let a = hash_input("ab", "c", "t");
        let b = hash_input("a", "bc", "t");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("hello "));
    }

    #[test]
    fn membership_hash_is_permutation_invariant() {
        let abc = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let cba = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(feed_membership_hash(&abc), feed_membership_hash(&cba));
    }

    #[test]
    fn membership_hash_empty_sentinel() {
        assert_eq!(feed_membership_hash(&[]), "");
    }

    #[test]
    fn membership_hash_changes_on_add_or_remove() {
        let ab = vec!["a".to_string(), "b".to_string()];
        let abc = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let a = vec!["a".to_string()];
        let h_ab = feed_membership_hash(&ab);
        assert_ne!(h_ab, feed_membership_hash(&abc));
        assert_ne!(h_ab, feed_membership_hash(&a));
    }

    #[test]
    fn dir_hash_tracks_content_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.html"), "one").unwrap();
        std::fs::write(dir.path().join("sub/b.html"), "two").unwrap();
        let first = hash_dir(dir.path()).unwrap();

        std::fs::write(dir.path().join("a.html"), "changed").unwrap();
        let second = hash_dir(dir.path()).unwrap();
        assert_ne!(first, second);

        std::fs::write(dir.path().join("a.html"), "one").unwrap();
        assert_eq!(hash_dir(dir.path()).unwrap(), first);
    }

    #[test]
    fn asset_map_hash_sorted_fold() {
        let forward = vec![
            ("a.css".to_string(), "h1".to_string()),
            ("b.js".to_string(), "h2".to_string()),
        ];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();
        assert_eq!(hash_asset_map(&forward), hash_asset_map(&reversed));
    }

    #[test]
    fn short_key_takes_sixteen_chars() {
        let h = hash_content("x");
        assert_eq!(short_key(&h).len(), 16);
        assert!(h.starts_with(short_key(&h)));
    }
}
