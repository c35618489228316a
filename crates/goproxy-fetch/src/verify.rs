//! dirhash-style verification: computing and checking the canonical
//! hash of a downloaded `.zip`/`.mod` against a checksum-DB line.

use goproxy_core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// `dirhash.HashZip`: hashes every entry of a zip archive, each
/// entry's hash line formatted as `<sha256>  <name>\n`, concatenated
/// in sorted-by-name order, then SHA-256'd again and prefixed `h1:`.
pub fn hash_zip(zip_path: &Path) -> Result<String> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::internal(e.to_string()))?;

    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).map(|f| f.name().to_string()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::internal(e.to_string()))?;
    names.sort();

    let mut lines = Vec::with_capacity(names.len());
    for name in &names {
        let mut entry = archive
            .by_name(name)
            .map_err(|e| Error::internal(e.to_string()))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut entry, &mut hasher).map_err(|e| Error::internal(e.to_string()))?;
        let digest = hasher.finalize();
        lines.push(format!("{}  {}\n", hex(&digest), name));
    }

    Ok(hash_lines(&lines))
}

/// `dirhash.DefaultHash` restricted to a single named file (used for
/// the `<path>@<version>/go.mod` entry): hashes the raw file content
/// under a synthetic entry name.
pub fn hash_go_mod(mod_path: &Path, entry_name: &str) -> Result<String> {
    let mut file = std::fs::File::open(mod_path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| Error::internal(e.to_string()))?;
    let digest = hasher.finalize();
    let line = format!("{}  {}\n", hex(&digest), entry_name);
    Ok(hash_lines(&[line]))
}

fn hash_lines(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
    }
    format!("h1:{}", base64_std(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn base64_std(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Extracts the `h1:...` hash token from a checksum-DB line of the
/// form `<module> <version> h1:<base64>`.
pub fn extract_hash_token(line: &str) -> Option<&str> {
    line.split_whitespace().find(|tok| tok.starts_with("h1:"))
}

/// Reads the first non-blank, non-comment line of a `go.mod` file and
/// reports whether it begins with `module`.
pub fn mod_file_has_module_directive(mod_path: &Path) -> Result<bool> {
    let contents = std::fs::read_to_string(mod_path)?;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        return Ok(trimmed.starts_with("module"));
    }
    Ok(false)
}

/// Structural check on a downloaded zip: every entry name must have
/// prefix `<path>@<version>/`.
pub fn zip_entries_have_prefix(zip_path: &Path, prefix: &str) -> Result<()> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::internal(e.to_string()))?;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| Error::internal(e.to_string()))?;
        if !entry.name().starts_with(prefix) {
            return Err(Error::not_found(format!(
                "zip entry {} does not have prefix {prefix}",
                entry.name()
            )));
        }
    }
    Ok(())
}
