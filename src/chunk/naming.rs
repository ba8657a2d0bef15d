//! Centralized chunk file naming conventions.
//!
//! This module is the single source of truth for how downloaded pieces are
//! named on disk:
//! - Derived base names (e.g. `wikipedia_en_all.zim` from a catalog URL)
//! - Single-piece names (e.g. `wikipedia_en_all.zim.part.part`)
//! - Multi-piece names (e.g. `wikipedia_en_all.zimaa.part.part`)
//!
//! All other modules should use these functions rather than constructing
//! names directly, so the reassembly step always finds what it expects.

/// Suffix marking a file as an in-progress download part.
///
/// Reassembly strips one `.part` when a piece finishes and the last one when
/// the whole archive is complete.
pub const PART_EXTENSION: &str = ".part.part";

const SUFFIX_ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Derive a file name from a download URL.
///
/// Takes the last path segment, ignoring any query string or fragment. A URL
/// with no usable segment (e.g. a bare host) falls back to `"download"`.
///
/// # Examples
///
/// ```
/// use zimfetch::chunk::file_name_from_url;
///
/// assert_eq!(
///     file_name_from_url("https://mirror.example.org/zim/wikipedia_en_all.zim?region=eu"),
///     "wikipedia_en_all.zim"
/// );
/// assert_eq!(file_name_from_url("https://mirror.example.org/"), "download");
/// ```
pub fn file_name_from_url(url: &str) -> String {
    let trimmed = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    // A bare scheme or host leaves a segment that is not a file name.
    if segment.is_empty() || segment.contains(':') {
        "download".to_string()
    } else {
        segment.to_string()
    }
}

/// Two-letter base-26 sequence suffix for a chunk index.
///
/// Indices map to `aa, ab, … az, ba, … zz`, covering 676 chunks. Callers are
/// expected to have rejected larger plans already.
///
/// # Examples
///
/// ```
/// use zimfetch::chunk::sequence_suffix;
///
/// assert_eq!(sequence_suffix(0), "aa");
/// assert_eq!(sequence_suffix(25), "az");
/// assert_eq!(sequence_suffix(26), "ba");
/// assert_eq!(sequence_suffix(675), "zz");
/// ```
pub fn sequence_suffix(index: usize) -> String {
    debug_assert!(index < 676, "sequence suffix index out of range: {index}");
    let first = SUFFIX_ALPHABET[(index / 26) % 26] as char;
    let second = SUFFIX_ALPHABET[index % 26] as char;
    format!("{first}{second}")
}

/// Name for the single piece of an unchunked download.
///
/// The derived file name is kept as-is, extension included, and gains the
/// part suffix.
///
/// # Format
///
/// `{file_name}.part.part`
///
/// # Examples
///
/// ```
/// use zimfetch::chunk::single_part_name;
///
/// assert_eq!(single_part_name("TestFileName"), "TestFileName.part.part");
/// assert_eq!(single_part_name("TestFileName.xml"), "TestFileName.xml.part.part");
/// ```
pub fn single_part_name(file_name: &str) -> String {
    format!("{file_name}{PART_EXTENSION}")
}

/// Name for one piece of a multi-chunk download.
///
/// Any prior extension is stripped from the derived name before the `.zim`
/// sequence suffix is appended, so `foo.zim` and `foo` both produce
/// `foo.zimaa.part.part` for the first chunk.
///
/// # Format
///
/// `{stem}.zim{aa|ab|...}.part.part`
///
/// # Examples
///
/// ```
/// use zimfetch::chunk::chunk_part_name;
///
/// assert_eq!(chunk_part_name("wikipedia.zim", 0), "wikipedia.zimaa.part.part");
/// assert_eq!(chunk_part_name("wikipedia.zim", 1), "wikipedia.zimab.part.part");
/// ```
pub fn chunk_part_name(file_name: &str, index: usize) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{stem}.zim{}{PART_EXTENSION}", sequence_suffix(index))
}
