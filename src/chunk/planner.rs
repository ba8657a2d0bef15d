//! Pure chunk planning: one logical download into ordered byte-range pieces.

use thiserror::Error;

use super::naming::{chunk_part_name, file_name_from_url, single_part_name};

/// Fixed chunk size: 2 GiB.
///
/// Sizes at or below this produce a single piece; anything larger is split
/// at exact multiples of this boundary.
pub const CHUNK_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Largest plan the two-letter sequence suffix can name (`aa` through `zz`).
pub const MAX_CHUNKS: u64 = 676;

/// Errors from [`plan`]. All are caller mistakes; none are retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The request URL was empty.
    #[error("download url must not be empty")]
    EmptyUrl,

    /// The requested size needs more pieces than the naming scheme covers.
    #[error("{requested} chunks exceed the {MAX_CHUNKS}-chunk naming limit")]
    TooManyChunks { requested: u64 },
}

/// One byte-range piece of a logical download.
///
/// The range header string carries only the value part (`"0-"`,
/// `"0-2147483647"`); prefixing `bytes=` is the transfer engine's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor<T> {
    /// URL of the owning request. Every chunk of one download shares it.
    pub url: String,
    /// Range header value: `"{start}-{end}"` with an inclusive end, or
    /// `"{start}-"` for the open-ended final piece.
    pub range: String,
    /// On-disk name for this piece.
    pub file_name: String,
    /// Opaque caller-supplied tag, carried through untouched.
    pub tag: T,
}

/// Split a download of `total_size_bytes` into ordered chunk descriptors.
///
/// Chunk `i` of `n` covers bytes `[i * CHUNK_SIZE, (i + 1) * CHUNK_SIZE)`,
/// except the final chunk whose range header omits the upper bound so a
/// server-reported size that drifts from the catalog's figure still downloads
/// completely. A size of zero still yields one open-ended chunk.
///
/// The returned list is in byte order, contiguous and non-overlapping, and
/// covers `[0, total_size_bytes)` exactly.
///
/// # Arguments
///
/// * `url` - Source URL, also used to derive piece file names
/// * `total_size_bytes` - Expected size from the content catalog
/// * `tag` - Opaque value cloned onto every descriptor (e.g. a notification
///   correlation id)
///
/// # Examples
///
/// ```
/// use zimfetch::chunk::{plan, CHUNK_SIZE};
///
/// let chunks = plan("https://mirror.example.org/wiktionary_fr.zim", CHUNK_SIZE, 7u32)?;
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].range, "0-");
/// # Ok::<(), zimfetch::chunk::PlanError>(())
/// ```
pub fn plan<T: Clone>(
    url: &str,
    total_size_bytes: u64,
    tag: T,
) -> Result<Vec<ChunkDescriptor<T>>, PlanError> {
    if url.is_empty() {
        return Err(PlanError::EmptyUrl);
    }

    let num_chunks = total_size_bytes.div_ceil(CHUNK_SIZE).max(1);
    if num_chunks > MAX_CHUNKS {
        return Err(PlanError::TooManyChunks {
            requested: num_chunks,
        });
    }

    let file_name = file_name_from_url(url);

    if num_chunks == 1 {
        return Ok(vec![ChunkDescriptor {
            url: url.to_string(),
            range: "0-".to_string(),
            file_name: single_part_name(&file_name),
            tag,
        }]);
    }

    let chunks = (0..num_chunks)
        .map(|i| {
            let start = i * CHUNK_SIZE;
            let range = if i == num_chunks - 1 {
                format!("{start}-")
            } else {
                format!("{start}-{}", (i + 1) * CHUNK_SIZE - 1)
            };
            ChunkDescriptor {
                url: url.to_string(),
                range,
                file_name: chunk_part_name(&file_name, i as usize),
                tag: tag.clone(),
            }
        })
        .collect();

    Ok(chunks)
}
