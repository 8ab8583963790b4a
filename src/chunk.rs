//! Splitting item lists into store-sized batches.

/// Split `items` into contiguous chunks of at most `max_size` elements.
///
/// Order-preserving and side-effect free; concatenating the returned chunks
/// reproduces the input exactly. `max_size` must be greater than zero.
pub fn chunk<T>(items: &[T], max_size: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    items.chunks(max_size).collect()
}
