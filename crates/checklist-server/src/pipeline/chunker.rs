//! Order-preserving slicing of a batch into bounded chunks.

/// Splits `items` into consecutive chunks of `size` elements.
///
/// Every chunk except possibly the last has exactly `size` elements, and the
/// concatenation of all chunks equals `items`. A `size` of zero yields no
/// chunks. Chunks borrow from `items`; only the outer vector is allocated.
pub fn split<T>(items: &[T], size: usize) -> Vec<&[T]> {
    if size == 0 || items.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    chunks.extend(items.chunks(size));
    chunks
}
