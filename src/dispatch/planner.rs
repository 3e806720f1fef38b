//! Partitioning recipients into ordered, bounded batches.

use crate::request::Recipient;

/// A contiguous slice of the request's recipients, sent in one concurrent round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Position of this batch in the plan, starting at 0
    pub index: usize,
    /// Offset of the first recipient of this batch in the request
    pub offset: usize,
    pub recipients: &'a [Recipient],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Split `recipients` into batches of at most `batch_size`, preserving order.
///
/// Batch `i` covers positions `[i * batch_size, min((i + 1) * batch_size, len))`.
/// A `batch_size` of zero is treated as one.
pub fn plan(recipients: &[Recipient], batch_size: usize) -> Vec<Batch<'_>> {
    let batch_size = batch_size.max(1);
    recipients
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            offset: index * batch_size,
            recipients: chunk,
        })
        .collect()
}
