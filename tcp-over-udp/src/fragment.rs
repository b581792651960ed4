//! Splitting oversized messages into fragments and putting them back
//! together.
//!
//! A message that fits in one packet travels with [`Marker::None`].  A larger
//! one is cut into `max_fragment_size` pieces: every piece but the last is
//! tagged [`Marker::More`], the final one [`Marker::Last`].
//!
//! The [`Reassembler`] only ever sees fragments in id order (the receiver
//! discards anything out of order), so reassembly is a simple append until
//! the `Last` marker arrives.

use crate::packet::Marker;

/// Cut `data` into `(marker, payload)` pieces of at most `max_fragment_size`
/// bytes, in original order.
///
/// Empty input yields no pieces: an empty `None` packet would be
/// indistinguishable from a pure ACK.
pub fn split(data: &[u8], max_fragment_size: usize) -> Vec<(Marker, Vec<u8>)> {
    if data.is_empty() {
        return Vec::new();
    }
    if data.len() <= max_fragment_size {
        return vec![(Marker::None, data.to_vec())];
    }

    let count = data.len().div_ceil(max_fragment_size);
    data.chunks(max_fragment_size)
        .enumerate()
        .map(|(i, chunk)| {
            let marker = if i + 1 == count {
                Marker::Last
            } else {
                Marker::More
            };
            (marker, chunk.to_vec())
        })
        .collect()
}

/// Collects in-order fragments until a complete message is available.
#[derive(Debug, Default)]
pub struct Reassembler {
    partial: Vec<u8>,
    /// Number of fragments in `partial`.
    pending: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next in-order payload.
    ///
    /// Returns the finished message once `marker` closes it.
    pub fn push(&mut self, marker: Marker, payload: &[u8]) -> Option<Vec<u8>> {
        match marker {
            Marker::None => {
                if self.pending > 0 {
                    log::warn!(
                        "unterminated message of {} fragment(s) discarded",
                        self.pending
                    );
                    self.reset();
                }
                Some(payload.to_vec())
            }
            Marker::More => {
                self.partial.extend_from_slice(payload);
                self.pending += 1;
                None
            }
            Marker::Last => {
                self.partial.extend_from_slice(payload);
                self.pending = 0;
                Some(std::mem::take(&mut self.partial))
            }
        }
    }

    /// Number of fragments waiting for their `Last`.
    pub fn pending(&self) -> usize {
        self.pending
    }

    fn reset(&mut self) {
        self.partial.clear();
        self.pending = 0;
    }
}
