//! HAS page intake and per-message-id accumulation.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::reed_solomon::{RsCodec, CODEWORD_LEN, INFO_LEN, PARITY_LEN};
use crate::{Error, Result};

/// Octets in one page payload.
pub const PAGE_OCTETS: usize = 53;
/// Bits in one page payload.
pub const PAGE_BITS: usize = PAGE_OCTETS * 8;
/// Message ids label independent accumulation streams, 0..=31.
pub(crate) const MAX_MESSAGE_IDS: usize = 32;
/// First page id carrying parity symbols. Page ids in
/// `(message_size, FIRST_PARITY_PID)` are never transmitted.
pub(crate) const FIRST_PARITY_PID: u8 = 33;

/// A single HAS page as delivered by the E6-B telemetry decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasPage {
    /// HAS status field: 0 and 1 are operational, 2 is test, 3 reserved.
    pub status: u8,
    /// Message type; only type 1 (satellite corrections) is decoded.
    pub message_type: u8,
    /// Message id, 0..=31.
    pub message_id: u8,
    /// Number of pages making up the message, 1..=32.
    pub message_size: u8,
    /// Page id within the codeword, 1..=255; 0 is reserved.
    pub page_id: u8,
    /// The 424 payload bits as `'0'`/`'1'` characters.
    pub bits: String,
    /// PRN of the satellite the page was received from.
    pub prn: u16,
    /// TOW at the current symbol, in milliseconds.
    pub tow_ms: u32,
}

/// 256-bit page-id membership set.
#[derive(Clone, Default)]
struct PidSet([u64; 4]);

impl PidSet {
    fn contains(&self, pid: u8) -> bool {
        self.0[usize::from(pid >> 6)] >> (pid & 63) & 1 == 1
    }

    fn insert(&mut self, pid: u8) {
        self.0[usize::from(pid >> 6)] |= 1 << (pid & 63);
    }

    fn clear(&mut self) {
        self.0 = [0; 4];
    }
}

/// Accumulates the pages of one message id until enough arrive to decode.
///
/// Row `pid - 1` of the octet table holds the payload of page `pid`; rows for
/// pages not (yet) received stay zero.
pub(crate) struct PageSlot {
    received: PidSet,
    /// Received page ids in arrival order, for diagnostics.
    order: Vec<u8>,
    octets: Vec<[u8; PAGE_OCTETS]>,
}

impl PageSlot {
    pub(crate) fn new() -> Self {
        PageSlot {
            received: PidSet::default(),
            order: Vec::new(),
            octets: vec![[0u8; PAGE_OCTETS]; CODEWORD_LEN],
        }
    }

    /// Record a page payload. Returns `false` for a duplicate page id, which
    /// leaves the slot untouched.
    pub(crate) fn insert(&mut self, pid: u8, bits: &str) -> bool {
        debug_assert!(pid != 0);
        debug_assert!(bits.len() == PAGE_BITS);
        if self.received.contains(pid) {
            return false;
        }
        self.received.insert(pid);
        self.order.push(pid);

        let bits = bits.as_bytes();
        let row = &mut self.octets[usize::from(pid) - 1];
        for (k, octet) in row.iter_mut().enumerate() {
            let mut value = 0u8;
            for &b in &bits[k * 8..k * 8 + 8] {
                value = value << 1 | u8::from(b == b'1');
            }
            *octet = value;
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Received page ids in arrival order.
    pub(crate) fn pids(&self) -> &[u8] {
        &self.order
    }

    pub(crate) fn reset(&mut self) {
        self.received.clear();
        self.order.clear();
        self.octets.iter_mut().for_each(|row| *row = [0; PAGE_OCTETS]);
    }

    fn column(&self, col: usize) -> [u8; CODEWORD_LEN] {
        let mut column = [0u8; CODEWORD_LEN];
        for (value, row) in column.iter_mut().zip(&self.octets) {
            *value = row[col];
        }
        column
    }

    /// Erasure positions for a message of `message_size` pages: every missing
    /// page id in `1..=message_size` and `33..=255`, mapped to 0-based
    /// codeword positions. Page ids between those ranges are untransmitted
    /// zero information symbols, not erasures.
    fn erasures(&self, message_size: u8) -> Vec<usize> {
        let mut erasures = Vec::with_capacity(PARITY_LEN);
        for pid in 1..=message_size {
            if !self.received.contains(pid) {
                erasures.push(usize::from(pid) - 1);
            }
        }
        for pid in FIRST_PARITY_PID..=u8::MAX {
            if !self.received.contains(pid) {
                erasures.push(usize::from(pid) - 1);
            }
        }
        erasures
    }

    /// Erasure-decode the 53 column codewords and return the reconstructed
    /// MT1 bitstring of `message_size * 424` bits.
    ///
    /// # Errors
    /// [Error::TooManyErasures] when the received set cannot determine the
    /// codeword (also the symptom of a corrupted page id landing in the
    /// untransmitted range); [Error::ReedSolomon] when a column fails.
    pub(crate) fn reconstruct(&self, rs: &RsCodec, message_size: u8) -> Result<String> {
        let erasures = self.erasures(message_size);
        if erasures.len() > PARITY_LEN {
            return Err(Error::TooManyErasures {
                erasures: erasures.len(),
                max: PARITY_LEN,
            });
        }

        // Each column is an independent codeword along the page-id axis.
        let info: Vec<[u8; INFO_LEN]> = (0..PAGE_OCTETS)
            .into_par_iter()
            .map(|col| {
                let mut cw = self.column(col);
                rs.decode_column(&mut cw, &erasures, col)?;
                let mut info = [0u8; INFO_LEN];
                info.copy_from_slice(&cw[..INFO_LEN]);
                Ok(info)
            })
            .collect::<Result<_>>()?;

        let mut bits = String::with_capacity(usize::from(message_size) * PAGE_BITS);
        for row in 0..usize::from(message_size) {
            for col in info.iter().take(PAGE_OCTETS) {
                let octet = col[row];
                for j in (0..8).rev() {
                    bits.push(if octet >> j & 1 == 1 { '1' } else { '0' });
                }
            }
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_bits(fill: char) -> String {
        std::iter::repeat(fill).take(PAGE_BITS).collect()
    }

    #[test]
    fn duplicate_pages_are_rejected() {
        let mut slot = PageSlot::new();
        assert!(slot.insert(7, &page_bits('1')));
        assert!(!slot.insert(7, &page_bits('0')));
        assert_eq!(slot.len(), 1);
        assert_eq!(slot.pids(), &[7]);
        // the first payload won
        assert_eq!(slot.column(0)[6], 0xff);
    }

    #[test]
    fn payload_octets_land_in_the_page_row() {
        let mut slot = PageSlot::new();
        let mut bits = String::from("10100101");
        bits.push_str(&"0".repeat(PAGE_BITS - 8));
        slot.insert(3, &bits);
        assert_eq!(slot.column(0)[2], 0xa5);
        assert_eq!(slot.column(1)[2], 0x00);
    }

    #[test]
    fn erasures_skip_untransmitted_page_ids() {
        let mut slot = PageSlot::new();
        slot.insert(1, &page_bits('0'));
        slot.insert(3, &page_bits('0'));
        slot.insert(40, &page_bits('0'));
        let erasures = slot.erasures(4);
        // missing 2 and 4 from the information range, everything but 40 from
        // the parity range; 5..=32 are not erasures
        assert_eq!(erasures.len(), 2 + PARITY_LEN - 1);
        assert!(erasures.contains(&1));
        assert!(erasures.contains(&3));
        assert!(!erasures.contains(&4));
        assert!(!erasures.contains(&39));
    }

    #[test]
    fn reset_clears_everything() {
        let mut slot = PageSlot::new();
        slot.insert(5, &page_bits('1'));
        slot.reset();
        assert_eq!(slot.len(), 0);
        assert!(slot.pids().is_empty());
        assert_eq!(slot.column(10)[4], 0);
        assert!(slot.insert(5, &page_bits('1')));
    }

    #[test]
    fn reconstruct_rejects_a_pid_in_the_dead_zone() {
        let rs = RsCodec::new();
        let mut slot = PageSlot::new();
        slot.insert(1, &page_bits('0'));
        slot.insert(5, &page_bits('0'));
        // message size 2: pid 5 should never have been transmitted
        assert!(matches!(
            slot.reconstruct(&rs, 2),
            Err(Error::TooManyErasures { erasures: 224, .. })
        ));
    }

    #[test]
    fn reconstruct_round_trips_encoded_pages() {
        let rs = RsCodec::new();
        let mut slot = PageSlot::new();

        // one information page plus enough parity coverage via full encode
        let mut info = [[0u8; PAGE_OCTETS]; INFO_LEN];
        for (col, value) in info[0].iter_mut().enumerate() {
            *value = col as u8;
        }
        let mut codewords = vec![[0u8; PAGE_OCTETS]; CODEWORD_LEN];
        for col in 0..PAGE_OCTETS {
            let mut column = [0u8; INFO_LEN];
            for (row, values) in info.iter().enumerate() {
                column[row] = values[col];
            }
            let cw = rs.encode(&column);
            for (pid0, &sym) in cw.iter().enumerate() {
                codewords[pid0][col] = sym;
            }
        }

        // deliver the single information page as a bitstring
        let bits: String = codewords[0]
            .iter()
            .map(|octet| format!("{octet:08b}"))
            .collect();
        slot.insert(1, &bits);

        let decoded = slot.reconstruct(&rs, 1).unwrap();
        assert_eq!(decoded.len(), PAGE_BITS);
        assert_eq!(decoded, bits);
    }
}
