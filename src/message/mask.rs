//! Satellite/signal masks and the cache that resolves correction-only
//! messages.

use serde::{Deserialize, Serialize};

/// Mask ids label cache entries, 0..=31.
pub const MAX_MASK_IDS: usize = 32;
/// Width of the per-system satellite bitmap.
pub const SATELLITE_MASK_BITS: usize = 40;
/// Width of the per-system signal bitmap.
pub const SIGNAL_MASK_BITS: usize = 16;

/// Per-(satellite, signal) presence grid, stored flat.
///
/// Rows follow the set bits of the satellite mask, columns the set bits of the
/// signal mask, both in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMask {
    nsat: usize,
    nsig: usize,
    cells: Vec<bool>,
}

impl CellMask {
    /// # Panics
    /// If `cells` is not `nsat * nsig` long.
    #[must_use]
    pub fn new(nsat: usize, nsig: usize, cells: Vec<bool>) -> Self {
        assert!(cells.len() == nsat * nsig, "cell mask shape mismatch");
        CellMask { nsat, nsig, cells }
    }

    /// A mask with every cell set to `value`.
    #[must_use]
    pub fn filled(nsat: usize, nsig: usize, value: bool) -> Self {
        CellMask {
            nsat,
            nsig,
            cells: vec![value; nsat * nsig],
        }
    }

    #[must_use]
    pub fn nsat(&self) -> usize {
        self.nsat
    }

    #[must_use]
    pub fn nsig(&self) -> usize {
        self.nsig
    }

    /// # Panics
    /// If `sat` or `sig` is out of range.
    #[must_use]
    pub fn get(&self, sat: usize, sig: usize) -> bool {
        assert!(sat < self.nsat && sig < self.nsig);
        self.cells[sat * self.nsig + sig]
    }

    pub(crate) fn cells(&self) -> &[bool] {
        &self.cells
    }
}

/// The mask of one GNSS within an MT1 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMask {
    /// 4-bit GNSS id: 0 GPS, 2 Galileo, others reserved.
    pub gnss_id: u8,
    /// 40-bit satellite bitmap, MSB is PRN 1.
    pub satellite_mask: u64,
    /// 16-bit signal bitmap, MSB is signal 0.
    pub signal_mask: u16,
    /// When `false` the cell mask bits were transmitted but every cell is to
    /// be treated as present.
    pub cell_mask_availability: bool,
    pub cell_mask: CellMask,
    /// 3-bit navigation message id the corrections refer to.
    pub nav_message: u8,
}

impl SystemMask {
    /// Number of satellites this system contributes to the correction grid.
    #[must_use]
    pub fn nsat(&self) -> usize {
        self.satellite_mask.count_ones() as usize
    }

    /// Number of signals in the signal mask.
    #[must_use]
    pub fn nsig(&self) -> usize {
        self.signal_mask.count_ones() as usize
    }

    /// Whether corrections for cell (`sat`, `sig`) are on the wire.
    #[must_use]
    pub fn cell_present(&self, sat: usize, sig: usize) -> bool {
        !self.cell_mask_availability || self.cell_mask.get(sat, sig)
    }

    /// PRNs of the masked satellites, ascending.
    pub fn prns(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=SATELLITE_MASK_BITS as u8)
            .filter(move |prn| self.satellite_mask >> (SATELLITE_MASK_BITS as u8 - prn) & 1 == 1)
    }

    /// Signal numbers of the masked signals, ascending.
    pub fn signals(&self) -> impl Iterator<Item = u8> + '_ {
        (0..SIGNAL_MASK_BITS as u8)
            .filter(move |sig| self.signal_mask >> (SIGNAL_MASK_BITS as u8 - 1 - sig) & 1 == 1)
    }
}

/// The full mask block of an MT1 message: one [SystemMask] per system, in
/// wire order. Satellite-indexed correction arrays follow this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionMask {
    pub systems: Vec<SystemMask>,
}

impl CorrectionMask {
    #[must_use]
    pub fn nsys(&self) -> usize {
        self.systems.len()
    }

    /// Total satellites across all systems.
    #[must_use]
    pub fn nsat_total(&self) -> usize {
        self.systems.iter().map(SystemMask::nsat).sum()
    }
}

/// Masks seen in previous messages, keyed by mask id.
///
/// Correction-only messages (mask flag clear) cannot be sized without the
/// mask they implicitly reference, so every successfully parsed mask is
/// retained here until replaced or evicted.
#[derive(Debug)]
pub struct MaskCache {
    entries: Vec<Option<CorrectionMask>>,
}

impl MaskCache {
    #[must_use]
    pub fn new() -> Self {
        MaskCache {
            entries: (0..MAX_MASK_IDS).map(|_| None).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, mask_id: u8) -> Option<&CorrectionMask> {
        self.entries.get(usize::from(mask_id))?.as_ref()
    }

    /// Store `mask`, replacing any prior entry for `mask_id`.
    pub fn insert(&mut self, mask_id: u8, mask: CorrectionMask) {
        if let Some(entry) = self.entries.get_mut(usize::from(mask_id)) {
            *entry = Some(mask);
        }
    }

    pub fn evict(&mut self, mask_id: u8) {
        if let Some(entry) = self.entries.get_mut(usize::from(mask_id)) {
            *entry = None;
        }
    }

    /// Total satellites of the cached mask, or 0 when absent.
    #[must_use]
    pub fn nsat(&self, mask_id: u8) -> usize {
        self.get(mask_id).map_or(0, CorrectionMask::nsat_total)
    }
}

impl Default for MaskCache {
    fn default() -> Self {
        Self::new()
    }
}
