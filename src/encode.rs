//! Encoder mirror of the MT1 parser.
//!
//! Builds bitstrings and full page sets from structured records, for test
//! fixtures and signal simulators. Block shapes must match the mask geometry;
//! mismatches panic at build time.

use crate::message::{
    ClockFullSet, ClockSubset, CodeBiases, CorrectionMask, GnssKind, HasMessage, Mt1Header,
    OrbitCorrections, PhaseBiases, UraSet, MT1_HEADER_BITS,
};
use crate::page::{HasPage, PAGE_BITS, PAGE_OCTETS};
use crate::reed_solomon::{RsCodec, CODEWORD_LEN, INFO_LEN};

/// MSB-first bit string assembler.
#[derive(Debug, Default)]
pub struct BitWriter {
    bits: String,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `width` bits of `value`, MSB first.
    pub fn push_u64(&mut self, value: u64, width: usize) {
        debug_assert!(width <= 64);
        for j in (0..width).rev() {
            self.bits.push(if value >> j & 1 == 1 { '1' } else { '0' });
        }
    }

    pub fn push_u(&mut self, value: u32, width: usize) {
        self.push_u64(u64::from(value), width);
    }

    /// Append `value` as a `width`-bit two's-complement field.
    pub fn push_i16(&mut self, value: i16, width: usize) {
        debug_assert!(width >= 1 && width <= 16);
        let mask = if width == 16 { u16::MAX } else { (1 << width) - 1 };
        self.push_u64(u64::from(value as u16 & mask), width);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.bits.push(if value { '1' } else { '0' });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[must_use]
    pub fn into_bits(self) -> String {
        self.bits
    }
}

/// Builds MT1 messages block by block.
///
/// Header flags derive from the blocks provided. [Self::with_mask] embeds the
/// mask in the message; [Self::with_layout] only shapes the correction blocks
/// of a correction-only message (mask flag clear), the way a live receiver
/// would shape them from its cache.
#[derive(Debug, Default, Clone)]
pub struct Mt1Builder {
    toh: u16,
    mask_id: u8,
    iod_id: u8,
    mask: Option<CorrectionMask>,
    layout: Option<CorrectionMask>,
    orbit: Option<OrbitCorrections>,
    clock_fullset: Option<ClockFullSet>,
    clock_subset: Option<ClockSubset>,
    code_bias: Option<CodeBiases>,
    phase_bias: Option<PhaseBiases>,
    ura: Option<UraSet>,
}

impl Mt1Builder {
    #[must_use]
    pub fn new(toh: u16, mask_id: u8, iod_id: u8) -> Self {
        Mt1Builder {
            toh,
            mask_id,
            iod_id,
            ..Self::default()
        }
    }

    /// Embed `mask` in the message and use it to shape correction blocks.
    #[must_use]
    pub fn with_mask(mut self, mask: CorrectionMask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Shape correction blocks with `mask` without transmitting it.
    #[must_use]
    pub fn with_layout(mut self, mask: CorrectionMask) -> Self {
        self.layout = Some(mask);
        self
    }

    #[must_use]
    pub fn with_orbit(mut self, orbit: OrbitCorrections) -> Self {
        self.orbit = Some(orbit);
        self
    }

    #[must_use]
    pub fn with_clock_fullset(mut self, block: ClockFullSet) -> Self {
        self.clock_fullset = Some(block);
        self
    }

    #[must_use]
    pub fn with_clock_subset(mut self, block: ClockSubset) -> Self {
        self.clock_subset = Some(block);
        self
    }

    #[must_use]
    pub fn with_code_bias(mut self, block: CodeBiases) -> Self {
        self.code_bias = Some(block);
        self
    }

    #[must_use]
    pub fn with_phase_bias(mut self, block: PhaseBiases) -> Self {
        self.phase_bias = Some(block);
        self
    }

    #[must_use]
    pub fn with_ura(mut self, block: UraSet) -> Self {
        self.ura = Some(block);
        self
    }

    fn geometry(&self) -> &CorrectionMask {
        self.mask
            .as_ref()
            .or(self.layout.as_ref())
            .expect("correction blocks need a mask or layout")
    }

    /// The header this builder will emit.
    #[must_use]
    pub fn header(&self) -> Mt1Header {
        Mt1Header {
            toh: self.toh,
            mask_id: self.mask_id,
            iod_id: self.iod_id,
            mask_flag: self.mask.is_some(),
            orbit_correction_flag: self.orbit.is_some(),
            clock_fullset_flag: self.clock_fullset.is_some(),
            clock_subset_flag: self.clock_subset.is_some(),
            code_bias_flag: self.code_bias.is_some(),
            phase_bias_flag: self.phase_bias.is_some(),
            ura_flag: self.ura.is_some(),
        }
    }

    /// Header plus body, zero-padded to `message_size * 424` bits.
    ///
    /// # Panics
    /// If the message does not fit in `message_size` pages or a block does
    /// not match the mask geometry.
    #[must_use]
    pub fn message_bits(&self, message_size: u8) -> String {
        let header = self.header();
        let mut w = BitWriter::new();
        w.push_u(u32::from(header.toh), 12);
        w.push_u(u32::from(header.mask_id), 5);
        w.push_u(u32::from(header.iod_id), 5);
        for flag in [
            header.mask_flag,
            header.orbit_correction_flag,
            header.clock_fullset_flag,
            header.clock_subset_flag,
            header.code_bias_flag,
            header.phase_bias_flag,
            header.ura_flag,
        ] {
            w.push_bool(flag);
        }
        w.push_u(0, MT1_HEADER_BITS - 29);

        if let Some(mask) = &self.mask {
            write_mask(&mut w, mask);
        }
        if let Some(orbit) = &self.orbit {
            write_orbit(&mut w, orbit, self.geometry());
        }
        if let Some(block) = &self.clock_fullset {
            write_clock_fullset(&mut w, block, self.geometry());
        }
        if let Some(block) = &self.clock_subset {
            write_clock_subset(&mut w, block);
        }
        if let Some(block) = &self.code_bias {
            write_code_bias(&mut w, block, self.geometry());
        }
        if let Some(block) = &self.phase_bias {
            write_phase_bias(&mut w, block, self.geometry());
        }
        if let Some(block) = &self.ura {
            write_ura(&mut w, block);
        }

        let capacity = usize::from(message_size) * PAGE_BITS;
        assert!(
            w.len() <= capacity,
            "message of {} bits does not fit in {message_size} pages",
            w.len()
        );
        let mut bits = w.into_bits();
        while bits.len() < capacity {
            bits.push('0');
        }
        bits
    }

    /// Produce the transmitted page set: the message bits chunked into
    /// information pages (pids `1..=message_size`) plus the parity pages
    /// (pids `33..=255`) from column-wise RS encoding.
    #[must_use]
    pub fn pages(&self, rs: &RsCodec, message_id: u8, message_size: u8) -> Vec<HasPage> {
        let bits = self.message_bits(message_size);
        let bits = bits.as_bytes();

        let mut info = [[0u8; PAGE_OCTETS]; INFO_LEN];
        for (row, octets) in info.iter_mut().enumerate().take(usize::from(message_size)) {
            for (col, octet) in octets.iter_mut().enumerate() {
                let offset = (row * PAGE_OCTETS + col) * 8;
                let mut value = 0u8;
                for &b in &bits[offset..offset + 8] {
                    value = value << 1 | u8::from(b == b'1');
                }
                *octet = value;
            }
        }

        let mut codewords = vec![[0u8; PAGE_OCTETS]; CODEWORD_LEN];
        for col in 0..PAGE_OCTETS {
            let mut column = [0u8; INFO_LEN];
            for (row, octets) in info.iter().enumerate() {
                column[row] = octets[col];
            }
            for (pid0, &symbol) in rs.encode(&column).iter().enumerate() {
                codewords[pid0][col] = symbol;
            }
        }

        (1..=message_size)
            .chain(33..=u8::MAX)
            .map(|page_id| {
                let mut page_bits = String::with_capacity(PAGE_BITS);
                for octet in &codewords[usize::from(page_id) - 1] {
                    for j in (0..8).rev() {
                        page_bits.push(if octet >> j & 1 == 1 { '1' } else { '0' });
                    }
                }
                HasPage {
                    status: 0,
                    message_type: 1,
                    message_id,
                    message_size,
                    page_id,
                    bits: page_bits,
                    prn: 0,
                    tow_ms: 0,
                }
            })
            .collect()
    }
}

/// Build a complete page set straight from a parsed record, reusing its mask
/// as the layout when the mask flag is clear.
#[must_use]
pub fn pages_from_message(
    rs: &RsCodec,
    message: &HasMessage,
    message_id: u8,
    message_size: u8,
) -> Vec<HasPage> {
    let mut builder = Mt1Builder::new(message.header.toh, message.header.mask_id, message.header.iod_id);
    if let Some(mask) = &message.mask {
        builder = if message.header.mask_flag {
            builder.with_mask(mask.clone())
        } else {
            builder.with_layout(mask.clone())
        };
    }
    if let Some(block) = &message.orbit {
        builder = builder.with_orbit(block.clone());
    }
    if let Some(block) = &message.clock_fullset {
        builder = builder.with_clock_fullset(block.clone());
    }
    if let Some(block) = &message.clock_subset {
        builder = builder.with_clock_subset(block.clone());
    }
    if let Some(block) = &message.code_bias {
        builder = builder.with_code_bias(block.clone());
    }
    if let Some(block) = &message.phase_bias {
        builder = builder.with_phase_bias(block.clone());
    }
    if let Some(block) = &message.ura {
        builder = builder.with_ura(block.clone());
    }
    builder.pages(rs, message_id, message_size)
}

fn write_mask(w: &mut BitWriter, mask: &CorrectionMask) {
    w.push_u(mask.nsys() as u32, 4);
    if mask.nsys() == 0 {
        return;
    }
    for sys in &mask.systems {
        w.push_u(u32::from(sys.gnss_id), 4);
        w.push_u64(sys.satellite_mask, 40);
        w.push_u(u32::from(sys.signal_mask), 16);
        w.push_bool(sys.cell_mask_availability);
        assert!(
            sys.cell_mask.nsat() == sys.nsat() && sys.cell_mask.nsig() == sys.nsig(),
            "cell mask shape does not match the bitmaps"
        );
        for &cell in sys.cell_mask.cells() {
            w.push_bool(cell);
        }
        w.push_u(u32::from(sys.nav_message), 3);
    }
    w.push_u(0, 6); // reserved
}

fn write_orbit(w: &mut BitWriter, block: &OrbitCorrections, geometry: &CorrectionMask) {
    assert!(block.satellites.len() == geometry.nsat_total());
    w.push_u(u32::from(block.validity_interval_index), 4);
    let mut satellites = block.satellites.iter();
    for sys in &geometry.systems {
        let kind = GnssKind::from_id(sys.gnss_id).expect("orbit corrections need a known gnss id");
        for _ in 0..sys.nsat() {
            let sat = satellites.next().expect("satellite count checked above");
            w.push_u(u32::from(sat.iod), kind.iod_bits());
            w.push_i16(sat.delta_radial, 13);
            w.push_i16(sat.delta_along_track, 12);
            w.push_i16(sat.delta_cross_track, 12);
        }
    }
}

fn write_clock_fullset(w: &mut BitWriter, block: &ClockFullSet, geometry: &CorrectionMask) {
    assert!(block.c0_multipliers.len() == geometry.nsys());
    assert!(block.satellites.len() == geometry.nsat_total());
    w.push_u(u32::from(block.validity_interval_index), 4);
    for &multiplier in &block.c0_multipliers {
        w.push_u(u32::from(multiplier), 2);
    }
    for sat in &block.satellites {
        w.push_bool(sat.iod_change);
        w.push_i16(sat.delta_c0, 13);
    }
}

fn write_clock_subset(w: &mut BitWriter, block: &ClockSubset) {
    w.push_u(u32::from(block.validity_interval_index), 4);
    w.push_u(block.systems.len() as u32, 4);
    for sys in &block.systems {
        w.push_u(u32::from(sys.gnss_id), 4);
        assert!(sys.c0_multiplier >= 1, "subset multiplier is stored offset by one");
        w.push_u(u32::from(sys.c0_multiplier - 1), 2);
        for &present in &sys.submask {
            w.push_bool(present);
        }
        let expected = sys.submask.iter().filter(|&&p| p).count();
        assert!(sys.delta_c0.len() == expected);
        for &delta in &sys.delta_c0 {
            w.push_i16(delta, 13);
        }
    }
}

fn write_code_bias(w: &mut BitWriter, block: &CodeBiases, geometry: &CorrectionMask) {
    w.push_u(u32::from(block.validity_interval_index), 4);
    let mut sat = 0;
    for sys in &geometry.systems {
        for s in 0..sys.nsat() {
            for c in 0..sys.nsig() {
                if sys.cell_present(s, c) {
                    w.push_i16(block.biases.get(sat, c), 11);
                }
            }
            sat += 1;
        }
    }
}

fn write_phase_bias(w: &mut BitWriter, block: &PhaseBiases, geometry: &CorrectionMask) {
    w.push_u(u32::from(block.validity_interval_index), 4);
    let mut sat = 0;
    for sys in &geometry.systems {
        for s in 0..sys.nsat() {
            for c in 0..sys.nsig() {
                if sys.cell_present(s, c) {
                    w.push_i16(block.biases.get(sat, c), 11);
                    w.push_u(u32::from(block.discontinuity.get(sat, c)), 2);
                }
            }
            sat += 1;
        }
    }
}

fn write_ura(w: &mut BitWriter, block: &UraSet) {
    w.push_u(u32::from(block.validity_interval_index), 4);
    for &value in &block.values {
        w.push_u(u32::from(value), 3);
    }
}
