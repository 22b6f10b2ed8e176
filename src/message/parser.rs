//! MT1 body parsing, ICD v1.2 Table 7.
//!
//! The body is consumed strictly left-to-right with a bit cursor; every block
//! size depends on the mask in force, so there is no random access.

use crate::bits::BitReader;
use crate::message::{
    CellMask, ClockCorrection, ClockFullSet, ClockSubset, ClockSubsetSystem, CodeBiases,
    CorrectionMask, GnssKind, Grid, HasMessage, MaskCache, Mt1Header, OrbitCorrection,
    OrbitCorrections, PhaseBiases, SystemMask, UraSet, MAX_TOH, MT1_HEADER_BITS,
};
use crate::{Error, Result};

// Field widths, ICD v1.2.
const NSYS_LEN: usize = 4;
const GNSS_ID_LEN: usize = 4;
const SATELLITE_MASK_LEN: usize = 40;
const SIGNAL_MASK_LEN: usize = 16;
const NAV_MESSAGE_LEN: usize = 3;
const MASK_RESERVED_LEN: usize = 6;
const VALIDITY_INDEX_LEN: usize = 4;
const DELTA_RADIAL_LEN: usize = 13;
const DELTA_ALONG_TRACK_LEN: usize = 12;
const DELTA_CROSS_TRACK_LEN: usize = 12;
const C0_MULTIPLIER_LEN: usize = 2;
const DELTA_C0_LEN: usize = 13;
const NSYSPRIME_LEN: usize = 4;
const SUBSET_GNSS_ID_LEN: usize = 4;
const SUBSET_C0_MULTIPLIER_LEN: usize = 2;
const SUBSET_DELTA_C0_LEN: usize = 13;
const CODE_BIAS_LEN: usize = 11;
const PHASE_BIAS_LEN: usize = 11;
const PHASE_DISCONTINUITY_LEN: usize = 2;
const URA_LEN: usize = 3;

/// Parse a reconstructed MT1 bitstring into a structured record, consulting
/// and updating the mask cache.
///
/// On any parse error the cache entry for the message's mask id is evicted.
pub(crate) fn parse(bits: &str, cache: &mut MaskCache) -> Result<HasMessage> {
    let header = Mt1Header::decode(bits)?;
    match parse_body(header, bits, cache) {
        Ok(message) => Ok(message),
        Err(err) => {
            cache.evict(header.mask_id);
            Err(err)
        }
    }
}

fn parse_body(header: Mt1Header, bits: &str, cache: &mut MaskCache) -> Result<HasMessage> {
    let mut r = BitReader::new(bits);
    r.skip(MT1_HEADER_BITS)?;

    let mask = if header.mask_flag {
        let mask = read_mask(&mut r)?;
        cache.insert(header.mask_id, mask.clone());
        Some(mask)
    } else {
        cache.get(header.mask_id).cloned()
    };

    // Correction blocks are only readable while a non-empty mask is in force.
    let mut active = mask.as_ref().filter(|m| m.nsat_total() > 0);

    if header.toh > MAX_TOH {
        active = None;
        cache.evict(header.mask_id);
    }

    let mut orbit = None;
    let mut clock_fullset = None;
    let mut clock_subset = None;
    let mut code_bias = None;
    let mut phase_bias = None;
    let mut ura = None;

    if header.orbit_correction_flag {
        if let Some(m) = active {
            orbit = Some(read_orbit(&mut r, m)?);
        }
    }
    if header.clock_fullset_flag {
        if let Some(m) = active {
            clock_fullset = Some(read_clock_fullset(&mut r, m)?);
        }
    }
    if header.clock_subset_flag {
        if let Some(m) = active {
            match read_clock_subset(&mut r, m)? {
                Some(block) => clock_subset = Some(block),
                None => {
                    // Nsysprime of zero is not representable; distrust the
                    // mask and skip the remaining blocks.
                    active = None;
                    cache.evict(header.mask_id);
                }
            }
        }
    }
    if header.code_bias_flag {
        if let Some(m) = active {
            code_bias = Some(read_code_bias(&mut r, m)?);
        }
    }
    if header.phase_bias_flag {
        if let Some(m) = active {
            phase_bias = Some(read_phase_bias(&mut r, m)?);
        }
    }
    if header.ura_flag {
        if let Some(m) = active {
            ura = Some(read_ura(&mut r, m.nsat_total())?);
        }
    }

    Ok(HasMessage {
        header,
        mask,
        orbit,
        clock_fullset,
        clock_subset,
        code_bias,
        phase_bias,
        ura,
    })
}

fn read_mask(r: &mut BitReader) -> Result<CorrectionMask> {
    let nsys = usize::from(r.read_u8(NSYS_LEN)?);
    if nsys == 0 {
        return Ok(CorrectionMask::default());
    }

    let mut systems = Vec::with_capacity(nsys);
    for _ in 0..nsys {
        let gnss_id = r.read_u8(GNSS_ID_LEN)?;
        let satellite_mask = r.read_u64(SATELLITE_MASK_LEN)?;
        let signal_mask = r.read_u16(SIGNAL_MASK_LEN)?;
        let cell_mask_availability = r.read_bool()?;

        let nsat = satellite_mask.count_ones() as usize;
        let nsig = signal_mask.count_ones() as usize;
        // satellite-major, signal-minor; consumed even when the availability
        // flag is clear
        let mut cells = Vec::with_capacity(nsat * nsig);
        for _ in 0..nsat * nsig {
            cells.push(r.read_bool()?);
        }
        let nav_message = r.read_u8(NAV_MESSAGE_LEN)?;

        systems.push(SystemMask {
            gnss_id,
            satellite_mask,
            signal_mask,
            cell_mask_availability,
            cell_mask: CellMask::new(nsat, nsig, cells),
            nav_message,
        });
    }
    r.skip(MASK_RESERVED_LEN)?;

    Ok(CorrectionMask { systems })
}

fn read_orbit(r: &mut BitReader, mask: &CorrectionMask) -> Result<OrbitCorrections> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let mut satellites = Vec::with_capacity(mask.nsat_total());
    for sys in &mask.systems {
        let kind = GnssKind::from_id(sys.gnss_id).ok_or(Error::UnknownGnssId(sys.gnss_id))?;
        for _ in 0..sys.nsat() {
            satellites.push(OrbitCorrection {
                iod: r.read_u16(kind.iod_bits())?,
                delta_radial: r.read_i16(DELTA_RADIAL_LEN)?,
                delta_along_track: r.read_i16(DELTA_ALONG_TRACK_LEN)?,
                delta_cross_track: r.read_i16(DELTA_CROSS_TRACK_LEN)?,
            });
        }
    }
    Ok(OrbitCorrections {
        validity_interval_index,
        satellites,
    })
}

fn read_clock_fullset(r: &mut BitReader, mask: &CorrectionMask) -> Result<ClockFullSet> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let mut c0_multipliers = Vec::with_capacity(mask.nsys());
    for _ in 0..mask.nsys() {
        c0_multipliers.push(r.read_u8(C0_MULTIPLIER_LEN)?);
    }
    let mut satellites = Vec::with_capacity(mask.nsat_total());
    for _ in 0..mask.nsat_total() {
        satellites.push(ClockCorrection {
            iod_change: r.read_bool()?,
            delta_c0: r.read_i16(DELTA_C0_LEN)?,
        });
    }
    Ok(ClockFullSet {
        validity_interval_index,
        c0_multipliers,
        satellites,
    })
}

/// Returns `None` for the structurally impossible Nsysprime of zero.
fn read_clock_subset(r: &mut BitReader, mask: &CorrectionMask) -> Result<Option<ClockSubset>> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let nsysprime = usize::from(r.read_u8(NSYSPRIME_LEN)?);
    if nsysprime == 0 {
        return Ok(None);
    }

    let mut systems = Vec::with_capacity(nsysprime);
    for i in 0..nsysprime {
        // subset slot i draws its submask width from full-mask slot i
        let Some(slot) = mask.systems.get(i) else {
            return Err(Error::Malformed(format!(
                "clock subset slot {i} exceeds the {} masked systems",
                mask.nsys()
            )));
        };
        let gnss_id = r.read_u8(SUBSET_GNSS_ID_LEN)?;
        let c0_multiplier = r.read_u8(SUBSET_C0_MULTIPLIER_LEN)? + 1;
        let mut submask = Vec::with_capacity(slot.nsat());
        for _ in 0..slot.nsat() {
            submask.push(r.read_bool()?);
        }
        let mut delta_c0 = Vec::new();
        for &present in &submask {
            if present {
                delta_c0.push(r.read_i16(SUBSET_DELTA_C0_LEN)?);
            }
        }
        systems.push(ClockSubsetSystem {
            gnss_id,
            c0_multiplier,
            submask,
            delta_c0,
        });
    }
    Ok(Some(ClockSubset {
        validity_interval_index,
        systems,
    }))
}

/// Shape of the bias grids: one row per masked satellite, columns up to the
/// widest per-system signal list.
fn bias_shape(mask: &CorrectionMask) -> (usize, usize) {
    let cols = mask.systems.iter().map(SystemMask::nsig).max().unwrap_or(0);
    (mask.nsat_total(), cols)
}

fn read_code_bias(r: &mut BitReader, mask: &CorrectionMask) -> Result<CodeBiases> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let (rows, cols) = bias_shape(mask);
    let mut biases = Grid::new(rows, cols);
    let mut sat = 0;
    for sys in &mask.systems {
        for s in 0..sys.nsat() {
            for c in 0..sys.nsig() {
                if sys.cell_present(s, c) {
                    biases.set(sat, c, r.read_i16(CODE_BIAS_LEN)?);
                }
            }
            sat += 1;
        }
    }
    Ok(CodeBiases {
        validity_interval_index,
        biases,
    })
}

fn read_phase_bias(r: &mut BitReader, mask: &CorrectionMask) -> Result<PhaseBiases> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let (rows, cols) = bias_shape(mask);
    let mut biases = Grid::new(rows, cols);
    let mut discontinuity = Grid::new(rows, cols);
    let mut sat = 0;
    for sys in &mask.systems {
        for s in 0..sys.nsat() {
            for c in 0..sys.nsig() {
                if sys.cell_present(s, c) {
                    biases.set(sat, c, r.read_i16(PHASE_BIAS_LEN)?);
                    discontinuity.set(sat, c, r.read_u8(PHASE_DISCONTINUITY_LEN)?);
                }
            }
            sat += 1;
        }
    }
    Ok(PhaseBiases {
        validity_interval_index,
        biases,
        discontinuity,
    })
}

fn read_ura(r: &mut BitReader, nsat: usize) -> Result<UraSet> {
    let validity_interval_index = r.read_u8(VALIDITY_INDEX_LEN)?;
    let mut values = Vec::with_capacity(nsat);
    for _ in 0..nsat {
        values.push(r.read_u8(URA_LEN)?);
    }
    Ok(UraSet {
        validity_interval_index,
        values,
    })
}
