//! Reed-Solomon (255, 32, 224) erasure codec over GF(256).
//!
//! The HAS message layer transmits each message as a 255-page codeword with 32
//! information pages; any 32 received symbols per column are enough to recover
//! the message, so up to 223 missing pages are treated as erasures. The field
//! polynomial is 0x11D and the code generator is g(x) = ∏ (x - α^i) for
//! i = 1..=223, per the HAS SIS ICD.

use crate::{Error, Result};

/// Codeword length in symbols.
pub const CODEWORD_LEN: usize = 255;
/// Information symbols per codeword.
pub const INFO_LEN: usize = 32;
/// Parity symbols per codeword, also the maximum number of fillable erasures.
pub const PARITY_LEN: usize = CODEWORD_LEN - INFO_LEN;

const FIELD_POLY: u32 = 0x11d;
/// Exponent of the first consecutive generator root.
const FCR: usize = 1;

/// Outcome of a codeword decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsState {
    /// The codeword was already consistent.
    Ok,
    /// All erasures filled; holds the number of symbols that changed.
    Corrected(usize),
    /// The codeword could not be recovered.
    Uncorrectable,
}

impl RsState {
    /// Return `true` for [Self::Ok] or [Self::Corrected].
    #[must_use]
    pub fn ok(&self) -> bool {
        matches!(self, RsState::Ok | RsState::Corrected(_))
    }
}

/// The (255, 32) codec. Log/antilog tables are generated at construction.
#[derive(Debug, Clone)]
pub struct RsCodec {
    exp: [u8; 512],
    log: [u8; 256],
    /// Generator polynomial, leading coefficient first; always monic.
    genpoly: Vec<u8>,
}

impl RsCodec {
    pub fn new() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x = 1u32;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= FIELD_POLY;
            }
        }
        // doubled so products of two logs never need a modulo
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }

        let mut codec = RsCodec {
            exp,
            log,
            genpoly: Vec::new(),
        };
        let genpoly = codec.build_genpoly();
        codec.genpoly = genpoly;
        codec
    }

    fn build_genpoly(&self) -> Vec<u8> {
        let mut g = vec![1u8];
        for j in 0..PARITY_LEN {
            // multiply by (x + α^(FCR + j))
            let root = self.alpha_pow(FCR + j);
            g.push(0);
            for i in (1..g.len()).rev() {
                g[i] = g[i] ^ self.mul(root, g[i - 1]);
            }
        }
        g
    }

    #[inline]
    fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + self.log[b as usize] as usize]
        }
    }

    #[inline]
    fn div(&self, a: u8, b: u8) -> u8 {
        debug_assert!(b != 0);
        if a == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + 255 - self.log[b as usize] as usize]
        }
    }

    #[inline]
    fn inv(&self, a: u8) -> u8 {
        debug_assert!(a != 0);
        self.exp[255 - self.log[a as usize] as usize]
    }

    #[inline]
    fn alpha_pow(&self, e: usize) -> u8 {
        self.exp[e % 255]
    }

    fn pow(&self, x: u8, e: usize) -> u8 {
        if e == 0 {
            return 1;
        }
        if x == 0 {
            return 0;
        }
        self.exp[self.log[x as usize] as usize * e % 255]
    }

    /// Evaluate a low-degree-first polynomial at `x`.
    fn eval(&self, poly: &[u8], x: u8) -> u8 {
        poly.iter().rev().fold(0u8, |acc, &c| self.mul(acc, x) ^ c)
    }

    /// Syndromes S_j = c(α^(FCR + j)) of the full codeword.
    fn syndromes(&self, cw: &[u8; CODEWORD_LEN]) -> Vec<u8> {
        (0..PARITY_LEN)
            .map(|j| {
                let a = self.alpha_pow(FCR + j);
                cw.iter().fold(0u8, |acc, &c| self.mul(acc, a) ^ c)
            })
            .collect()
    }

    /// Systematically encode 32 information symbols into a full codeword.
    #[must_use]
    pub fn encode(&self, info: &[u8; INFO_LEN]) -> [u8; CODEWORD_LEN] {
        let mut cw = [0u8; CODEWORD_LEN];
        cw[..INFO_LEN].copy_from_slice(info);
        // synthetic division of m(x)·x^223 by the generator; the information
        // positions double as the running remainder and are restored after
        for i in 0..INFO_LEN {
            let coef = cw[i];
            if coef != 0 {
                for j in 1..self.genpoly.len() {
                    cw[i + j] ^= self.mul(self.genpoly[j], coef);
                }
            }
        }
        cw[..INFO_LEN].copy_from_slice(info);
        cw
    }

    /// Fill the erased positions of `cw` in place.
    ///
    /// `erasures` are 0-based codeword positions whose symbols are unknown;
    /// every non-erased symbol is assumed to be correct. The repaired word is
    /// re-checked against the code before reporting success.
    pub fn decode(&self, cw: &mut [u8; CODEWORD_LEN], erasures: &[usize]) -> RsState {
        if erasures.len() > PARITY_LEN {
            return RsState::Uncorrectable;
        }
        debug_assert!(erasures.iter().all(|&p| p < CODEWORD_LEN));

        let synd = self.syndromes(cw);
        if synd.iter().all(|&s| s == 0) {
            return RsState::Ok;
        }
        if erasures.is_empty() {
            // inconsistent symbols but nowhere marked to repair
            return RsState::Uncorrectable;
        }

        // Erasure locator Λ(x) = ∏ (1 + X_p·x) with X_p = α^(254 - p),
        // low-degree-first.
        let mut lambda = Vec::with_capacity(erasures.len() + 1);
        lambda.push(1u8);
        for &p in erasures {
            let x = self.alpha_pow(CODEWORD_LEN - 1 - p);
            lambda.push(0);
            for i in (1..lambda.len()).rev() {
                lambda[i] = lambda[i] ^ self.mul(x, lambda[i - 1]);
            }
        }

        // Evaluator Ω(x) = S(x)·Λ(x) mod x^223
        let mut omega = vec![0u8; PARITY_LEN];
        for (i, &s) in synd.iter().enumerate() {
            if s == 0 {
                continue;
            }
            for (j, &l) in lambda.iter().enumerate() {
                if i + j >= PARITY_LEN {
                    break;
                }
                omega[i + j] ^= self.mul(s, l);
            }
        }

        // Forney: e_p = Ω(X_p⁻¹) / Λ'(X_p⁻¹), with FCR = 1. The formal
        // derivative of Λ keeps only the odd-degree terms in GF(2^m).
        let mut corrected = 0;
        for &p in erasures {
            let xinv = self.inv(self.alpha_pow(CODEWORD_LEN - 1 - p));
            let num = self.eval(&omega, xinv);
            let mut den = 0u8;
            let mut i = 1;
            while i < lambda.len() {
                den ^= self.mul(lambda[i], self.pow(xinv, i - 1));
                i += 2;
            }
            if den == 0 {
                return RsState::Uncorrectable;
            }
            let magnitude = self.div(num, den);
            if magnitude != 0 {
                corrected += 1;
            }
            cw[p] ^= magnitude;
        }

        if self.syndromes(cw).iter().any(|&s| s != 0) {
            return RsState::Uncorrectable;
        }
        RsState::Corrected(corrected)
    }

    /// [Self::decode] mapped into the crate error type, tagging the failed
    /// `column` for diagnostics.
    pub fn decode_column(
        &self,
        cw: &mut [u8; CODEWORD_LEN],
        erasures: &[usize],
        column: usize,
    ) -> Result<()> {
        if self.decode(cw, erasures).ok() {
            Ok(())
        } else {
            Err(Error::ReedSolomon { column })
        }
    }
}

impl Default for RsCodec {
    fn default() -> Self {
        Self::new()
    }
}
