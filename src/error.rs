#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The bit cursor ran past the end of the message.
    #[error("bit underrun: needed {needed} bits, {remaining} remaining")]
    Underrun { needed: usize, remaining: usize },

    /// More erasures than the (255, 32) code can fill. Typically caused by a
    /// corrupted page id landing in the untransmitted range.
    #[error("{erasures} erasures exceed the {max} the code can fill")]
    TooManyErasures { erasures: usize, max: usize },

    /// A column codeword could not be erasure-decoded.
    #[error("reed-solomon decode failed at column {column}")]
    ReedSolomon { column: usize },

    /// Structurally impossible MT1 content.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// GNSS id without a defined correction layout.
    #[error("unsupported gnss id {0} in orbit corrections")]
    UnknownGnssId(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
