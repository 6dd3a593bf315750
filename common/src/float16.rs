//! Lossy decimal compression of token amounts into two bytes.
//!
//! The top 4 bits hold a base-10 exponent and the low 12 bits a mantissa, so
//! the encoded value is `mantissa * 10^exponent`. Amounts are expected to be
//! [`round`]ed before they are signed; [`compress`] refuses anything that
//! would lose precision.

use ethereum_types::U256;
use thiserror::Error;

/// Width of a compressed amount on the wire.
pub const FLOAT_LENGTH: usize = 2;

/// The largest representable value, `4095 * 10^15`.
pub const FLOAT16_MAX: U256 = U256([4_095_000_000_000_000_000, 0, 0, 0]);

const MANTISSA_BITS: u32 = 12;
const MANTISSA_MAX: u16 = (1 << MANTISSA_BITS) - 1;
const EXPONENT_MAX: usize = 15;

/// An error type for float16 compression.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum Float16Error {
    /// The value has more significant digits than the mantissa holds.
    #[error("{0} can not be represented as a float16 without losing precision")]
    Unrepresentable(U256),

    /// Even the largest exponent can't bring the value into range.
    #[error("{0} is too large for a float16")]
    Overflow(U256),
}

/// Encodes `input` exactly, or fails.
pub fn compress(input: U256) -> Result<[u8; FLOAT_LENGTH], Float16Error> {
    let ten = U256::from(10);
    let mut mantissa = input;
    let mut exponent = 0;
    while exponent < EXPONENT_MAX && !mantissa.is_zero() && (mantissa % ten).is_zero() {
        mantissa /= ten;
        exponent += 1;
    }
    if mantissa > U256::from(MANTISSA_MAX) {
        return Err(Float16Error::Unrepresentable(input));
    }
    let encoded = ((exponent as u16) << MANTISSA_BITS) | mantissa.low_u32() as u16;
    Ok(encoded.to_be_bytes())
}

pub fn decompress(input: [u8; FLOAT_LENGTH]) -> U256 {
    let raw = u16::from_be_bytes(input);
    let exponent = (raw >> MANTISSA_BITS) as usize;
    U256::from(raw & MANTISSA_MAX) * U256::exp10(exponent)
}

/// The largest representable value that is not greater than `input`.
pub fn round(input: U256) -> Result<U256, Float16Error> {
    let ten = U256::from(10);
    let mut mantissa = input;
    let mut exponent = 0;
    while mantissa > U256::from(MANTISSA_MAX) {
        mantissa /= ten;
        exponent += 1;
    }
    if exponent > EXPONENT_MAX {
        return Err(Float16Error::Overflow(input));
    }
    Ok(mantissa * U256::exp10(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_have_a_zero_exponent() {
        assert_eq!(compress(U256::from(4095)).unwrap(), [0x0f, 0xff]);
        assert_eq!(compress(U256::zero()).unwrap(), [0, 0]);
        assert_eq!(decompress([0x0f, 0xff]), U256::from(4095));
    }

    #[test]
    fn trailing_zeros_move_into_the_exponent() {
        // 1230000 = 123 * 10^4
        let bytes = compress(U256::from(1_230_000)).unwrap();
        assert_eq!(bytes, [0x40, 123]);
        assert_eq!(decompress(bytes), U256::from(1_230_000));
    }

    #[test]
    fn exponent_is_capped() {
        let value = U256::exp10(16);
        let bytes = compress(value).unwrap();
        // 10 * 10^15
        assert_eq!(u16::from_be_bytes(bytes) >> MANTISSA_BITS, 15);
        assert_eq!(decompress(bytes), value);
    }

    #[test]
    fn precision_loss_is_refused() {
        assert_eq!(
            compress(U256::from(4097)),
            Err(Float16Error::Unrepresentable(U256::from(4097)))
        );
    }

    #[test]
    fn round_truncates_to_a_representable_value() {
        assert_eq!(round(U256::from(123_456)).unwrap(), U256::from(123_400));
        assert_eq!(round(U256::from(4095)).unwrap(), U256::from(4095));
        let rounded = round(U256::from(987_654_321u64)).unwrap();
        assert_eq!(rounded, U256::from(987_000_000u64));
        assert_eq!(decompress(compress(rounded).unwrap()), rounded);
    }

    #[test]
    fn max_is_the_largest_encoding() {
        assert_eq!(decompress([0xff, 0xff]), FLOAT16_MAX);
        assert_eq!(round(FLOAT16_MAX), Ok(FLOAT16_MAX));
        assert_eq!(compress(FLOAT16_MAX), Ok([0xff, 0xff]));
    }

    #[test]
    fn round_rejects_values_beyond_the_largest_exponent() {
        let too_big = U256::from(4096) * U256::exp10(15);
        assert_eq!(round(too_big), Err(Float16Error::Overflow(too_big)));
    }
}
