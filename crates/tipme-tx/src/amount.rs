//! Asset descriptors and exact decimal to base-unit conversion.

use std::fmt;

use solana_pubkey::Pubkey;
use thiserror::Error;

/// Decimal precision of the native coin (lamports per SOL exponent).
pub const NATIVE_DECIMALS: u8 = 9;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Native balance a sender must keep on top of the transfer to cover fees.
pub const DEFAULT_FEE_BUFFER_LAMPORTS: u64 = 5_000_000;

/// Largest decimal precision accepted for token mints.
const MAX_DECIMALS: u8 = 19;

/// Amount conversion and balance-check errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmountError {
    /// Amount does not convert exactly to an integer at the asset precision.
    #[error("amount {amount} is not representable with {decimals} decimals")]
    NotExact {
        /// Requested decimal amount.
        amount: f64,
        /// Asset decimal precision.
        decimals: u8,
    },
    /// Amount is negative, NaN, or infinite.
    #[error("amount {amount} is not a finite non-negative number")]
    NotFinite {
        /// Requested decimal amount.
        amount: f64,
    },
    /// Scaled amount exceeds the 64-bit base-unit range.
    #[error("amount {amount} overflows base units at {decimals} decimals")]
    Overflow {
        /// Requested decimal amount.
        amount: f64,
        /// Asset decimal precision.
        decimals: u8,
    },
    /// Token precision outside the supported range.
    #[error("unsupported decimal precision {decimals}")]
    UnsupportedDecimals {
        /// Declared decimal precision.
        decimals: u8,
    },
    /// Native balance does not cover the transfer plus fee buffer.
    #[error("insufficient native balance: need {required} lamports, have {available}")]
    InsufficientFunds {
        /// Lamports required including the fee buffer.
        required: u64,
        /// Lamports available.
        available: u64,
    },
}

/// Transferable asset.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Asset {
    /// Native coin (SOL).
    Native,
    /// Fungible token identified by its mint.
    Token {
        /// Token mint address.
        mint: Pubkey,
        /// Mint decimal precision.
        decimals: u8,
    },
}

impl Asset {
    /// Creates a token asset descriptor.
    #[must_use]
    pub const fn token(mint: Pubkey, decimals: u8) -> Self {
        Self::Token { mint, decimals }
    }

    /// Returns the decimal precision for this asset.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Native => NATIVE_DECIMALS,
            Self::Token { decimals, .. } => *decimals,
        }
    }

    /// Returns the token mint for token assets.
    #[must_use]
    pub const fn mint(&self) -> Option<Pubkey> {
        match self {
            Self::Native => None,
            Self::Token { mint, .. } => Some(*mint),
        }
    }

    /// Converts a decimal amount into integral base units.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] when the scaled amount is not an exact integer or does not fit
    /// into `u64`.
    pub fn base_units(&self, amount: f64) -> Result<u64, AmountError> {
        to_base_units(amount, self.decimals())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("SOL"),
            Self::Token { mint, .. } => write!(f, "{mint}"),
        }
    }
}

/// Converts `amount` into base units at `decimals` precision, rejecting any rounding.
///
/// # Errors
///
/// Returns [`AmountError`] when the amount is negative or non-finite, when `amount * 10^decimals`
/// has a fractional part, or when it does not fit into `u64`.
pub fn to_base_units(amount: f64, decimals: u8) -> Result<u64, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals { decimals });
    }
    if !amount.is_finite() || (amount.is_sign_negative() && amount != 0.0) {
        return Err(AmountError::NotFinite { amount });
    }
    let scaled = amount * 10_f64.powi(i32::from(decimals));
    if !scaled.is_finite() || scaled >= u64::MAX as f64 {
        return Err(AmountError::Overflow { amount, decimals });
    }
    if scaled.fract() != 0.0 {
        return Err(AmountError::NotExact { amount, decimals });
    }
    Ok(scaled as u64)
}

/// Checks that a native balance covers `amount` of `asset` plus the fee buffer.
///
/// Balance checks belong to the caller; this helper keeps the rule in one place.
///
/// # Errors
///
/// Returns [`AmountError::InsufficientFunds`] when the balance is short, or a conversion error
/// when `amount` is not exact.
pub fn ensure_fee_buffer(
    balance_lamports: u64,
    amount: f64,
    asset: &Asset,
) -> Result<(), AmountError> {
    let spent = match asset {
        Asset::Native => asset.base_units(amount)?,
        Asset::Token { .. } => 0,
    };
    let required = spent.saturating_add(DEFAULT_FEE_BUFFER_LAMPORTS);
    if balance_lamports < required {
        return Err(AmountError::InsufficientFunds {
            required,
            available: balance_lamports,
        });
    }
    Ok(())
}

/// Converts a SOL amount into lamports, rounding up.
#[must_use]
pub fn sol_to_lamports_ceil(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    let lamports = (sol * LAMPORTS_PER_SOL as f64).ceil();
    if lamports >= u64::MAX as f64 {
        return u64::MAX;
    }
    lamports as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_native_amounts_convert() {
        assert_eq!(to_base_units(0.1, NATIVE_DECIMALS), Ok(100_000_000));
        assert_eq!(to_base_units(1.0, NATIVE_DECIMALS), Ok(LAMPORTS_PER_SOL));
        assert_eq!(to_base_units(0.000_000_001, NATIVE_DECIMALS), Ok(1));
        assert_eq!(to_base_units(0.0, NATIVE_DECIMALS), Ok(0));
    }

    #[test]
    fn sub_precision_amounts_are_rejected() {
        assert_eq!(
            to_base_units(0.000_000_000_5, NATIVE_DECIMALS),
            Err(AmountError::NotExact {
                amount: 0.000_000_000_5,
                decimals: NATIVE_DECIMALS,
            })
        );
        assert!(matches!(
            to_base_units(1.5, 0),
            Err(AmountError::NotExact { .. })
        ));
        assert!(matches!(
            to_base_units(0.123, 2),
            Err(AmountError::NotExact { .. })
        ));
    }

    #[test]
    fn token_precision_drives_conversion() {
        let asset = Asset::token(Pubkey::new_unique(), 5);
        assert_eq!(asset.base_units(1000.0), Ok(100_000_000));
        assert_eq!(asset.base_units(0.25), Ok(25_000));
        assert!(asset.base_units(0.000_001).is_err());
        assert_eq!(Asset::token(Pubkey::new_unique(), 0).base_units(42.0), Ok(42));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(matches!(
            to_base_units(-1.0, 6),
            Err(AmountError::NotFinite { .. })
        ));
        assert!(matches!(
            to_base_units(f64::NAN, 6),
            Err(AmountError::NotFinite { .. })
        ));
        assert!(matches!(
            to_base_units(f64::INFINITY, 6),
            Err(AmountError::NotFinite { .. })
        ));
        assert!(matches!(
            to_base_units(1e30, 9),
            Err(AmountError::Overflow { .. })
        ));
        assert!(matches!(
            to_base_units(1.0, 40),
            Err(AmountError::UnsupportedDecimals { decimals: 40 })
        ));
    }

    #[test]
    fn fee_buffer_applies_to_native_and_token_transfers() {
        assert!(ensure_fee_buffer(105_000_000, 0.1, &Asset::Native).is_ok());
        assert_eq!(
            ensure_fee_buffer(104_999_999, 0.1, &Asset::Native),
            Err(AmountError::InsufficientFunds {
                required: 105_000_000,
                available: 104_999_999,
            })
        );
        let token = Asset::token(Pubkey::new_unique(), 6);
        assert!(ensure_fee_buffer(DEFAULT_FEE_BUFFER_LAMPORTS, 10.0, &token).is_ok());
        assert!(ensure_fee_buffer(1, 10.0, &token).is_err());
    }

    #[test]
    fn sol_to_lamports_rounds_up() {
        assert_eq!(sol_to_lamports_ceil(0.001), 1_000_000);
        assert_eq!(sol_to_lamports_ceil(0.000_000_000_1), 1);
        assert_eq!(sol_to_lamports_ceil(0.0), 0);
        assert_eq!(sol_to_lamports_ceil(-1.0), 0);
    }
}
