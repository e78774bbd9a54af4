//! Utility and conversion errors.

/// Errors that can occur in utility functions
#[derive(Debug, thiserror::Error)]
pub enum UtilityError {
    #[error("Failed to parse address from '{input}'")]
    AddressParsingFailed { input: String },

    #[error("Failed to convert {value} with {decimals} decimals to display units")]
    UnitConversionFailed { value: String, decimals: u8 },

    #[error("Amount {amount} is not representable with {decimals} decimals")]
    AmountNotRepresentable { amount: f64, decimals: u8 },
}
