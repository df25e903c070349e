/// How many bytes one cell of an attribute occupies (spec §6
/// `attribute_cell_size`).
///
/// Variable-sized attributes carry a conservative average used only for
/// `est_result_size` (spec §4.5); it is never an exactness guarantee (spec
/// §8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeCellSize {
    Fixed(u32),
    Variable { average_bytes: u32 },
}

/// Fallback average used when a variable-sized attribute does not supply
/// its own estimate.
pub const DEFAULT_VARIABLE_ATTRIBUTE_AVERAGE_BYTES: u32 = 64;

impl AttributeCellSize {
    pub fn estimate_bytes(&self) -> u64 {
        match self {
            AttributeCellSize::Fixed(size) => u64::from(*size),
            AttributeCellSize::Variable { average_bytes } => {
                u64::from(*average_bytes)
            }
        }
    }
}

impl Default for AttributeCellSize {
    fn default() -> Self {
        AttributeCellSize::Variable {
            average_bytes: DEFAULT_VARIABLE_ATTRIBUTE_AVERAGE_BYTES,
        }
    }
}
