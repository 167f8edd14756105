//! Layer kinds of the accelerator pipeline.

/// Hardware layer kind (`enum intuitus_layer_types`).
///
/// Discriminants are the values the driver switches on.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Network input; always layer id 0.
    Input = 0,
    /// Network output; copies its source buffer into the shared block.
    Output = 1,
    /// Pointwise convolution.
    Conv1x1 = 2,
    /// Inverted bottleneck with a 3x3 depthwise stage.
    InvBottleneck3x3 = 3,
    /// Inverted bottleneck with a 5x5 depthwise stage.
    InvBottleneck5x5 = 4,
    /// 3x3 convolution.
    Conv3x3 = 5,
    /// 5x5 convolution.
    Conv5x5 = 6,
    /// Residual add; the only compute kind that reads `src_buffer_id`.
    Residual = 7,
    /// Channel concatenation of two buffers.
    Concat = 8,
    /// Channel split of one buffer into groups.
    Split = 9,
    /// 2x nearest-neighbour upsampling.
    Upsample = 10,
    /// 2D max pooling; stride travels in `scattered_lines`.
    Maxpool2d = 11,
    /// Buffer copy.
    Copy = 12,
    /// Hardware loopback test.
    TestLoop = 13,
}

impl LayerKind {
    /// Every kind, in discriminant order.
    pub const ALL: [Self; 14] = [
        Self::Input,
        Self::Output,
        Self::Conv1x1,
        Self::InvBottleneck3x3,
        Self::InvBottleneck5x5,
        Self::Conv3x3,
        Self::Conv5x5,
        Self::Residual,
        Self::Concat,
        Self::Split,
        Self::Upsample,
        Self::Maxpool2d,
        Self::Copy,
        Self::TestLoop,
    ];

    /// Decode a raw `layer_type` field.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Raw value written into `LayerArgs::layer_type`.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Kinds that stream tx commands and rx tiles after creation.
    #[must_use]
    pub const fn carries_tiles(self) -> bool {
        matches!(
            self,
            Self::Conv1x1
                | Self::InvBottleneck3x3
                | Self::InvBottleneck5x5
                | Self::Conv3x3
                | Self::Conv5x5
                | Self::Residual
                | Self::TestLoop
        )
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for kind in LayerKind::ALL {
            assert_eq!(LayerKind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(LayerKind::from_raw(14), None);
    }

    #[test]
    fn header_discriminants() {
        assert_eq!(LayerKind::Input.raw(), 0);
        assert_eq!(LayerKind::Residual.raw(), 7);
        assert_eq!(LayerKind::Maxpool2d.raw(), 11);
        assert_eq!(LayerKind::TestLoop.raw(), 13);
    }

    #[test]
    fn structural_kinds_carry_no_tiles() {
        assert!(LayerKind::Conv3x3.carries_tiles());
        assert!(LayerKind::Residual.carries_tiles());
        assert!(!LayerKind::Input.carries_tiles());
        assert!(!LayerKind::Upsample.carries_tiles());
        assert!(!LayerKind::Concat.carries_tiles());
    }
}
