use num::Num;
use num_traits::{AsPrimitive, Bounded};
use std::fmt::Debug;

/// Pixel encoding of a band or buffer.
///
/// Complex variants store the real and imaginary components
/// contiguously, real part first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
    CI16,
    CI32,
    CF32,
    CF64,
}

impl PixelType {
    /// Size of one pixel word in bytes (both components for complex types).
    pub const fn size_bytes(self) -> usize {
        match self {
            PixelType::U8 | PixelType::I8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 | PixelType::CI16 => 4,
            PixelType::F64 | PixelType::CI32 | PixelType::CF32 => 8,
            PixelType::CF64 => 16,
        }
    }

    pub const fn is_complex(self) -> bool {
        matches!(
            self,
            PixelType::CI16 | PixelType::CI32 | PixelType::CF32 | PixelType::CF64
        )
    }

    /// Smallest representable value of the (real component) type.
    pub fn min_value(self) -> f64 {
        match self {
            PixelType::U8 => u8::MIN as f64,
            PixelType::I8 => i8::MIN as f64,
            PixelType::U16 => u16::MIN as f64,
            PixelType::I16 | PixelType::CI16 => i16::MIN as f64,
            PixelType::U32 => u32::MIN as f64,
            PixelType::I32 | PixelType::CI32 => i32::MIN as f64,
            PixelType::F32 | PixelType::CF32 => f32::MIN as f64,
            PixelType::F64 | PixelType::CF64 => f64::MIN,
        }
    }

    /// Largest representable value of the (real component) type.
    pub fn max_value(self) -> f64 {
        match self {
            PixelType::U8 => u8::MAX as f64,
            PixelType::I8 => i8::MAX as f64,
            PixelType::U16 => u16::MAX as f64,
            PixelType::I16 | PixelType::CI16 => i16::MAX as f64,
            PixelType::U32 => u32::MAX as f64,
            PixelType::I32 | PixelType::CI32 => i32::MAX as f64,
            PixelType::F32 | PixelType::CF32 => f32::MAX as f64,
            PixelType::F64 | PixelType::CF64 => f64::MAX,
        }
    }

    pub const ALL: [PixelType; 12] = [
        PixelType::U8,
        PixelType::I8,
        PixelType::U16,
        PixelType::I16,
        PixelType::U32,
        PixelType::I32,
        PixelType::F32,
        PixelType::F64,
        PixelType::CI16,
        PixelType::CI32,
        PixelType::CF32,
        PixelType::CF64,
    ];
}

/// Real primitive types a band can be built from in memory.
pub trait Pixel:
    Copy + PartialOrd + Debug + Send + Sync + Num + Bounded + AsPrimitive<f64> + 'static
{
    const TYPE: PixelType;
}

impl Pixel for u8 {
    const TYPE: PixelType = PixelType::U8;
}
impl Pixel for i8 {
    const TYPE: PixelType = PixelType::I8;
}
impl Pixel for u16 {
    const TYPE: PixelType = PixelType::U16;
}
impl Pixel for i16 {
    const TYPE: PixelType = PixelType::I16;
}
impl Pixel for u32 {
    const TYPE: PixelType = PixelType::U32;
}
impl Pixel for i32 {
    const TYPE: PixelType = PixelType::I32;
}
impl Pixel for f32 {
    const TYPE: PixelType = PixelType::F32;
}
impl Pixel for f64 {
    const TYPE: PixelType = PixelType::F64;
}

/// Representable range of `T` as the engine's working `f64`.
pub fn value_range<T: Pixel>() -> (f64, f64) {
    (T::min_value().as_(), T::max_value().as_())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PixelType::U8, 1)]
    #[case(PixelType::I16, 2)]
    #[case(PixelType::F64, 8)]
    #[case(PixelType::CI16, 4)]
    #[case(PixelType::CF64, 16)]
    fn word_sizes(#[case] ty: PixelType, #[case] bytes: usize) {
        assert_eq!(ty.size_bytes(), bytes);
    }

    #[test]
    fn complex_flags() {
        for ty in PixelType::ALL {
            let complex = matches!(
                ty,
                PixelType::CI16 | PixelType::CI32 | PixelType::CF32 | PixelType::CF64
            );
            assert_eq!(ty.is_complex(), complex);
        }
    }

    #[test]
    fn declared_ranges_match_primitive_bounds() {
        assert_eq!(
            value_range::<u8>(),
            (PixelType::U8.min_value(), PixelType::U8.max_value())
        );
        assert_eq!(
            value_range::<i16>(),
            (PixelType::I16.min_value(), PixelType::I16.max_value())
        );
        assert_eq!(
            value_range::<f32>(),
            (PixelType::F32.min_value(), PixelType::F32.max_value())
        );
        assert_eq!(
            value_range::<f64>(),
            (PixelType::F64.min_value(), PixelType::F64.max_value())
        );
    }
}
