//! Word copy/convert engine.
//!
//! Converts runs of pixel words between any two [PixelType]s with
//! independent byte strides on both sides. Narrowing conversions clip to
//! the destination range instead of wrapping, float to integer conversion
//! truncates toward zero, real to complex sets the imaginary component to
//! zero and complex to real discards it.
//!
//! Dispatch is a tagged match over the closed `(source, destination)` type
//! matrix; every pairing monomorphizes the same generic loop, so any fast
//! path added on top must produce identical output.

use crate::components::pixel::PixelType;

/// One real component: load/store from native-endian bytes plus the
/// clipping conversion through `f64`.
trait Scalar: Copy {
    const BYTES: usize;
    fn load(bytes: &[u8]) -> Self;
    fn store(self, bytes: &mut [u8]);
    fn to_f64(self) -> f64;
    /// Clamp to the representable range, truncating fractions.
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            const BYTES: usize = std::mem::size_of::<$t>();
            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..Self::BYTES]);
                <$t>::from_ne_bytes(raw)
            }
            fn store(self, bytes: &mut [u8]) {
                bytes[..Self::BYTES].copy_from_slice(&self.to_ne_bytes());
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> Self {
                // `as` saturates on overflow and truncates toward zero.
                v as $t
            }
        }
    )*};
}

impl_scalar!(u8, i8, u16, i16, u32, i32, f32, f64);

/// A full pixel word, real or complex, expressed as an (re, im) pair of
/// `f64` for the generic conversion path. Method names differ from
/// [`Scalar`]'s so calls on the primitive types stay unambiguous.
trait Word: Copy {
    fn load_word(bytes: &[u8]) -> Self;
    fn store_word(self, bytes: &mut [u8]);
    fn into_parts(self) -> (f64, f64);
    fn from_parts(re: f64, im: f64) -> Self;
}

impl<T: Scalar> Word for T {
    fn load_word(bytes: &[u8]) -> Self {
        Scalar::load(bytes)
    }
    fn store_word(self, bytes: &mut [u8]) {
        Scalar::store(self, bytes)
    }
    fn into_parts(self) -> (f64, f64) {
        (self.to_f64(), 0.0)
    }
    fn from_parts(re: f64, _im: f64) -> Self {
        Self::from_f64(re)
    }
}

#[derive(Clone, Copy)]
struct Complex<T>(T, T);

impl<T: Scalar> Word for Complex<T> {
    fn load_word(bytes: &[u8]) -> Self {
        Complex(T::load(bytes), T::load(&bytes[T::BYTES..]))
    }
    fn store_word(self, bytes: &mut [u8]) {
        self.0.store(bytes);
        self.1.store(&mut bytes[T::BYTES..]);
    }
    fn into_parts(self) -> (f64, f64) {
        (self.0.to_f64(), self.1.to_f64())
    }
    fn from_parts(re: f64, im: f64) -> Self {
        Complex(T::from_f64(re), T::from_f64(im))
    }
}

/// The generic fallback loop every type pairing reduces to.
fn convert_loop<S: Word, D: Word>(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    count: usize,
) {
    for n in 0..count {
        let (re, im) = S::load_word(&src[n * src_stride..]).into_parts();
        D::from_parts(re, im).store_word(&mut dst[n * dst_stride..]);
    }
}

fn dispatch_to<S: Word>(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_ty: PixelType,
    dst_stride: usize,
    count: usize,
) {
    match dst_ty {
        PixelType::U8 => convert_loop::<S, u8>(src, src_stride, dst, dst_stride, count),
        PixelType::I8 => convert_loop::<S, i8>(src, src_stride, dst, dst_stride, count),
        PixelType::U16 => convert_loop::<S, u16>(src, src_stride, dst, dst_stride, count),
        PixelType::I16 => convert_loop::<S, i16>(src, src_stride, dst, dst_stride, count),
        PixelType::U32 => convert_loop::<S, u32>(src, src_stride, dst, dst_stride, count),
        PixelType::I32 => convert_loop::<S, i32>(src, src_stride, dst, dst_stride, count),
        PixelType::F32 => convert_loop::<S, f32>(src, src_stride, dst, dst_stride, count),
        PixelType::F64 => convert_loop::<S, f64>(src, src_stride, dst, dst_stride, count),
        PixelType::CI16 => convert_loop::<S, Complex<i16>>(src, src_stride, dst, dst_stride, count),
        PixelType::CI32 => convert_loop::<S, Complex<i32>>(src, src_stride, dst, dst_stride, count),
        PixelType::CF32 => convert_loop::<S, Complex<f32>>(src, src_stride, dst, dst_stride, count),
        PixelType::CF64 => convert_loop::<S, Complex<f64>>(src, src_stride, dst, dst_stride, count),
    }
}

fn dispatch(
    src: &[u8],
    src_ty: PixelType,
    src_stride: usize,
    dst: &mut [u8],
    dst_ty: PixelType,
    dst_stride: usize,
    count: usize,
) {
    match src_ty {
        PixelType::U8 => dispatch_to::<u8>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::I8 => dispatch_to::<i8>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::U16 => dispatch_to::<u16>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::I16 => dispatch_to::<i16>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::U32 => dispatch_to::<u32>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::I32 => dispatch_to::<i32>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::F32 => dispatch_to::<f32>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::F64 => dispatch_to::<f64>(src, src_stride, dst, dst_ty, dst_stride, count),
        PixelType::CI16 => {
            dispatch_to::<Complex<i16>>(src, src_stride, dst, dst_ty, dst_stride, count)
        }
        PixelType::CI32 => {
            dispatch_to::<Complex<i32>>(src, src_stride, dst, dst_ty, dst_stride, count)
        }
        PixelType::CF32 => {
            dispatch_to::<Complex<f32>>(src, src_stride, dst, dst_ty, dst_stride, count)
        }
        PixelType::CF64 => {
            dispatch_to::<Complex<f64>>(src, src_stride, dst, dst_ty, dst_stride, count)
        }
    }
}

/// Copy `count` pixel words from `src` to `dst`, converting between the
/// two encodings. Strides are in bytes. A zero `src_stride` replicates
/// word 0 of `src` across all `count` destination slots.
pub fn copy_words(
    src: &[u8],
    src_ty: PixelType,
    src_stride: usize,
    dst: &mut [u8],
    dst_ty: PixelType,
    dst_stride: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }

    if src_stride == 0 && count > 1 {
        replicate_word(src, src_ty, dst, dst_ty, dst_stride, count);
        return;
    }

    // Packed byte widenings, the most common conversions in practice.
    if src_ty == PixelType::U8 && src_stride == 1 {
        match dst_ty {
            PixelType::U16 if dst_stride == 2 => {
                for n in 0..count {
                    dst[n * 2..n * 2 + 2].copy_from_slice(&(src[n] as u16).to_ne_bytes());
                }
                return;
            }
            PixelType::F32 if dst_stride == 4 => {
                for n in 0..count {
                    dst[n * 4..n * 4 + 4].copy_from_slice(&(src[n] as f32).to_ne_bytes());
                }
                return;
            }
            _ => {}
        }
    }

    if src_ty == dst_ty {
        let size = src_ty.size_bytes();
        if src_stride == size && dst_stride == size {
            dst[..count * size].copy_from_slice(&src[..count * size]);
        } else {
            for n in 0..count {
                let s = n * src_stride;
                let d = n * dst_stride;
                dst[d..d + size].copy_from_slice(&src[s..s + size]);
            }
        }
        return;
    }

    dispatch(src, src_ty, src_stride, dst, dst_ty, dst_stride, count);
}

/// Replicate word 0 of `src` (converted once) across `count` destination
/// slots. This is the stride-0 fast path, not a general loop.
pub fn replicate_word(
    src: &[u8],
    src_ty: PixelType,
    dst: &mut [u8],
    dst_ty: PixelType,
    dst_stride: usize,
    count: usize,
) {
    // Convert the first word, then duplicate it without re-converting.
    dispatch(src, src_ty, src_ty.size_bytes(), dst, dst_ty, dst_stride, 1);

    let size = dst_ty.size_bytes();
    if dst_ty == PixelType::U8 && dst_stride == 1 {
        let v = dst[0];
        dst[1..count].fill(v);
        return;
    }
    for n in 1..count {
        let (head, tail) = dst.split_at_mut(n * dst_stride);
        tail[..size].copy_from_slice(&head[..size]);
    }
}

/// Read the real component of the word at `bytes` as `f64`.
pub(crate) fn load_f64(ty: PixelType, bytes: &[u8]) -> f64 {
    match ty {
        PixelType::U8 => u8::load(bytes).to_f64(),
        PixelType::I8 => i8::load(bytes).to_f64(),
        PixelType::U16 => u16::load(bytes).to_f64(),
        PixelType::I16 | PixelType::CI16 => i16::load(bytes).to_f64(),
        PixelType::U32 => u32::load(bytes).to_f64(),
        PixelType::I32 | PixelType::CI32 => i32::load(bytes).to_f64(),
        PixelType::F32 | PixelType::CF32 => f32::load(bytes).to_f64(),
        PixelType::F64 | PixelType::CF64 => f64::load(bytes),
    }
}

/// Store `v` into the word at `bytes`, clipping to the destination range.
/// A complex destination gets a zero imaginary component.
pub(crate) fn store_f64(ty: PixelType, bytes: &mut [u8], v: f64) {
    match ty {
        PixelType::U8 => u8::from_f64(v).store(bytes),
        PixelType::I8 => i8::from_f64(v).store(bytes),
        PixelType::U16 => u16::from_f64(v).store(bytes),
        PixelType::I16 => i16::from_f64(v).store(bytes),
        PixelType::U32 => u32::from_f64(v).store(bytes),
        PixelType::I32 => i32::from_f64(v).store(bytes),
        PixelType::F32 => f32::from_f64(v).store(bytes),
        PixelType::F64 => v.store(bytes),
        PixelType::CI16 => Complex::<i16>::from_parts(v, 0.0).store_word(bytes),
        PixelType::CI32 => Complex::<i32>::from_parts(v, 0.0).store_word(bytes),
        PixelType::CF32 => Complex::<f32>::from_parts(v, 0.0).store_word(bytes),
        PixelType::CF64 => Complex::<f64>::from_parts(v, 0.0).store_word(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn words<T: Copy>(values: &[T]) -> Vec<u8> {
        let size = std::mem::size_of::<T>();
        let mut out = vec![0u8; values.len() * size];
        for (n, v) in values.iter().enumerate() {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (v as *const T).cast::<u8>(),
                    out[n * size..].as_mut_ptr(),
                    size,
                );
            }
        }
        out
    }

    #[rstest]
    #[case::u16_clips_high_to_u8(PixelType::U16, words(&[300u16]), PixelType::U8, vec![255u8])]
    #[case::i16_clips_low_to_u8(PixelType::I16, words(&[-5i16]), PixelType::U8, vec![0u8])]
    #[case::f64_clips_to_u16(PixelType::F64, words(&[70000.0f64]), PixelType::U16, words(&[u16::MAX]))]
    #[case::f32_truncates(PixelType::F32, words(&[3.9f32]), PixelType::I32, words(&[3i32]))]
    #[case::f32_truncates_negative(PixelType::F32, words(&[-3.9f32]), PixelType::I32, words(&[-3i32]))]
    #[case::i32_clips_to_i16(PixelType::I32, words(&[1 << 20]), PixelType::I16, words(&[i16::MAX]))]
    #[case::negative_to_unsigned(PixelType::F64, words(&[-1.5f64]), PixelType::U32, words(&[0u32]))]
    fn narrowing_clips(
        #[case] src_ty: PixelType,
        #[case] src: Vec<u8>,
        #[case] dst_ty: PixelType,
        #[case] expected: Vec<u8>,
    ) {
        let mut dst = vec![0u8; expected.len()];
        copy_words(
            &src,
            src_ty,
            src_ty.size_bytes(),
            &mut dst,
            dst_ty,
            dst_ty.size_bytes(),
            1,
        );
        assert_eq!(dst, expected);
    }

    #[test]
    fn real_to_complex_and_back() {
        let src = words(&[42.5f32, -7.25]);
        let mut complex = vec![0u8; 2 * PixelType::CF64.size_bytes()];
        copy_words(&src, PixelType::F32, 4, &mut complex, PixelType::CF64, 16, 2);

        // Imaginary components are zero.
        assert_eq!(f64::load(&complex[8..]), 0.0);
        assert_eq!(f64::load(&complex[24..]), 0.0);

        let mut back = vec![0u8; 8];
        copy_words(&complex, PixelType::CF64, 16, &mut back, PixelType::F32, 4, 2);
        assert_eq!(back, src);
    }

    #[test]
    fn complex_to_real_discards_imaginary() {
        let src = words(&[3i16, 9, -2, 4]); // two CI16 words
        let mut dst = vec![0u8; 2 * 4];
        copy_words(&src, PixelType::CI16, 4, &mut dst, PixelType::I32, 4, 2);
        assert_eq!(i32::load(&dst), 3);
        assert_eq!(i32::load(&dst[4..]), -2);
    }

    #[test]
    fn complex_to_complex_keeps_both_components() {
        let src = words(&[1.5f32, -2.5]);
        let mut dst = vec![0u8; PixelType::CF64.size_bytes()];
        copy_words(&src, PixelType::CF32, 8, &mut dst, PixelType::CF64, 16, 1);
        assert_eq!(f64::load(&dst), 1.5);
        assert_eq!(f64::load(&dst[8..]), -2.5);
    }

    #[test]
    fn zero_stride_replicates_first_word() {
        let src = words(&[900u16, 3]);
        let mut dst = vec![0u8; 5];
        copy_words(&src, PixelType::U16, 0, &mut dst, PixelType::U8, 1, 5);
        assert_eq!(dst, vec![255u8; 5]);
    }

    #[test]
    fn replicate_strided_complex() {
        let src = words(&[7i32, -9]);
        let mut dst = vec![0u8; 3 * 12];
        copy_words(&src, PixelType::CI32, 0, &mut dst, PixelType::CI32, 12, 3);
        for n in 0..3 {
            assert_eq!(i32::load(&dst[n * 12..]), 7);
            assert_eq!(i32::load(&dst[n * 12 + 4..]), -9);
        }
    }

    /// The same-type memcpy path must agree with the generic loop.
    #[rstest]
    #[case(PixelType::U16, words(&[0u16, 1, 255, 256, 65535, 40000, 7, 1234]))]
    #[case(PixelType::F64, words(&[0.0f64, -1.5, 1e300, -1e-300, 42.0, 7.25, -0.0, 9.0]))]
    #[case(PixelType::CF32, words(&[0.0f32, 1.0, -2.5, 3.5, 1e30, -1e-30, 8.0, -8.0]))]
    fn fast_path_matches_generic(#[case] ty: PixelType, #[case] src: Vec<u8>) {
        let size = ty.size_bytes();
        let count = src.len() / size;
        let mut fast = vec![0u8; src.len()];
        copy_words(&src, ty, size, &mut fast, ty, size, count);

        let mut generic = vec![0u8; src.len()];
        dispatch(&src, ty, size, &mut generic, ty, size, count);
        assert_eq!(fast, generic);
    }

    #[rstest]
    #[case(PixelType::U8)]
    #[case(PixelType::I16)]
    #[case(PixelType::U32)]
    #[case(PixelType::F32)]
    #[case(PixelType::CI16)]
    #[case(PixelType::CF64)]
    fn real_component_store_then_load(#[case] ty: PixelType) {
        let mut bytes = vec![0u8; ty.size_bytes()];
        store_f64(ty, &mut bytes, 42.0);
        assert_eq!(load_f64(ty, &bytes), 42.0);
    }

    #[rstest]
    #[case(PixelType::U16)]
    #[case(PixelType::F32)]
    fn u8_widening_matches_generic(#[case] dst_ty: PixelType) {
        let src: Vec<u8> = (0..=255).collect();
        let size = dst_ty.size_bytes();
        let mut fast = vec![0u8; 256 * size];
        copy_words(&src, PixelType::U8, 1, &mut fast, dst_ty, size, 256);

        let mut generic = vec![0u8; 256 * size];
        dispatch(&src, PixelType::U8, 1, &mut generic, dst_ty, size, 256);
        assert_eq!(fast, generic);
    }

    #[test]
    fn strided_gather_scatter() {
        // Every second source word into every third destination slot.
        let src = words(&[1u8, 2, 3, 4, 5, 6]);
        let mut dst = vec![0u8; 9];
        copy_words(&src, PixelType::U8, 2, &mut dst, PixelType::U8, 3, 3);
        assert_eq!(dst, vec![1, 0, 0, 3, 0, 0, 5, 0, 0]);
    }
}
