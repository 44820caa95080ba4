//! Accuracy quantization of network words.
//!
//! A value is stored as `round(value / accuracy)` with ties away from zero and
//! decoded as `word * accuracy`. A non-positive accuracy stores the raw `f32`
//! bits in the word instead.

use crate::math::Vec3;

/// Encodes `value` into one word.
#[inline]
pub fn quantize(value: f32, accuracy: f32) -> i32 {
    if accuracy <= 0.0 {
        return value.to_bits() as i32;
    }
    let scaled = value * (1.0 / accuracy);
    if scaled < 0.0 {
        (scaled - 0.5) as i32
    } else {
        (scaled + 0.5) as i32
    }
}

#[inline]
pub fn dequantize(word: i32, accuracy: f32) -> f32 {
    if accuracy <= 0.0 {
        return f32::from_bits(word as u32);
    }
    word as f32 * accuracy
}

/// The value a peer decodes after `value` went through the network.
#[inline]
pub fn quantized(value: f32, accuracy: f32) -> f32 {
    dequantize(quantize(value, accuracy), accuracy)
}

#[inline]
pub fn quantized_vec3(value: Vec3, accuracy: f32) -> Vec3 {
    value.map(|v| quantized(v, accuracy))
}

pub fn write_vec3(words: &mut [i32], value: Vec3, accuracy: f32) {
    for (word, v) in words.iter_mut().zip(value.iter()) {
        *word = quantize(*v, accuracy);
    }
}

pub fn read_vec3(words: &[i32], accuracy: f32) -> Vec3 {
    Vec3::new(
        dequantize(words[0], accuracy),
        dequantize(words[1], accuracy),
        dequantize(words[2], accuracy),
    )
}

#[inline]
pub fn write_f32(value: f32) -> i32 {
    value.to_bits() as i32
}

#[inline]
pub fn read_f32(word: i32) -> f32 {
    f32::from_bits(word as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_value_stays_within_half_accuracy() {
        for accuracy in [0.001f32, 0.01, 0.05, 0.5] {
            let mut v = -50.0f32;
            while v < 50.0 {
                let error = (quantized(v, accuracy) - v).abs();
                assert!(error <= accuracy * 0.5 + 1.0e-4, "{} at {}: {}", v, accuracy, error);
                v += 0.137;
            }
        }
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(quantize(0.5, 1.0), 1);
        assert_eq!(quantize(-0.5, 1.0), -1);
        assert_eq!(quantize(1.49, 1.0), 1);
        assert_eq!(quantize(-1.49, 1.0), -1);
    }

    #[test]
    fn zero_accuracy_keeps_raw_bits() {
        let value = 1234.5678f32;
        assert_eq!(quantized(value, 0.0), value);
        assert_eq!(dequantize(quantize(-0.1, 0.0), 0.0), -0.1);
    }

    #[test]
    fn requantizing_a_decoded_value_is_stable() {
        // history restoration compares against already-decoded values
        let accuracy = 0.001;
        for v in [12.3456f32, -0.0004, 981.2345, -77.7777] {
            let once = quantized(v, accuracy);
            assert_eq!(quantized(once, accuracy), once);
        }
    }

    #[test]
    fn vectors_use_three_words() {
        let mut words = [0i32; 3];
        write_vec3(&mut words, Vec3::new(1.0, -2.0, 3.25), 0.25);
        assert_eq!(words, [4, -8, 13]);
        assert_eq!(read_vec3(&words, 0.25), Vec3::new(1.0, -2.0, 3.25));
    }
}
