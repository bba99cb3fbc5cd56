//! Plain (untranslated) command parameters.
//!
//! Every parameter occupies whole words. Values narrower than 32 bits are zero- or sign-extended
//! into one word, 64-bit values take two words with the low word first.

use ctr_kernel::result::ResultCode;

/// A value that can be read from and written to the normal-parameter region.
pub trait CommandParam: Sized {
    /// Number of command buffer words the value occupies.
    const WORDS: usize;

    /// Reads the value from the first [`Self::WORDS`] words of `words`.
    fn read_words(words: &[u32]) -> Self;

    /// Writes the value into the first [`Self::WORDS`] words of `words`.
    fn write_words(self, words: &mut [u32]);
}

macro_rules! impl_single_word_param {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CommandParam for $ty {
                const WORDS: usize = 1;

                #[inline]
                fn read_words(words: &[u32]) -> Self {
                    words[0] as $ty
                }

                #[inline]
                fn write_words(self, words: &mut [u32]) {
                    words[0] = self as u32;
                }
            }
        )*
    };
}

impl_single_word_param!(u8, u16, u32, i32);

// Signed narrow values are sign-extended on write so the word reads back the same through `i32`.
macro_rules! impl_signed_narrow_param {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CommandParam for $ty {
                const WORDS: usize = 1;

                #[inline]
                fn read_words(words: &[u32]) -> Self {
                    words[0] as i32 as $ty
                }

                #[inline]
                fn write_words(self, words: &mut [u32]) {
                    words[0] = self as i32 as u32;
                }
            }
        )*
    };
}

impl_signed_narrow_param!(i8, i16);

impl CommandParam for u64 {
    const WORDS: usize = 2;

    #[inline]
    fn read_words(words: &[u32]) -> Self {
        (words[0] as u64) | ((words[1] as u64) << 32)
    }

    #[inline]
    fn write_words(self, words: &mut [u32]) {
        words[0] = self as u32;
        words[1] = (self >> 32) as u32;
    }
}

impl CommandParam for i64 {
    const WORDS: usize = 2;

    #[inline]
    fn read_words(words: &[u32]) -> Self {
        u64::read_words(words) as i64
    }

    #[inline]
    fn write_words(self, words: &mut [u32]) {
        (self as u64).write_words(words);
    }
}

impl CommandParam for bool {
    const WORDS: usize = 1;

    /// Any non-zero low byte is `true`.
    #[inline]
    fn read_words(words: &[u32]) -> Self {
        words[0] as u8 != 0
    }

    #[inline]
    fn write_words(self, words: &mut [u32]) {
        words[0] = self as u32;
    }
}

impl CommandParam for f32 {
    const WORDS: usize = 1;

    #[inline]
    fn read_words(words: &[u32]) -> Self {
        f32::from_bits(words[0])
    }

    #[inline]
    fn write_words(self, words: &mut [u32]) {
        words[0] = self.to_bits();
    }
}

impl CommandParam for ResultCode {
    const WORDS: usize = 1;

    #[inline]
    fn read_words(words: &[u32]) -> Self {
        ResultCode::from_raw(words[0])
    }

    #[inline]
    fn write_words(self, words: &mut [u32]) {
        words[0] = self.to_raw();
    }
}
