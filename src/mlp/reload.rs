use crate::error::ReloadError;
use crate::mlp::{HIDDEN, INPUTS, MlpWeights};
use std::io::{ErrorKind, Read};

/// A stream of 32-bit reload words.
pub trait WordSource {
    /// The next word, or `None` once the stream is exhausted.
    fn next_word(&mut self) -> Result<Option<u32>, ReloadError>;
}

impl<I> WordSource for I
where
    I: Iterator<Item = u32>,
{
    #[inline]
    fn next_word(&mut self) -> Result<Option<u32>, ReloadError> {
        Ok(self.next())
    }
}

/// Reads big-endian words from a byte stream. A trailing partial word counts as
/// the end of the stream.
pub struct BeWordReader<R: Read> {
    reader: R,
}

impl<R: Read> BeWordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> WordSource for BeWordReader<R> {
    fn next_word(&mut self) -> Result<Option<u32>, ReloadError> {
        let mut word = [0u8; 4];
        match self.reader.read_exact(&mut word) {
            Ok(()) => Ok(Some(u32::from_be_bytes(word))),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Element counts for one reload. Trusted as given; nothing checks them against
/// the tensor shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadCounts {
    pub w0_bytes: usize,
    pub b0_words: usize,
    pub w1_bytes: usize,
    pub b1_words: usize,
}

impl ReloadCounts {
    pub const FULL: ReloadCounts = ReloadCounts {
        w0_bytes: HIDDEN * INPUTS,
        b0_words: HIDDEN,
        w1_bytes: HIDDEN,
        b1_words: 1,
    };

    /// Stream words the counts describe: bytes are packed four per word.
    pub const fn total_words(&self) -> usize {
        self.w0_bytes.div_ceil(4) + self.b0_words + self.w1_bytes.div_ceil(4) + self.b1_words
    }

    /// Weight and bias elements the counts describe.
    pub const fn total_elements(&self) -> usize {
        self.w0_bytes + self.b0_words + self.w1_bytes + self.b1_words
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub words_consumed: usize,
    pub elements_loaded: usize,
    /// Store version that published the set, 0 until published.
    pub version: u64,
}

/// Packs bytes four per big-endian word, zero padding the last word.
pub fn pack_bytes_be(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

struct Counted<'a, S: WordSource + ?Sized> {
    source: &'a mut S,
    consumed: usize,
    expected: usize,
}

impl<S: WordSource + ?Sized> Counted<'_, S> {
    fn word(&mut self) -> Result<u32, ReloadError> {
        match self.source.next_word()? {
            Some(w) => {
                self.consumed += 1;
                Ok(w)
            }
            None => Err(ReloadError::WeightStreamUnderrun {
                expected: self.expected,
                consumed: self.consumed,
            }),
        }
    }

    /// Unpacks `count` bytes, handing each with its flat index to `store`.
    fn bytes(&mut self, count: usize, mut store: impl FnMut(usize, u8)) -> Result<(), ReloadError> {
        for w in 0..count.div_ceil(4) {
            let word = self.word()?.to_be_bytes();
            for (k, b) in word.into_iter().enumerate() {
                let idx = w * 4 + k;
                if idx < count {
                    store(idx, b);
                }
            }
        }
        Ok(())
    }
}

/// Consumes one reload sequence into `weights`.
///
/// On error `weights` may be partially written; callers stage into a copy and
/// publish only on success. Elements beyond the tensor capacity are consumed
/// and dropped; only the first B1 word is kept.
pub fn reload_into<S: WordSource + ?Sized>(
    weights: &mut MlpWeights,
    source: &mut S,
    counts: ReloadCounts,
) -> Result<ReloadReport, ReloadError> {
    let mut src = Counted {
        source,
        consumed: 0,
        expected: counts.total_words(),
    };

    src.bytes(counts.w0_bytes, |idx, b| {
        let (h, d) = (idx / INPUTS, idx % INPUTS);
        if h < HIDDEN {
            weights.w0[h][d] = b as i8;
        }
    })?;
    for i in 0..counts.b0_words {
        let word = src.word()?;
        if i < HIDDEN {
            weights.b0[i] = word as i32;
        }
    }
    src.bytes(counts.w1_bytes, |idx, b| {
        if idx < HIDDEN {
            weights.w1[idx] = b as i8;
        }
    })?;
    for i in 0..counts.b1_words {
        let word = src.word()?;
        if i == 0 {
            weights.b1 = word as i32;
        }
    }

    Ok(ReloadReport {
        words_consumed: src.consumed,
        elements_loaded: counts.total_elements(),
        version: 0,
    })
}
