use crate::error::{FieldEngineError, Result};
use crate::structs::*;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand_distr::weighted::WeightedIndex;
use rand_distr::Distribution;
use rand_pcg::Pcg32;
use serde::Deserialize;

/// An entry of a [`HistogramEngine`].
///
/// Each entry has a weight `prob` (only its magnitude relative to the other entries matters)
/// and produces a value when it is picked. 32-bit integers are written in network byte order,
/// runes are UTF-8 encoded.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HistogramEntry {
    /// A constant 32-bit integer
    #[serde(rename = "uint32")]
    UInt32 { v: u32, prob: u32 },
    /// A 32-bit integer drawn uniformly in [min, max]
    #[serde(rename = "uint32_range")]
    UInt32Range { min: u32, max: u32, prob: u32 },
    /// A 32-bit integer picked uniformly in a list
    #[serde(rename = "uint32_list")]
    UInt32List { list: Vec<u32>, prob: u32 },
    /// A constant rune
    #[serde(rename = "rune")]
    Rune { r: char, prob: u32 },
    /// A rune drawn uniformly in [min, max]
    #[serde(rename = "rune_range")]
    RuneRange { min: char, max: char, prob: u32 },
    /// A rune picked uniformly in a list
    #[serde(rename = "rune_list")]
    RuneList { list: Vec<char>, prob: u32 },
}

fn encode_rune(r: char) -> Vec<u8> {
    let mut buf = [0u8; 4];
    r.encode_utf8(&mut buf).as_bytes().to_vec()
}

impl HistogramEntry {
    pub fn uint32(v: u32, prob: u32) -> Self {
        HistogramEntry::UInt32 { v, prob }
    }

    pub fn uint32_range(min: u32, max: u32, prob: u32) -> Result<Self> {
        let entry = HistogramEntry::UInt32Range { min, max, prob };
        entry.validate()?;
        Ok(entry)
    }

    pub fn uint32_list(list: Vec<u32>, prob: u32) -> Result<Self> {
        let entry = HistogramEntry::UInt32List { list, prob };
        entry.validate()?;
        Ok(entry)
    }

    pub fn rune(r: char, prob: u32) -> Self {
        HistogramEntry::Rune { r, prob }
    }

    pub fn rune_range(min: char, max: char, prob: u32) -> Result<Self> {
        let entry = HistogramEntry::RuneRange { min, max, prob };
        entry.validate()?;
        Ok(entry)
    }

    pub fn rune_list(list: Vec<char>, prob: u32) -> Result<Self> {
        let entry = HistogramEntry::RuneList { list, prob };
        entry.validate()?;
        Ok(entry)
    }

    /// Weight of this entry in the histogram
    pub fn weight(&self) -> u32 {
        match self {
            HistogramEntry::UInt32 { prob, .. }
            | HistogramEntry::UInt32Range { prob, .. }
            | HistogramEntry::UInt32List { prob, .. }
            | HistogramEntry::Rune { prob, .. }
            | HistogramEntry::RuneRange { prob, .. }
            | HistogramEntry::RuneList { prob, .. } => *prob,
        }
    }

    /// Check that a value can be generated from this entry
    pub fn validate(&self) -> Result<()> {
        match self {
            HistogramEntry::UInt32Range { min, max, .. } if max < min => {
                Err(FieldEngineError::InvalidConfig(format!(
                    "Max {max} is smaller than min {min} in uint32 range entry"
                )))
            }
            HistogramEntry::RuneRange { min, max, .. } if max < min => {
                Err(FieldEngineError::InvalidConfig(format!(
                    "Max {max:?} is smaller than min {min:?} in rune range entry"
                )))
            }
            HistogramEntry::UInt32List { list, .. } if list.is_empty() => Err(
                FieldEngineError::InvalidConfig("Empty list in uint32 list entry".to_string()),
            ),
            HistogramEntry::RuneList { list, .. } if list.is_empty() => Err(
                FieldEngineError::InvalidConfig("Empty list in rune list entry".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Generate the bytes of a value of this entry
    pub fn value(&self, rng: &mut impl Rng) -> Result<Vec<u8>> {
        self.validate()?;
        let b = match self {
            HistogramEntry::UInt32 { v, .. } => v.to_be_bytes().to_vec(),
            HistogramEntry::UInt32Range { min, max, .. } => {
                rng.random_range(*min..=*max).to_be_bytes().to_vec()
            }
            HistogramEntry::UInt32List { list, .. } => list
                .choose(rng)
                .ok_or_else(|| FieldEngineError::InvalidConfig("Empty uint32 list".to_string()))?
                .to_be_bytes()
                .to_vec(),
            HistogramEntry::Rune { r, .. } => encode_rune(*r),
            HistogramEntry::RuneRange { min, max, .. } => {
                encode_rune(rng.random_range(*min..=*max))
            }
            HistogramEntry::RuneList { list, .. } => encode_rune(
                *list
                    .choose(rng)
                    .ok_or_else(|| FieldEngineError::InvalidConfig("Empty rune list".to_string()))?,
            ),
        };
        Ok(b)
    }

    /// Smallest and largest number of bytes `value` can produce
    pub fn value_width_range(&self) -> (usize, usize) {
        match self {
            HistogramEntry::UInt32 { .. }
            | HistogramEntry::UInt32Range { .. }
            | HistogramEntry::UInt32List { .. } => (4, 4),
            HistogramEntry::Rune { r, .. } => (r.len_utf8(), r.len_utf8()),
            // the UTF-8 length grows with the code point
            HistogramEntry::RuneRange { min, max, .. } => (min.len_utf8(), max.len_utf8()),
            HistogramEntry::RuneList { list, .. } => (
                list.iter().map(|r| r.len_utf8()).min().unwrap_or(0),
                list.iter().map(|r| r.len_utf8()).max().unwrap_or(0),
            ),
        }
    }
}

/// Parameters of a [`HistogramEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramEngineParams {
    /// Size of the field in bytes
    pub size: u16,
    /// Offset of the field in the packet
    pub offset: u16,
    /// Entries of the histogram. The order of the entries fixes the order of the weights
    pub entries: Vec<HistogramEntry>,
}

/// A field engine that picks one of its entries with a non-uniform distribution
/// and writes the value generated by that entry.
///
/// Only the first `size` bytes of the generated value are written.
#[derive(Debug, Clone)]
pub struct HistogramEngine {
    par: HistogramEngineParams,
    distribution: WeightedIndex<u64>,
    rng: Pcg32,
}

impl HistogramEngine {
    pub fn new(par: HistogramEngineParams, rng: Pcg32) -> Result<Self> {
        if par.size == 0 {
            return Err(FieldEngineError::InvalidConfig(
                "Histogram field size cannot be 0".to_string(),
            ));
        }
        for entry in par.entries.iter() {
            entry.validate()?;
        }
        // summed in u64 so that any vector of u32 weights is accepted
        let distribution = WeightedIndex::new(par.entries.iter().map(|e| u64::from(e.weight())))
            .map_err(|e| {
                FieldEngineError::InvalidConfig(format!("Invalid histogram weights: {e}"))
            })?;

        for (index, entry) in par.entries.iter().enumerate() {
            let (min_width, max_width) = entry.value_width_range();
            if max_width < par.size as usize {
                log::warn!(
                    "Histogram entry {index} produces at most {max_width} bytes but the field at offset {} has {} bytes",
                    par.offset,
                    par.size
                );
            } else if min_width > par.size as usize {
                log::warn!(
                    "Histogram entry {index} produces at least {min_width} bytes, values will be truncated to {} bytes",
                    par.size
                );
            }
        }
        log::debug!(
            "Histogram engine at offset {}: {} bytes, {} entries",
            par.offset,
            par.size,
            par.entries.len()
        );

        Ok(HistogramEngine {
            par,
            distribution,
            rng,
        })
    }

    pub fn params(&self) -> &HistogramEngineParams {
        &self.par
    }
}

impl FieldEngine for HistogramEngine {
    fn update(&mut self, b: &mut [u8]) -> Result<()> {
        check_len(b, self.par.size)?;
        let size = self.par.size as usize;
        let index = self.distribution.sample(&mut self.rng);
        let value = self.par.entries[index].value(&mut self.rng)?;
        if value.len() < size {
            return Err(FieldEngineError::ValueTooShort {
                want: size,
                have: value.len(),
            });
        }
        b[..size].copy_from_slice(&value[..size]);
        log::trace!("Offset {}: wrote entry {index}", self.par.offset);
        Ok(())
    }

    fn offset(&self) -> u16 {
        self.par.offset
    }

    fn size(&self) -> u16 {
        self.par.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::SeedableRng;

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(42)
    }

    fn engine(size: u16, entries: Vec<HistogramEntry>) -> Result<HistogramEngine> {
        HistogramEngine::new(
            HistogramEngineParams {
                size,
                offset: 12,
                entries,
            },
            rng(),
        )
    }

    #[test]
    fn test_fixed_entries() {
        let mut rng = rng();
        let e = HistogramEntry::uint32(0x0a0b0c0d, 1);
        assert_eq!(e.value(&mut rng).unwrap(), vec![0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(e.weight(), 1);
        let e = HistogramEntry::rune('a', 2);
        assert_eq!(e.value(&mut rng).unwrap(), b"a".to_vec());
        let e = HistogramEntry::rune('€', 3);
        assert_eq!(e.value(&mut rng).unwrap(), vec![0xe2, 0x82, 0xac]);
        assert_eq!(e.weight(), 3);
        assert_eq!(e.value_width_range(), (3, 3));
    }

    #[test]
    fn test_uint32_range_entry() {
        let mut rng = rng();
        let e = HistogramEntry::uint32_range(1000, 1010, 1).unwrap();
        for _ in 0..500 {
            let b = e.value(&mut rng).unwrap();
            assert_eq!(b.len(), 4);
            let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            assert!((1000..=1010).contains(&v));
        }
        let full = HistogramEntry::uint32_range(0, u32::MAX, 1).unwrap();
        assert_eq!(full.value(&mut rng).unwrap().len(), 4);

        assert!(HistogramEntry::uint32_range(10, 5, 1).is_err());
        // built literally, the check happens when a value is requested
        let literal = HistogramEntry::UInt32Range {
            min: 10,
            max: 5,
            prob: 1,
        };
        assert!(matches!(
            literal.value(&mut rng),
            Err(FieldEngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_uint32_list_entry() {
        let mut rng = rng();
        let list = vec![7, 300, 70000];
        let e = HistogramEntry::uint32_list(list.clone(), 1).unwrap();
        let mut seen = [false; 3];
        for _ in 0..300 {
            let b = e.value(&mut rng).unwrap();
            let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            let pos = list.iter().position(|x| *x == v).unwrap();
            seen[pos] = true;
        }
        assert!(seen.iter().all(|s| *s));

        assert!(HistogramEntry::uint32_list(vec![], 1).is_err());
        let literal = HistogramEntry::UInt32List { list: vec![], prob: 1 };
        assert!(literal.value(&mut rng).is_err());
    }

    #[test]
    fn test_rune_entries() {
        let mut rng = rng();
        let e = HistogramEntry::rune_range('a', 'f', 1).unwrap();
        for _ in 0..100 {
            let b = e.value(&mut rng).unwrap();
            let s = std::str::from_utf8(&b).unwrap();
            let c = s.chars().next().unwrap();
            assert!(('a'..='f').contains(&c));
        }
        assert!(HistogramEntry::rune_range('z', 'a', 1).is_err());

        let e = HistogramEntry::rune_list(vec!['x', 'é', '語'], 1).unwrap();
        assert_eq!(e.value_width_range(), (1, 3));
        for _ in 0..100 {
            let b = e.value(&mut rng).unwrap();
            let s = String::from_utf8(b).unwrap();
            assert!(["x", "é", "語"].contains(&s.as_str()));
        }
        assert!(HistogramEntry::rune_list(vec![], 1).is_err());
    }

    #[test]
    fn test_histogram_writes_entry_value() {
        let mut e = engine(4, vec![HistogramEntry::uint32(0xdeadbeef, 5)]).unwrap();
        assert_eq!(e.params().entries, vec![HistogramEntry::uint32(0xdeadbeef, 5)]);
        assert_eq!(e.offset(), 12);
        assert_eq!(e.size(), 4);
        let mut buf = [0u8; 6];
        e.update(&mut buf).unwrap();
        assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef, 0, 0]);
    }

    #[test]
    fn test_histogram_truncates() {
        let mut e = engine(2, vec![HistogramEntry::uint32(0x01020304, 1)]).unwrap();
        let mut buf = [0u8; 4];
        e.update(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 0, 0]);
    }

    #[test]
    fn test_histogram_size_errors() {
        let mut e = engine(4, vec![HistogramEntry::uint32(1, 1)]).unwrap();
        let mut short = [0u8; 3];
        assert!(matches!(
            e.update(&mut short),
            Err(FieldEngineError::BufferTooShort { want: 4, have: 3 })
        ));

        let mut e = engine(2, vec![HistogramEntry::rune('a', 1)]).unwrap();
        let mut buf = [0u8; 2];
        let err = e.update(&mut buf).unwrap_err();
        assert!(matches!(err, FieldEngineError::ValueTooShort { want: 2, have: 1 }));
        assert!(err.is_size_error());
    }

    #[test]
    fn test_histogram_invalid_config() {
        assert!(engine(4, vec![]).is_err());
        assert!(engine(
            4,
            vec![HistogramEntry::uint32(1, 0), HistogramEntry::uint32(2, 0)]
        )
        .is_err());
        assert!(engine(
            4,
            vec![
                HistogramEntry::uint32(1, 1),
                HistogramEntry::UInt32List { list: vec![], prob: 1 }
            ]
        )
        .is_err());
        assert!(engine(0, vec![HistogramEntry::uint32(1, 1)]).is_err());
    }

    #[test]
    fn test_histogram_frequencies() {
        let weights = [1u32, 2, 7, 0];
        let entries = weights
            .iter()
            .enumerate()
            .map(|(i, w)| HistogramEntry::uint32(i as u32, *w))
            .collect();
        let mut e = engine(4, entries).unwrap();
        let trials = 100_000;
        let mut counts = [0usize; 4];
        let mut buf = [0u8; 4];
        for _ in 0..trials {
            e.update(&mut buf).unwrap();
            counts[u32::from_be_bytes(buf) as usize] += 1;
        }
        let total: u32 = weights.iter().sum();
        for (count, w) in counts.iter().zip(weights.iter()) {
            let expected = *w as f64 / total as f64;
            let observed = *count as f64 / trials as f64;
            assert!(
                (expected - observed).abs() < 0.01,
                "expected {expected}, observed {observed}"
            );
        }
        assert_eq!(counts[3], 0);
    }

    #[test]
    fn test_histogram_large_weights() {
        let mut e = engine(
            4,
            vec![
                HistogramEntry::uint32(1, 3_000_000_000),
                HistogramEntry::uint32(2, 3_000_000_000),
            ],
        )
        .unwrap();
        let mut counts = [0usize; 2];
        let mut buf = [0u8; 4];
        for _ in 0..10_000 {
            e.update(&mut buf).unwrap();
            counts[u32::from_be_bytes(buf) as usize - 1] += 1;
        }
        assert!(counts.iter().all(|c| (4500..=5500).contains(c)));

        let max_weights = vec![HistogramEntry::uint32(1, u32::MAX); 3];
        assert!(engine(4, max_weights).is_ok());
    }

    #[test]
    fn test_rune_range_skips_surrogates() {
        let mut rng = rng();
        let e = HistogramEntry::rune_range('\u{D7FF}', '\u{E000}', 1).unwrap();
        assert_eq!(e.value_width_range(), (3, 3));
        let mut seen = [false; 2];
        for _ in 0..200 {
            let b = e.value(&mut rng).unwrap();
            let s = std::str::from_utf8(&b).unwrap();
            let mut chars = s.chars();
            let c = chars.next().unwrap();
            assert!(chars.next().is_none());
            match c {
                '\u{D7FF}' => seen[0] = true,
                '\u{E000}' => seen[1] = true,
                _ => panic!("unexpected code point {:X}", c as u32),
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_four_byte_runes() {
        let mut rng = rng();
        let e = HistogramEntry::rune('😀', 1);
        assert_eq!(e.value(&mut rng).unwrap(), vec![0xf0, 0x9f, 0x98, 0x80]);
        assert_eq!(e.value_width_range(), (4, 4));

        let e = HistogramEntry::rune_range('a', '😀', 1).unwrap();
        assert_eq!(e.value_width_range(), (1, 4));
        let e = HistogramEntry::rune_list(vec!['a', '😀'], 1).unwrap();
        assert_eq!(e.value_width_range(), (1, 4));

        let mut e = engine(4, vec![HistogramEntry::rune('😀', 1)]).unwrap();
        let mut buf = [0u8; 5];
        e.update(&mut buf).unwrap();
        assert_eq!(buf, [0xf0, 0x9f, 0x98, 0x80, 0]);
        assert_eq!(std::str::from_utf8(&buf[..4]).unwrap(), "😀");
    }
}
