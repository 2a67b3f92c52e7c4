//! Fixed-width record codec and derived sort key.

use std::cmp::Ordering;
use std::fmt;

/// A fixed-width record of five signed 32-bit fields.
///
/// The sort key `g = 10·a·(x² + 3·c³·z⁴ − 5·y⁷)` is derived from the stored
/// fields when a record is constructed or decoded and is never persisted.
/// Equality and ordering consider the derived key only: records with equal
/// keys compare as equal regardless of field differences.
#[derive(Clone, Copy, Debug)]
pub struct Record {
    pub a: i32,
    pub y: i32,
    pub c: i32,
    pub z: i32,
    pub x: i32,

    key: f64,
}

impl Record {
    /// Encoded size in bytes: five big-endian `i32` fields.
    pub const ENCODED_SIZE: usize = 20;

    /// Creates a record and computes its derived key.
    pub fn new(a: i32, y: i32, c: i32, z: i32, x: i32) -> Self {
        Record {
            a,
            y,
            c,
            z,
            x,
            key: derive_key(a, y, c, z, x),
        }
    }

    /// Returns the derived sort key.
    pub fn key(&self) -> f64 {
        self.key
    }

    /// Encodes the record to its on-tape representation.
    ///
    /// Layout: a (4) || y (4) || c (4) || z (4) || x (4), all big-endian.
    pub fn encode(&self) -> [u8; Self::ENCODED_SIZE] {
        let mut out = [0u8; Self::ENCODED_SIZE];
        out[0..4].copy_from_slice(&self.a.to_be_bytes());
        out[4..8].copy_from_slice(&self.y.to_be_bytes());
        out[8..12].copy_from_slice(&self.c.to_be_bytes());
        out[12..16].copy_from_slice(&self.z.to_be_bytes());
        out[16..20].copy_from_slice(&self.x.to_be_bytes());
        out
    }

    /// Decodes a record from the front of `bytes`, recomputing the key.
    ///
    /// Returns [`None`] when fewer than [`Record::ENCODED_SIZE`] bytes are
    /// available. A trailing partial record is indistinguishable from
    /// end-of-data, so this is the end-of-stream signal, not an error.
    pub fn decode(bytes: &[u8]) -> Option<Record> {
        if bytes.len() < Self::ENCODED_SIZE {
            return None;
        }

        let mut fields = [0i32; 5];
        for (i, field) in fields.iter_mut().enumerate() {
            let start = i * 4;
            *field = i32::from_be_bytes(bytes[start..start + 4].try_into().ok()?);
        }

        let [a, y, c, z, x] = fields;
        Some(Record::new(a, y, c, z, x))
    }
}

fn derive_key(a: i32, y: i32, c: i32, z: i32, x: i32) -> f64 {
    let x2 = f64::from(x).powi(2);
    let c3 = f64::from(c).powi(3);
    let z4 = f64::from(z).powi(4);
    let y7 = f64::from(y).powi(7);

    10.0 * f64::from(a) * (x2 + 3.0 * c3 * z4 - 5.0 * y7)
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.total_cmp(&other.key)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a={} y={} c={} z={} x={} | g={:.2}",
            self.a, self.y, self.c, self.z, self.x, self.key
        )
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::Record;

    #[rstest]
    #[case(1, 1, 1, 1, 1, -10.0)]
    #[case(1, 1, 1, 1, 2, 20.0)]
    #[case(1, 1, 1, 1, 5, 230.0)]
    #[case(2, 1, 1, 1, 2, 40.0)]
    #[case(1, 2, 1, 1, 1, -6360.0)]
    #[case(0, 3, 4, 5, 6, 0.0)]
    fn test_derived_key(
        #[case] a: i32,
        #[case] y: i32,
        #[case] c: i32,
        #[case] z: i32,
        #[case] x: i32,
        #[case] expected: f64,
    ) {
        let record = Record::new(a, y, c, z, x);
        assert_eq!(record.key(), expected);
    }

    #[test]
    fn test_round_trip() {
        let record = Record::new(-7, 3, 0, -2, 1_000_000);

        let decoded = Record::decode(&record.encode()).unwrap();

        assert_eq!(decoded.a, record.a);
        assert_eq!(decoded.y, record.y);
        assert_eq!(decoded.c, record.c);
        assert_eq!(decoded.z, record.z);
        assert_eq!(decoded.x, record.x);
        assert_eq!(decoded.key().to_bits(), record.key().to_bits());
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(19)]
    fn test_decode_short_input(#[case] len: usize) {
        let bytes = vec![0u8; len];
        assert!(Record::decode(&bytes).is_none());
    }

    #[test]
    fn test_ordering_by_key_only() {
        let small = Record::new(1, 1, 1, 1, 1);
        let large = Record::new(1, 1, 1, 1, 5);
        assert!(small < large);

        // x enters the key squared, so negating it leaves the key unchanged
        // while the stored fields differ.
        let tie_a = Record::new(1, 1, 1, 1, 2);
        let tie_b = Record::new(1, 1, 1, 1, -2);
        assert_ne!(tie_a.x, tie_b.x);
        assert_eq!(tie_a, tie_b);
    }
}
