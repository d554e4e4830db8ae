use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::RowValues;

const DEFAULT_MULTIPLIER: u64 = 37;
const DEFAULT_HASHCODE: u64 = 17;

/// Composite, order-sensitive cache key.
///
/// Built from the statement id, paging bounds, SQL text, every bound parameter value and
/// the environment id. Two keys are equal only if every component is value-equal in the
/// same order; the running hash and checksum make most mismatches cheap to detect.
#[derive(Debug, Clone)]
pub struct CacheKey {
    hashcode: u64,
    checksum: u64,
    count: usize,
    update_list: Vec<RowValues>,
}

impl CacheKey {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Key made of the given components, in order.
    pub fn from_parts<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RowValues>,
    {
        let mut key = Self::new();
        for part in parts {
            key.update(part);
        }
        key
    }

    pub fn update(&mut self, part: impl Into<RowValues>) {
        let part = part.into();
        let base = value_hash(&part);
        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base);
        let weighted = base.wrapping_mul(self.count as u64);
        self.hashcode = DEFAULT_MULTIPLIER
            .wrapping_mul(self.hashcode)
            .wrapping_add(weighted);
        self.update_list.push(part);
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.count
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self
                .update_list
                .iter()
                .zip(&other.update_list)
                .all(|(a, b)| value_eq(a, b))
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for part in &self.update_list {
            match part {
                RowValues::Text(s) => write!(f, ":{s}")?,
                RowValues::Int(i) => write!(f, ":{i}")?,
                RowValues::Null => write!(f, ":null")?,
                other => write!(f, ":{other:?}")?,
            }
        }
        Ok(())
    }
}

/// Floats compare by bit pattern so a key containing NaN still equals itself.
fn value_eq(a: &RowValues, b: &RowValues) -> bool {
    match (a, b) {
        (RowValues::Float(x), RowValues::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn value_hash(value: &RowValues) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::mem::discriminant(value).hash(&mut hasher);
    match value {
        RowValues::Int(i) => i.hash(&mut hasher),
        RowValues::Float(f) => f.to_bits().hash(&mut hasher),
        RowValues::Text(s) => s.hash(&mut hasher),
        RowValues::Bool(b) => b.hash(&mut hasher),
        RowValues::Timestamp(ts) => ts.hash(&mut hasher),
        RowValues::Null => {}
        RowValues::JSON(json) => json.to_string().hash(&mut hasher),
        RowValues::Blob(bytes) => bytes.hash(&mut hasher),
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_components_make_equal_keys() {
        let a = CacheKey::from_parts([
            RowValues::from("ns.find"),
            RowValues::Int(0),
            RowValues::Float(1.5),
        ]);
        let b = CacheKey::from_parts([
            RowValues::from("ns.find"),
            RowValues::Int(0),
            RowValues::Float(1.5),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn order_matters() {
        let a = CacheKey::from_parts([1_i64, 2]);
        let b = CacheKey::from_parts([2_i64, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn null_and_missing_differ() {
        let a = CacheKey::from_parts([RowValues::from("x"), RowValues::Null]);
        let b = CacheKey::from_parts([RowValues::from("x")]);
        assert_ne!(a, b);
    }
}
