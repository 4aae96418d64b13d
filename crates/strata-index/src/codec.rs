//! Fixed-width encoding for page-resident keys and values.

use strata_common::types::{PageId, Rid};

/// A type that can live in a fixed-width index page slot.
///
/// Encodings are little-endian and exactly [`ENCODED_LEN`] bytes, so a
/// bucket page can compute its slot layout from the type alone. The
/// on-disk bytes are consequently not portable across differently
/// laid-out encodings, which is fine: pages never leave the database
/// that wrote them.
///
/// [`ENCODED_LEN`]: Storable::ENCODED_LEN
pub trait Storable: Clone + PartialEq + Send + Sync + 'static {
    /// Exact number of bytes [`write_to`]/[`read_from`] use.
    ///
    /// [`write_to`]: Storable::write_to
    /// [`read_from`]: Storable::read_from
    const ENCODED_LEN: usize;

    /// Encodes `self` into `buf` (exactly `ENCODED_LEN` bytes).
    fn write_to(&self, buf: &mut [u8]);

    /// Decodes a value from `buf` (exactly `ENCODED_LEN` bytes).
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! storable_int {
    ($($ty:ty),*) => {
        $(
            impl Storable for $ty {
                const ENCODED_LEN: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::ENCODED_LEN].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_from(buf: &[u8]) -> Self {
                    <$ty>::from_le_bytes(buf[..Self::ENCODED_LEN].try_into().unwrap())
                }
            }
        )*
    };
}

storable_int!(u32, u64, i32, i64);

impl Storable for Rid {
    const ENCODED_LEN: usize = 8;

    #[inline]
    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id().to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot().to_le_bytes());
    }

    #[inline]
    fn read_from(buf: &[u8]) -> Self {
        let page_id = PageId::from_le_bytes(buf[0..4].try_into().unwrap());
        let slot = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        Self::new(page_id, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Storable + std::fmt::Debug>(value: T) {
        let mut buf = vec![0u8; T::ENCODED_LEN];
        value.write_to(&mut buf);
        assert_eq!(T::read_from(&buf), value);
    }

    #[test]
    fn test_int_round_trips() {
        round_trip(0u32);
        round_trip(u32::MAX);
        round_trip(u64::MAX - 1);
        round_trip(-1i32);
        round_trip(i64::MIN);
    }

    #[test]
    fn test_rid_round_trip() {
        round_trip(Rid::new(PageId::new(77), 3));
    }

    #[test]
    fn test_encoding_is_little_endian() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.write_to(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }
}
