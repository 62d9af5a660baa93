//! In-memory frame store
//!
//! Decoded audio is held once, as one contiguous byte block cut into
//! fixed-size frames. The store never changes after it is built, so the
//! playback thread and the UI share it through an `Arc` without locking.

use crate::audio::DecodeError;

/// Immutable sequence of equally sized audio frames
#[derive(Debug, Clone)]
pub struct FrameStore {
    data: Vec<u8>,
    frame_size: usize,
    frame_count: usize,
}

impl FrameStore {
    /// Split raw decoded bytes into frames of `frame_size` bytes.
    ///
    /// A trailing chunk shorter than one frame is dropped.
    pub fn build(mut raw: Vec<u8>, frame_size: usize) -> Result<Self, DecodeError> {
        if frame_size == 0 {
            return Err(DecodeError::InvalidFrameSize(frame_size));
        }
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let frame_count = raw.len() / frame_size;
        if frame_count == 0 {
            return Err(DecodeError::ShorterThanFrame {
                len: raw.len(),
                frame_size,
            });
        }

        let dropped = raw.len() - frame_count * frame_size;
        if dropped > 0 {
            log::debug!("Dropping {} trailing bytes (partial frame)", dropped);
        }
        raw.truncate(frame_count * frame_size);
        raw.shrink_to_fit();

        Ok(Self {
            data: raw,
            frame_size,
            frame_count,
        })
    }

    /// Frame at `index`, or `None` past the end
    #[inline]
    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        if index >= self.frame_count {
            return None;
        }
        let start = index * self.frame_size;
        Some(&self.data[start..start + self.frame_size])
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.data.chunks_exact(self.frame_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_build_splits_into_frames() {
        let raw: Vec<u8> = (0..12).collect();
        let store = FrameStore::build(raw, 4).unwrap();

        assert_eq!(store.frame_count(), 3);
        assert_eq!(store.frame(0), Some(&[0, 1, 2, 3][..]));
        assert_eq!(store.frame(2), Some(&[8, 9, 10, 11][..]));
        assert_eq!(store.frame(3), None);
    }

    #[test]
    fn test_partial_trailing_frame_is_dropped() {
        let raw: Vec<u8> = (0..10).collect();
        let store = FrameStore::build(raw, 4).unwrap();

        assert_eq!(store.frame_count(), 2);
        assert_eq!(store.iter().count(), 2);
        assert_eq!(store.iter().last(), Some(&[4, 5, 6, 7][..]));
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(
            FrameStore::build(Vec::new(), 4),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_zero_frame_size_fails() {
        assert!(matches!(
            FrameStore::build(vec![1, 2, 3], 0),
            Err(DecodeError::InvalidFrameSize(0))
        ));
    }

    #[test]
    fn test_input_shorter_than_one_frame_fails() {
        assert!(matches!(
            FrameStore::build(vec![1, 2, 3], 4),
            Err(DecodeError::ShorterThanFrame {
                len: 3,
                frame_size: 4
            })
        ));
    }

    proptest! {
        /// frame_count is the truncating quotient and every frame is full size
        #[test]
        fn frame_count_is_truncating_division(
            len in 1usize..20_000,
            frame_size in 1usize..5_000,
        ) {
            let raw = vec![7u8; len];
            match FrameStore::build(raw, frame_size) {
                Ok(store) => {
                    prop_assert_eq!(store.frame_count(), len / frame_size);
                    prop_assert_eq!(store.iter().count(), store.frame_count());
                    prop_assert!(store.iter().all(|f| f.len() == frame_size));
                }
                Err(DecodeError::ShorterThanFrame { .. }) => prop_assert!(len < frame_size),
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }
    }
}
