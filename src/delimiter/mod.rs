use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DelimiterError {
    #[error("unbalanced delimiters in request body")]
    Unbalanced,

    #[error("body target position {0} out of range")]
    PositionOutOfRange(usize),
}

/// A DelimiterIndex finds the positions of a single delimiter byte within a
/// byte buffer. A full suffix array is overkill here since we only ever look
/// up one byte at a time.
pub struct DelimiterIndex<'a> {
    contents: &'a [u8],
}

impl<'a> DelimiterIndex<'a> {
    pub fn new(contents: &'a [u8]) -> Self {
        Self { contents }
    }

    /// Returns the offsets the delimiter appears at, in ascending order, in
    /// O(n) time.
    pub fn lookup(&self, delimiter: u8) -> Vec<usize> {
        self.contents
            .iter()
            .enumerate()
            .filter(|(_, &value)| value == delimiter)
            .map(|(offset, _)| offset)
            .collect()
    }

    /// Returns the (start, end) offsets of the marker-bounded site at
    /// `position`, inclusive of the delimiter bytes. Site k is bounded by the
    /// 2k-th and (2k+1)-th occurrence of the delimiter.
    pub fn site_range(
        &self,
        position: usize,
        delimiter: u8,
    ) -> Result<(usize, usize), DelimiterError> {
        let offsets = self.lookup(delimiter);
        if offsets.len() % 2 != 0 {
            return Err(DelimiterError::Unbalanced);
        }
        if position >= offsets.len() / 2 {
            return Err(DelimiterError::PositionOutOfRange(position));
        }
        Ok((offsets[position * 2], offsets[position * 2 + 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_correct_offsets() {
        let contents = b"The delimiter is the `backtick` character";
        let index = DelimiterIndex::new(contents);
        assert_eq!(index.lookup(b'`'), vec![21, 30]);
    }

    #[test]
    fn lookup_returns_empty_for_absent_delimiter() {
        let index = DelimiterIndex::new(b"no markers here");
        assert!(index.lookup(b'`').is_empty());
    }

    #[test]
    fn site_range_pairs_adjacent_offsets() {
        let contents = b"The delimiter is the `backtick` character";
        let index = DelimiterIndex::new(contents);
        assert_eq!(index.site_range(0, b'`').unwrap(), (21, 30));
    }

    #[test]
    fn site_range_rejects_odd_delimiter_count() {
        let index = DelimiterIndex::new(b"one `marker only");
        assert_eq!(
            index.site_range(0, b'`').unwrap_err(),
            DelimiterError::Unbalanced
        );
    }

    #[test]
    fn site_range_rejects_position_past_last_site() {
        let index = DelimiterIndex::new(b"`a` and `b`");
        assert!(index.site_range(1, b'`').is_ok());
        assert_eq!(
            index.site_range(2, b'`').unwrap_err(),
            DelimiterError::PositionOutOfRange(2)
        );
    }
}
