//! Span

use std::ops::Range;

/// 一つの割当に払い出された、連続したブロック列.
///
/// **注意**: スパンは [start, end) のブロックを表すため、`end`のブロックは含まれない.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    /// 先頭ブロックのインデックス.
    pub start: usize,

    /// 終端ブロックのインデックス(このブロック自体は含まない).
    pub end: usize,
}
#[allow(clippy::len_without_is_empty)]
impl Span {
    /// スパンに含まれるブロック数を返す.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// スパンに含まれるブロックのインデックス群を返す.
    pub fn blocks(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        let span = Span { start: 3, end: 7 };
        assert_eq!(span.len(), 4);
        assert_eq!(span.blocks().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
    }
}
