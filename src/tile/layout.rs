//! Tile storage layout and in-place layout conversion

use crate::dtype::Element;
use crate::error::{Error, Result};

/// Storage layout of the scalars inside one tile
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileLayout {
    /// Columns are contiguous; stride is the distance between columns
    #[default]
    ColMajor,
    /// Rows are contiguous; stride is the distance between rows
    RowMajor,
}

impl TileLayout {
    /// The other layout
    #[inline]
    pub fn transposed(self) -> Self {
        match self {
            Self::ColMajor => Self::RowMajor,
            Self::RowMajor => Self::ColMajor,
        }
    }

    /// Offset of stored element (r, c) for leading dimension `stride`
    #[inline(always)]
    pub fn offset(self, r: usize, c: usize, stride: usize) -> usize {
        match self {
            Self::ColMajor => r + c * stride,
            Self::RowMajor => r * stride + c,
        }
    }

    /// Extent that the stride must cover: rows for ColMajor, columns for RowMajor
    #[inline]
    pub fn leading_extent(self, mb: usize, nb: usize) -> usize {
        match self {
            Self::ColMajor => mb,
            Self::RowMajor => nb,
        }
    }

    /// Smallest legal stride for an `mb x nb` tile
    #[inline]
    pub fn min_stride(self, mb: usize, nb: usize) -> usize {
        self.leading_extent(mb, nb).max(1)
    }

    /// Number of scalars a buffer must hold for an `mb x nb` tile with `stride`
    #[inline]
    pub fn required_len(self, mb: usize, nb: usize, stride: usize) -> usize {
        if mb == 0 || nb == 0 {
            return 0;
        }
        match self {
            Self::ColMajor => stride * (nb - 1) + mb,
            Self::RowMajor => stride * (mb - 1) + nb,
        }
    }
}

/// Validate that `stride` and a buffer of `len` scalars describe an `mb x nb` tile
pub fn check_extent(
    layout: TileLayout,
    mb: usize,
    nb: usize,
    stride: usize,
    len: usize,
) -> Result<()> {
    if stride < layout.min_stride(mb, nb) {
        return Err(Error::invalid_argument(
            "stride",
            format!(
                "stride {} is smaller than the leading extent {} of a {}x{} {:?} tile",
                stride,
                layout.leading_extent(mb, nb),
                mb,
                nb,
                layout
            ),
        ));
    }
    let needed = layout.required_len(mb, nb, stride);
    if len < needed {
        return Err(Error::invalid_argument(
            "data",
            format!("buffer holds {} scalars, tile needs {}", len, needed),
        ));
    }
    Ok(())
}

/// Convert an `mb x nb` tile stored in `data` from layout `from` to `from.transposed()`.
///
/// The converted tile is packed: its stride becomes the new leading extent.
/// Returns the new stride. Square packed tiles are transposed in place;
/// other shapes go through a scratch copy.
pub fn convert_layout<T: Element>(
    data: &mut [T],
    mb: usize,
    nb: usize,
    stride: usize,
    from: TileLayout,
) -> usize {
    let to = from.transposed();
    let new_stride = to.min_stride(mb, nb);
    if mb == 0 || nb == 0 {
        return new_stride;
    }

    if mb == nb && stride == mb {
        for c in 0..nb {
            for r in (c + 1)..mb {
                data.swap(r + c * stride, c + r * stride);
            }
        }
        return new_stride;
    }

    let mut scratch = Vec::with_capacity(mb * nb);
    for c in 0..nb {
        for r in 0..mb {
            scratch.push(data[from.offset(r, c, stride)]);
        }
    }
    for c in 0..nb {
        for r in 0..mb {
            data[to.offset(r, c, new_stride)] = scratch[r + c * mb];
        }
    }
    new_stride
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_len() {
        assert_eq!(TileLayout::ColMajor.required_len(3, 2, 4), 7);
        assert_eq!(TileLayout::RowMajor.required_len(3, 2, 2), 6);
        assert_eq!(TileLayout::ColMajor.required_len(0, 5, 1), 0);
    }

    #[test]
    fn test_check_extent_rejects_short_stride() {
        assert!(check_extent(TileLayout::ColMajor, 4, 2, 3, 100).is_err());
        assert!(check_extent(TileLayout::ColMajor, 4, 2, 4, 7).is_err());
        assert!(check_extent(TileLayout::ColMajor, 4, 2, 4, 8).is_ok());
    }

    #[test]
    fn test_convert_rectangular() {
        // 2x3 column-major: [[1, 3, 5], [2, 4, 6]]
        let mut data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let stride = convert_layout(&mut data, 2, 3, 2, TileLayout::ColMajor);
        assert_eq!(stride, 3);
        assert_eq!(data, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);

        let stride = convert_layout(&mut data, 2, 3, stride, TileLayout::RowMajor);
        assert_eq!(stride, 2);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_convert_square_in_place_and_padded() {
        let mut data = vec![1.0f32, 2.0, 3.0, 4.0];
        convert_layout(&mut data, 2, 2, 2, TileLayout::ColMajor);
        assert_eq!(data, vec![1.0, 3.0, 2.0, 4.0]);

        // padded stride 3 (third row is garbage)
        let mut padded = vec![1.0f32, 2.0, -1.0, 3.0, 4.0, -1.0];
        let stride = convert_layout(&mut padded, 2, 2, 3, TileLayout::ColMajor);
        assert_eq!(stride, 2);
        assert_eq!(&padded[..4], &[1.0, 3.0, 2.0, 4.0]);
    }
}
