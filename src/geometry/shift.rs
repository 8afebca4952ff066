use ndarray::Array2;

use crate::masked::MaskedArray2;

/// Integer pixel translation by `(di, dj)`: `di` shifts rows (y), `dj` shifts
/// columns (x). The output shares shape with the input. A pixel whose
/// source position `(row - di, col - dj)` falls outside the input bounds
/// becomes invalid (masked), not wrapped or zero-filled.
///
/// If `|di| >= height` or `|dj| >= width` the entire output is invalid --
/// every source position would fall out of bounds.
pub fn shift<T: Clone + Default>(frame: &Array2<T>, di: isize, dj: isize) -> MaskedArray2<T> {
    let (height, width) = frame.dim();
    let mut data = Array2::<T>::default(frame.dim());
    let mut valid = Array2::from_elem(frame.dim(), false);

    if di.unsigned_abs() >= height || dj.unsigned_abs() >= width {
        return MaskedArray2 { data, valid };
    }

    for row in 0..height {
        let src_row = row as isize - di;
        if src_row < 0 || src_row as usize >= height {
            continue;
        }
        for col in 0..width {
            let src_col = col as isize - dj;
            if src_col < 0 || src_col as usize >= width {
                continue;
            }
            data[[row, col]] = frame[[src_row as usize, src_col as usize]].clone();
            valid[[row, col]] = true;
        }
    }

    MaskedArray2 { data, valid }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_identity() {
        let frame = Array2::<f64>::from_elem((16, 16), 3.0);
        let shifted = shift(&frame, 0, 0);
        assert!(shifted.valid.iter().all(|&v| v));
        assert_eq!(shifted.data, frame);
    }

    #[test]
    fn shift_bounds_out_of_range() {
        let frame = Array2::<f64>::ones((256, 256));
        let shifted = shift(&frame, 300, 0);
        assert!(shifted.valid.iter().all(|&v| !v));

        let shifted = shift(&frame, 0, -451);
        assert!(shifted.valid.iter().all(|&v| !v));
    }

    #[test]
    fn shift_output_format_matches_input() {
        let frame = Array2::<f64>::ones((256, 256));
        let shifted = shift(&frame, 1, 23);
        assert_eq!(shifted.data.dim(), frame.dim());
    }

    #[test]
    fn shift_moves_values_by_offset() {
        let mut frame = Array2::<i32>::zeros((8, 8));
        frame[[2, 2]] = 42;
        let shifted = shift(&frame, 1, 1);
        // src_row = row - di -> row=3,col=3 pulls from (2,2)
        assert_eq!(shifted.data[[3, 3]], 42);
        assert!(shifted.valid[[3, 3]]);
        // row 0 / col 0 have no valid source
        assert!(!shifted.valid[[0, 0]]);
    }
}
