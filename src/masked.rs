//! The masked-array primitive (spec §9): a data buffer and a parallel
//! validity buffer threaded through the geometry and combiner code, standing
//! in for the source's `numpy.ma.MaskedArray`. All reducers here ignore
//! invalid positions and define what happens when every contributor to a
//! position is invalid (produce `NaN`, mark the output invalid).

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

/// A 2D array paired with a same-shape validity mask (`true` = valid).
#[derive(Debug, Clone)]
pub struct MaskedArray2<T> {
    pub data: Array2<T>,
    pub valid: Array2<bool>,
}

impl<T: Clone + Default> MaskedArray2<T> {
    pub fn from_valid(data: Array2<T>) -> Self {
        let valid = Array2::from_elem(data.dim(), true);
        MaskedArray2 { data, valid }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Fill invalid positions with `fill` and return the plain array, the
    /// operation the driver performs before persisting an averaged frame.
    pub fn fill(&self, fill: T) -> Array2<T> {
        Zip::from(&self.data)
            .and(&self.valid)
            .map_collect(|d, &v| if v { d.clone() } else { fill.clone() })
    }
}

/// A 3D masked stack, the `(rows, cols, scans)` cube of spec §4.6.
#[derive(Debug, Clone)]
pub struct MaskedArray3<T> {
    pub data: Array3<T>,
    pub valid: Array3<bool>,
}

impl<T: Clone> MaskedArray3<T> {
    pub fn new(data: Array3<T>, valid: Array3<bool>) -> Self {
        assert_eq!(data.dim(), valid.dim());
        MaskedArray3 { data, valid }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Truncate the scan axis (axis 2) to the first `n` slices, used after
    /// missing-frame bookkeeping compacts the cube (spec §4.6 step 3).
    pub fn truncate_scans(&self, n: usize) -> Self {
        let data = self.data.slice(ndarray::s![.., .., ..n]).to_owned();
        let valid = self.valid.slice(ndarray::s![.., .., ..n]).to_owned();
        MaskedArray3 { data, valid }
    }
}

/// Per-pixel median and MAD-based outlier mask across the scan axis (axis
/// 2), per spec §4.6 step 4. Returns the (possibly further-masked) stack
/// unchanged in shape; values where `dev > 3` have their `valid` entry
/// cleared. A pixel with `mad == 0` is treated as having zero deviation for
/// every scan (matches `iris/raw.py::mask_outliers`'s `isnan` fixup), so it
/// is never spuriously masked by a degenerate ring of identical values.
pub fn mask_outliers_by_mad(cube: &mut MaskedArray3<f64>) {
    let (h, w, s) = cube.shape();
    if s == 0 {
        return;
    }
    let mut scratch: Vec<f64> = Vec::with_capacity(s);
    let mut abs_scratch: Vec<f64> = Vec::with_capacity(s);
    for row in 0..h {
        for col in 0..w {
            scratch.clear();
            for scan in 0..s {
                if cube.valid[[row, col, scan]] {
                    scratch.push(cube.data[[row, col, scan]]);
                }
            }
            if scratch.len() < 2 {
                continue;
            }
            let med = median(&mut scratch);
            abs_scratch.clear();
            abs_scratch.extend(scratch.iter().map(|v| (v - med).abs()));
            let mad = 1.4826 * median(&mut abs_scratch);
            for scan in 0..s {
                if !cube.valid[[row, col, scan]] {
                    continue;
                }
                let absdiff = (cube.data[[row, col, scan]] - med).abs();
                let dev = if mad == 0.0 { 0.0 } else { absdiff / mad };
                if dev > 3.0 {
                    cube.valid[[row, col, scan]] = false;
                }
            }
        }
    }
}

/// In-place median of a scratch buffer (consumes ordering, not values).
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Per-scan intensity normalization + weighted mean along the scan axis
/// (spec §4.6 steps 5-6). Returns the averaged 2D masked frame: a pixel is
/// valid in the output iff at least one scan contributed a valid value.
pub fn normalize_and_weighted_mean(cube: &MaskedArray3<f64>) -> MaskedArray2<f64> {
    let (h, w, s) = cube.shape();
    if s == 0 {
        return MaskedArray2 {
            data: Array2::zeros((h, w)),
            valid: Array2::from_elem((h, w), false),
        };
    }

    // Integrated intensity per scan slice, ignoring masked pixels.
    let mut intensities = vec![0.0f32; s];
    for scan in 0..s {
        let slice: ArrayView2<f64> = cube.data.index_axis(Axis(2), scan);
        let valid_slice = cube.valid.index_axis(Axis(2), scan);
        let mut total = 0.0f32;
        Zip::from(slice).and(valid_slice).for_each(|&v, &ok| {
            if ok {
                total += v as f32;
            }
        });
        intensities[scan] = total;
    }
    let mean_intensity: f32 = intensities.iter().sum::<f32>() / s as f32;
    let weights: Vec<f64> = intensities
        .iter()
        .map(|&i| {
            let w_s = if mean_intensity == 0.0 {
                1.0
            } else {
                i / mean_intensity
            };
            if w_s == 0.0 {
                0.0
            } else {
                1.0 / w_s as f64
            }
        })
        .collect();

    let mut data = Array2::<f64>::zeros((h, w));
    let mut valid = Array2::from_elem((h, w), false);
    for row in 0..h {
        for col in 0..w {
            let mut num = 0.0;
            let mut den = 0.0;
            for scan in 0..s {
                if cube.valid[[row, col, scan]] {
                    num += weights[scan] * cube.data[[row, col, scan]];
                    den += weights[scan];
                }
            }
            if den > 0.0 {
                data[[row, col]] = num / den;
                valid[[row, col]] = true;
            }
        }
    }
    MaskedArray2 { data, valid }
}
