//! Block-mean coarsening for emitting lower-resolution copies of a dataset.
//!
//! Coarsening by 2 along both horizontal axes turns the 2x2.5 degree grid
//! (91 x 144) into the 4x5 degree grid (46 x 72). Odd axis lengths keep a
//! final partial block, which is averaged over the cells it contains.

use tracing::debug;

use crate::dataset::{Dataset, Variable};
use crate::error::DatasetResult;

/// Coarsen one axis of a row-major array by `factor`.
///
/// Each output cell is the mean of the non-NaN input cells in its block;
/// a block with no valid cells yields NaN.
///
/// # Returns
/// Tuple of (coarsened_data, new_shape)
pub fn coarsen_axis(data: &[f32], shape: &[usize], axis: usize, factor: usize) -> (Vec<f32>, Vec<usize>) {
    if factor <= 1 || axis >= shape.len() {
        return (data.to_vec(), shape.to_vec());
    }

    let outer: usize = shape[..axis].iter().product();
    let n = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    let new_n = n.div_ceil(factor);

    let mut output = vec![f32::NAN; outer * new_n * inner];

    for o in 0..outer {
        for j in 0..new_n {
            let lo = j * factor;
            let hi = ((j + 1) * factor).min(n);
            for i in 0..inner {
                let mut sum = 0.0f32;
                let mut count = 0;
                for k in lo..hi {
                    let v = data[(o * n + k) * inner + i];
                    if !v.is_nan() {
                        sum += v;
                        count += 1;
                    }
                }
                if count > 0 {
                    output[(o * new_n + j) * inner + i] = sum / count as f32;
                }
            }
        }
    }

    let mut new_shape = shape.to_vec();
    new_shape[axis] = new_n;
    (output, new_shape)
}

/// Produce a copy of `dataset` with the named horizontal dimensions
/// coarsened by `factor`.
///
/// Every variable that spans a coarsened dimension is averaged along it;
/// other variables and all attributes are copied unchanged.
pub fn coarsen_dataset(
    dataset: &Dataset,
    factor: usize,
    horizontal_dims: &[&str],
) -> DatasetResult<Dataset> {
    if factor <= 1 {
        return Ok(dataset.clone());
    }

    let mut out = Dataset::new();
    for dim in dataset.dimensions() {
        let len = if horizontal_dims.contains(&dim.name.as_str()) {
            dim.len.div_ceil(factor)
        } else {
            dim.len
        };
        out.add_dimension(dim.name.clone(), len)?;
    }
    for (name, value) in dataset.attributes() {
        out.set_attribute(name.clone(), value.clone());
    }
    out.set_attribute("coarsen_factor", factor.to_string());

    for (name, var) in dataset.variables() {
        let mut shape = dataset.shape_of(var)?;
        let mut data = var.data.clone();
        for (axis, dim) in var.dims.iter().enumerate() {
            if horizontal_dims.contains(&dim.as_str()) {
                let (coarse, coarse_shape) = coarsen_axis(&data, &shape, axis, factor);
                data = coarse;
                shape = coarse_shape;
            }
        }
        out.add_variable(
            name,
            Variable {
                dims: var.dims.clone(),
                data,
                attributes: var.attributes.clone(),
            },
        )?;
    }

    debug!(factor = factor, variables = out.variable_names().count(), "Coarsened dataset");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarsen_2d_block_mean() {
        // 4x4 grid with values 0..16
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let (rows, shape) = coarsen_axis(&data, &[4, 4], 0, 2);
        let (out, shape) = coarsen_axis(&rows, &shape, 1, 2);
        assert_eq!(shape, vec![2, 2]);
        // top-left block: 0,1,4,5
        assert_eq!(out[0], 2.5);
        // bottom-right block: 10,11,14,15
        assert_eq!(out[3], 12.5);
    }

    #[test]
    fn test_coarsen_odd_length_keeps_partial_block() {
        let (out, shape) = coarsen_axis(&[1.0, 3.0, 5.0], &[3], 0, 2);
        assert_eq!(shape, vec![2]);
        assert_eq!(out, vec![2.0, 5.0]);
    }

    #[test]
    fn test_coarsen_skips_nan() {
        let (out, _) = coarsen_axis(&[f32::NAN, 4.0, f32::NAN, f32::NAN], &[4], 0, 2);
        assert_eq!(out[0], 4.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn test_coarsen_dataset_2x25_to_4x5() {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 2).unwrap();
        ds.add_dimension("lat", 91).unwrap();
        ds.add_dimension("lon", 144).unwrap();
        ds.add_variable("TS", Variable::new(["time", "lat", "lon"], vec![290.0; 2 * 91 * 144]))
            .unwrap();
        ds.add_variable("time", Variable::new(["time"], vec![30.0, 90.0]))
            .unwrap();

        let coarse = coarsen_dataset(&ds, 2, &["lat", "lon"]).unwrap();
        assert_eq!(coarse.dimension_len("lat"), Some(46));
        assert_eq!(coarse.dimension_len("lon"), Some(72));
        assert_eq!(coarse.dimension_len("time"), Some(2));

        let ts = coarse.variable("TS").unwrap();
        assert_eq!(ts.data.len(), 2 * 46 * 72);
        assert!(ts.data.iter().all(|v| *v == 290.0));
        assert_eq!(coarse.variable("time").unwrap().data, vec![30.0, 90.0]);
        assert_eq!(coarse.attribute("coarsen_factor"), Some("2"));
    }

    #[test]
    fn test_factor_one_is_identity() {
        let mut ds = Dataset::new();
        ds.add_dimension("lat", 3).unwrap();
        ds.add_variable("x", Variable::new(["lat"], vec![1.0, 2.0, 3.0])).unwrap();
        let same = coarsen_dataset(&ds, 1, &["lat"]).unwrap();
        assert!(same.fields_equal(&ds));
    }
}
