use ndarray::Array2;
use opencv::{core::Mat, prelude::*};

use crate::error::Error;

/// Copies a single channel 8-bit image into a `Mat`
pub(crate) fn array_to_mat(image: &Array2<u8>) -> Result<Mat, Error> {
    let (rows, _) = image.dim();
    let data: Vec<u8> = image.iter().copied().collect();
    let flat = Mat::from_slice(&data)?;

    Ok(flat.reshape(1, rows as i32)?.try_clone()?)
}

/// Copies a single channel 8-bit `Mat` into an owned array
pub(crate) fn mat_to_array(mat: &Mat) -> Result<Array2<u8>, Error> {
    let (rows, cols) = (mat.rows() as usize, mat.cols() as usize);
    let owned = mat.try_clone()?;
    let data = owned.data_typed::<u8>()?.to_vec();

    Ok(Array2::from_shape_vec((rows, cols), data)?)
}
