use image::GrayImage;
use opencv::core::Mat;
use opencv::prelude::*;

/// Copies a grayscale image into a single-channel 8-bit `Mat`.
pub fn gray_to_mat(gray: &GrayImage) -> opencv::Result<Mat> {
    let borrowed =
        Mat::new_rows_cols_with_data(gray.height() as i32, gray.width() as i32, gray.as_raw())?;
    borrowed.try_clone()
}
