//! Image preprocessing for the convolutional encoder.
//!
//! The backbone was trained on ImageNet-normalized input:
//! - Input size: 224×224 pixels, resized without cropping
//! - Normalization: per channel, (pixel/255 - mean) / std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]
//!
//! These constants are shared with training. Changing them does not raise an
//! error; it quietly degrades every caption.

use image::DynamicImage;
use ndarray::{Array4, ArrayViewMut3, Axis};

/// Number of color channels (RGB).
pub const CHANNELS: usize = 3;

/// Side length of the square encoder input.
pub const IMAGE_SIZE: u32 = 224;

/// ImageNet per-channel mean.
pub const NORM_MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation.
pub const NORM_STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

/// Preprocess one image into a `[1, 3, 224, 224]` tensor.
///
/// Converts to RGB, resizes to exactly 224×224 with bilinear filtering,
/// scales to [0, 1], then applies per-channel normalization.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let size = IMAGE_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));
    fill_planes(image, tensor.index_axis_mut(Axis(0), 0));
    tensor
}

/// Preprocess several images and stack them along the batch axis.
pub fn preprocess_batch(images: &[DynamicImage]) -> Array4<f32> {
    let size = IMAGE_SIZE as usize;
    let mut batch = Array4::<f32>::zeros((images.len(), CHANNELS, size, size));
    for (image, planes) in images.iter().zip(batch.axis_iter_mut(Axis(0))) {
        fill_planes(image, planes);
    }
    batch
}

/// Write one normalized `[3, 224, 224]` image into `planes`.
fn fill_planes(image: &DynamicImage, mut planes: ArrayViewMut3<f32>) {
    let rgb = image::imageops::resize(
        &image.to_rgb8(),
        IMAGE_SIZE,
        IMAGE_SIZE,
        image::imageops::FilterType::Triangle,
    );

    // Walk the raw interleaved RGB bytes once and scatter into CHW planes.
    let size = IMAGE_SIZE as usize;
    for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
        let (y, x) = (i / size, i % size);
        for (c, &val) in pixel.iter().enumerate() {
            planes[[c, y, x]] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
        }
    }
}
