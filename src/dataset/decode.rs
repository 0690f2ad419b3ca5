//! Image decoding and the axis-order-tagged sample buffer.
//!
//! Pixel buffers can be laid out channels-last (`H x W x C`, the layout a
//! decoder produces) or channels-first (`C x H x W`, the layout most
//! training transforms emit). Reading width and height from fixed axis
//! positions silently breaks for one of the two, so every [`ImageArray`]
//! carries its [`AxisOrder`] and answers `width()` / `height()` from it.

use std::path::Path;

use image::{ImageError, ImageReader, Rgb, RgbImage};
use ndarray::{Array3, Axis};

use crate::error::CanonlabelError;

/// Axis layout of an [`ImageArray`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxisOrder {
    /// `[height, width, channel]`.
    #[default]
    Hwc,
    /// `[channel, height, width]`.
    Chw,
}

impl AxisOrder {
    pub fn height_axis(self) -> usize {
        match self {
            AxisOrder::Hwc => 0,
            AxisOrder::Chw => 1,
        }
    }

    pub fn width_axis(self) -> usize {
        match self {
            AxisOrder::Hwc => 1,
            AxisOrder::Chw => 2,
        }
    }

    pub fn channel_axis(self) -> usize {
        match self {
            AxisOrder::Hwc => 2,
            AxisOrder::Chw => 0,
        }
    }
}

/// A decoded (and possibly transformed) image, intensities in `[0, 255]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageArray {
    data: Array3<f32>,
    order: AxisOrder,
}

impl ImageArray {
    pub fn new(data: Array3<f32>, order: AxisOrder) -> Self {
        Self { data, order }
    }

    /// Copies an RGB image into a channels-last array.
    pub fn from_rgb(image: &RgbImage) -> Result<Self, CanonlabelError> {
        let (width, height) = image.dimensions();
        let shape = (height as usize, width as usize, 3);
        let samples: Vec<f32> = image
            .as_raw()
            .iter()
            .take(shape.0 * shape.1 * shape.2)
            .map(|&v| f32::from(v))
            .collect();
        let data = Array3::from_shape_vec(shape, samples)
            .map_err(|err| CanonlabelError::InvalidImageArray(err.to_string()))?;
        Ok(Self::new(data, AxisOrder::Hwc))
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    pub fn order(&self) -> AxisOrder {
        self.order
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(self.order.width_axis()))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(self.order.height_axis()))
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(self.order.channel_axis()))
    }

    /// Re-lays the buffer out in `order`. A no-op when already there.
    pub fn into_order(self, order: AxisOrder) -> Self {
        if self.order == order {
            return self;
        }
        let permuted = match order {
            AxisOrder::Chw => self.data.permuted_axes([2, 0, 1]),
            AxisOrder::Hwc => self.data.permuted_axes([1, 2, 0]),
        };
        Self::new(permuted.as_standard_layout().into_owned(), order)
    }

    fn value(&self, x: usize, y: usize, c: usize) -> f32 {
        match self.order {
            AxisOrder::Hwc => self.data[[y, x, c]],
            AxisOrder::Chw => self.data[[c, y, x]],
        }
    }

    /// Converts back to an 8-bit RGB image, clamping to `[0, 255]`.
    ///
    /// Single-channel buffers are replicated across RGB.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CanonlabelError> {
        let channels = self.channels();
        if channels != 1 && channels != 3 {
            return Err(CanonlabelError::InvalidImageArray(format!(
                "expected 1 or 3 channels, found {}",
                channels
            )));
        }
        let width = u32::try_from(self.width())
            .map_err(|_| CanonlabelError::InvalidImageArray("width exceeds u32".to_string()))?;
        let height = u32::try_from(self.height())
            .map_err(|_| CanonlabelError::InvalidImageArray("height exceeds u32".to_string()))?;

        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if channels == 1 {
                let v = to_u8(self.value(x, y, 0));
                Rgb([v, v, v])
            } else {
                Rgb([
                    to_u8(self.value(x, y, 0)),
                    to_u8(self.value(x, y, 1)),
                    to_u8(self.value(x, y, 2)),
                ])
            }
        }))
    }
}

/// Decodes `path` into 3-channel RGB.
///
/// The format is sniffed from the file contents; grayscale and alpha images
/// are converted. Failures are returned as-is, never retried.
pub fn decode_image(path: &Path) -> Result<RgbImage, CanonlabelError> {
    let decode_err = |source: ImageError| CanonlabelError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| decode_err(ImageError::IoError(err)))?;
    let image = reader.decode().map_err(decode_err)?;
    Ok(image.to_rgb8())
}
