use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgba, RgbaImage};
use ndarray::{Array, Array4};

/// Resize to `size`×`size` and lay the pixels out as a `[1, 3, size, size]` tensor in `[0, 1]`.
pub fn process_image(input_img: &DynamicImage, size: u32) -> Array4<f32> {
    let img = input_img.resize_exact(size, size, FilterType::CatmullRom);
    let side = size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = r as f32 / 255.0;
        input[[0, 1, y, x]] = g as f32 / 255.0;
        input[[0, 2, y, x]] = b as f32 / 255.0;
    }
    input
}

/// Rendered views of one probability map.
pub struct MaskImages {
    /// Grey-level probability
    pub probability: RgbaImage,
    /// White where the probability exceeds the threshold
    pub binary: RgbaImage,
    /// Red where the probability exceeds the threshold, for overlaying
    pub highlight: RgbaImage,
}

/// Row-major `size`×`size` probabilities. Returns `None` when the slice is too short.
pub fn process_predictions(predictions: &[f32], size: u32, threshold: f32) -> Option<MaskImages> {
    let side = size as usize;
    if predictions.len() < side * side {
        return None;
    }

    let mut probability = ImageBuffer::new(size, size);
    let mut binary = ImageBuffer::new(size, size);
    let mut highlight = ImageBuffer::new(size, size);

    for y in 0..size {
        for x in 0..size {
            let p = predictions[y as usize * side + x as usize].clamp(0.0, 1.0);
            let value = (p * 255.0) as u8;
            probability.put_pixel(x, y, Rgba([value, value, value, 255]));

            let hit: u8 = if p > threshold { 255 } else { 0 };
            binary.put_pixel(x, y, Rgba([hit, hit, hit, 255]));
            highlight.put_pixel(x, y, Rgba([hit, 0, 0, 255]));
        }
    }

    Some(MaskImages {
        probability,
        binary,
        highlight,
    })
}

/// Saturating per-channel sum of the input and the red highlight mask.
pub fn create_overlap_image(resized_input_img: &RgbaImage, highlight: &RgbaImage) -> RgbaImage {
    assert_eq!(resized_input_img.dimensions(), highlight.dimensions());

    let (width, height) = resized_input_img.dimensions();
    let mut overlap_image = RgbaImage::new(width, height);

    for (x, y, pixel) in overlap_image.enumerate_pixels_mut() {
        let a = resized_input_img.get_pixel(x, y);
        let b = highlight.get_pixel(x, y);
        *pixel = Rgba([
            a[0].saturating_add(b[0]),
            a[1].saturating_add(b[1]),
            a[2].saturating_add(b[2]),
            a[3].saturating_add(b[3]),
        ]);
    }

    overlap_image
}

/// Place the panels left to right. All panels are expected to share one height.
pub fn concatenate_images(panels: &[&RgbaImage]) -> RgbaImage {
    let total_width = panels.iter().map(|p| p.width()).sum();
    let height = panels.iter().map(|p| p.height()).max().unwrap_or(0);
    let mut concat_img = RgbaImage::new(total_width, height);

    let mut offset = 0i64;
    for panel in panels {
        image::imageops::overlay(&mut concat_img, *panel, offset, 0);
        offset += panel.width() as i64;
    }

    concat_img
}
