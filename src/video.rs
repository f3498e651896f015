use image::{DynamicImage, ImageBuffer, Rgb, RgbaImage};
use opencv::core::{Mat, CV_8UC3};
use opencv::imgproc;
use opencv::{
    core,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter, CAP_ANY},
};
use std::path::Path;
use tracing::{debug, info};

use crate::{Error, Result};

const FALLBACK_FPS: f64 = 25.0;

/// OpenCV frames are BGR; the model expects RGB.
fn mat_to_imagebuffer(mat: &Mat) -> Result<DynamicImage> {
    if mat.typ() != CV_8UC3 {
        return Err(Error::Video(format!("unsupported frame type {}", mat.typ())));
    }

    let size = mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    let rgb: Vec<u8> = mat
        .data_bytes()?
        .chunks_exact(3)
        .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
        .collect();

    let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| Error::Video("frame buffer does not match its size".to_string()))?;

    Ok(DynamicImage::ImageRgb8(buffer))
}

fn imagebuffer_to_mat(img: &RgbaImage) -> Result<Mat> {
    let height = img.height();
    let bgr: Vec<u8> = img
        .pixels()
        .flat_map(|p| [p[2], p[1], p[0]])
        .collect();

    let mat = Mat::from_slice(&bgr)?;
    let mat = mat.reshape(3, height as i32)?;
    Ok(mat.try_clone()?)
}

/// Decode `input`, pass each frame (resized to `size`×`size`) through `per_frame`, and
/// encode the returned images into `output`. Returns the number of frames written.
pub fn process_video<F>(input: &Path, output: &Path, size: u32, mut per_frame: F) -> Result<usize>
where
    F: FnMut(&DynamicImage) -> Result<RgbaImage>,
{
    let input_str = input
        .to_str()
        .ok_or_else(|| Error::Video(format!("non UTF-8 path {}", input.display())))?;
    let output_str = output
        .to_str()
        .ok_or_else(|| Error::Video(format!("non UTF-8 path {}", output.display())))?;

    let mut cap = VideoCapture::from_file(input_str, CAP_ANY)?;
    if !cap.is_opened()? {
        return Err(Error::Video(format!("cannot open {}", input.display())));
    }

    let fps = match cap.get(videoio::CAP_PROP_FPS)? {
        fps if fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    };
    let side = size as i32;

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let mut writer = VideoWriter::new(output_str, fourcc, fps, core::Size::new(side, side), true)?;
    if !writer.is_opened()? {
        return Err(Error::Video(format!("cannot write {}", output.display())));
    }
    info!(fps, size, "video opened");

    let mut frames = 0usize;
    let mut frame = Mat::default();
    while cap.read(&mut frame)? {
        if frame.empty() {
            break;
        }
        let mut resized_frame = Mat::default();
        imgproc::resize(
            &frame,
            &mut resized_frame,
            core::Size::new(side, side),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let dynamic_image = mat_to_imagebuffer(&resized_frame)?;
        let rendered = per_frame(&dynamic_image)?;
        writer.write(&imagebuffer_to_mat(&rendered)?)?;

        frames += 1;
        debug!(frames, "frame written");
    }

    cap.release()?;
    writer.release()?;
    Ok(frames)
}
