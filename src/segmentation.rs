//! ONNX segmentation engine.
//!
//! Runs a single-output segmentation model and renders, per input, the resized input, the
//! probability map, the thresholded mask and a red overlay side by side.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{imageops::FilterType, DynamicImage, RgbaImage};
use ort::session::Session;
use tracing::{info, instrument, warn};

use crate::classify::{self, InputKind};
use crate::config::EngineConfig;
use crate::engine::InferenceEngine;
use crate::utils::image_processing::{self, MaskImages};
use crate::utils::model;
use crate::{Error, Result};

pub struct SegmentationEngine {
    config: EngineConfig,
    session: Option<Session>,
}

/// One model pass over one picture.
struct Segmentation {
    resized: RgbaImage,
    masks: MaskImages,
}

impl SegmentationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Read the YAML config at `path`. The model itself is not touched until `load()`.
    pub fn from_config_path(path: &Path) -> Result<Self> {
        Ok(Self::new(EngineConfig::from_file(path)?))
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::NotLoaded)
    }

    fn segment(&self, input_img: &DynamicImage) -> Result<Segmentation> {
        let session = self.session()?;
        let size = self.config.input_size;

        let started = Instant::now();
        let resized = input_img.resize_exact(size, size, FilterType::CatmullRom);
        let input = image_processing::process_image(&resized, size);
        let prepared = Instant::now();

        let outputs =
            session.run(ort::inputs![self.config.input_name.as_str() => input.view()]?)?;
        let predictions: Vec<f32> = outputs[self.config.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();
        let inferred = Instant::now();

        let masks =
            image_processing::process_predictions(&predictions, size, self.config.threshold)
                .ok_or_else(|| {
                    Error::Inference(format!(
                        "model returned {} values, expected {size}x{size}",
                        predictions.len()
                    ))
                })?;
        let finished = Instant::now();

        info!(
            preprocess_ms = ms(prepared - started),
            inference_ms = ms(inferred - prepared),
            postprocess_ms = ms(finished - inferred),
            "segmented"
        );

        Ok(Segmentation {
            resized: resized.to_rgba8(),
            masks,
        })
    }

    fn result_path(&self, input: &Path, extension: Option<&str>) -> Result<PathBuf> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Inference(format!("{} has no file name", input.display())))?;
        let name = match extension {
            Some(ext) => {
                let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
                format!("result_{stem}.{ext}")
            }
            None => format!("result_{name}"),
        };
        Ok(self.config.output_dir.join(name))
    }
}

/// Regular files directly inside `dir` with an image extension, in sorted order.
fn folder_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file() && p.to_str().map(classify::from_extension) == Some(InputKind::Image)
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Run `infer` over every path, logging and skipping failures. Returns the failure count.
fn infer_each<F>(paths: &[PathBuf], mut infer: F) -> usize
where
    F: FnMut(&Path) -> Result<PathBuf>,
{
    let mut failed = 0;
    for path in paths {
        match infer(path) {
            Ok(output) => info!(input = %path.display(), output = %output.display(), "done"),
            Err(e) => {
                failed += 1;
                warn!(input = %path.display(), error = %e, "skipping image");
            }
        }
    }
    failed
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl InferenceEngine for SegmentationEngine {
    #[instrument(skip(self), fields(model = %self.config.model_path.display()))]
    fn load(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let started = Instant::now();
        self.session = Some(model::create_model_session(&self.config)?);
        info!(load_ms = ms(started.elapsed()), "model loaded");
        Ok(())
    }

    #[instrument(skip(self))]
    fn infer_image(&mut self, path: &Path) -> Result<PathBuf> {
        self.session()?;
        let input_img = image::open(path)?;
        let seg = self.segment(&input_img)?;

        let overlap = image_processing::create_overlap_image(&seg.resized, &seg.masks.highlight);
        let concat = image_processing::concatenate_images(&[
            &seg.resized,
            &seg.masks.probability,
            &seg.masks.binary,
            &overlap,
        ]);

        // keep the input's format when we can write it, png otherwise
        let extension = match path.to_str().map(classify::from_extension) {
            Some(InputKind::Image) => None,
            _ => Some("png"),
        };
        let output_path = self.result_path(path, extension)?;
        fs::create_dir_all(&self.config.output_dir)?;
        // jpeg cannot carry alpha
        DynamicImage::ImageRgba8(concat).to_rgb8().save(&output_path)?;

        Ok(output_path)
    }

    #[cfg(feature = "video")]
    #[instrument(skip(self))]
    fn infer_video(&mut self, path: &Path) -> Result<PathBuf> {
        self.session()?;
        let output_path = self.result_path(path, Some("mp4"))?;
        fs::create_dir_all(&self.config.output_dir)?;

        let frames = crate::video::process_video(
            path,
            &output_path,
            self.config.input_size,
            |frame| {
                let seg = self.segment(frame)?;
                Ok(image_processing::create_overlap_image(
                    &seg.resized,
                    &seg.masks.highlight,
                ))
            },
        )?;
        info!(frames, output = %output_path.display(), "video finished");

        Ok(output_path)
    }

    #[cfg(not(feature = "video"))]
    fn infer_video(&mut self, path: &Path) -> Result<PathBuf> {
        self.session()?;
        warn!(path = %path.display(), "video inference requested without video support");
        Err(Error::VideoUnsupported)
    }

    #[instrument(skip(self))]
    fn infer_folder(&mut self, dir: &Path) -> Result<()> {
        self.session()?;

        let images = folder_images(dir)?;
        let failed = infer_each(&images, |path| self.infer_image(path));

        info!(
            total = images.len(),
            failed,
            output_dir = %self.config.output_dir.display(),
            "folder finished"
        );
        Ok(())
    }
}
