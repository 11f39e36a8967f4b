//! Six-stage deterministic preprocessing: colour frame + mask to a single
//! grayscale image suitable for circle detection.

use opencv::core::{Mat, Scalar};
use opencv::prelude::*;
use opencv::{core, imgproc, photo};

use beadscope_models::Geometry;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::geometry;

/// Noise-reduction strategy for preprocessing stage 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenoiseMode {
    Bilateral,
    Gaussian,
    Median,
}

/// Glare-suppression strategy for preprocessing stage 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlareMode {
    None,
    Cap,
    Inpaint,
}

/// Side-product quality metrics, computed over the ROI only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMetrics {
    pub laplacian_variance: f64,
    pub std_before: f64,
    pub std_after: f64,
    pub min_intensity: f64,
    pub max_intensity: f64,
    pub glare_fraction_before: f64,
    pub glare_fraction_after: f64,
}

/// Run the full six-stage pipeline, returning the processed single-channel
/// 8-bit image. Output has the same `(h, w)` shape as `frame_bgr`; pixels
/// outside the ROI mask are exactly 0.
pub fn preprocess(
    frame_bgr: &Mat,
    geom: &Geometry,
    cfg: &PipelineConfig,
    denoise: DenoiseMode,
    glare: GlareMode,
) -> PipelineResult<(Mat, QualityMetrics)> {
    let h = frame_bgr.rows();
    let w = frame_bgr.cols();

    // 1. Grayscale
    let mut gray = Mat::default();
    imgproc::cvt_color(
        frame_bgr,
        &mut gray,
        imgproc::COLOR_BGR2GRAY,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let std_before = std_dev(&gray)?;
    let glare_fraction_before = fraction_above(&gray, 245.0)?;

    // 2. ROI apply
    let mask = geometry::roi_mask(geom, h, w)?;
    if mask.rows() != h || mask.cols() != w {
        return Err(PipelineError::ShapeMismatch {
            mask_h: mask.rows(),
            mask_w: mask.cols(),
            frame_h: h,
            frame_w: w,
        });
    }
    let mut masked = Mat::default();
    opencv::core::bitwise_and(&gray, &gray, &mut masked, &mask)?;

    // 3. Illumination normalisation (top-hat)
    let ksize = cfg.tophat_ksize | 1;
    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        core::Size::new(ksize, ksize),
        core::Point::new(-1, -1),
    )?;
    let mut tophat = Mat::default();
    imgproc::morphology_ex(
        &masked,
        &mut tophat,
        imgproc::MORPH_TOPHAT,
        &kernel,
        core::Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    let mut lifted = Mat::default();
    opencv::core::add(
        &masked,
        &tophat,
        &mut lifted,
        &core::no_array(),
        -1,
    )?;

    // 4. Local contrast (CLAHE)
    let mut clahe = imgproc::create_clahe(
        cfg.clahe_clip_limit,
        core::Size::new(cfg.clahe_tile_size, cfg.clahe_tile_size),
    )?;
    let mut contrasted = Mat::default();
    clahe.apply(&lifted, &mut contrasted)?;

    // 5. Noise reduction
    let mut denoised = Mat::default();
    match denoise {
        DenoiseMode::Bilateral => {
            imgproc::bilateral_filter(
                &contrasted,
                &mut denoised,
                cfg.bilateral_d,
                cfg.bilateral_sigma_color,
                cfg.bilateral_sigma_space,
                core::BORDER_DEFAULT,
            )?;
        }
        DenoiseMode::Gaussian => {
            let k = cfg.bilateral_d | 1;
            imgproc::gaussian_blur(
                &contrasted,
                &mut denoised,
                core::Size::new(k, k),
                0.0,
                0.0,
                core::BORDER_DEFAULT,
                core::AlgorithmHint::ALGO_HINT_DEFAULT,
            )?;
        }
        DenoiseMode::Median => {
            let k = cfg.bilateral_d | 1;
            imgproc::median_blur(&contrasted, &mut denoised, k)?;
        }
    }

    // 6. Glare suppression (optional)
    let glare_suppressed = match glare {
        GlareMode::None => denoised,
        GlareMode::Cap => cap_glare(&denoised, cfg.glare_threshold, cfg.glare_replacement)?,
        GlareMode::Inpaint => inpaint_glare(&denoised, cfg.glare_threshold)?,
    };

    // Re-apply the ROI mask: top-hat/CLAHE/denoise can leak values into
    // zeroed pixels via border handling, so the 0-outside-ROI contract is
    // enforced as the final step rather than assumed from step 2 alone.
    let mut output = Mat::default();
    opencv::core::bitwise_and(&glare_suppressed, &glare_suppressed, &mut output, &mask)?;

    let std_after = std_dev(&output)?;
    let glare_fraction_after = fraction_above(&output, 245.0)?;
    let laplacian_variance = laplacian_variance(&output)?;
    let (min_intensity, max_intensity) = min_max(&output)?;

    Ok((
        output,
        QualityMetrics {
            laplacian_variance,
            std_before,
            std_after,
            min_intensity,
            max_intensity,
            glare_fraction_before,
            glare_fraction_after,
        },
    ))
}

fn cap_glare(src: &Mat, threshold: f64, replacement: f64) -> PipelineResult<Mat> {
    let mut capped = Mat::default();
    imgproc::threshold(
        src,
        &mut capped,
        threshold,
        255.0,
        imgproc::THRESH_TRUNC,
    )?;
    // THRESH_TRUNC clamps to `threshold`, not `replacement`; rescale the
    // saturated band down to the configured replacement value.
    let mut glare_mask = Mat::default();
    imgproc::threshold(src, &mut glare_mask, threshold, 255.0, imgproc::THRESH_BINARY)?;
    let mut result = Mat::default();
    capped.copy_to(&mut result)?;
    let rows = result.rows();
    let cols = result.cols();
    for y in 0..rows {
        for x in 0..cols {
            if *glare_mask.at_2d::<u8>(y, x)? > 0 {
                *result.at_2d_mut::<u8>(y, x)? = replacement as u8;
            }
        }
    }
    Ok(result)
}

fn inpaint_glare(src: &Mat, threshold: f64) -> PipelineResult<Mat> {
    let mut glare_mask = Mat::default();
    imgproc::threshold(src, &mut glare_mask, threshold, 255.0, imgproc::THRESH_BINARY)?;
    let mut dilated = Mat::default();
    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        core::Size::new(3, 3),
        core::Point::new(-1, -1),
    )?;
    imgproc::dilate(
        &glare_mask,
        &mut dilated,
        &kernel,
        core::Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    let mut result = Mat::default();
    photo::inpaint(src, &dilated, &mut result, 3.0, photo::INPAINT_TELEA)?;
    Ok(result)
}

fn std_dev(img: &Mat) -> PipelineResult<f64> {
    let mut mean = core::Scalar::default();
    let mut stddev = core::Scalar::default();
    core::mean_std_dev(img, &mut mean, &mut stddev, &core::no_array())?;
    Ok(stddev[0])
}

fn min_max(img: &Mat) -> PipelineResult<(f64, f64)> {
    let mut min_val = 0.0;
    let mut max_val = 0.0;
    core::min_max_loc(
        img,
        Some(&mut min_val),
        Some(&mut max_val),
        None,
        None,
        &core::no_array(),
    )?;
    Ok((min_val, max_val))
}

fn fraction_above(img: &Mat, threshold: f64) -> PipelineResult<f64> {
    let mut thresholded = Mat::default();
    imgproc::threshold(img, &mut thresholded, threshold, 255.0, imgproc::THRESH_BINARY)?;
    let nonzero = core::count_non_zero(&thresholded)?;
    let total = (img.rows() * img.cols()) as f64;
    if total == 0.0 {
        Ok(0.0)
    } else {
        Ok(nonzero as f64 / total)
    }
}

fn laplacian_variance(img: &Mat) -> PipelineResult<f64> {
    let mut lap = Mat::default();
    imgproc::laplacian(
        img,
        &mut lap,
        core::CV_64F,
        1,
        1.0,
        0.0,
        core::BORDER_DEFAULT,
    )?;
    let mut mean = core::Scalar::default();
    let mut stddev = core::Scalar::default();
    core::mean_std_dev(&lap, &mut mean, &mut stddev, &core::no_array())?;
    Ok(stddev[0] * stddev[0])
}

/// Convenience for tests and callers who only need an upright blank BGR
/// frame of a given size; avoids repeating the `Mat::new_*` boilerplate.
pub fn blank_bgr(h: i32, w: i32) -> PipelineResult<Mat> {
    let m = Mat::new_rows_cols_with_default(
        h,
        w,
        opencv::core::CV_8UC3,
        Scalar::new(0.0, 0.0, 0.0, 0.0),
    )?;
    Ok(m)
}
