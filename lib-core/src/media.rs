use std::path::Path;

use image::{DynamicImage, ImageError, imageops::FilterType};
use tokio::io::AsyncWriteExt;

use crate::{
    AppResult, ErrType,
    storage::{self, Storage, tmp::StagedImage},
    target::{Operation, TargetSpec},
};

/// Produces the variant described by `spec` from the staged source.
///
/// Returns the bare file name, joinable with the storage dir.
pub async fn generate(
    storage: &Storage,
    staged: &StagedImage,
    local_name: &str,
    spec: &TargetSpec,
    jpeg_quality: u8,
) -> AppResult<String> {
    let (dst, file_name) = storage.variant_path(local_name, &spec.name, &staged.extension());

    match spec.operation {
        Operation::Copy => {
            make_copy(&staged.path, &dst).await?;
        }
        Operation::Thumbnail {
            width,
            height,
        } => {
            if width == 0 || height == 0 {
                return Err(ErrType::InvalidTarget
                    .msg(format!("Thumbnail target '{}' needs a positive size, got {width}x{height}", spec.name)));
            }

            let src = staged.path.clone();
            tokio::task::spawn_blocking(move || create_thumbnail(&src, &dst, width, height, jpeg_quality))
                .await
                .map_err(|err| ErrType::MediaError.err(err, "Thumbnail task failed"))??;
        }
    }

    tracing::debug!(spec = %spec.name, file_name = %file_name, "Generated variant");

    Ok(file_name)
}

/// Byte for byte duplicate of the staged source
async fn make_copy(src: &Path, dst: &Path) -> AppResult<u64> {
    let mut src_file = tokio::fs::File::open(src)
        .await
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to open staged image {src:?}")))?;
    let mut dst_file = storage::create_file(dst).await?;

    let copied = tokio::io::copy(&mut src_file, &mut dst_file)
        .await
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to copy image to {dst:?}")))?;
    dst_file.flush().await.map_err(|err| ErrType::FsError.err(err, format!("Failed to flush {dst:?}")))?;

    Ok(copied)
}

fn create_thumbnail(src: &Path, dst: &Path, width: u32, height: u32, quality: u8) -> AppResult<(u32, u32)> {
    let format = infer_to_image_format(src)?;

    let mut rd =
        image::ImageReader::open(src).map_err(|err| ErrType::FsError.err(err, "Failed to load image from path"))?;
    rd.set_format(format);
    let img = rd.decode().map_err(|err| ErrType::MediaError.err(err, "Failed to decode image"))?;

    // fills the whole box and crops the overflow, never letterboxes
    let thumbnail = img.resize_to_fill(width, height, FilterType::CatmullRom);
    drop(img);

    // output follows the extension, sniffed format when there is none
    let out_format = image::ImageFormat::from_path(dst).unwrap_or(format);

    // encode fully before touching dst so a failure keeps the previous variant
    let mut encoded = std::io::Cursor::new(Vec::new());
    match out_format {
        image::ImageFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, quality);
            DynamicImage::ImageRgb8(thumbnail.to_rgb8()).write_with_encoder(encoder)
        }
        _ => thumbnail.write_to(&mut encoded, out_format),
    }
    .map_err(|err| encode_error(err, dst))?;

    std::fs::write(dst, encoded.into_inner())
        .map_err(|err| ErrType::FsError.err(err, format!("Failed to write thumbnail {dst:?}")))?;

    Ok((thumbnail.width(), thumbnail.height()))
}

fn encode_error(err: ImageError, dst: &Path) -> crate::AppError {
    match err {
        ImageError::IoError(err) => ErrType::FsError.err(err, format!("Failed to buffer thumbnail {dst:?}")),
        err => ErrType::MediaError.err(err, format!("Failed to encode thumbnail {dst:?}")),
    }
}

/// Detects the real format of the staged file from its magic bytes
fn infer_to_image_format(path: &Path) -> AppResult<image::ImageFormat> {
    let kind = infer::get_from_path(path)
        .map_err(|err| ErrType::FsError.err(err, "Failed to process path"))?
        .ok_or(ErrType::MediaError.msg("Could not detect file type from magic bytes"))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ErrType::MediaError.msg(format!(
            "File is not an image, detected as: {} ({})",
            kind.mime_type(),
            kind.extension()
        )));
    }

    match kind.mime_type() {
        "image/jpeg" => Ok(image::ImageFormat::Jpeg),
        "image/png" => Ok(image::ImageFormat::Png),
        "image/gif" => Ok(image::ImageFormat::Gif),
        "image/webp" => Ok(image::ImageFormat::WebP),
        "image/bmp" => Ok(image::ImageFormat::Bmp),
        "image/tiff" => Ok(image::ImageFormat::Tiff),
        "image/avif" => Ok(image::ImageFormat::Avif),
        "image/x-icon" => Ok(image::ImageFormat::Ico),
        mime => Err(ErrType::MediaError.msg(format!("Unsupported image type {} ({})", mime, kind.extension()))),
    }
}
