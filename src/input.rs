// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/input.rs - 推理输入图像
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ImageInputError {
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(image::ImageError),
}

impl From<std::io::Error> for ImageInputError {
  fn from(err: std::io::Error) -> Self {
    ImageInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageInputError {
  fn from(err: image::ImageError) -> Self {
    ImageInputError::ImageLoadError(err)
  }
}

/// 推理输入图像: 文件路径或已解码的位图
#[derive(Debug, Clone)]
pub enum ImageInput {
  Path(String),
  Bitmap(RgbImage),
}

impl ImageInput {
  /// 统一解码为 RGB 位图, 路径变体在此处解码并归一化色彩空间
  pub fn into_bitmap(self) -> Result<RgbImage, ImageInputError> {
    match self {
      ImageInput::Path(path) => {
        debug!("解码图像文件: {}", path);
        let image = ImageReader::open(&path)?.decode()?;
        Ok(image.into())
      }
      ImageInput::Bitmap(bitmap) => Ok(bitmap),
    }
  }
}

impl From<RgbImage> for ImageInput {
  fn from(bitmap: RgbImage) -> Self {
    ImageInput::Bitmap(bitmap)
  }
}

impl From<&str> for ImageInput {
  fn from(path: &str) -> Self {
    ImageInput::Path(path.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bitmap_passthrough() {
    let bitmap = RgbImage::new(4, 2);
    let out = ImageInput::Bitmap(bitmap).into_bitmap().unwrap();
    assert_eq!(out.dimensions(), (4, 2));
  }

  #[test]
  fn test_path_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.png");
    let mut bitmap = RgbImage::new(3, 5);
    bitmap.put_pixel(1, 2, image::Rgb([10, 20, 30]));
    bitmap.save(&path).unwrap();

    let out = ImageInput::Path(path.to_string_lossy().into_owned())
      .into_bitmap()
      .unwrap();
    assert_eq!(out.dimensions(), (3, 5));
    assert_eq!(out.get_pixel(1, 2), &image::Rgb([10, 20, 30]));
  }

  #[test]
  fn test_missing_path() {
    let err = ImageInput::Path("no-such-image.png".to_string())
      .into_bitmap()
      .unwrap_err();
    match err {
      ImageInputError::IoError(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
      other => panic!("unexpected error: {other:?}"),
    }
  }
}
