// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/model/interpreter.rs - TFLite 解释器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tract_core::internal::format_err;
use tract_core::prelude::*;
use tract_tflite::Tflite;
use tracing::{debug, info};

use crate::input::{ImageInput, ImageInputError};

#[derive(Error, Debug)]
pub enum InterpreterError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, TractError),
  #[error("推理运行时错误: {0}")]
  RuntimeError(TractError),
  #[error("不支持的输入张量类型: {0:?}")]
  UnsupportedInputType(DatumType),
  #[error("图像输入错误: {0}")]
  ImageError(ImageInputError),
}

impl From<std::io::Error> for InterpreterError {
  fn from(err: std::io::Error) -> Self {
    InterpreterError::ModelLoadError(err)
  }
}

impl From<TractError> for InterpreterError {
  fn from(err: TractError) -> Self {
    InterpreterError::RuntimeError(err)
  }
}

impl From<ImageInputError> for InterpreterError {
  fn from(err: ImageInputError) -> Self {
    InterpreterError::ImageError(err)
  }
}

impl InterpreterError {
  pub fn invalid(msg: &str, e: TractError) -> Self {
    InterpreterError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct InterpreterBuilder {
  model_path: PathBuf,
}

impl InterpreterBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    InterpreterBuilder {
      model_path: model_path.into(),
    }
  }

  pub fn build(self) -> Result<Interpreter, InterpreterError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 TFLite 推理上下文");
    let mut reader = std::io::Cursor::new(model_data);
    let model = Tflite::default()
      .model_for_read(&mut reader)
      .map_err(|e| InterpreterError::invalid("无法解析模型文件", e))?;

    let plan = model
      .into_optimized()
      .map_err(|e| InterpreterError::invalid("无法优化模型图", e))?
      .into_runnable()
      .map_err(|e| InterpreterError::invalid("无法构建执行计划", e))?;

    // 读取第一个输入张量声明的元素类型与空间尺寸
    let input_fact = plan
      .model()
      .input_fact(0)
      .map_err(|e| InterpreterError::invalid("无法获取输入描述", e))?;
    let input_dt = input_fact.datum_type;
    let shape = input_fact.shape.as_concrete().ok_or_else(|| {
      InterpreterError::invalid("输入形状不是常量", format_err!("dynamic input shape"))
    })?;
    if shape.len() != 4 {
      return Err(InterpreterError::invalid(
        &format!("预期输入为 4 维 NHWC, 实际为 {} 维", shape.len()),
        format_err!("unexpected input rank"),
      ));
    }
    let (input_h, input_w) = (shape[1], shape[2]);
    info!("模型加载完成, 输入 {}x{} {:?}", input_w, input_h, input_dt);

    Ok(Interpreter {
      plan,
      input_dt,
      input_h,
      input_w,
    })
  }
}

/// 已加载的 TFLite 解释器, 持有执行计划与输入张量描述。
/// 由创建者独占, 推理过程中不可重入。
#[derive(Debug)]
pub struct Interpreter {
  plan: TypedRunnableModel<TypedModel>,
  input_dt: DatumType,
  input_h: usize,
  input_w: usize,
}

impl Interpreter {
  pub fn input_height(&self) -> usize {
    self.input_h
  }

  pub fn input_width(&self) -> usize {
    self.input_w
  }

  pub fn input_datum_type(&self) -> DatumType {
    self.input_dt
  }

  pub fn output_count(&self) -> usize {
    self.plan.model().outputs.len()
  }

  /// 单次推理: 把输入图像缩放归一化为输入张量, 执行一次前向计算,
  /// 返回各输出头的拷贝
  pub fn infer(&self, input: ImageInput) -> Result<ModelOutputs, InterpreterError> {
    let bitmap = input.into_bitmap()?;
    debug!("输入图像尺寸: {}x{}", bitmap.width(), bitmap.height());

    // 直接拉伸到模型声明的输入尺寸, 不保持宽高比也不加边
    let resized = image::imageops::resize(
      &bitmap,
      self.input_w as u32,
      self.input_h as u32,
      image::imageops::FilterType::Triangle,
    );

    let tensor = self.to_input_tensor(&resized)?;

    debug!("执行模型推理");
    let outputs = self.plan.run(tvec!(tensor.into()))?;
    debug!("模型输出头数量: {}", outputs.len());

    // 每个输出头转为 f32 数组并去掉 batch 维度
    let mut heads = Vec::with_capacity(outputs.len());
    for output in outputs.iter() {
      let array = output.cast_to::<f32>()?.to_array_view::<f32>()?.to_owned();
      let array = if array.ndim() > 0 {
        array.index_axis_move(tract_ndarray::Axis(0), 0)
      } else {
        array
      };
      heads.push(array);
    }

    Ok(ModelOutputs { heads })
  }

  /// 按声明的输入类型构造 NHWC 张量, 附加大小为 1 的 batch 维度。
  /// 浮点输入把像素值除以 255 归一化到 [0,1],
  /// 8 位整型输入保持原始像素值, 这是模型转换时定下的量化约定。
  fn to_input_tensor(&self, resized: &RgbImage) -> Result<Tensor, InterpreterError> {
    let tensor: Tensor = match self.input_dt.unquantized() {
      DatumType::F32 => tract_ndarray::Array4::from_shape_fn(
        (1, self.input_h, self.input_w, 3),
        |(_, y, x, c)| resized[(x as u32, y as u32)][c] as f32 / 255.0,
      )
      .into(),
      DatumType::U8 => tract_ndarray::Array4::from_shape_fn(
        (1, self.input_h, self.input_w, 3),
        |(_, y, x, c)| resized[(x as u32, y as u32)][c],
      )
      .into(),
      _ => return Err(InterpreterError::UnsupportedInputType(self.input_dt)),
    };

    // 量化模型声明的输入类型带量化参数, 这里对齐到声明类型
    if tensor.datum_type() == self.input_dt {
      Ok(tensor)
    } else {
      Ok(tensor.cast_to_dt(self.input_dt)?.into_owned())
    }
  }
}

/// 一次推理的全部输出头, 已去除 batch 维度。
/// 数值在推理返回前拷贝完成, 不受后续推理影响。
#[derive(Debug, Clone)]
pub struct ModelOutputs {
  heads: Vec<tract_ndarray::ArrayD<f32>>,
}

impl ModelOutputs {
  pub fn from_heads(heads: Vec<tract_ndarray::ArrayD<f32>>) -> Self {
    ModelOutputs { heads }
  }

  pub fn len(&self) -> usize {
    self.heads.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heads.is_empty()
  }

  pub fn head(&self, index: usize) -> Option<&tract_ndarray::ArrayD<f32>> {
    self.heads.get(index)
  }

  /// 按标准内存布局取输出头的扁平切片
  pub fn head_slice(&self, index: usize) -> Option<&[f32]> {
    self.heads.get(index).and_then(|head| head.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_model_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = InterpreterBuilder::new(dir.path().join("none.tflite"))
      .build()
      .unwrap_err();
    match err {
      InterpreterError::ModelLoadError(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn test_malformed_model_blob() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.tflite");
    std::fs::write(&path, b"not a flatbuffer").unwrap();

    let err = InterpreterBuilder::new(&path).build().unwrap_err();
    match err {
      InterpreterError::ModelInvalid(_, _) => {}
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn test_output_heads_access() {
    let head =
      tract_ndarray::ArrayD::from_shape_vec(tract_ndarray::IxDyn(&[3]), vec![0.1, 0.2, 0.7])
        .unwrap();
    let outputs = ModelOutputs::from_heads(vec![head]);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.head_slice(0).unwrap(), &[0.1, 0.2, 0.7]);
    assert!(outputs.head(1).is_none());
  }
}
