// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::debug;

use crate::labelmap::{LabelMap, LabelMapError};

/// 解码策略: 分类模型取概率最大的单个标签, 检测模型取第一个检测框。
/// 不做置信度过滤, 也不做非极大值抑制。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
  ArgMax,
  FirstBox,
}

#[derive(Debug, Clone)]
pub struct ClassifyItem {
  pub label: String,
  pub class_id: u32,
  pub score: f32,
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub label: String,
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [y_min, x_min, y_max, x_max]
}

#[derive(Debug, Clone)]
pub enum Decoded {
  Classify(ClassifyItem),
  Detect(DetectItem),
}

impl Decoded {
  pub fn label(&self) -> &str {
    match self {
      Decoded::Classify(item) => &item.label,
      Decoded::Detect(item) => &item.label,
    }
  }
}

impl std::fmt::Display for Decoded {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Decoded::Classify(item) => write!(f, "{}", item.label),
      Decoded::Detect(item) => write!(
        f,
        "[{:.4}, {:.4}, {:.4}, {:.4}] {} {:.4}",
        item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3], item.label, item.score
      ),
    }
  }
}

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("模型输出缺少第 {0} 个输出头")]
  MissingHead(usize),
  #[error("模型输出为空")]
  EmptyOutput,
  #[error("标签错误: {0}")]
  LabelError(LabelMapError),
}

impl From<LabelMapError> for DecodeError {
  fn from(err: LabelMapError) -> Self {
    DecodeError::LabelError(err)
  }
}

/// 按解码策略把模型输出解码为标签
pub fn decode(
  policy: DecodePolicy,
  outputs: &ModelOutputs,
  labelmap: &LabelMap,
) -> Result<Decoded, DecodeError> {
  match policy {
    DecodePolicy::ArgMax => decode_argmax(outputs, labelmap),
    DecodePolicy::FirstBox => decode_first_box(outputs, labelmap),
  }
}

fn decode_argmax(outputs: &ModelOutputs, labelmap: &LabelMap) -> Result<Decoded, DecodeError> {
  let probs = outputs.head_slice(0).ok_or(DecodeError::MissingHead(0))?;
  if probs.is_empty() {
    return Err(DecodeError::EmptyOutput);
  }

  let mut class_id = 0usize;
  let mut best = f32::MIN;
  for (idx, &prob) in probs.iter().enumerate() {
    if prob > best {
      best = prob;
      class_id = idx;
    }
  }
  debug!("arg-max 解码: 类别 {}, 得分 {}", class_id, best);

  let label = labelmap.get(class_id)?.to_string();
  Ok(Decoded::Classify(ClassifyItem {
    label,
    class_id: class_id as u32,
    score: best,
  }))
}

// 检测模型输出头约定: 0 为检测框, 1 为类别, 2 为得分
fn decode_first_box(outputs: &ModelOutputs, labelmap: &LabelMap) -> Result<Decoded, DecodeError> {
  let boxes = outputs.head_slice(0).ok_or(DecodeError::MissingHead(0))?;
  let classes = outputs.head_slice(1).ok_or(DecodeError::MissingHead(1))?;
  let scores = outputs.head_slice(2).ok_or(DecodeError::MissingHead(2))?;

  if boxes.len() < 4 || classes.is_empty() || scores.is_empty() {
    return Err(DecodeError::EmptyOutput);
  }

  let class_id = classes[0] as usize;
  let label = labelmap.get(class_id)?.to_string();
  debug!("first-box 解码: 类别 {}, 得分 {}", class_id, scores[0]);

  Ok(Decoded::Detect(DetectItem {
    label,
    class_id: class_id as u32,
    score: scores[0],
    bbox: [boxes[0], boxes[1], boxes[2], boxes[3]],
  }))
}

mod interpreter;
mod registry;

pub use self::interpreter::{Interpreter, InterpreterBuilder, InterpreterError, ModelOutputs};
pub use self::registry::{
  DEFAULT_ASSETS_DIR, ModelName, ModelRegistry, RegistryError, ResolvedModel,
};
