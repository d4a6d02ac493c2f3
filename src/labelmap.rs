// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/labelmap.rs - 标签映射表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("标签文件读取错误: {0}")]
  IoError(std::io::Error),
  #[error("标签索引越界: {0}, 共 {1} 个标签")]
  IndexOutOfRange(usize, usize),
}

impl From<std::io::Error> for LabelMapError {
  fn from(err: std::io::Error) -> Self {
    LabelMapError::IoError(err)
  }
}

/// 标签映射表: 类别编号 `i` 对应第 `i` 行的标签文本。
/// 加载后不可变, 不校验标签数量与模型类别数是否一致。
#[derive(Debug, Clone)]
pub struct LabelMap {
  labels: Box<[String]>,
}

impl LabelMap {
  /// 读取按行分隔的标签文件, 逐行去除首尾空白。
  /// 空行保留为空标签, 保证编号与文件行号对齐。
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelMapError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let labels: Vec<String> = content.lines().map(|line| line.trim().to_string()).collect();
    debug!(
      "标签文件加载完成: {}, 共 {} 个标签",
      path.as_ref().display(),
      labels.len()
    );

    Ok(LabelMap {
      labels: labels.into_boxed_slice(),
    })
  }

  /// 按类别编号取标签, 越界返回错误
  pub fn get(&self, class_id: usize) -> Result<&str, LabelMapError> {
    self
      .labels
      .get(class_id)
      .map(String::as_str)
      .ok_or(LabelMapError::IndexOutOfRange(class_id, self.labels.len()))
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl From<Vec<String>> for LabelMap {
  fn from(labels: Vec<String>) -> Self {
    LabelMap {
      labels: labels.into_boxed_slice(),
    }
  }
}
