// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/model/registry.rs - 模型注册表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

use crate::labelmap::{LabelMap, LabelMapError};
use crate::model::DecodePolicy;
use crate::model::interpreter::{Interpreter, InterpreterBuilder, InterpreterError};

pub const DEFAULT_ASSETS_DIR: &str = "assets/models";

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("未知模型名: {0}")]
  UnknownModel(String),
  #[error("资产文件不存在: {0}")]
  AssetNotFound(PathBuf),
  #[error("标签错误: {0}")]
  LabelMapError(LabelMapError),
  #[error("解释器错误: {0}")]
  InterpreterError(InterpreterError),
}

impl From<LabelMapError> for RegistryError {
  fn from(err: LabelMapError) -> Self {
    RegistryError::LabelMapError(err)
  }
}

impl From<InterpreterError> for RegistryError {
  fn from(err: InterpreterError) -> Self {
    RegistryError::InterpreterError(err)
  }
}

/// 已知模型的封闭枚举, 每个名字对应固定的资产文件与解码策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelName {
  /// ImageNet 分类器 (第一组测试模型)
  MobilenetV3,
  /// COCO 目标检测器 (第一组测试模型)
  EfficientDet,
  /// 一级作物分类器, 结果标签选择二级模型
  Auto,
  Beans,
  Cassava,
  Maize,
  Tomato,
}

impl ModelName {
  pub const ALL: [ModelName; 7] = [
    ModelName::MobilenetV3,
    ModelName::EfficientDet,
    ModelName::Auto,
    ModelName::Beans,
    ModelName::Cassava,
    ModelName::Maize,
    ModelName::Tomato,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ModelName::MobilenetV3 => "mobilenetv3",
      ModelName::EfficientDet => "efficientdet",
      ModelName::Auto => "auto",
      ModelName::Beans => "beans",
      ModelName::Cassava => "cassava",
      ModelName::Maize => "maize",
      ModelName::Tomato => "tomato",
    }
  }

  pub fn decode_policy(&self) -> DecodePolicy {
    match self {
      ModelName::EfficientDet => DecodePolicy::FirstBox,
      _ => DecodePolicy::ArgMax,
    }
  }

  /// 模型文件名: 第一组模型使用固定文件名, 其余遵循 -f16 后缀约定
  pub fn model_file(&self) -> String {
    match self {
      ModelName::MobilenetV3 | ModelName::EfficientDet => format!("{}.tflite", self.as_str()),
      _ => format!("{}-f16.tflite", self.as_str()),
    }
  }

  pub fn labelmap_file(&self) -> String {
    format!("{}-labelmap.txt", self.as_str())
  }
}

impl std::fmt::Display for ModelName {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for ModelName {
  type Err = RegistryError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    ModelName::ALL
      .iter()
      .find(|name| name.as_str() == lower)
      .copied()
      .ok_or_else(|| RegistryError::UnknownModel(s.to_string()))
  }
}

/// 解析完成的模型: 解释器与同名标签映射
pub struct ResolvedModel {
  pub name: ModelName,
  pub interpreter: Interpreter,
  pub labelmap: LabelMap,
}

/// 模型注册表: 在固定资产目录下把模型名解析为 (解释器, 标签映射)
pub struct ModelRegistry {
  assets_dir: PathBuf,
}

impl ModelRegistry {
  pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
    ModelRegistry {
      assets_dir: assets_dir.into(),
    }
  }

  pub fn assets_dir(&self) -> &Path {
    &self.assets_dir
  }

  pub fn model_path(&self, name: ModelName) -> PathBuf {
    self.assets_dir.join(name.model_file())
  }

  pub fn labelmap_path(&self, name: ModelName) -> PathBuf {
    self.assets_dir.join(name.labelmap_file())
  }

  /// 解析模型名: 任一资产缺失立即失败, 不进入模型加载
  pub fn resolve(&self, name: ModelName) -> Result<ResolvedModel, RegistryError> {
    let labelmap_path = self.labelmap_path(name);
    let model_path = self.model_path(name);

    if !labelmap_path.is_file() {
      return Err(RegistryError::AssetNotFound(labelmap_path));
    }
    if !model_path.is_file() {
      return Err(RegistryError::AssetNotFound(model_path));
    }

    let labelmap = LabelMap::from_file(&labelmap_path)?;
    debug!("模型 {} 的标签数量: {}", name, labelmap.len());

    let interpreter = InterpreterBuilder::new(&model_path).build()?;
    info!("模型 {} 解析完成", name);

    Ok(ResolvedModel {
      name,
      interpreter,
      labelmap,
    })
  }

  /// 校验一级标签词表与资产目录的对应关系, 返回没有可用资产对的标签。
  /// 词表与目录内容的耦合是隐式的, 只在这里暴露出来。
  pub fn unusable_labels(&self, labelmap: &LabelMap) -> Vec<String> {
    labelmap
      .iter()
      .filter(|label| !label.is_empty())
      .filter(|label| match label.parse::<ModelName>() {
        Ok(name) => !self.labelmap_path(name).is_file() || !self.model_path(name).is_file(),
        Err(_) => true,
      })
      .map(str::to_string)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_name_round_trip() {
    for name in ModelName::ALL {
      assert_eq!(name.as_str().parse::<ModelName>().unwrap(), name);
    }
  }

  #[test]
  fn test_name_parse_is_case_insensitive() {
    assert_eq!(" Auto ".parse::<ModelName>().unwrap(), ModelName::Auto);
    assert_eq!(
      "MOBILENETV3".parse::<ModelName>().unwrap(),
      ModelName::MobilenetV3
    );
  }

  #[test]
  fn test_unknown_name() {
    match "nonexistent-model".parse::<ModelName>() {
      Err(RegistryError::UnknownModel(name)) => assert_eq!(name, "nonexistent-model"),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn test_asset_file_conventions() {
    assert_eq!(ModelName::MobilenetV3.model_file(), "mobilenetv3.tflite");
    assert_eq!(ModelName::EfficientDet.model_file(), "efficientdet.tflite");
    assert_eq!(ModelName::Tomato.model_file(), "tomato-f16.tflite");
    assert_eq!(ModelName::Auto.model_file(), "auto-f16.tflite");
    assert_eq!(ModelName::Auto.labelmap_file(), "auto-labelmap.txt");
  }

  #[test]
  fn test_decode_policies() {
    assert_eq!(ModelName::EfficientDet.decode_policy(), DecodePolicy::FirstBox);
    assert_eq!(ModelName::MobilenetV3.decode_policy(), DecodePolicy::ArgMax);
    assert_eq!(ModelName::Beans.decode_policy(), DecodePolicy::ArgMax);
  }

  #[test]
  fn test_resolve_fails_before_any_load() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let Err(err) = registry.resolve(ModelName::Maize) else {
      panic!("expected AssetNotFound");
    };
    match err {
      RegistryError::AssetNotFound(path) => assert!(path.ends_with("maize-labelmap.txt")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn test_resolve_reports_missing_model_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("maize-labelmap.txt"), "healthy\n").unwrap();

    let registry = ModelRegistry::new(dir.path());
    let Err(err) = registry.resolve(ModelName::Maize) else {
      panic!("expected AssetNotFound");
    };
    match err {
      RegistryError::AssetNotFound(path) => assert!(path.ends_with("maize-f16.tflite")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn test_unusable_labels() {
    let dir = tempfile::tempdir().unwrap();
    // maize 资产齐全, beans 缺模型文件, blight 不是已知模型名
    std::fs::write(dir.path().join("maize-labelmap.txt"), "healthy\n").unwrap();
    std::fs::write(dir.path().join("maize-f16.tflite"), b"").unwrap();
    std::fs::write(dir.path().join("beans-labelmap.txt"), "healthy\n").unwrap();

    let registry = ModelRegistry::new(dir.path());
    let vocabulary = LabelMap::from(vec![
      "maize".to_string(),
      "beans".to_string(),
      "blight".to_string(),
    ]);
    let unusable = registry.unusable_labels(&vocabulary);
    assert_eq!(unusable, vec!["beans".to_string(), "blight".to_string()]);
  }
}
