// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::Instant;

use tracing::{info, warn};

use crate::input::ImageInput;
use crate::model::{Decoded, ModelName, ModelRegistry, decode};

/// 任务: 给定注册表与输入图像, 执行一次完整的推理流程
pub trait Task: Sized {
  type Output;
  type Error;

  fn run_task(
    self,
    registry: &ModelRegistry,
    image: ImageInput,
  ) -> Result<Self::Output, Self::Error>;
}

/// 单模型单次推理任务
pub struct OneShotTask {
  model: ModelName,
}

impl OneShotTask {
  pub fn new(model: ModelName) -> Self {
    OneShotTask { model }
  }
}

impl Task for OneShotTask {
  type Output = Decoded;
  type Error = anyhow::Error;

  fn run_task(self, registry: &ModelRegistry, image: ImageInput) -> Result<Decoded, Self::Error> {
    info!("开始任务...");
    let resolved = registry.resolve(self.model)?;

    info!("模型 {} 加载完成, 开始推理...", resolved.name);
    let now = Instant::now();
    let outputs = resolved.interpreter.infer(image)?;
    info!("推理完成, 耗时: {:.2?}", now.elapsed());

    let decoded = decode(resolved.name.decode_policy(), &outputs, &resolved.labelmap)?;
    info!("解码完成: {}", decoded);

    Ok(decoded)
  }
}

/// 两级流水线任务: 一级作物分类的结果标签选择二级病害分类模型
pub struct AutoChainTask;

impl Task for AutoChainTask {
  type Output = (Decoded, Decoded);
  type Error = anyhow::Error;

  fn run_task(
    self,
    registry: &ModelRegistry,
    image: ImageInput,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");

    // 两级推理共用同一张解码后的位图
    let bitmap = image.into_bitmap()?;

    let first = registry.resolve(ModelName::Auto)?;

    // 一级词表与资产目录存在隐式耦合, 入口处校验并告警
    for label in registry.unusable_labels(&first.labelmap) {
      warn!("一级标签 '{}' 没有对应的二级模型资产", label);
    }

    info!("一级模型加载完成, 开始推理...");
    let now = Instant::now();
    let outputs = first.interpreter.infer(ImageInput::Bitmap(bitmap.clone()))?;
    info!("一级推理完成, 耗时: {:.2?}", now.elapsed());

    let crop = decode(first.name.decode_policy(), &outputs, &first.labelmap)?;
    info!("一级解码完成: {}", crop);

    // 一级结果标签即二级模型名
    let second_name = crop
      .label()
      .parse::<ModelName>()
      .map_err(|e| anyhow::anyhow!("一级结果无法选择二级模型: {}", e))?;
    if second_name == ModelName::Auto {
      return Err(anyhow::anyhow!("一级结果不能再次选择 auto 模型"));
    }

    let second = registry.resolve(second_name)?;
    info!("二级模型 {} 加载完成, 开始推理...", second.name);
    let now = Instant::now();
    let outputs = second.interpreter.infer(ImageInput::Bitmap(bitmap))?;
    info!("二级推理完成, 耗时: {:.2?}", now.elapsed());

    let disease = decode(second.name.decode_policy(), &outputs, &second.labelmap)?;
    info!("二级解码完成: {}", disease);

    Ok((crop, disease))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_oneshot_fails_on_missing_assets() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let err = OneShotTask::new(ModelName::Tomato)
      .run_task(&registry, ImageInput::Path("img.png".to_string()))
      .unwrap_err();
    assert!(err.to_string().contains("tomato-labelmap.txt"));
  }

  #[test]
  fn test_auto_chain_fails_on_missing_first_stage() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let bitmap = image::RgbImage::new(2, 2);
    let err = AutoChainTask
      .run_task(&registry, ImageInput::Bitmap(bitmap))
      .unwrap_err();
    assert!(err.to_string().contains("auto-labelmap.txt"));
  }
}
