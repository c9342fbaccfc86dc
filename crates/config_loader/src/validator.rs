//! 配置校验模块
//!
//! 校验规则：
//! - dispatcher 字段范围合法 (capacity / parallelism / close_timeout_ms > 0)
//! - sink 名称唯一
//! - sink 必填参数齐全 (file 需要 path, network 需要 addr)

use std::collections::HashSet;

use contracts::{ContractError, RelayBlueprint};

/// 校验 RelayBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    blueprint.dispatcher.validate()?;
    validate_sink_names(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验 sink 名称唯一性
fn validate_sink_names(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sink in &blueprint.sinks {
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验每个 sink 条目
fn validate_sinks(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    for sink in &blueprint.sinks {
        sink.validate()?;
    }
    Ok(())
}
