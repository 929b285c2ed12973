//! 元数据定义
//!
//! 提供组件和类型的元数据信息

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型信息
///
/// 相等性与哈希只取决于 `TypeId`，名称仅用于日志和错误信息。
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// 类型名称（不含模块路径）
    pub name: String,
    /// 类型ID
    pub id: TypeId,
    /// 完整类型路径
    pub module_path: String,
}

impl TypeInfo {
    /// 从类型获取类型信息，支持 trait object
    pub fn of<T: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<T>();
        Self {
            name: short_type_name(full_name).to_string(),
            id: TypeId::of::<T>(),
            module_path: full_name.to_string(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// 检查是否为指定类型
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

fn short_type_name(full_name: &str) -> &str {
    // 泛型参数中的路径不做处理
    let head = full_name.split('<').next().unwrap_or(full_name);
    match head.rfind("::") {
        Some(index) => &full_name[index + 2..],
        None => full_name.trim_start_matches("dyn "),
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module_path)
    }
}
