//! 替换插件抽象接口

use infrastructure_common::{BoxError, Instance};

/// 替换插件 trait
///
/// 在测试实例准备阶段被调用，返回该测试实例希望使用的测试替身。
/// 闭包 `Fn(&str, &Instance) -> Result<Vec<Instance>, BoxError>` 直接实现该 trait。
pub trait ReplacementPlugin: Send + Sync {
    /// 插件名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 为测试实例提供替身
    fn replacements(&self, test_id: &str, test_instance: &Instance)
        -> Result<Vec<Instance>, BoxError>;
}

impl<F> ReplacementPlugin for F
where
    F: Fn(&str, &Instance) -> Result<Vec<Instance>, BoxError> + Send + Sync,
{
    fn replacements(
        &self,
        test_id: &str,
        test_instance: &Instance,
    ) -> Result<Vec<Instance>, BoxError> {
        self(test_id, test_instance)
    }
}
