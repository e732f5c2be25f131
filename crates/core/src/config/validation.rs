/// 配置段自校验
pub trait ConfigValidator {
    fn validate(&self) -> anyhow::Result<()>;
}
