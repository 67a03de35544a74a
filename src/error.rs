use serde::{Deserialize, Serialize};

/// 签名/验签核心的错误。
/// 注意：验签失败不是错误，验签接口以 bool 表达结果。
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// 密钥内容无法解析。
    #[error("invalid key material: {0}")]
    KeyFormat(String),
    /// 密钥结构合法，但不是 RSA 类型。
    #[error("unexpected key type, RSA key required")]
    KeyType,
    /// 移除 sign/sign_type 之后没有任何待签名参数。
    #[error("no parameters to canonicalize")]
    EmptyParameters,
    /// RSA 签名失败。
    #[error("rsa signing failed: {0}")]
    Signing(String),
}

/// 支付宝网关错误。
/// code 为 "10000" 时表示调用成功，其余均为失败。
/// 参见 <https://opendocs.alipay.com/common/02km9f>
#[derive(Debug, Clone, Default, Serialize, Deserialize, thiserror::Error)]
#[serde(default)]
#[error("支付宝网关错误: {code} {msg} ({sub_code}: {sub_msg})")]
pub struct AlipayApiError {
    /// 网关返回码
    pub code: String,
    /// 网关返回码描述
    pub msg: String,
    /// 业务返回码
    pub sub_code: String,
    /// 业务返回码描述
    pub sub_msg: String,
}
