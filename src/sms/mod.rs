//! 短信发送。目前支持阿里云与天翼云两个渠道。
//! 各渠道实现 `SmsAdaptor`，由 `send_sms` 按顺序逐个尝试。

pub mod aliyun;
pub mod tianyiyun;

pub use aliyun::AliyunSms;
pub use tianyiyun::TianyiyunSms;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// 发送成功时各渠道统一的状态码。
pub const CODE_OK: &str = "OK";

/// 阿里云防重放随机数撞车时的状态码，重新生成随机数重发即可。
const CODE_SIGNATURE_NONCE_USED: &str = "SignatureNonceUsed";

/// 同一渠道上随机数撞车的最大重发次数。
const MAX_NONCE_RETRIES: usize = 3;

/// 短信渠道适配器。
#[async_trait]
pub trait SmsAdaptor: Send + Sync {
    /// 渠道名称，如 "Aliyun"、"TianYiyun"。
    fn channel(&self) -> &'static str;

    /// 向指定手机号发送一条短信。
    /// 返回 Err 表示传输层失败；渠道侧的业务失败体现在返回值的 code 上。
    async fn send(&self, phone: &str) -> Result<SmsResponse>;
}

/// 各渠道统一的发送结果。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsResponse {
    /// 状态码。成功统一为 "OK"
    pub code: String,
    /// 状态描述
    pub message: String,
    /// 消息标识/请求 ID
    pub request_id: String,
    /// 发送回执 ID（阿里云）
    pub biz_id: String,
    /// 时间戳，格式 yyyyMMddHHmmssSSS（天翼云）
    pub timestamp: String,
    /// 发送使用的渠道
    pub channel: String,
}

impl SmsResponse {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// 依次尝试各渠道发送短信，任一渠道成功即返回。
/// 阿里云的 SignatureNonceUsed 在同一渠道内重发，次数有上限，
/// 防止渠道持续返回该状态码时无限重试。
pub async fn send_sms(phone: &str, adaptors: &[&dyn SmsAdaptor]) -> Result<SmsResponse> {
    if adaptors.is_empty() {
        anyhow::bail!("no sms adaptor configured");
    }
    if phone.is_empty() {
        anyhow::bail!("phone is empty");
    }

    let mut last = None;
    for adaptor in adaptors {
        let mut attempts = 0;
        let res = loop {
            let res = adaptor.send(phone).await?;
            if res.code != CODE_SIGNATURE_NONCE_USED {
                break res;
            }
            attempts += 1;
            if attempts >= MAX_NONCE_RETRIES {
                warn!(
                    "sms channel {}: nonce collision {} times in a row, giving up",
                    adaptor.channel(),
                    attempts
                );
                break res;
            }
        };

        if res.is_ok() {
            info!(
                "sms sent via {}, request_id={}",
                adaptor.channel(),
                res.request_id
            );
            return Ok(res);
        }
        warn!(
            "sms channel {} failed, code={}, message={}",
            adaptor.channel(),
            res.code,
            res.message
        );
        last = Some(res);
    }

    match last {
        Some(res) => Err(anyhow::format_err!(
            "sms send failed on all channels, last code: {}",
            res.code
        )),
        None => Err(anyhow::format_err!("no sms adaptor configured")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按脚本依次返回状态码的假渠道。脚本耗尽后重复最后一个。
    struct ScriptedAdaptor {
        name: &'static str,
        codes: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedAdaptor {
        fn new(name: &'static str, codes: Vec<&'static str>) -> ScriptedAdaptor {
            ScriptedAdaptor {
                name,
                codes,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SmsAdaptor for ScriptedAdaptor {
        fn channel(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _phone: &str) -> Result<SmsResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let code = self.codes[n.min(self.codes.len() - 1)];
            Ok(SmsResponse {
                code: code.to_string(),
                channel: self.name.to_string(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_send_sms_first_channel_ok() -> anyhow::Result<()> {
        let a = ScriptedAdaptor::new("A", vec![CODE_OK]);
        let b = ScriptedAdaptor::new("B", vec![CODE_OK]);
        let res = send_sms("13800000000", &[&a, &b]).await?;
        assert!(res.is_ok());
        assert_eq!(res.channel, "A");
        assert_eq!(b.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_sms_falls_through_to_next_channel() -> anyhow::Result<()> {
        let a = ScriptedAdaptor::new("A", vec!["isv.OUT_OF_SERVICE"]);
        let b = ScriptedAdaptor::new("B", vec![CODE_OK]);
        let res = send_sms("13800000000", &[&a, &b]).await?;
        assert_eq!(res.channel, "B");
        Ok(())
    }

    #[tokio::test]
    async fn test_send_sms_nonce_retry_succeeds() -> anyhow::Result<()> {
        let a = ScriptedAdaptor::new("A", vec!["SignatureNonceUsed", CODE_OK]);
        let res = send_sms("13800000000", &[&a]).await?;
        assert!(res.is_ok());
        assert_eq!(a.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_sms_nonce_retry_is_bounded() {
        // 一直返回 SignatureNonceUsed 时不能无限重试
        let a = ScriptedAdaptor::new("A", vec!["SignatureNonceUsed"]);
        let err = send_sms("13800000000", &[&a]).await.unwrap_err();
        assert_eq!(a.calls(), MAX_NONCE_RETRIES);
        assert!(err.to_string().contains("SignatureNonceUsed"));
    }

    #[tokio::test]
    async fn test_send_sms_argument_checks() {
        let a = ScriptedAdaptor::new("A", vec![CODE_OK]);
        assert!(send_sms("", &[&a]).await.is_err());
        assert!(send_sms("13800000000", &[]).await.is_err());
    }
}
