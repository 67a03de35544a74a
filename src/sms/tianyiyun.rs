//! 天翼云短信服务（HTTP JSON 接入）。
//! 签名方式为 MD5：MD5(enterprise_no + account + timestamp + http_sign_key)，
//! 32 位大写；时间戳格式 yyyyMMddHHmmssSSS。

use super::{SmsAdaptor, SmsResponse, CODE_OK};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const CHANNEL: &str = "TianYiyun";

/// 时间戳格式 yyyyMMddHHmmssSSS，如 20230417163200000。
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// 天翼云短信渠道。
#[derive(Debug, Clone)]
pub struct TianyiyunSms {
    client: Client,
    /// 接入机地址，请求发往 http://{host}/json/submit
    host: String,
    /// 企业编号
    enterprise_no: String,
    /// http 接入账号
    account: String,
    /// 签名密钥
    http_sign_key: String,
    /// 短信内容
    content: String,
}

impl TianyiyunSms {
    pub fn new(
        host: impl Into<String>,
        enterprise_no: impl Into<String>,
        account: impl Into<String>,
        http_sign_key: impl Into<String>,
        content: impl Into<String>,
    ) -> TianyiyunSms {
        TianyiyunSms {
            client: Client::new(),
            host: host.into(),
            enterprise_no: enterprise_no.into(),
            account: account.into(),
            http_sign_key: http_sign_key.into(),
            content: content.into(),
        }
    }

    fn submit_request(&self, phone: &str) -> SubmitRequest {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let sign = md5_sign(&format!(
            "{}{}{}{}",
            self.enterprise_no, self.account, timestamp, self.http_sign_key
        ));
        SubmitRequest {
            sign,
            enterprise_no: self.enterprise_no.clone(),
            account: self.account.clone(),
            phones: phone.to_string(),
            content: self.content.clone(),
            timestamp,
        }
    }
}

#[async_trait]
impl SmsAdaptor for TianyiyunSms {
    fn channel(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, phone: &str) -> Result<SmsResponse> {
        let url = format!("http://{}/json/submit", self.host);
        let req = self.submit_request(phone);
        let res = self.client.post(&url).json(&req).send().await?;
        let res: SubmitResponse = res.json().await?;

        Ok(SmsResponse {
            code: code_by_desc(&res.desc),
            message: res.desc,
            request_id: res.msgid,
            timestamp: res.timestamp,
            channel: CHANNEL.to_string(),
            ..Default::default()
        })
    }
}

/// 提交请求体。
#[derive(Debug, Clone, Serialize)]
struct SubmitRequest {
    /// 签名
    sign: String,
    /// 企业编号
    enterprise_no: String,
    /// http 接入账号
    account: String,
    /// 手机号码
    phones: String,
    /// 短信内容
    content: String,
    /// 时间戳，用于生成 sign
    timestamp: String,
}

/// 提交响应。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SubmitResponse {
    /// 0 成功，-1000 失败
    #[allow(unused)]
    result: String,
    /// 状态描述
    desc: String,
    /// 时间戳
    timestamp: String,
    /// 消息标识，对应状态报告
    msgid: String,
}

/// MD5 签名，32 位大写十六进制。
fn md5_sign(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02X}", b)).collect()
}

/// 天翼云以 desc 表达状态，归一化到统一状态码。"成功" -> "OK"。
fn code_by_desc(desc: &str) -> String {
    match desc {
        "" => "desc为空".to_string(),
        "成功" => CODE_OK.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_sign_is_32_chars_uppercase() {
        // MD5("abc") 的标准结果
        assert_eq!(md5_sign("abc"), "900150983CD24FB0D6963F7D28E17F72");
    }

    #[test]
    fn test_code_by_desc() {
        assert_eq!(code_by_desc("成功"), "OK");
        assert_eq!(code_by_desc("余额不足"), "余额不足");
        assert_eq!(code_by_desc(""), "desc为空");
    }

    #[test]
    fn test_submit_request_sign_matches_timestamp() {
        let sms = TianyiyunSms::new("127.0.0.1", "9001", "acct", "key", "您的验证码:1234");
        let req = sms.submit_request("13800000000");

        assert_eq!(req.timestamp.len(), 17);
        assert_eq!(
            req.sign,
            md5_sign(&format!("9001acct{}key", req.timestamp))
        );
        assert_eq!(req.phones, "13800000000");
    }
}
