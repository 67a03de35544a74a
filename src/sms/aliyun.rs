//! 阿里云短信服务（dysmsapi SendSms）。
//! RPC 风格签名：参数按字典序排序、逐个百分号编码拼成规范化查询串，
//! HMAC-SHA1 后 base64 作为 Signature 参数。
//! 参见 <https://help.aliyun.com/document_detail/101414.html>

use super::{SmsAdaptor, SmsResponse};
use crate::sign::ParameterSet;
use crate::util::generate_nonce_str;
use anyhow::Result;
use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const ENDPOINT: &str = "https://dysmsapi.aliyuncs.com/";
const ACTION: &str = "SendSms";
const API_VERSION: &str = "2017-05-25";
const CHANNEL: &str = "Aliyun";

/// 签名时间戳使用 UTC，格式 `2024-05-26T08:00:00Z`。
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 阿里云短信渠道。
#[derive(Debug, Clone)]
pub struct AliyunSms {
    client: Client,
    /// AccessKey ID
    access_key_id: String,
    /// AccessKey Secret
    access_key_secret: String,
    /// 地域 ID，如 cn-hangzhou
    region_id: String,
    /// 短信签名名称
    sign_name: String,
    /// 短信模板 CODE
    template_code: String,
    /// 短信模板变量对应的实际值，JSON 串
    template_param: String,
}

impl AliyunSms {
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        region_id: impl Into<String>,
        sign_name: impl Into<String>,
        template_code: impl Into<String>,
        template_param: impl Into<String>,
    ) -> AliyunSms {
        AliyunSms {
            client: Client::new(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            region_id: region_id.into(),
            sign_name: sign_name.into(),
            template_code: template_code.into(),
            template_param: template_param.into(),
        }
    }

    /// 组装带签名的请求表单。
    /// SignatureNonce 每次调用都重新生成，撞车时整个表单重建即可重发。
    fn signed_form(&self, phone: &str) -> Result<Vec<(String, String)>> {
        let mut params = ParameterSet::new();
        params.add("AccessKeyId", self.access_key_id.clone());
        params.add("Action", ACTION);
        params.add("Format", "JSON");
        params.add("PhoneNumbers", phone);
        params.add("RegionId", self.region_id.clone());
        params.add("SignName", self.sign_name.clone());
        params.add("SignatureMethod", "HMAC-SHA1");
        params.add("SignatureNonce", generate_nonce_str(32));
        params.add("SignatureVersion", "1.0");
        params.add("TemplateCode", self.template_code.clone());
        if !self.template_param.is_empty() {
            params.add("TemplateParam", self.template_param.clone());
        }
        params.add("Timestamp", Utc::now().format(TIMESTAMP_FORMAT).to_string());
        params.add("Version", API_VERSION);

        // ParameterSet 按 key 字典序迭代，正符合规范化查询串的要求
        let canonical_query = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let string_to_sign = format!("POST&{}&{}", percent_encode("/"), percent_encode(&canonical_query));

        let mut mac = HmacSha1::new_from_slice(format!("{}&", self.access_key_secret).as_bytes())?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let mut form: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        form.push(("Signature".to_string(), signature));
        Ok(form)
    }
}

#[async_trait]
impl SmsAdaptor for AliyunSms {
    fn channel(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, phone: &str) -> Result<SmsResponse> {
        let form = self.signed_form(phone)?;
        let res = self.client.post(ENDPOINT).form(&form).send().await?;
        let res: AliyunSmsResponse = res.json().await?;

        Ok(SmsResponse {
            code: res.code,
            message: res.message,
            request_id: res.request_id,
            biz_id: res.biz_id,
            channel: CHANNEL.to_string(),
            ..Default::default()
        })
    }
}

/// SendSms 响应。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AliyunSmsResponse {
    /// 请求状态码
    code: String,
    /// 状态码描述
    message: String,
    /// 请求 ID
    request_id: String,
    /// 发送回执 ID
    biz_id: String,
}

/// 阿里云规范化要求的百分号编码。
/// 除 A-Za-z0-9 和 `-`、`_`、`.`、`~` 外全部编码，十六进制大写，空格编码为 %20。
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("abc-_.~XYZ09"), "abc-_.~XYZ09");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("="), "%3D");
        assert_eq!(percent_encode("/"), "%2F");
        assert_eq!(percent_encode("中"), "%E4%B8%AD");
    }

    #[test]
    fn test_signed_form_contains_signature() -> anyhow::Result<()> {
        let sms = AliyunSms::new(
            "testAccessKeyId",
            "testAccessKeySecret",
            "cn-hangzhou",
            "测试签名",
            "SMS_0001",
            r#"{"code":"123456"}"#,
        );
        let form = sms.signed_form("13800000000")?;

        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("Action"), Some(ACTION));
        assert_eq!(get("Version"), Some(API_VERSION));
        assert_eq!(get("PhoneNumbers"), Some("13800000000"));
        assert_eq!(get("SignatureMethod"), Some("HMAC-SHA1"));
        // base64(HMAC-SHA1) 固定 28 字符
        assert_eq!(get("Signature").map(|s| s.len()), Some(28));
        Ok(())
    }

    #[test]
    fn test_nonce_changes_between_forms() -> anyhow::Result<()> {
        let sms = AliyunSms::new("ak", "sk", "cn-hangzhou", "sign", "SMS_0001", "");
        let nonce = |form: &[(String, String)]| {
            form.iter()
                .find(|(k, _)| k == "SignatureNonce")
                .map(|(_, v)| v.clone())
        };
        let a = nonce(&sms.signed_form("13800000000")?);
        let b = nonce(&sms.signed_form("13800000000")?);
        assert!(a.is_some());
        assert_ne!(a, b);
        Ok(())
    }
}
